use serde::{Deserialize, Serialize};

use crate::recipe::RecipeBook;

/// A configuration the factory cannot run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("num_lines must be at least 1")]
    NoLines,
    #[error("{buffer} capacity must be at least 1")]
    ZeroCapacity { buffer: &'static str },
    #[error("max_ticks must be at least 1")]
    ZeroMaxTicks,
    #[error(
        "{buffer} capacity {capacity} cannot hold recipe {recipe}, which needs {needed} ingredients"
    )]
    CapacityBelowRecipe {
        recipe: String,
        needed: usize,
        buffer: &'static str,
        capacity: usize,
    },
    #[error("order for {recipe} has quantity 0")]
    EmptyOrder { recipe: String },
    #[error("order names unknown recipe {recipe}")]
    UnknownOrder { recipe: String },
}

/// One line of the production schedule: make `quantity` of `recipe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub recipe: String,
    pub quantity: u32,
}

impl ProductionOrder {
    pub fn new(recipe: impl Into<String>, quantity: u32) -> Self {
        Self {
            recipe: recipe.into(),
            quantity,
        }
    }
}

/// Ten of each built-in dish: salad, then fried rice, then pasta.
pub fn standard_orders() -> Vec<ProductionOrder> {
    ["salad", "fried_rice", "pasta"]
        .into_iter()
        .map(|name| ProductionOrder::new(name, 10))
        .collect()
}

/// How items move between workflow stages when no coordinator map is
/// given for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Output buffers feed the next stage directly.
    #[default]
    Direct,
    /// Logistics robots serve fixed stage pairs.
    Segmented,
    /// Logistics robots serve the nearest source.
    Nearest,
}

/// Which intake storage a `produce_*` command fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnPolicy {
    #[default]
    FirstLine,
    /// Alternate lines on every spawn.
    RoundRobin,
}

/// Factory construction parameters. Every field has a default, so partial
/// config files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    pub seed: u64,
    /// Terminal once this many products are completed. Zero disables.
    pub target_products: u64,
    pub max_ticks: u64,
    /// Default recipe: sets baseline stage times and owns bare ingredients.
    pub recipe: String,
    /// Production schedule, worked front to back by `produce_next`. When
    /// non-empty, the episode ends once every order is complete.
    pub orders: Vec<ProductionOrder>,
    pub num_lines: u32,
    pub station_capacity: usize,
    pub storage_capacity: usize,
    pub transport: TransportMode,
    pub spawn: SpawnPolicy,
    pub malfunctions: bool,
    pub reserve_robots_per_line: u32,
    pub event_capacity: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            target_products: 0,
            max_ticks: 500,
            recipe: "pasta".to_string(),
            orders: Vec::new(),
            num_lines: 2,
            station_capacity: 10,
            storage_capacity: 100,
            transport: TransportMode::Direct,
            spawn: SpawnPolicy::FirstLine,
            malfunctions: true,
            reserve_robots_per_line: 1,
            event_capacity: 1024,
        }
    }
}

impl FactoryConfig {
    pub fn with_recipe(mut self, recipe: impl Into<String>) -> Self {
        self.recipe = recipe.into();
        self
    }

    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    pub fn without_malfunctions(mut self) -> Self {
        self.malfunctions = false;
        self
    }

    pub fn with_orders(mut self, orders: Vec<ProductionOrder>) -> Self {
        self.orders = orders;
        self
    }

    /// Structural checks that need no catalog.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.num_lines == 0 {
            return Err(ConfigError::NoLines);
        }
        for (buffer, capacity) in self.buffers() {
            if capacity == 0 {
                return Err(ConfigError::ZeroCapacity { buffer });
            }
        }
        if self.max_ticks == 0 {
            return Err(ConfigError::ZeroMaxTicks);
        }
        if let Some(order) = self.orders.iter().find(|o| o.quantity == 0) {
            return Err(ConfigError::EmptyOrder {
                recipe: order.recipe.clone(),
            });
        }
        Ok(())
    }

    /// [`check`](Self::check), then checks against the catalog the factory
    /// will run. Every buffer must hold the widest recipe's full ingredient
    /// set: intake takes whole kits and a combiner needs a whole set at once.
    pub fn check_against(&self, recipes: &RecipeBook) -> Result<(), ConfigError> {
        self.check()?;
        if let Some(widest) = recipes.iter().max_by_key(|r| r.ingredients.len()) {
            let needed = widest.ingredients.len();
            for (buffer, capacity) in self.buffers() {
                if capacity < needed {
                    return Err(ConfigError::CapacityBelowRecipe {
                        recipe: widest.name.clone(),
                        needed,
                        buffer,
                        capacity,
                    });
                }
            }
        }
        if let Some(order) = self.orders.iter().find(|o| recipes.by_name(&o.recipe).is_none()) {
            return Err(ConfigError::UnknownOrder {
                recipe: order.recipe.clone(),
            });
        }
        Ok(())
    }

    fn buffers(&self) -> [(&'static str, usize); 2] {
        [
            ("station", self.station_capacity),
            ("storage", self.storage_capacity),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::standard_catalog;

    #[test]
    fn defaults() {
        let c = FactoryConfig::default();
        assert_eq!(c.max_ticks, 500);
        assert_eq!(c.num_lines, 2);
        assert_eq!(c.station_capacity, 10);
        assert!(c.check().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: FactoryConfig =
            serde_json::from_str(r#"{"seed": 7, "transport": "segmented"}"#).unwrap();
        assert_eq!(c.seed, 7);
        assert_eq!(c.transport, TransportMode::Segmented);
        assert_eq!(c.recipe, "pasta");
    }

    #[test]
    fn zero_lines_rejected() {
        let c = FactoryConfig {
            num_lines: 0,
            ..FactoryConfig::default()
        };
        assert_eq!(c.check(), Err(ConfigError::NoLines));
    }

    #[test]
    fn zero_storage_names_the_buffer() {
        let c = FactoryConfig {
            storage_capacity: 0,
            ..FactoryConfig::default()
        };
        assert_eq!(c.check(), Err(ConfigError::ZeroCapacity { buffer: "storage" }));
    }

    // ===========================================================================
    // Catalog checks
    // ===========================================================================

    #[test]
    fn station_capacity_must_hold_widest_recipe() {
        let book = standard_catalog().unwrap();
        let c = FactoryConfig {
            station_capacity: 6,
            ..FactoryConfig::default()
        };
        assert_eq!(
            c.check_against(&book),
            Err(ConfigError::CapacityBelowRecipe {
                recipe: "fried_rice".into(),
                needed: 7,
                buffer: "station",
                capacity: 6,
            })
        );
        let seven = FactoryConfig {
            station_capacity: 7,
            ..c
        };
        assert!(seven.check_against(&book).is_ok());
    }

    #[test]
    fn orders_must_be_known_and_non_empty() {
        let book = standard_catalog().unwrap();
        let empty = FactoryConfig::default().with_orders(vec![ProductionOrder::new("salad", 0)]);
        assert!(matches!(empty.check(), Err(ConfigError::EmptyOrder { .. })));
        let unknown = FactoryConfig::default().with_orders(vec![ProductionOrder::new("soup", 3)]);
        assert!(unknown.check().is_ok());
        assert_eq!(
            unknown.check_against(&book),
            Err(ConfigError::UnknownOrder {
                recipe: "soup".into()
            })
        );
    }

    #[test]
    fn standard_orders_fit_standard_catalog() {
        let book = standard_catalog().unwrap();
        let c = FactoryConfig::default().with_orders(standard_orders());
        assert!(c.check_against(&book).is_ok());
        assert_eq!(c.orders.len(), 3);
    }

    #[test]
    fn orders_parse_from_json() {
        let c: FactoryConfig = serde_json::from_str(
            r#"{"orders": [{"recipe": "salad", "quantity": 10}, {"recipe": "pasta", "quantity": 4}]}"#,
        )
        .unwrap();
        assert_eq!(c.orders[1], ProductionOrder::new("pasta", 4));
    }
}
