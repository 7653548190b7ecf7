//! Binary snapshots of the whole factory.
//!
//! A snapshot is a `bitcode` blob with a versioned header. It carries the
//! config, the recipe catalog, every station and robot, the generator and
//! the counters, so a restored factory continues bit-identically. The event
//! log is not part of the snapshot and comes back empty.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::FactoryConfig;
use crate::engine::{CompletedProduct, Counters, Factory, OrderProgress};
use crate::event::EventLog;
use crate::grid::GridSize;
use crate::id::{ItemId, RecipeId};
use crate::item::ItemIdAllocator;
use crate::recipe::{Recipe, RecipeBook};
use crate::rng::SimRng;
use crate::robot::Robot;
use crate::sim::SimState;
use crate::station::Station;

/// Magic number identifying a factory snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xF00D_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("snapshot names recipe {0:?} which is not in its catalog")]
    MissingRecipe(RecipeId),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick at which the snapshot was taken.
    pub tick: u64,
}

impl SnapshotHeader {
    pub fn new(tick: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Decode only far enough to report the header. bitcode has no partial
/// decoding, so the whole payload is read.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let snapshot: FactorySnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

#[derive(Debug, Serialize, Deserialize)]
struct FactorySnapshot {
    header: SnapshotHeader,
    config: FactoryConfig,
    recipes: Vec<Recipe>,
    recipe: RecipeId,
    size: GridSize,
    stations: Vec<Station>,
    robots: Vec<Robot>,
    rng: SimRng,
    ids: ItemIdAllocator,
    sim: SimState,
    counters: Counters,
    in_progress: BTreeSet<ItemId>,
    completed_products: Vec<CompletedProduct>,
    orders: Vec<OrderProgress>,
    terminal: bool,
    next_spawn_line: u32,
    last_state_hash: u64,
}

impl Factory {
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = FactorySnapshot {
            header: SnapshotHeader::new(self.sim.tick),
            config: self.config.clone(),
            recipes: self.recipes.as_slice().to_vec(),
            recipe: self.recipe,
            size: self.size,
            stations: self.stations.clone(),
            robots: self.robots.clone(),
            rng: self.rng.clone(),
            ids: self.ids.clone(),
            sim: self.sim.clone(),
            counters: self.counters,
            in_progress: self.in_progress.clone(),
            completed_products: self.completed_products.clone(),
            orders: self.orders.clone(),
            terminal: self.terminal,
            next_spawn_line: self.next_spawn_line,
            last_state_hash: self.last_state_hash,
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Restore a factory. The header is validated before any state is
    /// used; a bad blob is an error, never a panic.
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: FactorySnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;

        let recipes = RecipeBook::from_recipes(snapshot.recipes);
        if recipes.get(snapshot.recipe).is_none() {
            return Err(DeserializeError::MissingRecipe(snapshot.recipe));
        }
        let events = EventLog::new(snapshot.config.event_capacity);

        Ok(Factory {
            config: snapshot.config,
            recipes,
            recipe: snapshot.recipe,
            size: snapshot.size,
            stations: snapshot.stations,
            robots: snapshot.robots,
            rng: snapshot.rng,
            ids: snapshot.ids,
            sim: snapshot.sim,
            counters: snapshot.counters,
            in_progress: snapshot.in_progress,
            completed_products: snapshot.completed_products,
            orders: snapshot.orders,
            terminal: snapshot.terminal,
            next_spawn_line: snapshot.next_spawn_line,
            last_state_hash: snapshot.last_state_hash,
            events,
            last_report: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::test_utils::*;

    fn busy_factory() -> Factory {
        let mut f = Factory::new(FactoryConfig::default()).unwrap();
        for i in 0..40 {
            let action = if i % 8 == 0 {
                Action::command("produce_pasta")
            } else {
                Action::idle()
            };
            f.step(&action);
        }
        f
    }

    #[test]
    fn round_trip_preserves_state_hash() {
        let f = busy_factory();
        let data = f.serialize().unwrap();
        let restored = Factory::deserialize(&data).unwrap();
        assert_eq!(restored.state_hash(), f.state_hash());
        assert_eq!(restored.tick(), f.tick());
        assert_eq!(restored.observe(), f.observe());
    }

    #[test]
    fn restored_factory_continues_identically() {
        let mut original = busy_factory();
        let mut restored = Factory::deserialize(&original.serialize().unwrap()).unwrap();
        for i in 0..60 {
            let action = if i % 10 == 0 {
                Action::command("produce_pasta")
            } else {
                Action::idle()
            };
            let a = original.step(&action);
            let b = restored.step(&action);
            assert_eq!(a.reward, b.reward);
            assert_eq!(original.state_hash(), restored.state_hash());
        }
    }

    #[test]
    fn event_log_comes_back_empty() {
        let f = busy_factory();
        assert!(!f.events().is_empty());
        let restored = Factory::deserialize(&f.serialize().unwrap()).unwrap();
        assert!(restored.events().is_empty());
        assert_eq!(restored.events().capacity(), f.events().capacity());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        match Factory::deserialize(&[0u8; 10]) {
            Err(DeserializeError::Decode(_)) => {}
            Err(other) => panic!("expected Decode error, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn header_validation() {
        assert!(SnapshotHeader::new(5).validate().is_ok());

        let bad_magic = SnapshotHeader {
            magic: 0xDEAD_BEEF,
            ..SnapshotHeader::new(0)
        };
        assert!(matches!(
            bad_magic.validate(),
            Err(DeserializeError::InvalidMagic(0xDEAD_BEEF))
        ));

        let future = SnapshotHeader {
            version: FORMAT_VERSION + 1,
            ..SnapshotHeader::new(0)
        };
        assert!(matches!(
            future.validate(),
            Err(DeserializeError::FutureVersion(_))
        ));

        let old = SnapshotHeader {
            version: 0,
            ..SnapshotHeader::new(0)
        };
        assert!(matches!(
            old.validate(),
            Err(DeserializeError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn header_reports_tick() {
        let f = busy_factory();
        let header = read_snapshot_header(&f.serialize().unwrap()).unwrap();
        assert_eq!(header.tick, 40);
        assert_eq!(header.magic, SNAPSHOT_MAGIC);
    }

    #[test]
    fn order_progress_survives() {
        let config = FactoryConfig::default()
            .with_orders(vec![crate::config::ProductionOrder::new("salad", 3)]);
        let mut f = Factory::new(config).unwrap();
        f.step(&Action::command("produce_next"));
        let restored = Factory::deserialize(&f.serialize().unwrap()).unwrap();
        assert_eq!(restored.orders(), f.orders());
        assert_eq!(restored.orders()[0].released, 1);
    }

    #[test]
    fn custom_catalog_survives() {
        let f = factory_with_recipe(two_ingredient_recipe());
        let restored = Factory::deserialize(&f.serialize().unwrap()).unwrap();
        assert_eq!(restored.default_recipe(), f.default_recipe());
    }
}
