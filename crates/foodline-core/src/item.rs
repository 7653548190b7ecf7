//! Item kinds and the mutable work-item record that flows between stations.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::id::{ItemId, RecipeId};

/// Every kind of thing that can sit in a station buffer: raw ingredients and
/// finished products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    // Salad ingredients.
    Lettuce,
    Romaine,
    Sprouts,
    CherryTomato,
    Ricotta,
    Nuts,
    Balsamic,
    // Pasta ingredients.
    Pasta,
    Tomato,
    Onion,
    Garlic,
    OliveOil,
    Sugar,
    Salt,
    // Fried rice ingredients.
    Rice,
    Shrimp,
    GreenOnion,
    Carrot,
    Oil,
    OysterSauce,
    // Products.
    Salad,
    PastaDish,
    RiceDish,
}

impl ItemKind {
    pub const ALL: [ItemKind; 23] = [
        ItemKind::Lettuce,
        ItemKind::Romaine,
        ItemKind::Sprouts,
        ItemKind::CherryTomato,
        ItemKind::Ricotta,
        ItemKind::Nuts,
        ItemKind::Balsamic,
        ItemKind::Pasta,
        ItemKind::Tomato,
        ItemKind::Onion,
        ItemKind::Garlic,
        ItemKind::OliveOil,
        ItemKind::Sugar,
        ItemKind::Salt,
        ItemKind::Rice,
        ItemKind::Shrimp,
        ItemKind::GreenOnion,
        ItemKind::Carrot,
        ItemKind::Oil,
        ItemKind::OysterSauce,
        ItemKind::Salad,
        ItemKind::PastaDish,
        ItemKind::RiceDish,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ItemKind::Lettuce => "lettuce",
            ItemKind::Romaine => "romaine",
            ItemKind::Sprouts => "sprouts",
            ItemKind::CherryTomato => "cherry_tomato",
            ItemKind::Ricotta => "ricotta",
            ItemKind::Nuts => "nuts",
            ItemKind::Balsamic => "balsamic",
            ItemKind::Pasta => "pasta",
            ItemKind::Tomato => "tomato",
            ItemKind::Onion => "onion",
            ItemKind::Garlic => "garlic",
            ItemKind::OliveOil => "olive_oil",
            ItemKind::Sugar => "sugar",
            ItemKind::Salt => "salt",
            ItemKind::Rice => "rice",
            ItemKind::Shrimp => "shrimp",
            ItemKind::GreenOnion => "green_onion",
            ItemKind::Carrot => "carrot",
            ItemKind::Oil => "oil",
            ItemKind::OysterSauce => "oyster_sauce",
            ItemKind::Salad => "salad",
            ItemKind::PastaDish => "pasta_dish",
            ItemKind::RiceDish => "rice_dish",
        }
    }

    /// Case-insensitive lookup by snake_case name.
    pub fn from_name(name: &str) -> Option<ItemKind> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|k| k.name() == lower)
    }

    pub fn is_product(self) -> bool {
        matches!(self, ItemKind::Salad | ItemKind::PastaDish | ItemKind::RiceDish)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One product instance, or one raw ingredient unit before combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub kind: ItemKind,
    pub id: ItemId,
    pub recipe: RecipeId,
    /// Index into the recipe workflow of the stage currently holding the item.
    pub current_step: usize,
    pub time_remaining: u32,
    pub quality: Fixed64,
    pub is_defective: bool,
    pub line: u32,
    pub sealed: bool,
}

impl WorkItem {
    pub fn new(kind: ItemKind, id: ItemId, recipe: RecipeId, line: u32) -> Self {
        Self {
            kind,
            id,
            recipe,
            current_step: 0,
            time_remaining: 0,
            quality: Fixed64::ONE,
            is_defective: false,
            line,
            sealed: false,
        }
    }

    pub fn with_quality(mut self, quality: Fixed64) -> Self {
        self.quality = quality;
        self
    }

    /// Multiply quality by `factor`, clamped into `[0, 1]`.
    pub fn degrade(&mut self, factor: Fixed64) {
        self.quality = crate::fixed::clamp_unit(self.quality * factor);
    }
}

/// Hands out monotonic item ids. Part of the factory state, so ids restart
/// at zero on reset and survive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemIdAllocator {
    next: u64,
}

impl ItemIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ItemId {
        let id = ItemId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}
