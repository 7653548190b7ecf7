use serde::{Deserialize, Serialize};

/// Index of a station in the factory's station arena. Robots and tasks hold
/// this instead of a reference, so no robot ever co-owns a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(pub u32);

impl StationId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a robot in the factory's robot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RobotId(pub u32);

impl RobotId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic identifier of a work item. Never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

/// Identifies a recipe in the [`RecipeBook`](crate::recipe::RecipeBook).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipeId(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_index_into_arenas() {
        assert_eq!(StationId(4).index(), 4);
        assert_eq!(RobotId(9).index(), 9);
    }

    #[test]
    fn item_ids_order_by_creation() {
        assert!(ItemId(1) < ItemId(2));
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(StationId(0), "storage");
        map.insert(StationId(1), "washer");
        assert_eq!(map[&StationId(1)], "washer");
    }
}
