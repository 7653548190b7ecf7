//! Grid coordinates and single-cell Manhattan stepping.

use serde::{Deserialize, Serialize};

/// A cell on the factory floor, `(row, col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub row: i32,
    pub col: i32,
}

impl GridPos {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn manhattan_distance(&self, other: &GridPos) -> u32 {
        (self.row - other.row).unsigned_abs() + (self.col - other.col).unsigned_abs()
    }

    /// One cell toward `target`. The row delta is resolved completely before
    /// the column delta; there is no diagonal movement.
    pub fn step_toward(&self, target: GridPos) -> GridPos {
        if self.row != target.row {
            GridPos::new(self.row + (target.row - self.row).signum(), self.col)
        } else if self.col != target.col {
            GridPos::new(self.row, self.col + (target.col - self.col).signum())
        } else {
            *self
        }
    }

    /// Parse `"row,col"`.
    pub fn parse(s: &str) -> Option<GridPos> {
        let (r, c) = s.split_once(',')?;
        Some(GridPos::new(r.trim().parse().ok()?, c.trim().parse().ok()?))
    }
}

impl std::fmt::Display for GridPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Floor dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub rows: i32,
    pub cols: i32,
}

impl GridSize {
    pub fn contains(&self, pos: GridPos) -> bool {
        (0..self.rows).contains(&pos.row) && (0..self.cols).contains(&pos.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_distance_sums_axes() {
        let a = GridPos::new(1, 2);
        let b = GridPos::new(4, -2);
        assert_eq!(a.manhattan_distance(&b), 7);
        assert_eq!(b.manhattan_distance(&a), 7);
    }

    #[test]
    fn step_resolves_rows_first() {
        let mut pos = GridPos::new(0, 0);
        let target = GridPos::new(2, 2);
        let mut path = Vec::new();
        while pos != target {
            pos = pos.step_toward(target);
            path.push(pos);
        }
        assert_eq!(
            path,
            vec![
                GridPos::new(1, 0),
                GridPos::new(2, 0),
                GridPos::new(2, 1),
                GridPos::new(2, 2),
            ]
        );
    }

    #[test]
    fn step_at_target_stays() {
        let p = GridPos::new(3, 3);
        assert_eq!(p.step_toward(p), p);
    }

    #[test]
    fn parse_cell() {
        assert_eq!(GridPos::parse("3, 7"), Some(GridPos::new(3, 7)));
        assert_eq!(GridPos::parse("3"), None);
        assert_eq!(GridPos::parse("a,b"), None);
    }

    #[test]
    fn grid_bounds() {
        let size = GridSize { rows: 16, cols: 30 };
        assert!(size.contains(GridPos::new(0, 0)));
        assert!(size.contains(GridPos::new(15, 29)));
        assert!(!size.contains(GridPos::new(16, 0)));
        assert!(!size.contains(GridPos::new(0, -1)));
    }
}
