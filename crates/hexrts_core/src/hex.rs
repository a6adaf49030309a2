//! Axial hex coordinates.
//!
//! The map is a pointy-top hex grid addressed by axial `(q, r)` pairs.
//! `HexCoord` is a plain value type: structural equality and hashing,
//! cheap to copy, fully serializable.

use serde::{Deserialize, Serialize};

/// Axial hex coordinate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct HexCoord {
    /// Axial column.
    pub q: i32,
    /// Axial row.
    pub r: i32,
}

/// The six axial direction offsets, in fixed clockwise order.
///
/// The order matters for determinism: neighbor expansion in the
/// pathfinder and ring walks always visit directions in this order.
pub const HEX_DIRECTIONS: [(i32, i32); 6] = [
    (1, 0),  // east
    (1, -1), // northeast
    (0, -1), // northwest
    (-1, 0), // west
    (-1, 1), // southwest
    (0, 1),  // southeast
];

impl HexCoord {
    /// Origin coordinate.
    pub const ORIGIN: Self = Self { q: 0, r: 0 };

    /// Create a new coordinate.
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Hex grid distance to another coordinate.
    ///
    /// This is the minimum number of steps between the two hexes, the
    /// axial form of cube Manhattan distance divided by two. It never
    /// overestimates true path cost (every step costs at least 1), so
    /// it is an admissible A* heuristic.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        let ds = dq + dr;
        ((dq.abs() + dr.abs() + ds.abs()) / 2) as u32
    }

    /// The six adjacent coordinates, in [`HEX_DIRECTIONS`] order.
    #[must_use]
    pub fn neighbors(self) -> [Self; 6] {
        let mut out = [Self::ORIGIN; 6];
        for (i, &(dq, dr)) in HEX_DIRECTIONS.iter().enumerate() {
            out[i] = Self::new(self.q + dq, self.r + dr);
        }
        out
    }

    /// Check adjacency (distance exactly 1).
    #[must_use]
    pub fn is_neighbor_of(self, other: Self) -> bool {
        self.distance(other) == 1
    }

    /// All coordinates at exactly `radius` steps from `self`.
    ///
    /// Radius 0 yields just `self`. The walk order is deterministic:
    /// start `radius` steps to the southwest, then trace the ring
    /// clockwise through the six directions.
    #[must_use]
    pub fn ring(self, radius: u32) -> Vec<Self> {
        if radius == 0 {
            return vec![self];
        }

        let r = radius as i32;
        let mut out = Vec::with_capacity(6 * radius as usize);
        // Start at self + southwest * radius
        let mut cur = Self::new(self.q - r, self.r + r);
        for &(dq, dr) in &HEX_DIRECTIONS {
            for _ in 0..radius {
                out.push(cur);
                cur = Self::new(cur.q + dq, cur.r + dr);
            }
        }
        out
    }

    /// All coordinates within `radius` steps, nearest rings first.
    #[must_use]
    pub fn spiral(self, radius: u32) -> Vec<Self> {
        let mut out = Vec::new();
        for ring_radius in 0..=radius {
            out.extend(self.ring(ring_radius));
        }
        out
    }
}

impl std::fmt::Display for HexCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_distance_symmetry() {
        let a = HexCoord::new(3, -2);
        let b = HexCoord::new(-1, 4);
        assert_eq!(a.distance(b), b.distance(a));
        assert_eq!(a.distance(a), 0);
    }

    #[test]
    fn test_distance_known_values() {
        let origin = HexCoord::ORIGIN;
        assert_eq!(origin.distance(HexCoord::new(1, 0)), 1);
        assert_eq!(origin.distance(HexCoord::new(1, -1)), 1);
        assert_eq!(origin.distance(HexCoord::new(2, -1)), 2);
        assert_eq!(origin.distance(HexCoord::new(3, 0)), 3);
        // q and r steps in the same sign direction add up
        assert_eq!(origin.distance(HexCoord::new(2, 2)), 4);
    }

    #[test]
    fn test_neighbors_are_adjacent() {
        let c = HexCoord::new(5, -3);
        let neighbors = c.neighbors();
        assert_eq!(neighbors.len(), 6);
        for n in neighbors {
            assert_eq!(c.distance(n), 1);
        }
        // All distinct
        let set: HashSet<_> = neighbors.iter().copied().collect();
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn test_ring_counts_and_distances() {
        let c = HexCoord::new(1, 1);
        assert_eq!(c.ring(0), vec![c]);
        for radius in 1..4u32 {
            let ring = c.ring(radius);
            assert_eq!(ring.len(), (6 * radius) as usize);
            for h in &ring {
                assert_eq!(c.distance(*h), radius);
            }
        }
    }

    #[test]
    fn test_spiral_nearest_first() {
        let c = HexCoord::ORIGIN;
        let spiral = c.spiral(2);
        assert_eq!(spiral.len(), 1 + 6 + 12);
        let mut last = 0;
        for h in spiral {
            let d = c.distance(h);
            assert!(d >= last, "spiral must be ordered by ring");
            last = d;
        }
    }
}
