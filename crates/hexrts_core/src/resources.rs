//! Resources: stockpiles, costs and map resource points.
//!
//! All resource accounting is plain integer math. Stockpiles are
//! bounded by per-kind storage capacity; amounts never go negative.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::registry::define_id;
use crate::villager::VillagerGroupId;
use crate::hex::HexCoord;

define_id!(
    /// Unique identifier for resource points.
    ResourcePointId
);

/// The four stockpiled resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Food from forage, farms, hunting.
    Food,
    /// Wood from trees.
    Wood,
    /// Stone from quarries.
    Stone,
    /// Ore from mines.
    Ore,
}

impl ResourceKind {
    /// All kinds in fixed order (also the stockpile array layout).
    pub const ALL: [Self; 4] = [Self::Food, Self::Wood, Self::Stone, Self::Ore];

    const fn index(self) -> usize {
        match self {
            Self::Food => 0,
            Self::Wood => 1,
            Self::Stone => 2,
            Self::Ore => 3,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Food => "food",
            Self::Wood => "wood",
            Self::Stone => "stone",
            Self::Ore => "ore",
        };
        f.write_str(name)
    }
}

/// A bundle of resource amounts, used for costs and refunds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cost {
    /// Food component.
    pub food: u32,
    /// Wood component.
    pub wood: u32,
    /// Stone component.
    pub stone: u32,
    /// Ore component.
    pub ore: u32,
}

impl Cost {
    /// Zero cost.
    pub const FREE: Self = Self::new(0, 0, 0, 0);

    /// Create a cost bundle.
    #[must_use]
    pub const fn new(food: u32, wood: u32, stone: u32, ore: u32) -> Self {
        Self {
            food,
            wood,
            stone,
            ore,
        }
    }

    /// Amount of one kind in this bundle.
    #[must_use]
    pub const fn amount(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Food => self.food,
            ResourceKind::Wood => self.wood,
            ResourceKind::Stone => self.stone,
            ResourceKind::Ore => self.ore,
        }
    }

    /// Check if every component is zero.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.food == 0 && self.wood == 0 && self.stone == 0 && self.ore == 0
    }

    /// Scale every component by an integer factor (upgrade levels).
    #[must_use]
    pub const fn scaled(&self, factor: u32) -> Self {
        Self::new(
            self.food * factor,
            self.wood * factor,
            self.stone * factor,
            self.ore * factor,
        )
    }

    /// Multiply every component by `count` units.
    #[must_use]
    pub const fn times(&self, count: u32) -> Self {
        self.scaled(count)
    }
}

/// Per-player resource stockpile with per-kind storage caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stockpile {
    amounts: [u32; 4],
    capacities: [u32; 4],
}

impl Stockpile {
    /// Create a stockpile with the same capacity for every kind.
    #[must_use]
    pub const fn with_capacity(capacity: u32) -> Self {
        Self {
            amounts: [0; 4],
            capacities: [capacity; 4],
        }
    }

    /// Current amount of one kind.
    #[must_use]
    pub const fn amount(&self, kind: ResourceKind) -> u32 {
        self.amounts[kind.index()]
    }

    /// Storage capacity for one kind.
    #[must_use]
    pub const fn capacity(&self, kind: ResourceKind) -> u32 {
        self.capacities[kind.index()]
    }

    /// Raise the storage capacity for every kind (granaries, centers).
    pub fn raise_capacity(&mut self, extra: u32) {
        for c in &mut self.capacities {
            *c = c.saturating_add(extra);
        }
    }

    /// Deposit resources, respecting the storage cap.
    ///
    /// Returns the amount actually stored.
    pub fn deposit(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let i = kind.index();
        let space = self.capacities[i].saturating_sub(self.amounts[i]);
        let stored = amount.min(space);
        self.amounts[i] += stored;
        stored
    }

    /// Find the first unaffordable component of a cost, if any.
    ///
    /// Returns `(kind, required, available)` for the caller to build a
    /// typed rejection from.
    #[must_use]
    pub fn missing_for(&self, cost: &Cost) -> Option<(ResourceKind, u32, u32)> {
        for kind in ResourceKind::ALL {
            let required = cost.amount(kind);
            let available = self.amount(kind);
            if available < required {
                return Some((kind, required, available));
            }
        }
        None
    }

    /// Check affordability.
    #[must_use]
    pub fn can_afford(&self, cost: &Cost) -> bool {
        self.missing_for(cost).is_none()
    }

    /// Deduct a cost. Returns false (and deducts nothing) if short.
    pub fn spend(&mut self, cost: &Cost) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        for kind in ResourceKind::ALL {
            self.amounts[kind.index()] -= cost.amount(kind);
        }
        true
    }

    /// Return a cost to the stockpile (cancellation refunds).
    ///
    /// Refunds above capacity are clamped, not carried.
    pub fn refund(&mut self, cost: &Cost) {
        for kind in ResourceKind::ALL {
            self.deposit(kind, cost.amount(kind));
        }
    }
}

impl Default for Stockpile {
    fn default() -> Self {
        Self::with_capacity(1000)
    }
}

/// Kinds of resource point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourcePointKind {
    /// Trees, gathered as wood.
    Trees,
    /// Forage bushes, gathered as food.
    Forage,
    /// Ore deposit.
    Ore,
    /// Stone outcrop.
    Stone,
    /// A live animal; must be hunted down before it can be gathered.
    Huntable,
    /// A felled animal, gathered as food.
    Carcass,
    /// Farmland; gatherable once a farm covers it.
    Farmland,
}

impl ResourcePointKind {
    /// The stockpile kind this point yields.
    #[must_use]
    pub const fn yields(self) -> ResourceKind {
        match self {
            Self::Trees => ResourceKind::Wood,
            Self::Forage | Self::Huntable | Self::Carcass | Self::Farmland => ResourceKind::Food,
            Self::Ore => ResourceKind::Ore,
            Self::Stone => ResourceKind::Stone,
        }
    }

    /// Whether villagers must hunt this point before gathering it.
    #[must_use]
    pub const fn is_huntable(self) -> bool {
        matches!(self, Self::Huntable)
    }

    /// Units gathered per villager per tick.
    #[must_use]
    pub const fn gather_rate(self) -> u32 {
        match self {
            Self::Trees | Self::Stone | Self::Ore => 1,
            Self::Forage | Self::Carcass | Self::Farmland => 1,
            Self::Huntable => 0,
        }
    }

    /// How many villager groups may work this point at once.
    #[must_use]
    pub const fn gatherer_capacity(self) -> usize {
        match self {
            Self::Farmland => 1,
            _ => 3,
        }
    }
}

/// A gatherable (or huntable) point on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePoint {
    /// Unique id, assigned on registration.
    pub id: ResourcePointId,
    /// Map coordinate.
    pub coord: HexCoord,
    /// Point kind.
    pub kind: ResourcePointKind,
    /// Remaining extractable amount.
    pub remaining: u32,
    /// Current health, for huntable kinds only.
    pub health: Option<u32>,
    /// Villager groups currently assigned here.
    pub gatherers: BTreeSet<VillagerGroupId>,
}

impl ResourcePoint {
    /// Create a new resource point awaiting registration.
    #[must_use]
    pub fn new(coord: HexCoord, kind: ResourcePointKind, remaining: u32) -> Self {
        let health = if kind.is_huntable() { Some(60) } else { None };
        Self {
            id: ResourcePointId(0),
            coord,
            kind,
            remaining,
            health,
            gatherers: BTreeSet::new(),
        }
    }

    /// Check depletion.
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.remaining == 0
    }

    /// Whether another gatherer group may join.
    #[must_use]
    pub fn has_gatherer_space(&self) -> bool {
        self.gatherers.len() < self.kind.gatherer_capacity()
    }

    /// Extract up to `requested` units; returns the amount extracted.
    pub fn extract(&mut self, requested: u32) -> u32 {
        let extracted = requested.min(self.remaining);
        self.remaining -= extracted;
        extracted
    }

    /// Apply hunting damage. Returns true when the animal falls.
    ///
    /// A fallen huntable converts to a carcass in place; its remaining
    /// amount becomes the food yield.
    pub fn hunt(&mut self, damage: u32) -> bool {
        let Some(health) = self.health.as_mut() else {
            return false;
        };
        *health = health.saturating_sub(damage);
        if *health == 0 {
            self.kind = ResourcePointKind::Carcass;
            self.health = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stockpile_deposit_respects_capacity() {
        let mut s = Stockpile::with_capacity(100);
        assert_eq!(s.deposit(ResourceKind::Wood, 60), 60);
        assert_eq!(s.deposit(ResourceKind::Wood, 60), 40);
        assert_eq!(s.amount(ResourceKind::Wood), 100);
    }

    #[test]
    fn test_spend_is_all_or_nothing() {
        let mut s = Stockpile::with_capacity(500);
        s.deposit(ResourceKind::Wood, 100);
        s.deposit(ResourceKind::Stone, 10);

        let cost = Cost::new(0, 50, 50, 0);
        assert!(!s.spend(&cost));
        // Nothing deducted on failure
        assert_eq!(s.amount(ResourceKind::Wood), 100);
        assert_eq!(s.amount(ResourceKind::Stone), 10);

        let affordable = Cost::new(0, 50, 10, 0);
        assert!(s.spend(&affordable));
        assert_eq!(s.amount(ResourceKind::Wood), 50);
        assert_eq!(s.amount(ResourceKind::Stone), 0);
    }

    #[test]
    fn test_missing_for_reports_shortfall() {
        let mut s = Stockpile::with_capacity(500);
        s.deposit(ResourceKind::Food, 30);
        let cost = Cost::new(80, 0, 0, 0);
        assert_eq!(s.missing_for(&cost), Some((ResourceKind::Food, 80, 30)));
    }

    #[test]
    fn test_extract_clamps_to_remaining() {
        let mut point = ResourcePoint::new(HexCoord::ORIGIN, ResourcePointKind::Trees, 5);
        assert_eq!(point.extract(3), 3);
        assert_eq!(point.extract(10), 2);
        assert!(point.is_depleted());
    }

    #[test]
    fn test_hunt_converts_to_carcass() {
        let mut animal = ResourcePoint::new(HexCoord::ORIGIN, ResourcePointKind::Huntable, 120);
        assert!(!animal.hunt(30));
        assert!(animal.hunt(40));
        assert!(!animal.hunt(40));
        assert_eq!(animal.kind, ResourcePointKind::Carcass);
        assert_eq!(animal.health, None);
        assert_eq!(animal.remaining, 120);
        assert_eq!(animal.kind.yields(), ResourceKind::Food);
    }
}
