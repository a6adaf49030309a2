//! Unit types, stat tables and composition aggregation.
//!
//! Unit stats are data, not architecture: each unit type carries three
//! raw damage components (melee, pierce, bludgeon), three armor
//! components of the same kinds, and flat bonus multipliers against
//! target categories. Armies aggregate these per composition.
//!
//! Aggregation is deliberately asymmetric: raw damage and armor sum
//! across all units in the stack, while category bonuses are averaged
//! so they do not scale with stack size. Tests pin this down.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::{percent, Fixed};
use crate::resources::Cost;

/// All trainable military unit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitType {
    /// Anti-cavalry infantry.
    Spearman,
    /// Line infantry.
    Swordsman,
    /// Ranged foot unit.
    Archer,
    /// Armor-piercing ranged unit.
    Crossbowman,
    /// Fast scout cavalry.
    LightCavalry,
    /// Heavy shock cavalry.
    Knight,
    /// Anti-building ram.
    Ram,
    /// Siege artillery.
    Catapult,
}

impl UnitType {
    /// All unit types in fixed order. Composition iteration, casualty
    /// distribution and serialization all use this order.
    pub const ALL: [Self; 8] = [
        Self::Spearman,
        Self::Swordsman,
        Self::Archer,
        Self::Crossbowman,
        Self::LightCavalry,
        Self::Knight,
        Self::Ram,
        Self::Catapult,
    ];

    /// Static stats for this unit type.
    #[must_use]
    pub fn stats(self) -> UnitStats {
        match self {
            Self::Spearman => UnitStats {
                hit_points: 45,
                attack: DamageTriple::new(6, 0, 0),
                armor: DamageTriple::new(1, 1, 0),
                category: UnitCategory::Infantry,
                bonus_vs: CategoryBonus::none().vs_cavalry(percent(50)),
                speed: Fixed::from_num(0.20),
                cost: Cost::new(35, 20, 0, 0),
                train_time: 240,
                population: 1,
            },
            Self::Swordsman => UnitStats {
                hit_points: 60,
                attack: DamageTriple::new(9, 0, 0),
                armor: DamageTriple::new(2, 1, 0),
                category: UnitCategory::Infantry,
                bonus_vs: CategoryBonus::none(),
                speed: Fixed::from_num(0.18),
                cost: Cost::new(50, 0, 0, 15),
                train_time: 300,
                population: 1,
            },
            Self::Archer => UnitStats {
                hit_points: 35,
                attack: DamageTriple::new(0, 5, 0),
                armor: DamageTriple::new(0, 1, 0),
                category: UnitCategory::Ranged,
                bonus_vs: CategoryBonus::none().vs_infantry(percent(25)),
                speed: Fixed::from_num(0.20),
                cost: Cost::new(25, 30, 0, 0),
                train_time: 260,
                population: 1,
            },
            Self::Crossbowman => UnitStats {
                hit_points: 40,
                attack: DamageTriple::new(0, 8, 0),
                armor: DamageTriple::new(0, 1, 0),
                category: UnitCategory::Ranged,
                bonus_vs: CategoryBonus::none().vs_infantry(percent(25)),
                speed: Fixed::from_num(0.18),
                cost: Cost::new(30, 30, 0, 10),
                train_time: 320,
                population: 1,
            },
            Self::LightCavalry => UnitStats {
                hit_points: 70,
                attack: DamageTriple::new(7, 0, 0),
                armor: DamageTriple::new(1, 1, 0),
                category: UnitCategory::Cavalry,
                bonus_vs: CategoryBonus::none().vs_ranged(percent(40)).vs_siege(percent(50)),
                speed: Fixed::from_num(0.40),
                cost: Cost::new(70, 0, 0, 0),
                train_time: 340,
                population: 2,
            },
            Self::Knight => UnitStats {
                hit_points: 110,
                attack: DamageTriple::new(12, 0, 0),
                armor: DamageTriple::new(3, 2, 0),
                category: UnitCategory::Cavalry,
                bonus_vs: CategoryBonus::none().vs_ranged(percent(30)),
                speed: Fixed::from_num(0.34),
                cost: Cost::new(80, 0, 0, 40),
                train_time: 420,
                population: 2,
            },
            Self::Ram => UnitStats {
                hit_points: 160,
                attack: DamageTriple::new(0, 0, 4),
                armor: DamageTriple::new(0, 6, 0),
                category: UnitCategory::Siege,
                bonus_vs: CategoryBonus::none().vs_buildings(percent(200)),
                speed: Fixed::from_num(0.10),
                cost: Cost::new(0, 120, 0, 30),
                train_time: 500,
                population: 3,
            },
            Self::Catapult => UnitStats {
                hit_points: 90,
                attack: DamageTriple::new(0, 0, 14),
                armor: DamageTriple::new(0, 2, 0),
                category: UnitCategory::Siege,
                bonus_vs: CategoryBonus::none().vs_buildings(percent(150)),
                speed: Fixed::from_num(0.10),
                cost: Cost::new(0, 140, 0, 60),
                train_time: 560,
                population: 3,
            },
        }
    }

    /// Cost of researching the next permanent upgrade level.
    #[must_use]
    pub fn upgrade_cost(self, next_level: u8) -> Cost {
        let base = self.stats().cost;
        base.scaled(u32::from(next_level) * 4)
    }

    /// Research time in ticks for the next upgrade level.
    #[must_use]
    pub fn upgrade_time(self, next_level: u8) -> u64 {
        600 * u64::from(next_level)
    }
}

/// Broad unit categories used for bonuses and dominant-type matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitCategory {
    /// Foot soldiers.
    Infantry,
    /// Mounted units.
    Cavalry,
    /// Bow and crossbow units.
    Ranged,
    /// Rams and artillery.
    Siege,
}

/// What an attack is aimed at, for bonus lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetCategory {
    /// A unit composition dominated by the given category.
    Unit(UnitCategory),
    /// A building.
    Building,
}

/// The three raw damage (or armor) components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageTriple {
    /// Melee component.
    pub melee: u32,
    /// Pierce component.
    pub pierce: u32,
    /// Bludgeon component.
    pub bludgeon: u32,
}

impl DamageTriple {
    /// Create a triple.
    #[must_use]
    pub const fn new(melee: u32, pierce: u32, bludgeon: u32) -> Self {
        Self {
            melee,
            pierce,
            bludgeon,
        }
    }

    /// Component-wise sum.
    #[must_use]
    pub const fn plus(self, other: Self) -> Self {
        Self::new(
            self.melee + other.melee,
            self.pierce + other.pierce,
            self.bludgeon + other.bludgeon,
        )
    }

    /// Component-wise scale by a unit count.
    #[must_use]
    pub const fn times(self, count: u32) -> Self {
        Self::new(
            self.melee * count,
            self.pierce * count,
            self.bludgeon * count,
        )
    }

    /// Per-component armor subtraction, floored at zero, then summed.
    ///
    /// This is the core of the damage model: each damage kind is
    /// reduced by the matching armor kind independently before the
    /// remainders are added together.
    #[must_use]
    pub fn apply_armor(self, armor: Self) -> u32 {
        self.melee.saturating_sub(armor.melee)
            + self.pierce.saturating_sub(armor.pierce)
            + self.bludgeon.saturating_sub(armor.bludgeon)
    }
}

/// Flat bonus multipliers against target categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryBonus {
    /// Bonus vs infantry.
    #[serde(with = "crate::math::fixed_serde")]
    pub infantry: Fixed,
    /// Bonus vs cavalry.
    #[serde(with = "crate::math::fixed_serde")]
    pub cavalry: Fixed,
    /// Bonus vs ranged units.
    #[serde(with = "crate::math::fixed_serde")]
    pub ranged: Fixed,
    /// Bonus vs siege equipment.
    #[serde(with = "crate::math::fixed_serde")]
    pub siege: Fixed,
    /// Bonus vs buildings.
    #[serde(with = "crate::math::fixed_serde")]
    pub buildings: Fixed,
}

impl CategoryBonus {
    /// No bonuses.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Builder: set the infantry bonus.
    #[must_use]
    pub fn vs_infantry(mut self, bonus: Fixed) -> Self {
        self.infantry = bonus;
        self
    }

    /// Builder: set the cavalry bonus.
    #[must_use]
    pub fn vs_cavalry(mut self, bonus: Fixed) -> Self {
        self.cavalry = bonus;
        self
    }

    /// Builder: set the ranged bonus.
    #[must_use]
    pub fn vs_ranged(mut self, bonus: Fixed) -> Self {
        self.ranged = bonus;
        self
    }

    /// Builder: set the siege bonus.
    #[must_use]
    pub fn vs_siege(mut self, bonus: Fixed) -> Self {
        self.siege = bonus;
        self
    }

    /// Builder: set the building bonus.
    #[must_use]
    pub fn vs_buildings(mut self, bonus: Fixed) -> Self {
        self.buildings = bonus;
        self
    }

    /// Look up the bonus against a target category.
    #[must_use]
    pub fn against(&self, target: TargetCategory) -> Fixed {
        match target {
            TargetCategory::Unit(UnitCategory::Infantry) => self.infantry,
            TargetCategory::Unit(UnitCategory::Cavalry) => self.cavalry,
            TargetCategory::Unit(UnitCategory::Ranged) => self.ranged,
            TargetCategory::Unit(UnitCategory::Siege) => self.siege,
            TargetCategory::Building => self.buildings,
        }
    }
}

/// Static stats for one unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Hit points per unit; also the unit's strength weight.
    pub hit_points: u32,
    /// Raw damage components.
    pub attack: DamageTriple,
    /// Raw armor components.
    pub armor: DamageTriple,
    /// Category for bonus matching.
    pub category: UnitCategory,
    /// Bonus multipliers this unit holds against target categories.
    pub bonus_vs: CategoryBonus,
    /// Map speed in tiles per tick.
    #[serde(with = "crate::math::fixed_serde")]
    pub speed: Fixed,
    /// Training cost per unit.
    pub cost: Cost,
    /// Training time in ticks per batch.
    pub train_time: u32,
    /// Population weight per unit.
    pub population: u32,
}

/// A unit composition: type to count. `BTreeMap` keeps iteration
/// deterministic for casualty distribution and hashing.
pub type UnitRoster = BTreeMap<UnitType, u32>;

/// Total units in a roster.
#[must_use]
pub fn roster_size(roster: &UnitRoster) -> u32 {
    roster.values().sum()
}

/// Total strength (hit-point mass) of a roster.
#[must_use]
pub fn roster_strength(roster: &UnitRoster) -> u32 {
    roster
        .iter()
        .map(|(ty, count)| ty.stats().hit_points * count)
        .sum()
}

/// Total population weight of a roster.
#[must_use]
pub fn roster_population(roster: &UnitRoster) -> u32 {
    roster
        .iter()
        .map(|(ty, count)| ty.stats().population * count)
        .sum()
}

/// Slowest unit speed in the roster; an army marches at this pace.
#[must_use]
pub fn roster_speed(roster: &UnitRoster) -> Fixed {
    roster
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(ty, _)| ty.stats().speed)
        .min()
        .unwrap_or(Fixed::ZERO)
}

/// Summed raw attack across all units, with per-type upgrade levels.
///
/// Upgrades add 10% damage per level for that unit type.
#[must_use]
pub fn roster_attack(roster: &UnitRoster, upgrades: &BTreeMap<UnitType, u8>) -> DamageTriple {
    let mut total = DamageTriple::default();
    for (ty, count) in roster {
        if *count == 0 {
            continue;
        }
        let base = ty.stats().attack.times(*count);
        let level = u64::from(upgrades.get(ty).copied().unwrap_or(0));
        // Integer math keeps 10%-per-level exact; fixed-point would
        // shave the product at decimal boundaries.
        let boosted = |v: u32| (u64::from(v) * (10 + level) / 10).min(u64::from(u32::MAX)) as u32;
        total = total.plus(DamageTriple::new(
            boosted(base.melee),
            boosted(base.pierce),
            boosted(base.bludgeon),
        ));
    }
    total
}

/// Summed raw armor across all units.
#[must_use]
pub fn roster_armor(roster: &UnitRoster) -> DamageTriple {
    let mut total = DamageTriple::default();
    for (ty, count) in roster {
        total = total.plus(ty.stats().armor.times(*count));
    }
    total
}

/// Category bonuses averaged over units (they do not scale with
/// stack size, unlike raw damage).
#[must_use]
pub fn roster_bonus(roster: &UnitRoster) -> CategoryBonus {
    let total_units = roster_size(roster);
    if total_units == 0 {
        return CategoryBonus::none();
    }
    let divisor = Fixed::from_num(total_units);
    let mut sum = CategoryBonus::none();
    for (ty, count) in roster {
        let b = ty.stats().bonus_vs;
        let n = Fixed::from_num(*count);
        sum.infantry += b.infantry * n;
        sum.cavalry += b.cavalry * n;
        sum.ranged += b.ranged * n;
        sum.siege += b.siege * n;
        sum.buildings += b.buildings * n;
    }
    sum.infantry /= divisor;
    sum.cavalry /= divisor;
    sum.ranged /= divisor;
    sum.siege /= divisor;
    sum.buildings /= divisor;
    sum
}

/// The category with the most units; ties go to the earlier category
/// in declaration order. `None` for an empty roster.
#[must_use]
pub fn dominant_category(roster: &UnitRoster) -> Option<UnitCategory> {
    let mut counts: BTreeMap<UnitCategory, u32> = BTreeMap::new();
    for (ty, count) in roster {
        if *count > 0 {
            *counts.entry(ty.stats().category).or_insert(0) += count;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(category, _)| category)
}

/// Merge `extra` into `roster`.
pub fn merge_rosters(roster: &mut UnitRoster, extra: &UnitRoster) {
    for (ty, count) in extra {
        *roster.entry(*ty).or_insert(0) += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(entries: &[(UnitType, u32)]) -> UnitRoster {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_apply_armor_floors_per_component() {
        let attack = DamageTriple::new(10, 2, 0);
        let armor = DamageTriple::new(4, 5, 1);
        // melee 10-4=6, pierce 2-5 floors to 0, bludgeon 0
        assert_eq!(attack.apply_armor(armor), 6);
    }

    #[test]
    fn test_attack_scales_with_stack_size() {
        let one = roster(&[(UnitType::Swordsman, 1)]);
        let ten = roster(&[(UnitType::Swordsman, 10)]);
        let upgrades = BTreeMap::new();
        let a1 = roster_attack(&one, &upgrades);
        let a10 = roster_attack(&ten, &upgrades);
        assert_eq!(a10.melee, a1.melee * 10);
    }

    #[test]
    fn bonus_does_not_scale_with_stack() {
        // The source model's asymmetry: bonuses average, damage sums.
        let one = roster(&[(UnitType::Spearman, 1)]);
        let ten = roster(&[(UnitType::Spearman, 10)]);
        assert_eq!(roster_bonus(&one).cavalry, roster_bonus(&ten).cavalry);
    }

    #[test]
    fn test_mixed_roster_bonus_averages() {
        // 1 spearman (50% vs cavalry) + 1 swordsman (0%) -> 25%
        let mixed = roster(&[(UnitType::Spearman, 1), (UnitType::Swordsman, 1)]);
        assert_eq!(roster_bonus(&mixed).cavalry, percent(25));
    }

    #[test]
    fn test_upgrades_raise_attack() {
        let r = roster(&[(UnitType::Archer, 10)]);
        let none = BTreeMap::new();
        let mut two: BTreeMap<UnitType, u8> = BTreeMap::new();
        two.insert(UnitType::Archer, 2);
        let base = roster_attack(&r, &none).pierce;
        let upgraded = roster_attack(&r, &two).pierce;
        assert_eq!(upgraded, base * 12 / 10);
    }

    #[test]
    fn test_dominant_category() {
        assert_eq!(dominant_category(&roster(&[])), None);
        let mostly_cavalry = roster(&[
            (UnitType::Knight, 5),
            (UnitType::Archer, 3),
        ]);
        assert_eq!(
            dominant_category(&mostly_cavalry),
            Some(UnitCategory::Cavalry)
        );
        // Tie breaks toward earlier declaration order (Infantry).
        let tie = roster(&[(UnitType::Spearman, 1), (UnitType::Knight, 1)]);
        assert_eq!(dominant_category(&tie), Some(UnitCategory::Infantry));
    }

    #[test]
    fn test_roster_speed_is_slowest() {
        let r = roster(&[(UnitType::LightCavalry, 4), (UnitType::Ram, 1)]);
        assert_eq!(roster_speed(&r), UnitType::Ram.stats().speed);
    }
}
