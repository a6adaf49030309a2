//! Players: ownership, diplomacy, stockpiles, and research.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::army::ArmyId;
use crate::building::BuildingId;
use crate::commander::CommanderId;
use crate::math::{timed_progress, Fixed};
use crate::registry::define_id;
use crate::resources::Stockpile;
use crate::units::UnitType;
use crate::villager::VillagerGroupId;

define_id!(
    /// Unique identifier for players.
    PlayerId
);

/// Maximum per-unit-type upgrade level.
pub const MAX_UNIT_UPGRADE_LEVEL: u8 = 5;

/// Population capacity every player has before building bonuses.
pub const BASE_POPULATION_CAPACITY: u32 = 5;

/// Diplomatic standing between two players, from the perspective of
/// the player holding the relation.
///
/// The ordering matters for passage: own, ally, and guild members may
/// pass through gated fortifications; neutral and enemy players may
/// not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Diplomacy {
    /// The player themself.
    Own,
    /// Formal ally.
    Ally,
    /// Fellow guild member.
    Guild,
    /// No standing relation. Default for unknown players.
    Neutral,
    /// At war.
    Enemy,
}

impl Diplomacy {
    /// Whether this standing permits passage through gated
    /// fortifications (gates, forts, castles).
    #[must_use]
    pub const fn allows_passage(self) -> bool {
        matches!(self, Self::Own | Self::Ally | Self::Guild)
    }

    /// Whether this standing permits attack orders.
    #[must_use]
    pub const fn is_hostile(self) -> bool {
        matches!(self, Self::Neutral | Self::Enemy)
    }
}

/// An in-progress academy research project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Research {
    /// Unit type being upgraded.
    pub unit: UnitType,
    /// Tick the research began.
    pub started: u64,
    /// Total research duration in ticks.
    pub duration: u64,
}

impl Research {
    /// Pure progress function over the tick clock.
    #[must_use]
    pub fn progress(&self, now: u64) -> Fixed {
        timed_progress(self.started, self.duration, now)
    }

    /// Check completion against the current tick.
    #[must_use]
    pub const fn is_complete(&self, now: u64) -> bool {
        now >= self.started + self.duration
    }
}

/// A participant in the match.
///
/// Ownership sets are maintained by the state transactions that add
/// and remove entities; they are `BTreeSet`s so iteration order is
/// deterministic without sorting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Unique id, assigned on registration.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Resource stockpile.
    pub stockpile: Stockpile,
    /// Declared relations toward other players; absent means neutral.
    pub diplomacy: BTreeMap<PlayerId, Diplomacy>,
    /// Buildings this player owns.
    pub buildings: BTreeSet<BuildingId>,
    /// Armies this player owns.
    pub armies: BTreeSet<ArmyId>,
    /// Villager groups this player owns.
    pub villager_groups: BTreeSet<VillagerGroupId>,
    /// Commanders this player owns.
    pub commanders: BTreeSet<CommanderId>,
    /// Per-unit-type upgrade levels; absent means 0.
    pub unit_upgrades: BTreeMap<UnitType, u8>,
    /// Academy research in progress; one project at a time.
    pub research: Option<Research>,
    /// Population ceiling from completed buildings.
    pub population_capacity: u32,
}

impl Player {
    /// Create a player awaiting registration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PlayerId(0),
            name: name.into(),
            stockpile: Stockpile::default(),
            diplomacy: BTreeMap::new(),
            buildings: BTreeSet::new(),
            armies: BTreeSet::new(),
            villager_groups: BTreeSet::new(),
            commanders: BTreeSet::new(),
            unit_upgrades: BTreeMap::new(),
            research: None,
            population_capacity: 0,
        }
    }

    /// This player's standing toward `other`.
    #[must_use]
    pub fn diplomacy_with(&self, other: PlayerId) -> Diplomacy {
        if other == self.id {
            return Diplomacy::Own;
        }
        self.diplomacy.get(&other).copied().unwrap_or(Diplomacy::Neutral)
    }

    /// Declare a standing toward another player.
    pub fn set_diplomacy(&mut self, other: PlayerId, standing: Diplomacy) {
        if other != self.id {
            self.diplomacy.insert(other, standing);
        }
    }

    /// Current upgrade level for a unit type.
    #[must_use]
    pub fn upgrade_level(&self, unit: UnitType) -> u8 {
        self.unit_upgrades.get(&unit).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diplomacy_defaults_to_neutral() {
        let mut p = Player::new("Rhea");
        p.id = PlayerId(1);
        assert_eq!(p.diplomacy_with(PlayerId(2)), Diplomacy::Neutral);
        assert_eq!(p.diplomacy_with(PlayerId(1)), Diplomacy::Own);
    }

    #[test]
    fn test_passage_table() {
        assert!(Diplomacy::Own.allows_passage());
        assert!(Diplomacy::Ally.allows_passage());
        assert!(Diplomacy::Guild.allows_passage());
        assert!(!Diplomacy::Neutral.allows_passage());
        assert!(!Diplomacy::Enemy.allows_passage());
    }

    #[test]
    fn test_cannot_declare_against_self() {
        let mut p = Player::new("Rhea");
        p.id = PlayerId(1);
        p.set_diplomacy(PlayerId(1), Diplomacy::Enemy);
        assert_eq!(p.diplomacy_with(PlayerId(1)), Diplomacy::Own);
    }

    #[test]
    fn test_research_progress() {
        let r = Research {
            unit: UnitType::Archer,
            started: 10,
            duration: 100,
        };
        assert!(!r.is_complete(109));
        assert!(r.is_complete(110));
        assert_eq!(r.progress(60), crate::math::percent(50));
    }
}
