//! Armies: mobile military formations.
//!
//! An army is a roster of units bound to a home base, optionally led by
//! a commander. Movement uses the same fractional-progress scheme as
//! villager groups: each tick the army accrues `speed / tile_cost`
//! progress toward the next path tile and steps when progress reaches 1.

use serde::{Deserialize, Serialize};

use crate::building::BuildingId;
use crate::combat::{AttackTarget, EngagementId};
use crate::commander::CommanderId;
use crate::hex::HexCoord;
use crate::math::{fixed_serde, percent, timed_progress, Fixed};
use crate::player::PlayerId;
use crate::registry::define_id;
use crate::resources::Cost;
use crate::units::{roster_size, roster_speed, UnitRoster};

define_id!(
    /// Unique identifier for armies.
    ArmyId
);

/// Ticks required to finish entrenching.
pub const ENTRENCH_TIME: u64 = 300;

/// Resources consumed to dig in: timber for stakes and earthworks.
#[must_use]
pub fn entrench_cost() -> Cost {
    Cost::new(0, 30, 0, 0)
}

/// Speed multiplier bonus applied to retreating armies.
#[must_use]
pub fn retreat_speed_bonus() -> Fixed {
    percent(50)
}

/// Entrenchment state of an army.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntrenchState {
    /// Not dug in.
    None,
    /// Digging in since the given tick.
    Entrenching {
        /// Tick entrenchment began.
        started: u64,
    },
    /// Fully dug in; grants a defense bonus until the army moves.
    Entrenched {
        /// Neighbor tiles the earthworks cover, fixed when digging
        /// finished. Screens approaches even if terrain later changes.
        covers: Vec<HexCoord>,
    },
}

impl EntrenchState {
    /// Build the fully-entrenched state for an army standing at
    /// `position`, covering all six adjacent tiles.
    #[must_use]
    pub fn entrenched_at(position: HexCoord) -> Self {
        Self::Entrenched {
            covers: position.neighbors().to_vec(),
        }
    }

    /// Pure progress toward full entrenchment.
    #[must_use]
    pub fn progress(&self, now: u64) -> Fixed {
        match self {
            Self::None => Fixed::ZERO,
            Self::Entrenching { started } => timed_progress(*started, ENTRENCH_TIME, now),
            Self::Entrenched { .. } => Fixed::ONE,
        }
    }

    /// Whether the earthworks are complete.
    #[must_use]
    pub const fn is_entrenched(&self) -> bool {
        matches!(self, Self::Entrenched { .. })
    }

    /// Tiles covered by completed earthworks; empty otherwise.
    #[must_use]
    pub fn covered_tiles(&self) -> &[HexCoord] {
        match self {
            Self::Entrenched { covers } => covers,
            _ => &[],
        }
    }
}

/// A reinforcement column marching from a garrison toward an army.
///
/// The column is not an independent army: it cannot fight, and enemy
/// contact en route is ignored. If the destination army moves, the
/// column is re-pathed when it exhausts its current path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinforcementColumn {
    /// Units on the march.
    pub roster: UnitRoster,
    /// Garrison building the column left from.
    pub from: BuildingId,
    /// Current coordinate.
    pub coord: HexCoord,
    /// Remaining path toward the army.
    pub path: Vec<HexCoord>,
    /// Index of the next tile in `path`.
    pub path_index: usize,
    /// Fractional progress toward the next tile.
    #[serde(with = "fixed_serde")]
    pub progress: Fixed,
}

/// A deployed military formation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Army {
    /// Unique id, assigned on registration.
    pub id: ArmyId,
    /// Owning player.
    pub owner: PlayerId,
    /// Current coordinate.
    pub coord: HexCoord,
    /// Unit composition.
    pub roster: UnitRoster,
    /// Leading commander, if any.
    pub commander: Option<CommanderId>,
    /// Building this army returns to and draws reinforcements from.
    pub home_base: BuildingId,
    /// Remaining movement path; empty when not traveling.
    pub path: Vec<HexCoord>,
    /// Index of the next tile in `path`.
    pub path_index: usize,
    /// Fractional progress toward the next tile.
    #[serde(with = "fixed_serde")]
    pub progress: Fixed,
    /// Standing attack order, carried while marching to the target.
    pub attack_order: Option<AttackTarget>,
    /// Engagement this army is locked into, if any.
    pub engagement: Option<EngagementId>,
    /// Whether the army is withdrawing toward its home base.
    pub retreating: bool,
    /// Entrenchment state; cleared by any movement.
    pub entrenchment: EntrenchState,
    /// Columns marching from garrisons to join this army.
    pub reinforcements: Vec<ReinforcementColumn>,
}

impl Army {
    /// Create a stationary army awaiting registration.
    #[must_use]
    pub fn new(owner: PlayerId, coord: HexCoord, roster: UnitRoster, home_base: BuildingId) -> Self {
        Self {
            id: ArmyId(0),
            owner,
            coord,
            roster,
            commander: None,
            home_base,
            path: Vec::new(),
            path_index: 0,
            progress: Fixed::ZERO,
            attack_order: None,
            engagement: None,
            retreating: false,
            entrenchment: EntrenchState::None,
            reinforcements: Vec::new(),
        }
    }

    /// Number of units in the army.
    #[must_use]
    pub fn size(&self) -> u32 {
        roster_size(&self.roster)
    }

    /// Effective movement speed: the slowest unit's speed, raised by
    /// the retreat bonus while withdrawing.
    #[must_use]
    pub fn speed(&self) -> Fixed {
        let base = roster_speed(&self.roster);
        if self.retreating {
            base * (Fixed::ONE + retreat_speed_bonus())
        } else {
            base
        }
    }

    /// Whether the army is locked in combat.
    #[must_use]
    pub const fn in_combat(&self) -> bool {
        self.engagement.is_some()
    }

    /// Whether the army is mid-travel.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.path_index < self.path.len()
    }

    /// Start traveling along `path`. Any movement breaks entrenchment.
    pub fn set_path(&mut self, path: Vec<HexCoord>) {
        self.path = path;
        self.path_index = 0;
        self.progress = Fixed::ZERO;
        if !self.path.is_empty() {
            self.entrenchment = EntrenchState::None;
        }
    }

    /// Stop in place, dropping path and standing orders.
    pub fn halt(&mut self) {
        self.path.clear();
        self.path_index = 0;
        self.progress = Fixed::ZERO;
        self.attack_order = None;
        self.retreating = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitType;

    fn army_with(unit: UnitType, count: u32) -> Army {
        let mut roster = UnitRoster::new();
        roster.insert(unit, count);
        Army::new(PlayerId(1), HexCoord::ORIGIN, roster, BuildingId(1))
    }

    #[test]
    fn test_retreat_raises_speed() {
        let mut a = army_with(UnitType::Spearman, 10);
        let base = a.speed();
        a.retreating = true;
        assert_eq!(a.speed(), base * (Fixed::ONE + percent(50)));
    }

    #[test]
    fn test_movement_breaks_entrenchment() {
        let mut a = army_with(UnitType::Archer, 5);
        a.entrenchment = EntrenchState::entrenched_at(a.coord);
        a.set_path(vec![HexCoord::new(1, 0)]);
        assert_eq!(a.entrenchment, EntrenchState::None);
    }

    #[test]
    fn test_entrench_progress() {
        let state = EntrenchState::Entrenching { started: 100 };
        assert_eq!(state.progress(100), Fixed::ZERO);
        assert_eq!(state.progress(100 + ENTRENCH_TIME), Fixed::ONE);
        assert_eq!(EntrenchState::entrenched_at(HexCoord::ORIGIN).progress(0), Fixed::ONE);
    }

    #[test]
    fn test_entrenched_covers_all_neighbors() {
        let position = HexCoord::new(2, -1);
        let state = EntrenchState::entrenched_at(position);
        assert!(state.is_entrenched());
        let covers = state.covered_tiles();
        assert_eq!(covers.len(), 6);
        for tile in covers {
            assert!(position.is_neighbor_of(*tile));
        }
        // Unfinished earthworks cover nothing.
        assert!(EntrenchState::None.covered_tiles().is_empty());
        assert!(EntrenchState::Entrenching { started: 5 }
            .covered_tiles()
            .is_empty());
    }
}
