//! Full-state snapshots: capture, serialize, verify, restore.
//!
//! A snapshot carries everything a simulation needs to resume: the
//! game state (registries plus spatial index) and the combat resolver
//! with its live engagements. Bytes are bincode with an embedded
//! format version; restore refuses mismatched versions and then
//! cross-checks the decoded data before handing it back, so corrupt
//! or hand-edited snapshots fail loudly instead of desyncing later.

use serde::{Deserialize, Serialize};

use crate::combat::{AttackTarget, CombatResolver};
use crate::error::{GameError, Result};
use crate::sim::Simulation;
use crate::state::GameState;

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A complete, self-contained capture of a running simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    version: u32,
    state: GameState,
    combat: CombatResolver,
}

impl GameSnapshot {
    /// Capture the current state of a simulation.
    #[must_use]
    pub fn capture(sim: &Simulation) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            state: sim.state().clone(),
            combat: sim.combat().clone(),
        }
    }

    /// The tick the snapshot was taken on.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.state.tick()
    }

    /// Serialize to bytes.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GameError::CorruptState(e.to_string()))
    }

    /// Decode a snapshot from bytes, checking the format version.
    ///
    /// # Errors
    /// [`GameError::CorruptState`] on malformed bytes,
    /// [`GameError::VersionMismatch`] on a foreign format version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self =
            bincode::deserialize(bytes).map_err(|e| GameError::CorruptState(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GameError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                actual: snapshot.version,
            });
        }
        Ok(snapshot)
    }

    /// Verify internal consistency and build a simulation from the
    /// snapshot. The command history does not survive a snapshot; the
    /// restored executor starts empty.
    ///
    /// # Errors
    /// [`GameError::DanglingReference`] if an entity points at a
    /// missing one, [`GameError::InvariantViolation`] if the spatial
    /// index disagrees with the registries.
    pub fn restore(self) -> Result<Simulation> {
        verify(&self.state, &self.combat)?;
        Ok(Simulation::from_parts(self.state, self.combat))
    }
}

/// Cross-check registries, references, and the spatial index.
fn verify(state: &GameState, combat: &CombatResolver) -> Result<()> {
    for id in state.building_ids() {
        let Some(b) = state.building(id) else { continue };
        state
            .player(b.owner)
            .ok_or(GameError::DanglingReference {
                kind: "player",
                id: b.owner.0,
            })?;
        for &coord in &b.footprint {
            if state.map().building_at(coord) != Some(id) {
                return Err(GameError::InvariantViolation(format!(
                    "building {id} not indexed at {coord}"
                )));
            }
        }
    }
    for id in state.army_ids() {
        let Some(a) = state.army(id) else { continue };
        state.building(a.home_base).ok_or(GameError::DanglingReference {
            kind: "building",
            id: a.home_base.0,
        })?;
        if let Some(c) = a.commander {
            state.commander(c).ok_or(GameError::DanglingReference {
                kind: "commander",
                id: c.0,
            })?;
        }
        if !state.map().armies_at(a.coord).contains(&id) {
            return Err(GameError::InvariantViolation(format!(
                "army {id} not indexed at {}",
                a.coord
            )));
        }
    }
    for id in state.villager_ids() {
        let Some(g) = state.villagers(id) else { continue };
        if !state.map().villagers_at(g.coord).contains(&id) {
            return Err(GameError::InvariantViolation(format!(
                "villager group {id} not indexed at {}",
                g.coord
            )));
        }
    }
    for id in combat.engagement_ids() {
        let Some(e) = combat.engagement(id) else { continue };
        state.army(e.attacker).ok_or(GameError::DanglingReference {
            kind: "army",
            id: e.attacker.0,
        })?;
        let target_alive = match e.target {
            AttackTarget::Army { army } => state.army(army).is_some(),
            AttackTarget::Building { building } => state.building(building).is_some(),
            AttackTarget::Villagers { group } => state.villagers(group).is_some(),
        };
        if !target_alive {
            return Err(GameError::InvariantViolation(format!(
                "engagement {id} targets a missing entity"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::army::Army;
    use crate::building::{Building, BuildingKind, BuildingState};
    use crate::hex::HexCoord;
    use crate::map::MapModel;
    use crate::player::Player;
    use crate::units::{UnitRoster, UnitType};

    fn populated_sim() -> Simulation {
        let mut sim = Simulation::new(MapModel::hexagonal(5));
        let player = sim.state_mut().add_player(Player::new("Nox"));
        let mut base = Building::new(BuildingKind::CityCenter, player, HexCoord::ORIGIN);
        base.state = BuildingState::Completed;
        let base = sim.state_mut().add_building(base).unwrap();
        let mut roster = UnitRoster::new();
        roster.insert(UnitType::Swordsman, 12);
        sim.state_mut()
            .add_army(Army::new(player, HexCoord::new(3, 0), roster, base))
            .unwrap();
        for _ in 0..5 {
            sim.tick();
        }
        sim
    }

    #[test]
    fn test_round_trip_preserves_state_hash() {
        let sim = populated_sim();
        let expected = sim.state().state_hash();
        let bytes = GameSnapshot::capture(&sim).to_bytes().unwrap();
        let restored = GameSnapshot::from_bytes(&bytes).unwrap().restore().unwrap();
        assert_eq!(restored.state().state_hash(), expected);
        assert_eq!(restored.state().tick(), 5);
    }

    #[test]
    fn test_restored_simulation_keeps_running() {
        let mut original = populated_sim();
        let bytes = GameSnapshot::capture(&original).to_bytes().unwrap();
        let mut restored = GameSnapshot::from_bytes(&bytes).unwrap().restore().unwrap();
        for _ in 0..10 {
            original.tick();
            restored.tick();
        }
        assert_eq!(
            original.state().state_hash(),
            restored.state().state_hash()
        );
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let sim = populated_sim();
        let mut snapshot = GameSnapshot::capture(&sim);
        snapshot.version = SNAPSHOT_VERSION + 7;
        let bytes = bincode::serialize(&snapshot).unwrap();
        let result = GameSnapshot::from_bytes(&bytes);
        assert!(matches!(
            result,
            Err(GameError::VersionMismatch { actual, .. }) if actual == SNAPSHOT_VERSION + 7
        ));
    }

    #[test]
    fn test_garbage_bytes_are_corrupt_state() {
        let result = GameSnapshot::from_bytes(&[0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(result, Err(GameError::CorruptState(_))));
    }
}
