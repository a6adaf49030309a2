//! Test fixtures and helpers.
//!
//! Pre-built game scenarios and entity configurations
//! for consistent testing.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hexrts_core::army::{Army, ArmyId};
use hexrts_core::building::{Building, BuildingId, BuildingKind, BuildingState};
use hexrts_core::hex::HexCoord;
use hexrts_core::map::MapModel;
use hexrts_core::player::{Diplomacy, Player, PlayerId};
use hexrts_core::resources::Cost;
use hexrts_core::sim::Simulation;
use hexrts_core::units::{UnitRoster, UnitType};
use hexrts_core::villager::VillagerGroup;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// A two-player scenario on an all-plains hexagonal map.
///
/// Each player gets a completed city center, a fat stockpile, and an
/// `Enemy` standing toward the other.
pub struct TwoPlayerScenario {
    /// The simulation under test.
    pub sim: Simulation,
    /// West player.
    pub west: PlayerId,
    /// West player's city center.
    pub west_base: BuildingId,
    /// East player.
    pub east: PlayerId,
    /// East player's city center.
    pub east_base: BuildingId,
}

/// Build a [`TwoPlayerScenario`] on a map of the given radius.
///
/// # Panics
/// Panics if the radius is too small to seat both city centers.
#[must_use]
pub fn two_player_scenario(radius: u32) -> TwoPlayerScenario {
    let mut sim = Simulation::new(MapModel::hexagonal(radius));
    let west = sim.state_mut().add_player(Player::new("West"));
    let east = sim.state_mut().add_player(Player::new("East"));
    let offset = i32::try_from(radius).unwrap_or(3) - 1;
    let west_base = completed_building(
        &mut sim,
        BuildingKind::CityCenter,
        west,
        HexCoord::new(-offset, 0),
    );
    let east_base = completed_building(
        &mut sim,
        BuildingKind::CityCenter,
        east,
        HexCoord::new(offset, 0),
    );
    for (player, other) in [(west, east), (east, west)] {
        if let Some(p) = sim.state_mut().player_mut(player) {
            p.stockpile.refund(&Cost::new(900, 900, 900, 900));
            p.set_diplomacy(other, Diplomacy::Enemy);
        }
    }
    TwoPlayerScenario {
        sim,
        west,
        west_base,
        east,
        east_base,
    }
}

/// Place a building already in `Completed` state.
///
/// # Panics
/// Panics if the footprint is off-map or overlaps another building.
pub fn completed_building(
    sim: &mut Simulation,
    kind: BuildingKind,
    owner: PlayerId,
    anchor: HexCoord,
) -> BuildingId {
    let mut building = Building::new(kind, owner, anchor);
    building.state = BuildingState::Completed;
    sim.state_mut()
        .add_building(building)
        .unwrap_or_else(|e| panic!("fixture building at {anchor}: {e}"))
}

/// Field an army of a single unit type.
///
/// # Panics
/// Panics if the spawn tile is full.
pub fn field_army(
    sim: &mut Simulation,
    owner: PlayerId,
    home: BuildingId,
    coord: HexCoord,
    unit: UnitType,
    count: u32,
) -> ArmyId {
    let mut roster = UnitRoster::new();
    roster.insert(unit, count);
    sim.state_mut()
        .add_army(Army::new(owner, coord, roster, home))
        .unwrap_or_else(|e| panic!("fixture army at {coord}: {e}"))
}

/// Field a villager group.
pub fn field_villagers(
    sim: &mut Simulation,
    owner: PlayerId,
    home: BuildingId,
    coord: HexCoord,
    size: u32,
) -> hexrts_core::villager::VillagerGroupId {
    sim.state_mut()
        .add_villagers(VillagerGroup::new(owner, coord, size, home))
}

/// Error type for scenario loading.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The parsed scenario could not be instantiated.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// A declarative scenario, loadable from RON.
///
/// Scenarios define an initial game state for integration testing:
/// map radius, players, starting buildings, and starting armies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Hex map radius.
    pub map_radius: u32,
    /// Player setups, in join order.
    pub players: Vec<PlayerSetup>,
}

/// One player's starting position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSetup {
    /// Player name.
    pub name: String,
    /// City center anchor as `(q, r)`.
    pub base: (i32, i32),
    /// Starting resources, applied to every kind.
    pub starting_resources: u32,
    /// Starting armies as `(q, r, unit, count)`.
    #[serde(default)]
    pub armies: Vec<(i32, i32, UnitType, u32)>,
    /// Starting villager groups as `(q, r, size)`.
    #[serde(default)]
    pub villagers: Vec<(i32, i32, u32)>,
}

impl Scenario {
    /// Load from a RON string (useful for embedded scenarios).
    ///
    /// # Errors
    /// Returns [`ScenarioError::ParseError`] on malformed RON.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Instantiate the scenario. Every player is hostile to every
    /// other player.
    ///
    /// # Errors
    /// Returns [`ScenarioError::Invalid`] if a placement fails.
    pub fn build(&self) -> Result<Simulation, ScenarioError> {
        let mut sim = Simulation::new(MapModel::hexagonal(self.map_radius));
        let mut ids = Vec::new();
        for setup in &self.players {
            ids.push(sim.state_mut().add_player(Player::new(setup.name.clone())));
        }
        for (setup, &player) in self.players.iter().zip(&ids) {
            let anchor = HexCoord::new(setup.base.0, setup.base.1);
            let mut base = Building::new(BuildingKind::CityCenter, player, anchor);
            base.state = BuildingState::Completed;
            let base = sim
                .state_mut()
                .add_building(base)
                .map_err(|e| ScenarioError::Invalid(e.to_string()))?;
            if let Some(p) = sim.state_mut().player_mut(player) {
                let r = setup.starting_resources;
                p.stockpile.refund(&Cost::new(r, r, r, r));
                for &other in &ids {
                    if other != player {
                        p.set_diplomacy(other, Diplomacy::Enemy);
                    }
                }
            }
            for &(q, r, unit, count) in &setup.armies {
                let mut roster = UnitRoster::new();
                roster.insert(unit, count);
                sim.state_mut()
                    .add_army(Army::new(player, HexCoord::new(q, r), roster, base))
                    .map_err(|e| ScenarioError::Invalid(e.to_string()))?;
            }
            for &(q, r, size) in &setup.villagers {
                sim.state_mut().add_villagers(VillagerGroup::new(
                    player,
                    HexCoord::new(q, r),
                    size,
                    base,
                ));
            }
        }
        Ok(sim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_from_ron() {
        let source = r#"Scenario(
            name: "border clash",
            map_radius: 6,
            players: [
                PlayerSetup(
                    name: "West",
                    base: (-4, 0),
                    starting_resources: 500,
                    armies: [(-1, 0, Knight, 6)],
                ),
                PlayerSetup(
                    name: "East",
                    base: (4, 0),
                    starting_resources: 500,
                    villagers: [(2, 0, 5)],
                ),
            ],
        )"#;
        let scenario = Scenario::from_ron_str(source).unwrap();
        assert_eq!(scenario.players.len(), 2);
        let sim = scenario.build().unwrap();
        assert_eq!(sim.state().player_ids().len(), 2);
        assert_eq!(sim.state().army_ids().len(), 1);
        assert_eq!(sim.state().villager_ids().len(), 1);
    }
}
