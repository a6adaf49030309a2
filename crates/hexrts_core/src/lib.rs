//! # Hexfront Core
//!
//! Deterministic hex-grid RTS simulation core.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Lockstep multiplayer (identical simulation across clients)
//! - Headless server builds
//! - Replay systems
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`hex`], [`map`] - axial coordinates, terrain, and the spatial index
//! - [`building`], [`army`], [`villager`], [`commander`], [`player`] - entity models
//! - [`state`] - the aggregate game state and its registries
//! - [`command`], [`pipeline`] - the command catalog and validate/execute pipeline
//! - [`pathfinding`] - diplomacy-aware A* over the hex grid
//! - [`combat`] - engagements and casualty resolution
//! - [`sim`] - the fixed-order tick loop
//! - [`snapshot`] - full-state capture and restore
//! - [`events`] - the state-change log
//! - [`math`] - fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod army;
pub mod building;
pub mod combat;
pub mod command;
pub mod commander;
pub mod error;
pub mod events;
pub mod hex;
pub mod map;
pub mod math;
pub mod pathfinding;
pub mod pipeline;
pub mod player;
pub mod registry;
pub mod resources;
pub mod sim;
pub mod snapshot;
pub mod state;
pub mod units;
pub mod villager;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::army::{Army, ArmyId, EntrenchState};
    pub use crate::building::{Building, BuildingId, BuildingKind, BuildingState};
    pub use crate::combat::{AttackTarget, CombatResolver, Engagement, EngagementId};
    pub use crate::command::{Command, CommandEnvelope, CommandId, CommandRejection};
    pub use crate::commander::{Commander, CommanderId, Specialty};
    pub use crate::error::{GameError, Result};
    pub use crate::events::{StateChange, StateChangeBatch};
    pub use crate::hex::HexCoord;
    pub use crate::map::{MapModel, Terrain, Tile};
    pub use crate::math::Fixed;
    pub use crate::pathfinding::{find_nearest_walkable, find_path, PathRequest};
    pub use crate::pipeline::{CommandExecutor, CommandOutcome};
    pub use crate::player::{Diplomacy, Player, PlayerId};
    pub use crate::resources::{
        Cost, ResourceKind, ResourcePoint, ResourcePointId, ResourcePointKind, Stockpile,
    };
    pub use crate::sim::Simulation;
    pub use crate::snapshot::GameSnapshot;
    pub use crate::state::GameState;
    pub use crate::units::{UnitRoster, UnitType};
    pub use crate::villager::{VillagerGroup, VillagerGroupId, VillagerTask, VillagerWork};
}
