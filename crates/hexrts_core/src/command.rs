//! Player commands: the catalog, validation, and execution.
//!
//! Every command follows the same two-phase contract. `validate` is
//! read-only and may be called speculatively; `execute` mutates the
//! state and records [`StateChange`] events, and is ordered so that
//! any failure happens before the first mutation. A rejected command
//! therefore never leaves resources deducted or indices half-updated.
//!
//! [`CommandRejection`] is the expected-failure channel (a player
//! asked for something the rules refuse); [`crate::error::GameError`]
//! is reserved for states that should be impossible.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::army::{entrench_cost, Army, ArmyId, EntrenchState, ReinforcementColumn};
use crate::building::{Building, BuildingId, BuildingKind, BuildingState, TrainingEntry, TrainingOrder, MAX_BUILDING_LEVEL};
use crate::combat::{protectors_of, AttackTarget, CombatResolver};
use crate::commander::{attack_stamina_cost, CommanderId};
use crate::events::{ChangeBuilder, StateChange};
use crate::hex::HexCoord;
use crate::math::Fixed;
use crate::pathfinding::{find_nearest_walkable, find_path, PathRequest};
use crate::player::{Diplomacy, PlayerId, MAX_UNIT_UPGRADE_LEVEL};
use crate::resources::{ResourceKind, ResourcePointId, ResourcePointKind};
use crate::state::GameState;
use crate::units::{roster_size, UnitRoster, UnitType};
use crate::villager::{
    villager_cost, VillagerGroup, VillagerGroupId, VillagerTask, VillagerWork,
    VILLAGER_TRAIN_TIME,
};

/// Search radius for spawn placement around a building.
const SPAWN_SEARCH_RADIUS: u32 = 3;

/// Monotonic command identifier, assigned by the executor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CommandId(pub u64);

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// A command and its submission metadata, as kept in the history ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Executor-assigned id.
    pub id: CommandId,
    /// Tick the command was applied on.
    pub tick: u64,
    /// Issuing player.
    pub player: PlayerId,
    /// The command itself.
    pub command: Command,
}

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason")]
pub enum CommandRejection {
    /// Referenced entity does not exist.
    #[error("unknown {kind}")]
    UnknownEntity {
        /// Entity kind.
        kind: String,
    },
    /// Referenced entity belongs to another player.
    #[error("{kind} is not yours")]
    NotYourEntity {
        /// Entity kind.
        kind: String,
    },
    /// The player cannot pay.
    #[error("need {required} {kind:?}, have {available}")]
    InsufficientResources {
        /// Short resource kind.
        kind: ResourceKind,
        /// Amount needed.
        required: u32,
        /// Amount on hand.
        available: u32,
    },
    /// Training or deploying would exceed the population ceiling.
    #[error("population capacity {capacity} exceeded")]
    PopulationLimit {
        /// Current ceiling.
        capacity: u32,
    },
    /// The chosen coordinate cannot host this action.
    #[error("invalid site: {0}")]
    InvalidSite(String),
    /// No route exists to the destination.
    #[error("no path to destination")]
    NoPath,
    /// Destination tile already carries the maximum army stack.
    #[error("army stack limit reached")]
    StackingLimit,
    /// The home building cannot take another army.
    #[error("home base is at capacity")]
    HomeBaseFull,
    /// Army is locked in an engagement.
    #[error("army is in combat")]
    AlreadyInCombat,
    /// The target is shielded by defensive structures.
    #[error("target is protected by {0} defensive structure(s)", protectors.len())]
    ProtectedByDefenses {
        /// Structures that must fall first.
        protectors: Vec<BuildingId>,
    },
    /// Diplomacy does not permit attacking this player.
    #[error("diplomacy does not permit attacking this target")]
    NotHostile,
    /// The commander lacks stamina for an offensive order.
    #[error("commander is exhausted")]
    CommanderExhausted,
    /// The commander is already leading another army.
    #[error("commander is unavailable")]
    CommanderUnavailable,
    /// An academy research project is already running.
    #[error("research already in progress")]
    ResearchBusy,
    /// The upgrade target is already at its ceiling.
    #[error("already at maximum level")]
    MaxLevel,
    /// A state-machine precondition failed.
    #[error("{0}")]
    InvalidState(String),
}

/// The command catalog.
///
/// Serialized with a `type` tag so envelopes decode from JSON sent by
/// clients and replay files alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// March an army to a destination.
    MoveArmy {
        /// Army to move.
        army: ArmyId,
        /// Destination tile.
        to: HexCoord,
    },
    /// Walk a villager group to a destination.
    MoveVillagers {
        /// Group to move.
        group: VillagerGroupId,
        /// Destination tile.
        to: HexCoord,
    },
    /// Pay for and place a building in `Planning` state.
    Build {
        /// What to build.
        kind: BuildingKind,
        /// Anchor tile.
        anchor: HexCoord,
    },
    /// Send a villager group to work on a planned or active site.
    AssignBuilders {
        /// Target building.
        building: BuildingId,
        /// Group to send.
        group: VillagerGroupId,
    },
    /// Begin tearing a building down.
    Demolish {
        /// Target building.
        building: BuildingId,
    },
    /// Abort an in-progress demolition.
    CancelDemolition {
        /// Target building.
        building: BuildingId,
    },
    /// Pay for and begin a building upgrade.
    Upgrade {
        /// Target building.
        building: BuildingId,
    },
    /// Abort an in-progress upgrade, refunding its cost.
    CancelUpgrade {
        /// Target building.
        building: BuildingId,
    },
    /// Queue a batch of military units.
    TrainMilitary {
        /// Producing building.
        building: BuildingId,
        /// Unit type.
        unit: UnitType,
        /// Batch size.
        count: u32,
    },
    /// Queue a batch of villagers.
    TrainVillagers {
        /// Producing building.
        building: BuildingId,
        /// Batch size.
        count: u32,
    },
    /// Call off the most recently queued training batch.
    CancelTraining {
        /// Producing building.
        building: BuildingId,
    },
    /// Field an army from a building's garrison.
    DeployArmy {
        /// Source building; becomes the army's home base.
        building: BuildingId,
        /// Units to take.
        roster: UnitRoster,
        /// Commander to lead, if any.
        commander: Option<CommanderId>,
    },
    /// Field a villager group from a building's garrison.
    DeployVillagers {
        /// Source building.
        building: BuildingId,
        /// Villagers to take.
        count: u32,
    },
    /// Send a villager group to gather (or hunt) a resource point.
    Gather {
        /// Gathering group.
        group: VillagerGroupId,
        /// Target point.
        point: ResourcePointId,
    },
    /// Stop a group's gathering or hunting.
    StopGathering {
        /// Affected group.
        group: VillagerGroupId,
    },
    /// Order an army to attack a target.
    Attack {
        /// Attacking army.
        army: ArmyId,
        /// What to attack.
        target: AttackTarget,
    },
    /// Withdraw an army toward its home base.
    Retreat {
        /// Retreating army.
        army: ArmyId,
    },
    /// Begin digging in at the current position.
    Entrench {
        /// Entrenching army.
        army: ArmyId,
    },
    /// March reinforcements from the home garrison to an army.
    Reinforce {
        /// Destination army.
        army: ArmyId,
        /// Units to send.
        roster: UnitRoster,
    },
    /// Recall all reinforcement columns to the home garrison.
    CancelReinforcement {
        /// Affected army.
        army: ArmyId,
    },
    /// Merge one villager group into a co-located one.
    JoinVillagerGroup {
        /// Group that dissolves.
        group: VillagerGroupId,
        /// Group that absorbs it.
        into: VillagerGroupId,
    },
    /// Start academy research of a permanent per-unit-type upgrade.
    UpgradeUnit {
        /// Unit type to upgrade.
        unit: UnitType,
    },
    /// Declare a diplomatic standing toward another player.
    SetDiplomacy {
        /// Subject player.
        other: PlayerId,
        /// New standing.
        standing: Diplomacy,
    },
}

/// Check whether `player` may run `command` against `state`.
///
/// Read-only and side-effect-free; a validated command can still fail
/// in [`execute`] if the state changed in between.
///
/// # Errors
/// Returns the first [`CommandRejection`] encountered.
pub fn validate(
    state: &GameState,
    player: PlayerId,
    command: &Command,
) -> Result<(), CommandRejection> {
    match command {
        Command::MoveArmy { army, to } => {
            let a = owned_army(state, player, *army)?;
            if a.in_combat() {
                return Err(CommandRejection::AlreadyInCombat);
            }
            route(state, a.coord, *to, player)?;
            Ok(())
        }
        Command::MoveVillagers { group, to } => {
            let g = owned_group(state, player, *group)?;
            route(state, g.coord, *to, player)?;
            Ok(())
        }
        Command::Build { kind, anchor } => {
            check_site(state, *kind, *anchor)?;
            check_affordable(state, player, &kind.cost())?;
            Ok(())
        }
        Command::AssignBuilders { building, group } => {
            let b = owned_building(state, player, *building)?;
            let work = builder_work(b)?;
            let g = owned_group(state, player, *group)?;
            builder_route(state, g.coord, b, player)?;
            let _ = work;
            Ok(())
        }
        Command::Demolish { building } => {
            let b = owned_building(state, player, *building)?;
            if !b.is_completed() {
                return Err(CommandRejection::InvalidState(
                    "only completed buildings can be demolished".into(),
                ));
            }
            Ok(())
        }
        Command::CancelDemolition { building } => {
            let b = owned_building(state, player, *building)?;
            match b.state {
                BuildingState::Demolishing { .. } => Ok(()),
                _ => Err(CommandRejection::InvalidState(
                    "building is not being demolished".into(),
                )),
            }
        }
        Command::Upgrade { building } => {
            let b = owned_building(state, player, *building)?;
            if !b.is_completed() {
                return Err(CommandRejection::InvalidState(
                    "only completed buildings can be upgraded".into(),
                ));
            }
            if b.level >= MAX_BUILDING_LEVEL {
                return Err(CommandRejection::MaxLevel);
            }
            check_affordable(state, player, &b.upgrade_cost())?;
            Ok(())
        }
        Command::CancelUpgrade { building } => {
            let b = owned_building(state, player, *building)?;
            match b.state {
                BuildingState::Upgrading { .. } => Ok(()),
                _ => Err(CommandRejection::InvalidState(
                    "building is not upgrading".into(),
                )),
            }
        }
        Command::TrainMilitary {
            building,
            unit,
            count,
        } => {
            let b = owned_building(state, player, *building)?;
            check_trainer(b, *unit)?;
            check_count(*count)?;
            let stats = unit.stats();
            check_affordable(state, player, &stats.cost.times(*count))?;
            check_population(state, player, stats.population * count)?;
            Ok(())
        }
        Command::TrainVillagers { building, count } => {
            let b = owned_building(state, player, *building)?;
            if !b.is_completed() || !b.kind.trains_villagers() {
                return Err(CommandRejection::InvalidState(
                    "building cannot train villagers".into(),
                ));
            }
            check_count(*count)?;
            check_affordable(state, player, &villager_cost().times(*count))?;
            check_population(state, player, *count)?;
            Ok(())
        }
        Command::CancelTraining { building } => {
            let b = owned_building(state, player, *building)?;
            if b.training_queue.is_empty() {
                return Err(CommandRejection::InvalidState(
                    "training queue is empty".into(),
                ));
            }
            Ok(())
        }
        Command::DeployArmy {
            building,
            roster,
            commander,
        } => {
            let b = owned_building(state, player, *building)?;
            if !b.is_completed() {
                return Err(CommandRejection::InvalidState(
                    "building is not completed".into(),
                ));
            }
            check_garrison_covers(&b.garrison, roster)?;
            if b.kind.home_capacity().is_none() {
                return Err(CommandRejection::InvalidState(
                    "building cannot serve as a home base".into(),
                ));
            }
            if !state.has_home_capacity(*building) {
                return Err(CommandRejection::HomeBaseFull);
            }
            if let Some(id) = commander {
                let c = state
                    .commander(*id)
                    .ok_or_else(|| unknown("commander"))?;
                if c.owner != player {
                    return Err(not_yours("commander"));
                }
                if c.army.is_some() {
                    return Err(CommandRejection::CommanderUnavailable);
                }
            }
            spawn_site(state, b.anchor, player)?;
            Ok(())
        }
        Command::DeployVillagers { building, count } => {
            let b = owned_building(state, player, *building)?;
            check_count(*count)?;
            if b.villager_garrison < *count {
                return Err(CommandRejection::InvalidState(format!(
                    "only {} villagers garrisoned",
                    b.villager_garrison
                )));
            }
            spawn_site(state, b.anchor, player)?;
            Ok(())
        }
        Command::Gather { group, point } => {
            let g = owned_group(state, player, *group)?;
            let p = state
                .resource_point(*point)
                .ok_or_else(|| unknown("resource point"))?;
            if p.is_depleted() {
                return Err(CommandRejection::InvalidState(
                    "resource point is depleted".into(),
                ));
            }
            if !p.has_gatherer_space() {
                return Err(CommandRejection::InvalidState(
                    "resource point has no gatherer slots left".into(),
                ));
            }
            // Farmland yields nothing until a farm stands over it
            if p.kind == ResourcePointKind::Farmland {
                let farmed = state
                    .map()
                    .building_at(p.coord)
                    .and_then(|id| state.building(id))
                    .is_some_and(|b| b.kind == BuildingKind::Farm && b.is_completed());
                if !farmed {
                    return Err(CommandRejection::InvalidState(
                        "farmland has no completed farm over it".into(),
                    ));
                }
            }
            route(state, g.coord, p.coord, player)?;
            Ok(())
        }
        Command::StopGathering { group } => {
            let g = owned_group(state, player, *group)?;
            match gather_work(g) {
                Some(_) => Ok(()),
                None => Err(CommandRejection::InvalidState(
                    "group is not gathering".into(),
                )),
            }
        }
        Command::Attack { army, target } => {
            let a = owned_army(state, player, *army)?;
            if a.in_combat() {
                return Err(CommandRejection::AlreadyInCombat);
            }
            let (owner, _, _) = target_profile(state, *target)?;
            if !attacker_standing(state, player, owner).is_hostile() {
                return Err(CommandRejection::NotHostile);
            }
            if let AttackTarget::Building { building } = target {
                let protectors = protectors_of(state, *building);
                if !protectors.is_empty() {
                    return Err(CommandRejection::ProtectedByDefenses { protectors });
                }
            }
            check_stamina(state, a)?;
            assault_route(state, a.coord, *target, player)?;
            Ok(())
        }
        Command::Retreat { army } => {
            owned_army(state, player, *army)?;
            Ok(())
        }
        Command::Entrench { army } => {
            let a = owned_army(state, player, *army)?;
            if a.in_combat() {
                return Err(CommandRejection::AlreadyInCombat);
            }
            if a.is_moving() {
                return Err(CommandRejection::InvalidState(
                    "army must halt before entrenching".into(),
                ));
            }
            check_affordable(state, player, &entrench_cost())
        }
        Command::Reinforce { army, roster } => {
            let a = owned_army(state, player, *army)?;
            let home = state
                .building(a.home_base)
                .ok_or_else(|| unknown("home base"))?;
            if !home.is_completed() {
                return Err(CommandRejection::InvalidState(
                    "home base is not completed".into(),
                ));
            }
            check_garrison_covers(&home.garrison, roster)?;
            let start = spawn_site(state, home.anchor, player)?;
            route(state, start, a.coord, player)?;
            Ok(())
        }
        Command::CancelReinforcement { army } => {
            let a = owned_army(state, player, *army)?;
            if a.reinforcements.is_empty() {
                return Err(CommandRejection::InvalidState(
                    "no reinforcements are en route".into(),
                ));
            }
            Ok(())
        }
        Command::JoinVillagerGroup { group, into } => {
            if group == into {
                return Err(CommandRejection::InvalidState(
                    "a group cannot join itself".into(),
                ));
            }
            let g = owned_group(state, player, *group)?;
            let target = owned_group(state, player, *into)?;
            if g.coord != target.coord {
                return Err(CommandRejection::InvalidState(
                    "groups must share a tile to merge".into(),
                ));
            }
            Ok(())
        }
        Command::UpgradeUnit { unit } => {
            let p = state.player(player).ok_or_else(|| unknown("player"))?;
            if p.research.is_some() {
                return Err(CommandRejection::ResearchBusy);
            }
            let level = p.upgrade_level(*unit);
            if level >= MAX_UNIT_UPGRADE_LEVEL {
                return Err(CommandRejection::MaxLevel);
            }
            if !has_completed_kind(state, player, BuildingKind::Academy) {
                return Err(CommandRejection::InvalidState(
                    "an academy is required".into(),
                ));
            }
            check_affordable(state, player, &unit.upgrade_cost(level + 1))?;
            Ok(())
        }
        Command::SetDiplomacy { other, standing } => {
            if *other == player || *standing == Diplomacy::Own {
                return Err(CommandRejection::InvalidState(
                    "cannot declare a standing toward yourself".into(),
                ));
            }
            state.player(*other).ok_or_else(|| unknown("player"))?;
            Ok(())
        }
    }
}

/// Apply a validated command.
///
/// Re-checks the preconditions that can change between validation and
/// execution, and orders its mutations so a failure leaves the state
/// untouched.
///
/// # Errors
/// Returns a [`CommandRejection`] without mutating the state.
pub fn execute(
    state: &mut GameState,
    combat: &mut CombatResolver,
    player: PlayerId,
    command: &Command,
    changes: &mut ChangeBuilder,
) -> Result<(), CommandRejection> {
    validate(state, player, command)?;
    let now = state.tick();

    match command {
        Command::MoveArmy { army, to } => {
            let coord = state.army(*army).map(|a| a.coord).unwrap_or(*to);
            let path = route(state, coord, *to, player)?;
            if let Some(a) = state.army_mut(*army) {
                a.set_path(path);
                a.attack_order = None;
                a.retreating = false;
            }
            Ok(())
        }
        Command::MoveVillagers { group, to } => {
            let coord = state.villagers(*group).map(|g| g.coord).unwrap_or(*to);
            let path = route(state, coord, *to, player)?;
            detach_gatherer(state, *group);
            if let Some(g) = state.villagers_mut(*group) {
                g.set_path(path, None);
                let task = g.task;
                changes.record(StateChange::VillagerTaskChanged {
                    group: *group,
                    task,
                });
            }
            Ok(())
        }
        Command::Build { kind, anchor } => {
            spend(state, player, &kind.cost(), changes)?;
            let building = Building::new(*kind, player, *anchor);
            let id = state
                .add_building(building)
                .map_err(|e| CommandRejection::InvalidSite(e.to_string()))?;
            changes.record(StateChange::BuildingPlaced {
                building: id,
                kind: *kind,
                owner: player,
                anchor: *anchor,
            });
            Ok(())
        }
        Command::AssignBuilders { building, group } => {
            let (work, path) = {
                let b = state
                    .building(*building)
                    .ok_or_else(|| unknown("building"))?;
                let work = builder_work(b)?;
                let coord = state
                    .villagers(*group)
                    .map(|g| g.coord)
                    .ok_or_else(|| unknown("villager group"))?;
                (work, builder_route(state, coord, b, player)?)
            };
            detach_gatherer(state, *group);
            if let Some(g) = state.villagers_mut(*group) {
                g.set_path(path, Some(work));
                let task = g.task;
                changes.record(StateChange::VillagerTaskChanged {
                    group: *group,
                    task,
                });
            }
            Ok(())
        }
        Command::Demolish { building } => {
            set_building_state(state, *building, BuildingState::Demolishing { started: now }, changes)
        }
        Command::CancelDemolition { building } => {
            set_building_state(state, *building, BuildingState::Completed, changes)
        }
        Command::Upgrade { building } => {
            let cost = state
                .building(*building)
                .map(Building::upgrade_cost)
                .ok_or_else(|| unknown("building"))?;
            spend(state, player, &cost, changes)?;
            set_building_state(state, *building, BuildingState::Upgrading { started: now }, changes)
        }
        Command::CancelUpgrade { building } => {
            let cost = state
                .building(*building)
                .map(Building::upgrade_cost)
                .ok_or_else(|| unknown("building"))?;
            set_building_state(state, *building, BuildingState::Completed, changes)?;
            refund(state, player, &cost, changes);
            Ok(())
        }
        Command::TrainMilitary {
            building,
            unit,
            count,
        } => {
            let stats = unit.stats();
            spend(state, player, &stats.cost.times(*count), changes)?;
            let order = TrainingOrder::Military {
                unit: *unit,
                count: *count,
            };
            enqueue_training(
                state,
                *building,
                order,
                u64::from(stats.train_time) * u64::from(*count),
                now,
                changes,
            );
            Ok(())
        }
        Command::TrainVillagers { building, count } => {
            spend(state, player, &villager_cost().times(*count), changes)?;
            let order = TrainingOrder::Villagers { count: *count };
            enqueue_training(
                state,
                *building,
                order,
                VILLAGER_TRAIN_TIME * u64::from(*count),
                now,
                changes,
            );
            Ok(())
        }
        Command::CancelTraining { building } => {
            let popped = state
                .building_mut(*building)
                .and_then(|b| b.training_queue.pop());
            let Some(entry) = popped else {
                return Err(unknown("training entry"));
            };
            let cost = match entry.order {
                TrainingOrder::Military { unit, count } => unit.stats().cost.times(count),
                TrainingOrder::Villagers { count } => villager_cost().times(count),
            };
            refund(state, player, &cost, changes);
            changes.record(StateChange::TrainingCancelled {
                building: *building,
                order: entry.order,
            });
            Ok(())
        }
        Command::DeployArmy {
            building,
            roster,
            commander,
        } => {
            let anchor = state
                .building(*building)
                .map(|b| b.anchor)
                .ok_or_else(|| unknown("building"))?;
            let coord = spawn_site(state, anchor, player)?;
            if let Some(b) = state.building_mut(*building) {
                subtract_garrison(&mut b.garrison, roster);
            }
            let mut army = Army::new(player, coord, roster.clone(), *building);
            army.commander = *commander;
            match state.add_army(army) {
                Ok(id) => {
                    changes.record(StateChange::ArmyDeployed {
                        army: id,
                        owner: player,
                        coord,
                    });
                    Ok(())
                }
                Err(_) => {
                    // Spawn tile filled up between checks; put units back
                    if let Some(b) = state.building_mut(*building) {
                        crate::units::merge_rosters(&mut b.garrison, roster);
                    }
                    Err(CommandRejection::StackingLimit)
                }
            }
        }
        Command::DeployVillagers { building, count } => {
            let anchor = state
                .building(*building)
                .map(|b| b.anchor)
                .ok_or_else(|| unknown("building"))?;
            let coord = spawn_site(state, anchor, player)?;
            if let Some(b) = state.building_mut(*building) {
                b.villager_garrison -= count;
            }
            let group = VillagerGroup::new(player, coord, *count, *building);
            let id = state.add_villagers(group);
            changes.record(StateChange::VillagersDeployed {
                group: id,
                owner: player,
                coord,
            });
            Ok(())
        }
        Command::Gather { group, point } => {
            let (target_coord, huntable) = state
                .resource_point(*point)
                .map(|p| (p.coord, p.kind.is_huntable()))
                .ok_or_else(|| unknown("resource point"))?;
            let coord = state
                .villagers(*group)
                .map(|g| g.coord)
                .ok_or_else(|| unknown("villager group"))?;
            let path = route(state, coord, target_coord, player)?;
            let work = if huntable {
                VillagerWork::Hunt(*point)
            } else {
                VillagerWork::Gather(*point)
            };
            detach_gatherer(state, *group);
            if let Some(g) = state.villagers_mut(*group) {
                g.set_path(path, Some(work));
                let task = g.task;
                changes.record(StateChange::VillagerTaskChanged {
                    group: *group,
                    task,
                });
            }
            Ok(())
        }
        Command::StopGathering { group } => {
            detach_gatherer(state, *group);
            if let Some(g) = state.villagers_mut(*group) {
                g.stop();
                changes.record(StateChange::VillagerTaskChanged {
                    group: *group,
                    task: VillagerTask::Idle,
                });
            }
            Ok(())
        }
        Command::Attack { army, target } => {
            let coord = state
                .army(*army)
                .map(|a| a.coord)
                .ok_or_else(|| unknown("army"))?;
            let path = assault_route(state, coord, *target, player)?;
            if let Some(id) = state.army(*army).and_then(|a| a.commander) {
                let paid = state
                    .commander_mut(id)
                    .map_or(false, |c| c.spend_stamina(attack_stamina_cost()));
                if !paid {
                    return Err(CommandRejection::CommanderExhausted);
                }
            }
            if let Some(a) = state.army_mut(*army) {
                a.set_path(path);
                a.attack_order = Some(*target);
                a.retreating = false;
            }
            Ok(())
        }
        Command::Retreat { army } => {
            if let Some(engagement) = state.army(*army).and_then(|a| a.engagement) {
                combat.abort(state, engagement, changes);
            }
            let (coord, home) = state
                .army(*army)
                .map(|a| (a.coord, a.home_base))
                .ok_or_else(|| unknown("army"))?;
            let home_anchor = state.building(home).map(|b| b.anchor);
            let path = home_anchor
                .and_then(|anchor| find_nearest_walkable(state, anchor, SPAWN_SEARCH_RADIUS, player))
                .and_then(|dest| route(state, coord, dest, player).ok())
                .unwrap_or_default();
            if let Some(a) = state.army_mut(*army) {
                a.attack_order = None;
                a.retreating = true;
                a.set_path(path);
            }
            Ok(())
        }
        Command::Entrench { army } => {
            spend(state, player, &entrench_cost(), changes)?;
            if let Some(a) = state.army_mut(*army) {
                a.entrenchment = EntrenchState::Entrenching { started: now };
            }
            Ok(())
        }
        Command::Reinforce { army, roster } => {
            let (army_coord, home) = state
                .army(*army)
                .map(|a| (a.coord, a.home_base))
                .ok_or_else(|| unknown("army"))?;
            let anchor = state
                .building(home)
                .map(|b| b.anchor)
                .ok_or_else(|| unknown("home base"))?;
            let start = spawn_site(state, anchor, player)?;
            let path = route(state, start, army_coord, player)?;
            if let Some(b) = state.building_mut(home) {
                subtract_garrison(&mut b.garrison, roster);
            }
            if let Some(a) = state.army_mut(*army) {
                a.reinforcements.push(ReinforcementColumn {
                    roster: roster.clone(),
                    from: home,
                    coord: start,
                    path,
                    path_index: 0,
                    progress: Fixed::ZERO,
                });
            }
            Ok(())
        }
        Command::CancelReinforcement { army } => {
            let columns = state
                .army_mut(*army)
                .map(|a| std::mem::take(&mut a.reinforcements))
                .ok_or_else(|| unknown("army"))?;
            for column in columns {
                if let Some(b) = state.building_mut(column.from) {
                    crate::units::merge_rosters(&mut b.garrison, &column.roster);
                }
            }
            Ok(())
        }
        Command::JoinVillagerGroup { group, into } => {
            detach_gatherer(state, *group);
            let absorbed = state
                .remove_villagers(*group)
                .map_err(|_| unknown("villager group"))?;
            if let Some(target) = state.villagers_mut(*into) {
                target.absorb(absorbed.size);
            }
            changes.record(StateChange::VillagersRemoved { group: *group });
            Ok(())
        }
        Command::UpgradeUnit { unit } => {
            let level = state
                .player(player)
                .map(|p| p.upgrade_level(*unit))
                .ok_or_else(|| unknown("player"))?;
            spend(state, player, &unit.upgrade_cost(level + 1), changes)?;
            if let Some(p) = state.player_mut(player) {
                p.research = Some(crate::player::Research {
                    unit: *unit,
                    started: now,
                    duration: unit.upgrade_time(level + 1),
                });
            }
            changes.record(StateChange::ResearchStarted {
                player,
                unit: *unit,
            });
            Ok(())
        }
        Command::SetDiplomacy { other, standing } => {
            if let Some(p) = state.player_mut(player) {
                p.set_diplomacy(*other, *standing);
            }
            changes.record(StateChange::DiplomacyChanged {
                player,
                other: *other,
                standing: *standing,
            });
            Ok(())
        }
    }
}

// ---- shared helpers ----

fn unknown(kind: &str) -> CommandRejection {
    CommandRejection::UnknownEntity { kind: kind.into() }
}

fn not_yours(kind: &str) -> CommandRejection {
    CommandRejection::NotYourEntity { kind: kind.into() }
}

fn owned_army<'a>(
    state: &'a GameState,
    player: PlayerId,
    id: ArmyId,
) -> Result<&'a Army, CommandRejection> {
    let army = state.army(id).ok_or_else(|| unknown("army"))?;
    if army.owner != player {
        return Err(not_yours("army"));
    }
    Ok(army)
}

fn owned_group<'a>(
    state: &'a GameState,
    player: PlayerId,
    id: VillagerGroupId,
) -> Result<&'a VillagerGroup, CommandRejection> {
    let group = state.villagers(id).ok_or_else(|| unknown("villager group"))?;
    if group.owner != player {
        return Err(not_yours("villager group"));
    }
    Ok(group)
}

fn owned_building<'a>(
    state: &'a GameState,
    player: PlayerId,
    id: BuildingId,
) -> Result<&'a Building, CommandRejection> {
    let building = state.building(id).ok_or_else(|| unknown("building"))?;
    if building.owner != player {
        return Err(not_yours("building"));
    }
    Ok(building)
}

fn check_count(count: u32) -> Result<(), CommandRejection> {
    if count == 0 {
        return Err(CommandRejection::InvalidState("count must be positive".into()));
    }
    Ok(())
}

fn check_affordable(
    state: &GameState,
    player: PlayerId,
    cost: &crate::resources::Cost,
) -> Result<(), CommandRejection> {
    let p = state.player(player).ok_or_else(|| unknown("player"))?;
    if let Some((kind, required, available)) = p.stockpile.missing_for(cost) {
        return Err(CommandRejection::InsufficientResources {
            kind,
            required,
            available,
        });
    }
    Ok(())
}

fn check_population(
    state: &GameState,
    player: PlayerId,
    additional: u32,
) -> Result<(), CommandRejection> {
    let capacity = state
        .player(player)
        .map(|p| p.population_capacity)
        .ok_or_else(|| unknown("player"))?;
    if state.population(player) + additional > capacity {
        return Err(CommandRejection::PopulationLimit { capacity });
    }
    Ok(())
}

fn has_completed_kind(state: &GameState, player: PlayerId, kind: BuildingKind) -> bool {
    state.player(player).is_some_and(|p| {
        p.buildings
            .iter()
            .filter_map(|id| state.building(*id))
            .any(|b| b.kind == kind && b.is_completed())
    })
}

fn check_trainer(b: &Building, unit: UnitType) -> Result<(), CommandRejection> {
    if !b.is_completed() {
        return Err(CommandRejection::InvalidState(
            "building is not completed".into(),
        ));
    }
    if !b.kind.trains().contains(&unit) {
        return Err(CommandRejection::InvalidState(format!(
            "{:?} cannot train {unit:?}",
            b.kind
        )));
    }
    Ok(())
}

fn check_garrison_covers(
    garrison: &UnitRoster,
    wanted: &UnitRoster,
) -> Result<(), CommandRejection> {
    if roster_size(wanted) == 0 {
        return Err(CommandRejection::InvalidState("empty roster".into()));
    }
    for (unit, count) in wanted {
        let have = garrison.get(unit).copied().unwrap_or(0);
        if have < *count {
            return Err(CommandRejection::InvalidState(format!(
                "garrison holds {have} {unit:?}, {count} requested"
            )));
        }
    }
    Ok(())
}

fn check_stamina(state: &GameState, army: &Army) -> Result<(), CommandRejection> {
    if let Some(c) = army.commander.and_then(|c| state.commander(c)) {
        if !c.has_stamina(attack_stamina_cost()) {
            return Err(CommandRejection::CommanderExhausted);
        }
    }
    Ok(())
}

/// The standing the attacker has declared toward the target's owner.
fn attacker_standing(state: &GameState, attacker: PlayerId, owner: PlayerId) -> Diplomacy {
    if attacker == owner {
        return Diplomacy::Own;
    }
    state
        .player(attacker)
        .map_or(Diplomacy::Neutral, |p| p.diplomacy_with(owner))
}

/// Owner, coordinate, and footprint of an attack target.
fn target_profile(
    state: &GameState,
    target: AttackTarget,
) -> Result<(PlayerId, HexCoord, Vec<HexCoord>), CommandRejection> {
    match target {
        AttackTarget::Army { army } => {
            let a = state.army(army).ok_or_else(|| unknown("army"))?;
            Ok((a.owner, a.coord, Vec::new()))
        }
        AttackTarget::Building { building } => {
            let b = state.building(building).ok_or_else(|| unknown("building"))?;
            Ok((b.owner, b.anchor, b.footprint.clone()))
        }
        AttackTarget::Villagers { group } => {
            let g = state
                .villagers(group)
                .ok_or_else(|| unknown("villager group"))?;
            Ok((g.owner, g.coord, Vec::new()))
        }
    }
}

fn route(
    state: &GameState,
    from: HexCoord,
    to: HexCoord,
    player: PlayerId,
) -> Result<Vec<HexCoord>, CommandRejection> {
    find_path(state, &PathRequest::travel(from, to, player)).ok_or(CommandRejection::NoPath)
}

fn assault_route(
    state: &GameState,
    from: HexCoord,
    target: AttackTarget,
    player: PlayerId,
) -> Result<Vec<HexCoord>, CommandRejection> {
    let (_, coord, footprint) = target_profile(state, target)?;
    find_path(state, &PathRequest::assault(from, coord, player, footprint))
        .ok_or(CommandRejection::NoPath)
}

/// Path a builder group next to (or onto) a building site.
fn builder_route(
    state: &GameState,
    from: HexCoord,
    building: &Building,
    player: PlayerId,
) -> Result<Vec<HexCoord>, CommandRejection> {
    find_path(
        state,
        &PathRequest::assault(from, building.anchor, player, building.footprint.clone()),
    )
    .ok_or(CommandRejection::NoPath)
}

/// The villager work order appropriate to a building's state.
fn builder_work(b: &Building) -> Result<VillagerWork, CommandRejection> {
    match b.state {
        BuildingState::Planning | BuildingState::Constructing { .. } => {
            Ok(VillagerWork::Build(b.id))
        }
        BuildingState::Upgrading { .. } => Ok(VillagerWork::Upgrade(b.id)),
        BuildingState::Demolishing { .. } => Ok(VillagerWork::Demolish(b.id)),
        BuildingState::Completed | BuildingState::Destroyed => Err(
            CommandRejection::InvalidState("building needs no builders".into()),
        ),
    }
}

fn gather_work(g: &VillagerGroup) -> Option<ResourcePointId> {
    let work = match g.task {
        VillagerTask::Working(work) => Some(work),
        VillagerTask::Moving { then } => then,
        VillagerTask::Idle => None,
    }?;
    work.resource_point()
}

/// Drop a group's gatherer registration, if it holds one.
fn detach_gatherer(state: &mut GameState, group: VillagerGroupId) {
    let point = state.villagers(group).and_then(gather_work);
    if let Some(point) = point {
        if let Some(p) = state.resource_point_mut(point) {
            p.gatherers.remove(&group);
        }
    }
}

fn spawn_site(
    state: &GameState,
    anchor: HexCoord,
    player: PlayerId,
) -> Result<HexCoord, CommandRejection> {
    find_nearest_walkable(state, anchor, SPAWN_SEARCH_RADIUS, player)
        .ok_or(CommandRejection::StackingLimit)
}

/// Check a building site: tiles on the map, walkable, unoccupied, and
/// any camp resource requirement satisfied.
fn check_site(
    state: &GameState,
    kind: BuildingKind,
    anchor: HexCoord,
) -> Result<(), CommandRejection> {
    let footprint = kind.footprint_at(anchor);
    for &coord in &footprint {
        let tile = state
            .map()
            .tile(coord)
            .ok_or_else(|| CommandRejection::InvalidSite(format!("{coord} is off the map")))?;
        if !tile.terrain.is_walkable() {
            return Err(CommandRejection::InvalidSite(format!(
                "{coord} is not buildable terrain"
            )));
        }
        if state.map().building_at(coord).is_some() {
            return Err(CommandRejection::InvalidSite(format!(
                "{coord} already hosts a building"
            )));
        }
    }
    match kind.required_resource() {
        Some(required) => {
            let found = state
                .map()
                .resource_at(anchor)
                .and_then(|id| state.resource_point(id))
                .map(|p| p.kind);
            if found != Some(required) {
                return Err(CommandRejection::InvalidSite(format!(
                    "{kind:?} must be placed on a {required:?} point"
                )));
            }
        }
        None => {
            for &coord in &footprint {
                if state.map().resource_at(coord).is_some() {
                    return Err(CommandRejection::InvalidSite(format!(
                        "{coord} hosts a resource point"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn spend(
    state: &mut GameState,
    player: PlayerId,
    cost: &crate::resources::Cost,
    changes: &mut ChangeBuilder,
) -> Result<(), CommandRejection> {
    let p = state.player_mut(player).ok_or_else(|| unknown("player"))?;
    if let Some((kind, required, available)) = p.stockpile.missing_for(cost) {
        return Err(CommandRejection::InsufficientResources {
            kind,
            required,
            available,
        });
    }
    p.stockpile.spend(cost);
    changes.record(StateChange::ResourcesSpent {
        player,
        cost: *cost,
    });
    Ok(())
}

fn refund(
    state: &mut GameState,
    player: PlayerId,
    cost: &crate::resources::Cost,
    changes: &mut ChangeBuilder,
) {
    if let Some(p) = state.player_mut(player) {
        p.stockpile.refund(cost);
        changes.record(StateChange::ResourcesRefunded {
            player,
            cost: *cost,
        });
    }
}

fn set_building_state(
    state: &mut GameState,
    id: BuildingId,
    new_state: BuildingState,
    changes: &mut ChangeBuilder,
) -> Result<(), CommandRejection> {
    let b = state.building_mut(id).ok_or_else(|| unknown("building"))?;
    b.state = new_state;
    changes.record(StateChange::BuildingStateChanged {
        building: id,
        state: new_state,
    });
    Ok(())
}

fn enqueue_training(
    state: &mut GameState,
    id: BuildingId,
    order: TrainingOrder,
    duration: u64,
    now: u64,
    changes: &mut ChangeBuilder,
) {
    if let Some(b) = state.building_mut(id) {
        let started = if b.training_queue.is_empty() { now } else { 0 };
        b.training_queue.push(TrainingEntry {
            order,
            started,
            duration,
        });
        changes.record(StateChange::TrainingQueued {
            building: id,
            order,
        });
    }
}

fn subtract_garrison(garrison: &mut UnitRoster, taken: &UnitRoster) {
    for (unit, count) in taken {
        if let Some(have) = garrison.get_mut(unit) {
            *have = have.saturating_sub(*count);
        }
    }
    garrison.retain(|_, count| *count > 0);
}
