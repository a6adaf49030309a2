//! State-change events: the closed union of everything that can
//! happen to the game state.
//!
//! Commands and the tick loop never mutate silently: every mutation is
//! mirrored by a [`StateChange`] recorded through a [`ChangeBuilder`].
//! Batches are what synchronization layers ship to observers, so the
//! union is serialized with a tag for forward-compatible decoding.

use serde::{Deserialize, Serialize};

use crate::army::ArmyId;
use crate::building::{BuildingId, BuildingKind, BuildingState, TrainingOrder};
use crate::combat::{AttackTarget, EngagementId};
use crate::command::CommandId;
use crate::commander::CommanderId;
use crate::hex::HexCoord;
use crate::player::{Diplomacy, PlayerId};
use crate::resources::{Cost, ResourceKind, ResourcePointId, ResourcePointKind};
use crate::units::UnitType;
use crate::villager::{VillagerGroupId, VillagerTask};

/// One observable mutation of the game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StateChange {
    /// A player paid a cost.
    ResourcesSpent {
        /// Paying player.
        player: PlayerId,
        /// Amount deducted.
        cost: Cost,
    },
    /// A player was refunded a cost.
    ResourcesRefunded {
        /// Refunded player.
        player: PlayerId,
        /// Amount returned.
        cost: Cost,
    },
    /// A player's stockpile grew from gathering.
    ResourcesGained {
        /// Receiving player.
        player: PlayerId,
        /// Resource kind.
        kind: ResourceKind,
        /// Amount actually stored after capacity clamping.
        amount: u32,
    },
    /// A building was placed on the map.
    BuildingPlaced {
        /// New building.
        building: BuildingId,
        /// Its kind.
        kind: BuildingKind,
        /// Owning player.
        owner: PlayerId,
        /// Anchor coordinate.
        anchor: HexCoord,
    },
    /// A building moved to a new lifecycle state.
    BuildingStateChanged {
        /// Affected building.
        building: BuildingId,
        /// New state.
        state: BuildingState,
    },
    /// A building finished an upgrade.
    BuildingLeveled {
        /// Affected building.
        building: BuildingId,
        /// New level.
        level: u8,
    },
    /// A building took damage.
    BuildingDamaged {
        /// Affected building.
        building: BuildingId,
        /// Remaining health.
        health: u32,
    },
    /// A building left the game.
    BuildingRemoved {
        /// Removed building.
        building: BuildingId,
    },
    /// An army appeared on the map.
    ArmyDeployed {
        /// New army.
        army: ArmyId,
        /// Owning player.
        owner: PlayerId,
        /// Spawn coordinate.
        coord: HexCoord,
    },
    /// An army stepped to a new tile.
    ArmyMoved {
        /// Moving army.
        army: ArmyId,
        /// Previous coordinate.
        from: HexCoord,
        /// New coordinate.
        to: HexCoord,
    },
    /// An army's composition changed (casualties, reinforcements).
    ArmyRosterChanged {
        /// Affected army.
        army: ArmyId,
    },
    /// An army left the game.
    ArmyRemoved {
        /// Removed army.
        army: ArmyId,
    },
    /// A villager group appeared on the map.
    VillagersDeployed {
        /// New group.
        group: VillagerGroupId,
        /// Owning player.
        owner: PlayerId,
        /// Spawn coordinate.
        coord: HexCoord,
    },
    /// A villager group stepped to a new tile.
    VillagersMoved {
        /// Moving group.
        group: VillagerGroupId,
        /// Previous coordinate.
        from: HexCoord,
        /// New coordinate.
        to: HexCoord,
    },
    /// A villager group changed task.
    VillagerTaskChanged {
        /// Affected group.
        group: VillagerGroupId,
        /// New task.
        task: VillagerTask,
    },
    /// A villager group left the game.
    VillagersRemoved {
        /// Removed group.
        group: VillagerGroupId,
    },
    /// A resource point ran dry and was removed.
    ResourcePointDepleted {
        /// Depleted point.
        point: ResourcePointId,
    },
    /// A resource point changed kind (hunted animals become a carcass).
    ResourcePointConverted {
        /// Affected point.
        point: ResourcePointId,
        /// New kind.
        kind: ResourcePointKind,
    },
    /// A training batch joined a building's queue.
    TrainingQueued {
        /// Queuing building.
        building: BuildingId,
        /// Batch contents.
        order: TrainingOrder,
    },
    /// A training batch finished and entered the garrison.
    TrainingCompleted {
        /// Producing building.
        building: BuildingId,
        /// Batch contents.
        order: TrainingOrder,
    },
    /// A queued training batch was called off and refunded.
    TrainingCancelled {
        /// Queuing building.
        building: BuildingId,
        /// Batch contents.
        order: TrainingOrder,
    },
    /// Academy research began.
    ResearchStarted {
        /// Researching player.
        player: PlayerId,
        /// Unit type under research.
        unit: UnitType,
    },
    /// Academy research finished; the upgrade is permanent.
    ResearchCompleted {
        /// Researching player.
        player: PlayerId,
        /// Upgraded unit type.
        unit: UnitType,
        /// New upgrade level.
        level: u8,
    },
    /// An engagement began.
    EngagementStarted {
        /// New engagement.
        engagement: EngagementId,
        /// Attacking army.
        attacker: ArmyId,
        /// What is being attacked.
        target: AttackTarget,
    },
    /// One exchange of an engagement resolved.
    EngagementResolved {
        /// Affected engagement.
        engagement: EngagementId,
        /// Units the attacker lost this exchange.
        attacker_casualties: u32,
        /// Units (or health, for buildings) the defender lost.
        defender_casualties: u32,
    },
    /// An engagement ended.
    EngagementEnded {
        /// Ended engagement.
        engagement: EngagementId,
        /// Winning player, if either side was wiped out.
        victor: Option<PlayerId>,
    },
    /// A commander gained a level.
    CommanderLeveled {
        /// Promoted commander.
        commander: CommanderId,
        /// New level.
        level: u8,
    },
    /// A player declared a new standing toward another player.
    DiplomacyChanged {
        /// Declaring player.
        player: PlayerId,
        /// Subject of the declaration.
        other: PlayerId,
        /// New standing.
        standing: Diplomacy,
    },
}

/// A batch of changes produced by one command or one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeBatch {
    /// Tick the changes occurred on.
    pub tick: u64,
    /// Command that produced the batch, if any; `None` for tick-driven
    /// changes (movement arrivals, completions, combat).
    pub source: Option<CommandId>,
    /// Changes in the order they were applied.
    pub changes: Vec<StateChange>,
}

/// Accumulates changes during command execution or a tick.
#[derive(Debug, Default)]
pub struct ChangeBuilder {
    changes: Vec<StateChange>,
}

impl ChangeBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change.
    pub fn record(&mut self, change: StateChange) {
        self.changes.push(change);
    }

    /// Number of recorded changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Finalize into a batch.
    #[must_use]
    pub fn into_batch(self, tick: u64, source: Option<CommandId>) -> StateChangeBatch {
        StateChangeBatch {
            tick,
            source,
            changes: self.changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let mut builder = ChangeBuilder::new();
        builder.record(StateChange::ResourcesSpent {
            player: PlayerId(1),
            cost: Cost::new(0, 50, 0, 0),
        });
        builder.record(StateChange::BuildingPlaced {
            building: BuildingId(1),
            kind: BuildingKind::House,
            owner: PlayerId(1),
            anchor: HexCoord::ORIGIN,
        });
        let batch = builder.into_batch(42, Some(CommandId(7)));
        assert_eq!(batch.tick, 42);
        assert_eq!(batch.source, Some(CommandId(7)));
        assert_eq!(batch.changes.len(), 2);
        assert!(matches!(
            batch.changes[0],
            StateChange::ResourcesSpent { .. }
        ));
    }

    #[test]
    fn test_change_serialization_is_tagged() {
        let change = StateChange::ArmyMoved {
            army: ArmyId(3),
            from: HexCoord::ORIGIN,
            to: HexCoord::new(1, 0),
        };
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("\"type\":\"ArmyMoved\""));
        let back: StateChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, change);
    }
}
