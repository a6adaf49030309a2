//! Villager groups: the mobile labor force.
//!
//! Villagers move and work as groups rather than individuals. A group
//! has one task at a time; orders that require travel first path the
//! group to the work site and carry the work order along, so arrival
//! transitions straight into working without a second command.

use serde::{Deserialize, Serialize};

use crate::building::BuildingId;
use crate::hex::HexCoord;
use crate::math::{fixed_serde, Fixed};
use crate::player::PlayerId;
use crate::registry::define_id;
use crate::resources::ResourcePointId;

define_id!(
    /// Unique identifier for villager groups.
    VillagerGroupId
);

/// Villager movement speed in tiles per tick.
#[must_use]
pub fn villager_speed() -> Fixed {
    crate::math::percent(25)
}

/// Ticks to train one villager.
pub const VILLAGER_TRAIN_TIME: u64 = 200;

/// Cost of training one villager.
#[must_use]
pub fn villager_cost() -> crate::resources::Cost {
    crate::resources::Cost::new(40, 0, 0, 0)
}

/// A unit of work a villager group can perform at a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VillagerWork {
    /// Extract resources from a resource point.
    Gather(ResourcePointId),
    /// Whittle down a huntable animal group.
    Hunt(ResourcePointId),
    /// Advance a building's construction.
    Build(BuildingId),
    /// Advance a building's upgrade.
    Upgrade(BuildingId),
    /// Advance a building's demolition.
    Demolish(BuildingId),
}

impl VillagerWork {
    /// The building this work targets, if any.
    #[must_use]
    pub const fn building(self) -> Option<BuildingId> {
        match self {
            Self::Build(id) | Self::Upgrade(id) | Self::Demolish(id) => Some(id),
            Self::Gather(_) | Self::Hunt(_) => None,
        }
    }

    /// The resource point this work targets, if any.
    #[must_use]
    pub const fn resource_point(self) -> Option<ResourcePointId> {
        match self {
            Self::Gather(id) | Self::Hunt(id) => Some(id),
            Self::Build(_) | Self::Upgrade(_) | Self::Demolish(_) => None,
        }
    }
}

/// What a villager group is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VillagerTask {
    /// Standing by.
    Idle,
    /// Traveling, optionally with work to start on arrival.
    Moving {
        /// Work order to attempt once the destination is reached.
        then: Option<VillagerWork>,
    },
    /// Performing work at the current coordinate.
    Working(VillagerWork),
}

/// A group of villagers sharing a position and task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillagerGroup {
    /// Unique id, assigned on registration.
    pub id: VillagerGroupId,
    /// Owning player.
    pub owner: PlayerId,
    /// Current coordinate.
    pub coord: HexCoord,
    /// Number of villagers in the group.
    pub size: u32,
    /// Current task.
    pub task: VillagerTask,
    /// Building the group returns to when recalled.
    pub home_base: BuildingId,
    /// Remaining movement path; empty when not traveling.
    pub path: Vec<HexCoord>,
    /// Index of the next tile in `path`.
    pub path_index: usize,
    /// Fractional progress toward the next tile.
    #[serde(with = "fixed_serde")]
    pub progress: Fixed,
}

impl VillagerGroup {
    /// Create an idle group awaiting registration.
    #[must_use]
    pub fn new(owner: PlayerId, coord: HexCoord, size: u32, home_base: BuildingId) -> Self {
        Self {
            id: VillagerGroupId(0),
            owner,
            coord,
            size,
            task: VillagerTask::Idle,
            home_base,
            path: Vec::new(),
            path_index: 0,
            progress: Fixed::ZERO,
        }
    }

    /// Start traveling along `path`, carrying an optional work order.
    pub fn set_path(&mut self, path: Vec<HexCoord>, then: Option<VillagerWork>) {
        self.path = path;
        self.path_index = 0;
        self.progress = Fixed::ZERO;
        self.task = if self.path.is_empty() {
            match then {
                Some(work) => VillagerTask::Working(work),
                None => VillagerTask::Idle,
            }
        } else {
            VillagerTask::Moving { then }
        };
    }

    /// The work order this group is performing, if any.
    #[must_use]
    pub const fn current_work(&self) -> Option<VillagerWork> {
        match self.task {
            VillagerTask::Working(work) => Some(work),
            VillagerTask::Idle | VillagerTask::Moving { .. } => None,
        }
    }

    /// Whether this group is working on the given building.
    #[must_use]
    pub fn is_working_on(&self, building: BuildingId) -> bool {
        self.current_work().and_then(VillagerWork::building) == Some(building)
    }

    /// Whether the group is mid-travel.
    #[must_use]
    pub const fn is_moving(&self) -> bool {
        matches!(self.task, VillagerTask::Moving { .. })
    }

    /// Drop the current task and any queued work, staying in place.
    pub fn stop(&mut self) {
        self.task = VillagerTask::Idle;
        self.path.clear();
        self.path_index = 0;
        self.progress = Fixed::ZERO;
    }

    /// Absorb another group into this one.
    pub fn absorb(&mut self, other_size: u32) {
        self.size += other_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> VillagerGroup {
        VillagerGroup::new(PlayerId(1), HexCoord::ORIGIN, 5, BuildingId(1))
    }

    #[test]
    fn test_empty_path_starts_work_immediately() {
        let mut g = group();
        let work = VillagerWork::Build(BuildingId(3));
        g.set_path(Vec::new(), Some(work));
        assert_eq!(g.task, VillagerTask::Working(work));
        assert!(g.is_working_on(BuildingId(3)));
    }

    #[test]
    fn test_path_carries_work_order() {
        let mut g = group();
        let work = VillagerWork::Gather(ResourcePointId(7));
        g.set_path(vec![HexCoord::new(1, 0)], Some(work));
        assert!(g.is_moving());
        assert_eq!(g.task, VillagerTask::Moving { then: Some(work) });
        assert_eq!(g.current_work(), None);
    }

    #[test]
    fn test_stop_clears_everything() {
        let mut g = group();
        g.set_path(vec![HexCoord::new(1, 0)], None);
        g.progress = crate::math::percent(50);
        g.stop();
        assert_eq!(g.task, VillagerTask::Idle);
        assert!(g.path.is_empty());
        assert_eq!(g.progress, Fixed::ZERO);
    }
}
