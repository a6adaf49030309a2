//! Buildings: kind catalog, lifecycle state machine, training queues.
//!
//! Per-kind numbers (cost, time, health, capacities) are data tables,
//! reproduced as given rather than derived. The lifecycle is
//! Planning -> Constructing -> Completed -> [Upgrading | Demolishing]
//! -> Destroyed; "damaged" is not a distinct state but any completed
//! building below full health.

use serde::{Deserialize, Serialize};

use crate::hex::HexCoord;
use crate::math::Fixed;
use crate::player::PlayerId;
use crate::registry::define_id;
use crate::resources::{Cost, ResourcePointKind};
use crate::units::{DamageTriple, UnitRoster, UnitType};

define_id!(
    /// Unique identifier for buildings.
    BuildingId
);

/// Maximum building upgrade level.
pub const MAX_BUILDING_LEVEL: u8 = 3;

/// How a completed building affects movement through its tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementBlock {
    /// Does not block movement (economic buildings, roads).
    None,
    /// Blocks everyone (walls).
    Always,
    /// Blocks unless the requesting player's diplomacy with the owner
    /// is own/ally/guild (gates, forts, castles).
    DiplomacyGated,
}

/// All constructible building kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildingKind {
    /// Main settlement hub: storage, villager training, unlimited army home.
    CityCenter,
    /// Raises population capacity.
    House,
    /// Works adjacent farmland.
    Farm,
    /// Wood camp, built atop a trees point.
    LumberCamp,
    /// Stone camp, built atop a stone point.
    Quarry,
    /// Ore camp, built atop an ore point.
    MiningCamp,
    /// Trains infantry and ranged units.
    Barracks,
    /// Trains cavalry.
    Stable,
    /// Builds rams and catapults.
    SiegeWorkshop,
    /// Researches per-unit-type upgrades.
    Academy,
    /// Impassable fortification segment.
    Wall,
    /// Wall passage for friendly players.
    Gate,
    /// Small defensive structure; protects nearby buildings.
    Fort,
    /// Large defensive structure; protects nearby buildings.
    Castle,
    /// Negates terrain movement cost on its tile.
    Road,
}

impl BuildingKind {
    /// Construction cost at level 1.
    #[must_use]
    pub const fn cost(self) -> Cost {
        match self {
            Self::CityCenter => Cost::new(0, 300, 200, 0),
            Self::House => Cost::new(0, 50, 0, 0),
            Self::Farm => Cost::new(0, 60, 0, 0),
            Self::LumberCamp | Self::MiningCamp | Self::Quarry => Cost::new(0, 100, 50, 0),
            Self::Barracks => Cost::new(0, 150, 50, 0),
            Self::Stable => Cost::new(0, 180, 60, 0),
            Self::SiegeWorkshop => Cost::new(0, 200, 100, 40),
            Self::Academy => Cost::new(0, 160, 120, 20),
            Self::Wall => Cost::new(0, 0, 30, 0),
            Self::Gate => Cost::new(0, 20, 40, 0),
            Self::Fort => Cost::new(0, 100, 250, 20),
            Self::Castle => Cost::new(0, 200, 600, 80),
            Self::Road => Cost::new(0, 0, 10, 0),
        }
    }

    /// Construction time in ticks.
    #[must_use]
    pub const fn build_time(self) -> u64 {
        match self {
            Self::CityCenter => 2400,
            Self::House => 300,
            Self::Farm => 400,
            Self::LumberCamp | Self::MiningCamp | Self::Quarry => 500,
            Self::Barracks => 900,
            Self::Stable => 1000,
            Self::SiegeWorkshop => 1200,
            Self::Academy => 1100,
            Self::Wall => 200,
            Self::Gate => 300,
            Self::Fort => 1600,
            Self::Castle => 3000,
            Self::Road => 100,
        }
    }

    /// Maximum health at level 1. Each level adds 50%.
    #[must_use]
    pub const fn max_health(self) -> u32 {
        match self {
            Self::CityCenter => 3000,
            Self::House => 400,
            Self::Farm => 350,
            Self::LumberCamp | Self::MiningCamp | Self::Quarry => 500,
            Self::Barracks => 1200,
            Self::Stable => 1200,
            Self::SiegeWorkshop => 1000,
            Self::Academy => 900,
            Self::Wall => 1500,
            Self::Gate => 1200,
            Self::Fort => 2500,
            Self::Castle => 4500,
            Self::Road => 100,
        }
    }

    /// How this kind affects movement through its tiles when completed.
    #[must_use]
    pub const fn movement_block(self) -> MovementBlock {
        match self {
            Self::Wall => MovementBlock::Always,
            Self::Gate | Self::Fort | Self::Castle => MovementBlock::DiplomacyGated,
            _ => MovementBlock::None,
        }
    }

    /// Footprint offsets from the anchor coordinate.
    ///
    /// Multi-tile kinds occupy the anchor plus its six neighbors.
    #[must_use]
    pub fn footprint_offsets(self) -> &'static [(i32, i32)] {
        const SINGLE: [(i32, i32); 1] = [(0, 0)];
        const LARGE: [(i32, i32); 7] = [
            (0, 0),
            (1, 0),
            (1, -1),
            (0, -1),
            (-1, 0),
            (-1, 1),
            (0, 1),
        ];
        match self {
            Self::CityCenter | Self::Castle => &LARGE,
            _ => &SINGLE,
        }
    }

    /// Resolve the full footprint for an anchor coordinate.
    #[must_use]
    pub fn footprint_at(self, anchor: HexCoord) -> Vec<HexCoord> {
        self.footprint_offsets()
            .iter()
            .map(|&(dq, dr)| HexCoord::new(anchor.q + dq, anchor.r + dr))
            .collect()
    }

    /// The resource point kind this building must sit atop, if any.
    ///
    /// Camps are the documented exception to the rule that a building
    /// and a resource point never share a coordinate.
    #[must_use]
    pub const fn required_resource(self) -> Option<ResourcePointKind> {
        match self {
            Self::LumberCamp => Some(ResourcePointKind::Trees),
            Self::Quarry => Some(ResourcePointKind::Stone),
            Self::MiningCamp => Some(ResourcePointKind::Ore),
            Self::Farm => Some(ResourcePointKind::Farmland),
            _ => None,
        }
    }

    /// Protection radius for defensive structures.
    ///
    /// Buildings within this range of a completed protector cannot be
    /// attacked until every protector is destroyed.
    #[must_use]
    pub const fn protection_range(self) -> Option<u32> {
        match self {
            Self::Castle => Some(3),
            Self::Fort => Some(2),
            _ => None,
        }
    }

    /// Unit garrison capacity (training output waits here).
    #[must_use]
    pub const fn garrison_capacity(self) -> u32 {
        match self {
            Self::CityCenter => 40,
            Self::Barracks | Self::Stable | Self::SiegeWorkshop => 20,
            Self::Fort => 30,
            Self::Castle => 60,
            _ => 0,
        }
    }

    /// Army home-base capacity; `None` means not a valid home.
    #[must_use]
    pub const fn home_capacity(self) -> Option<u32> {
        match self {
            Self::CityCenter => Some(u32::MAX),
            Self::Fort => Some(2),
            Self::Castle => Some(4),
            _ => None,
        }
    }

    /// Population capacity this kind grants when completed.
    #[must_use]
    pub const fn population_bonus(self) -> u32 {
        match self {
            Self::CityCenter => 10,
            Self::House => 5,
            _ => 0,
        }
    }

    /// Storage capacity this kind grants when completed.
    #[must_use]
    pub const fn storage_bonus(self) -> u32 {
        match self {
            Self::CityCenter => 1000,
            Self::LumberCamp | Self::MiningCamp | Self::Quarry | Self::Farm => 200,
            _ => 0,
        }
    }

    /// Damage this kind contributes when defending an engagement.
    #[must_use]
    pub const fn defense_attack(self) -> DamageTriple {
        match self {
            Self::Castle => DamageTriple::new(0, 30, 0),
            Self::Fort => DamageTriple::new(0, 18, 0),
            Self::CityCenter => DamageTriple::new(0, 8, 0),
            _ => DamageTriple::new(0, 0, 0),
        }
    }

    /// Armor components applied to damage aimed at this kind.
    #[must_use]
    pub const fn defense_armor(self) -> DamageTriple {
        match self {
            Self::Wall => DamageTriple::new(8, 12, 2),
            Self::Gate => DamageTriple::new(6, 10, 2),
            Self::Fort | Self::Castle => DamageTriple::new(10, 14, 3),
            _ => DamageTriple::new(2, 4, 0),
        }
    }

    /// Unit types this kind can train.
    #[must_use]
    pub fn trains(self) -> &'static [UnitType] {
        match self {
            Self::Barracks => &[
                UnitType::Spearman,
                UnitType::Swordsman,
                UnitType::Archer,
                UnitType::Crossbowman,
            ],
            Self::Stable => &[UnitType::LightCavalry, UnitType::Knight],
            Self::SiegeWorkshop => &[UnitType::Ram, UnitType::Catapult],
            _ => &[],
        }
    }

    /// Whether this kind trains villagers.
    #[must_use]
    pub const fn trains_villagers(self) -> bool {
        matches!(self, Self::CityCenter)
    }

    /// Whether this kind negates terrain movement cost on its tile.
    #[must_use]
    pub const fn is_road(self) -> bool {
        matches!(self, Self::Road)
    }
}

/// Building lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingState {
    /// Placed and paid for, waiting for builders.
    Planning,
    /// Under construction since the given tick.
    Constructing {
        /// Tick construction began.
        started: u64,
    },
    /// Operational.
    Completed,
    /// Upgrading to the next level since the given tick.
    Upgrading {
        /// Tick the upgrade began.
        started: u64,
    },
    /// Being torn down since the given tick.
    Demolishing {
        /// Tick demolition began.
        started: u64,
    },
    /// Gone; kept only transiently while removal propagates.
    Destroyed,
}

/// One entry in a building's training queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingEntry {
    /// What is being trained.
    pub order: TrainingOrder,
    /// Tick the entry reached the head of the queue (0 while queued).
    pub started: u64,
    /// Total ticks for the whole batch.
    pub duration: u64,
}

/// A training batch: military units or villagers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingOrder {
    /// A batch of one military unit type.
    Military {
        /// Unit type.
        unit: UnitType,
        /// Batch size.
        count: u32,
    },
    /// A batch of villagers.
    Villagers {
        /// Batch size.
        count: u32,
    },
}

impl TrainingEntry {
    /// Pure progress function: 0 before start, 1 at/after completion.
    #[must_use]
    pub fn progress(&self, now: u64) -> Fixed {
        crate::math::timed_progress(self.started, self.duration, now)
    }

    /// Check completion against the current tick.
    #[must_use]
    pub fn is_complete(&self, now: u64) -> bool {
        self.started > 0 && now >= self.started + self.duration
    }
}

/// A placed building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// Unique id, assigned on registration.
    pub id: BuildingId,
    /// Building kind.
    pub kind: BuildingKind,
    /// Owning player.
    pub owner: PlayerId,
    /// Anchor coordinate.
    pub anchor: HexCoord,
    /// Full occupied footprint, anchor first.
    pub footprint: Vec<HexCoord>,
    /// Lifecycle state.
    pub state: BuildingState,
    /// Upgrade level, 1-based.
    pub level: u8,
    /// Current health.
    pub health: u32,
    /// Garrisoned military units awaiting deployment.
    pub garrison: UnitRoster,
    /// Garrisoned villagers awaiting deployment.
    pub villager_garrison: u32,
    /// Ordered training queue; index 0 is in progress.
    pub training_queue: Vec<TrainingEntry>,
}

impl Building {
    /// Create a building in `Planning` state awaiting registration.
    #[must_use]
    pub fn new(kind: BuildingKind, owner: PlayerId, anchor: HexCoord) -> Self {
        Self {
            id: BuildingId(0),
            kind,
            owner,
            anchor,
            footprint: kind.footprint_at(anchor),
            state: BuildingState::Planning,
            level: 1,
            health: kind.max_health(),
            garrison: UnitRoster::new(),
            villager_garrison: 0,
            training_queue: Vec::new(),
        }
    }

    /// Maximum health at the current level (each level adds 50%).
    #[must_use]
    pub fn max_health(&self) -> u32 {
        let base = self.kind.max_health();
        base + base / 2 * u32::from(self.level - 1)
    }

    /// Whether the building is operational.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.state, BuildingState::Completed)
    }

    /// Completed but below full health.
    #[must_use]
    pub fn is_damaged(&self) -> bool {
        self.is_completed() && self.health < self.max_health()
    }

    /// Upgrade cost to the next level.
    #[must_use]
    pub fn upgrade_cost(&self) -> Cost {
        self.kind.cost().scaled(u32::from(self.level))
    }

    /// Upgrade duration to the next level, in ticks.
    #[must_use]
    pub fn upgrade_time(&self) -> u64 {
        self.kind.build_time() / 2 * u64::from(self.level)
    }

    /// Demolition duration in ticks.
    #[must_use]
    pub const fn demolition_time(&self) -> u64 {
        self.kind.build_time() / 4
    }

    /// Units currently garrisoned (military plus villagers).
    #[must_use]
    pub fn garrison_load(&self) -> u32 {
        crate::units::roster_size(&self.garrison) + self.villager_garrison
    }

    /// Apply damage; returns true if health reached zero.
    pub fn apply_damage(&mut self, amount: u32) -> bool {
        self.health = self.health.saturating_sub(amount);
        self.health == 0
    }

    /// Start the head-of-queue training entry if it is idle.
    pub fn start_next_training(&mut self, now: u64) {
        if let Some(entry) = self.training_queue.first_mut() {
            if entry.started == 0 {
                entry.started = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_multi_tile_kinds() {
        let anchor = HexCoord::new(4, -2);
        let castle = BuildingKind::Castle.footprint_at(anchor);
        assert_eq!(castle.len(), 7);
        assert_eq!(castle[0], anchor);
        for coord in &castle[1..] {
            assert!(coord.is_neighbor_of(anchor));
        }

        assert_eq!(BuildingKind::House.footprint_at(anchor), vec![anchor]);
    }

    #[test]
    fn test_movement_block_table() {
        assert_eq!(BuildingKind::Wall.movement_block(), MovementBlock::Always);
        assert_eq!(
            BuildingKind::Gate.movement_block(),
            MovementBlock::DiplomacyGated
        );
        assert_eq!(
            BuildingKind::Castle.movement_block(),
            MovementBlock::DiplomacyGated
        );
        assert_eq!(BuildingKind::Farm.movement_block(), MovementBlock::None);
    }

    #[test]
    fn test_camp_resource_requirements() {
        assert_eq!(
            BuildingKind::LumberCamp.required_resource(),
            Some(ResourcePointKind::Trees)
        );
        assert_eq!(BuildingKind::Barracks.required_resource(), None);
    }

    #[test]
    fn test_max_health_scales_with_level() {
        let mut b = Building::new(BuildingKind::Barracks, PlayerId(1), HexCoord::ORIGIN);
        assert_eq!(b.max_health(), 1200);
        b.level = 2;
        assert_eq!(b.max_health(), 1800);
    }

    #[test]
    fn test_apply_damage_saturates() {
        let mut b = Building::new(BuildingKind::House, PlayerId(1), HexCoord::ORIGIN);
        assert!(!b.apply_damage(100));
        assert!(b.apply_damage(10_000));
        assert_eq!(b.health, 0);
    }

    #[test]
    fn test_training_entry_progress() {
        let entry = TrainingEntry {
            order: TrainingOrder::Villagers { count: 3 },
            started: 100,
            duration: 200,
        };
        assert_eq!(entry.progress(100), Fixed::ZERO);
        assert_eq!(entry.progress(200), Fixed::from_num(0.5));
        assert!(entry.is_complete(300));
        assert!(!entry.is_complete(299));
    }
}
