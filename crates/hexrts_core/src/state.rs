//! The authoritative game state: registries, map, and tick counter.
//!
//! All entity creation and removal goes through the `add_*` /
//! `remove_*` transactions here, which keep three things consistent at
//! once: the entity registry, the map occupancy indices, and the
//! owner's id sets. A transaction that fails part-way rolls back, so
//! no caller can observe a half-registered entity.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::army::{Army, ArmyId};
use crate::building::{Building, BuildingId, BuildingKind};
use crate::commander::{Commander, CommanderId};
use crate::error::{GameError, Result};
use crate::hex::HexCoord;
use crate::map::MapModel;
use crate::math::Fixed;
use crate::player::{Diplomacy, Player, PlayerId};
use crate::registry::Registry;
use crate::resources::{ResourcePoint, ResourcePointId};
use crate::units::{roster_population, roster_size, roster_strength};
use crate::villager::{VillagerGroup, VillagerGroupId};

/// The complete simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    tick: u64,
    map: MapModel,
    players: Registry<PlayerId, Player>,
    buildings: Registry<BuildingId, Building>,
    armies: Registry<ArmyId, Army>,
    villagers: Registry<VillagerGroupId, VillagerGroup>,
    commanders: Registry<CommanderId, Commander>,
    resource_points: Registry<ResourcePointId, ResourcePoint>,
}

impl GameState {
    /// Create an empty state over the given map.
    #[must_use]
    pub fn new(map: MapModel) -> Self {
        Self {
            tick: 0,
            map,
            players: Registry::new(),
            buildings: Registry::new(),
            armies: Registry::new(),
            villagers: Registry::new(),
            commanders: Registry::new(),
            resource_points: Registry::new(),
        }
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance the tick counter by one.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// The map and its occupancy indices.
    #[must_use]
    pub const fn map(&self) -> &MapModel {
        &self.map
    }

    /// Mutable map access, for terrain edits and scenario setup.
    pub fn map_mut(&mut self) -> &mut MapModel {
        &mut self.map
    }

    // ---- players ----

    /// Register a player.
    pub fn add_player(&mut self, player: Player) -> PlayerId {
        let id = self.players.insert(player);
        if let Some(p) = self.players.get_mut(id) {
            p.id = id;
        }
        id
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Mutable player access.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Player ids in ascending order.
    #[must_use]
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.sorted_ids()
    }

    /// The standing the `owner` has declared toward `requester`.
    ///
    /// Passage through gated fortifications is the owner's call, so
    /// this looks up the owner's relation, not the requester's.
    #[must_use]
    pub fn standing_toward(&self, owner: PlayerId, requester: PlayerId) -> Diplomacy {
        if owner == requester {
            return Diplomacy::Own;
        }
        self.players
            .get(owner)
            .map_or(Diplomacy::Neutral, |p| p.diplomacy_with(requester))
    }

    // ---- buildings ----

    /// Register a building, indexing its footprint and crediting the
    /// owner. The building's `id` field is filled in.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if any footprint tile lies
    /// off the map or is already occupied by another building; the
    /// state is unchanged in that case.
    pub fn add_building(&mut self, building: Building) -> Result<BuildingId> {
        for &coord in &building.footprint {
            if !self.map.contains(coord) {
                return Err(GameError::CorruptState(format!(
                    "building footprint tile {coord} is off the map"
                )));
            }
        }
        let owner = building.owner;
        let footprint = building.footprint.clone();
        let id = self.buildings.insert(building);
        if let Err(err) = self.map.index_building(id, &footprint) {
            self.buildings.remove(id);
            return Err(err);
        }
        if let Some(b) = self.buildings.get_mut(id) {
            b.id = id;
        }
        if let Some(p) = self.players.get_mut(owner) {
            p.buildings.insert(id);
        }
        Ok(id)
    }

    /// Remove a building, returning it. Armies and villager groups
    /// homed there are reassigned to the owner's nearest surviving
    /// home building.
    ///
    /// # Errors
    /// Returns [`GameError::DanglingReference`] if the id is unknown.
    pub fn remove_building(&mut self, id: BuildingId) -> Result<Building> {
        let building = self
            .buildings
            .remove(id)
            .ok_or(GameError::DanglingReference {
                kind: "building",
                id: id.0,
            })?;
        self.map.unindex_building(id, &building.footprint);
        if let Some(p) = self.players.get_mut(building.owner) {
            p.buildings.remove(&id);
        }
        self.reassign_homes(id, building.owner, building.anchor);
        Ok(building)
    }

    /// Look up a building.
    #[must_use]
    pub fn building(&self, id: BuildingId) -> Option<&Building> {
        self.buildings.get(id)
    }

    /// Mutable building access.
    pub fn building_mut(&mut self, id: BuildingId) -> Option<&mut Building> {
        self.buildings.get_mut(id)
    }

    /// Building ids in ascending order.
    #[must_use]
    pub fn building_ids(&self) -> Vec<BuildingId> {
        self.buildings.sorted_ids()
    }

    /// Number of armies using `building` as home base.
    #[must_use]
    pub fn armies_homed_at(&self, building: BuildingId) -> u32 {
        let mut count = 0;
        for (_, army) in self.armies.iter() {
            if army.home_base == building {
                count += 1;
            }
        }
        count
    }

    /// Whether `building` can take one more homed army.
    #[must_use]
    pub fn has_home_capacity(&self, building: BuildingId) -> bool {
        self.buildings.get(building).is_some_and(|b| {
            b.is_completed()
                && b.kind
                    .home_capacity()
                    .is_some_and(|cap| self.armies_homed_at(building) < cap)
        })
    }

    /// Re-home armies and villager groups after their base is lost.
    /// Garrison buildings with free capacity outrank city centers,
    /// even nearer ones; within a rank the closest wins.
    fn reassign_homes(&mut self, lost: BuildingId, owner: PlayerId, anchor: HexCoord) {
        let mut candidates: Vec<(u8, u32, BuildingId)> = self
            .buildings
            .sorted_ids()
            .into_iter()
            .filter_map(|id| {
                let b = self.buildings.get(id)?;
                if b.owner == owner && b.is_completed() && b.kind.home_capacity().is_some() {
                    let rank = match b.kind {
                        BuildingKind::Fort | BuildingKind::Castle => 0,
                        _ => 1,
                    };
                    Some((rank, anchor.distance(b.anchor), id))
                } else {
                    None
                }
            })
            .collect();
        candidates.sort_unstable();

        for army_id in self.armies.sorted_ids() {
            let needs_rehome = self
                .armies
                .get(army_id)
                .is_some_and(|a| a.owner == owner && a.home_base == lost);
            if !needs_rehome {
                continue;
            }
            let new_home = candidates
                .iter()
                .map(|&(_, _, id)| id)
                .find(|&id| self.has_home_capacity(id));
            if let (Some(home), Some(army)) = (new_home, self.armies.get_mut(army_id)) {
                army.home_base = home;
            }
        }

        if let Some(&(_, _, fallback)) = candidates.first() {
            for group_id in self.villagers.sorted_ids() {
                if let Some(group) = self.villagers.get_mut(group_id) {
                    if group.owner == owner && group.home_base == lost {
                        group.home_base = fallback;
                    }
                }
            }
        }
    }

    // ---- armies ----

    /// Register an army, indexing its position and linking its
    /// commander.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if the tile's army stack is
    /// full; the state is unchanged in that case.
    pub fn add_army(&mut self, army: Army) -> Result<ArmyId> {
        let owner = army.owner;
        let coord = army.coord;
        let commander = army.commander;
        let id = self.armies.insert(army);
        if let Err(err) = self.map.index_army(id, coord) {
            self.armies.remove(id);
            return Err(err);
        }
        if let Some(a) = self.armies.get_mut(id) {
            a.id = id;
        }
        if let Some(p) = self.players.get_mut(owner) {
            p.armies.insert(id);
        }
        if let Some(c) = commander.and_then(|c| self.commanders.get_mut(c)) {
            c.army = Some(id);
        }
        Ok(id)
    }

    /// Remove an army, returning it. Its commander (if any) becomes
    /// available again; reinforcement columns en route are lost.
    ///
    /// # Errors
    /// Returns [`GameError::DanglingReference`] if the id is unknown.
    pub fn remove_army(&mut self, id: ArmyId) -> Result<Army> {
        let army = self.armies.remove(id).ok_or(GameError::DanglingReference {
            kind: "army",
            id: id.0,
        })?;
        self.map.unindex_army(id, army.coord);
        if let Some(p) = self.players.get_mut(army.owner) {
            p.armies.remove(&id);
        }
        if let Some(c) = army.commander.and_then(|c| self.commanders.get_mut(c)) {
            c.army = None;
        }
        Ok(army)
    }

    /// Look up an army.
    #[must_use]
    pub fn army(&self, id: ArmyId) -> Option<&Army> {
        self.armies.get(id)
    }

    /// Mutable army access.
    pub fn army_mut(&mut self, id: ArmyId) -> Option<&mut Army> {
        self.armies.get_mut(id)
    }

    /// Army ids in ascending order.
    #[must_use]
    pub fn army_ids(&self) -> Vec<ArmyId> {
        self.armies.sorted_ids()
    }

    /// Step an army to a new coordinate, keeping the index in sync.
    ///
    /// # Errors
    /// Returns [`GameError::DanglingReference`] for an unknown army and
    /// [`GameError::CorruptState`] if the destination stack is full.
    pub fn move_army_to(&mut self, id: ArmyId, to: HexCoord) -> Result<HexCoord> {
        let from = self
            .armies
            .get(id)
            .map(|a| a.coord)
            .ok_or(GameError::DanglingReference {
                kind: "army",
                id: id.0,
            })?;
        self.map.move_army(id, from, to)?;
        if let Some(a) = self.armies.get_mut(id) {
            a.coord = to;
        }
        Ok(from)
    }

    // ---- villager groups ----

    /// Register a villager group.
    pub fn add_villagers(&mut self, group: VillagerGroup) -> VillagerGroupId {
        let owner = group.owner;
        let coord = group.coord;
        let id = self.villagers.insert(group);
        self.map.index_villagers(id, coord);
        if let Some(g) = self.villagers.get_mut(id) {
            g.id = id;
        }
        if let Some(p) = self.players.get_mut(owner) {
            p.villager_groups.insert(id);
        }
        id
    }

    /// Remove a villager group, returning it.
    ///
    /// # Errors
    /// Returns [`GameError::DanglingReference`] if the id is unknown.
    pub fn remove_villagers(&mut self, id: VillagerGroupId) -> Result<VillagerGroup> {
        let group = self
            .villagers
            .remove(id)
            .ok_or(GameError::DanglingReference {
                kind: "villager group",
                id: id.0,
            })?;
        self.map.unindex_villagers(id, group.coord);
        if let Some(p) = self.players.get_mut(group.owner) {
            p.villager_groups.remove(&id);
        }
        for point_id in self.resource_points.sorted_ids() {
            if let Some(point) = self.resource_points.get_mut(point_id) {
                point.gatherers.remove(&id);
            }
        }
        Ok(group)
    }

    /// Look up a villager group.
    #[must_use]
    pub fn villagers(&self, id: VillagerGroupId) -> Option<&VillagerGroup> {
        self.villagers.get(id)
    }

    /// Mutable villager group access.
    pub fn villagers_mut(&mut self, id: VillagerGroupId) -> Option<&mut VillagerGroup> {
        self.villagers.get_mut(id)
    }

    /// Villager group ids in ascending order.
    #[must_use]
    pub fn villager_ids(&self) -> Vec<VillagerGroupId> {
        self.villagers.sorted_ids()
    }

    /// Step a villager group to a new coordinate.
    ///
    /// # Errors
    /// Returns [`GameError::DanglingReference`] if the id is unknown.
    pub fn move_villagers_to(&mut self, id: VillagerGroupId, to: HexCoord) -> Result<HexCoord> {
        let from = self
            .villagers
            .get(id)
            .map(|g| g.coord)
            .ok_or(GameError::DanglingReference {
                kind: "villager group",
                id: id.0,
            })?;
        self.map.move_villagers(id, from, to);
        if let Some(g) = self.villagers.get_mut(id) {
            g.coord = to;
        }
        Ok(from)
    }

    // ---- commanders ----

    /// Register a commander.
    pub fn add_commander(&mut self, commander: Commander) -> CommanderId {
        let owner = commander.owner;
        let id = self.commanders.insert(commander);
        if let Some(c) = self.commanders.get_mut(id) {
            c.id = id;
        }
        if let Some(p) = self.players.get_mut(owner) {
            p.commanders.insert(id);
        }
        id
    }

    /// Look up a commander.
    #[must_use]
    pub fn commander(&self, id: CommanderId) -> Option<&Commander> {
        self.commanders.get(id)
    }

    /// Mutable commander access.
    pub fn commander_mut(&mut self, id: CommanderId) -> Option<&mut Commander> {
        self.commanders.get_mut(id)
    }

    /// Commander ids in ascending order.
    #[must_use]
    pub fn commander_ids(&self) -> Vec<CommanderId> {
        self.commanders.sorted_ids()
    }

    // ---- resource points ----

    /// Register a resource point.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if the tile already holds a
    /// resource point; the state is unchanged in that case.
    pub fn add_resource_point(&mut self, point: ResourcePoint) -> Result<ResourcePointId> {
        let coord = point.coord;
        let id = self.resource_points.insert(point);
        if let Err(err) = self.map.index_resource(id, coord) {
            self.resource_points.remove(id);
            return Err(err);
        }
        if let Some(p) = self.resource_points.get_mut(id) {
            p.id = id;
        }
        Ok(id)
    }

    /// Remove a resource point, returning it.
    ///
    /// # Errors
    /// Returns [`GameError::DanglingReference`] if the id is unknown.
    pub fn remove_resource_point(&mut self, id: ResourcePointId) -> Result<ResourcePoint> {
        let point = self
            .resource_points
            .remove(id)
            .ok_or(GameError::DanglingReference {
                kind: "resource point",
                id: id.0,
            })?;
        self.map.unindex_resource(id, point.coord);
        Ok(point)
    }

    /// Look up a resource point.
    #[must_use]
    pub fn resource_point(&self, id: ResourcePointId) -> Option<&ResourcePoint> {
        self.resource_points.get(id)
    }

    /// Mutable resource point access.
    pub fn resource_point_mut(&mut self, id: ResourcePointId) -> Option<&mut ResourcePoint> {
        self.resource_points.get_mut(id)
    }

    /// Resource point ids in ascending order.
    #[must_use]
    pub fn resource_point_ids(&self) -> Vec<ResourcePointId> {
        self.resource_points.sorted_ids()
    }

    // ---- derived queries ----

    /// Current population of a player: fielded units, garrisoned
    /// units, and villagers.
    #[must_use]
    pub fn population(&self, player: PlayerId) -> u32 {
        let Some(p) = self.players.get(player) else {
            return 0;
        };
        let mut total = 0;
        for &army_id in &p.armies {
            if let Some(army) = self.armies.get(army_id) {
                total += roster_population(&army.roster);
                for column in &army.reinforcements {
                    total += roster_population(&column.roster);
                }
            }
        }
        for &building_id in &p.buildings {
            if let Some(b) = self.buildings.get(building_id) {
                total += roster_population(&b.garrison) + b.villager_garrison;
            }
        }
        for &group_id in &p.villager_groups {
            if let Some(g) = self.villagers.get(group_id) {
                total += g.size;
            }
        }
        total
    }

    /// Combined strength (hit-point mass) a player can field: armies,
    /// their inbound reinforcement columns, and building garrisons.
    #[must_use]
    pub fn player_strength(&self, player: PlayerId) -> u32 {
        let Some(p) = self.players.get(player) else {
            return 0;
        };
        let mut total = 0;
        for &army_id in &p.armies {
            if let Some(army) = self.armies.get(army_id) {
                total += roster_strength(&army.roster);
                for column in &army.reinforcements {
                    total += roster_strength(&column.roster);
                }
            }
        }
        for &building_id in &p.buildings {
            if let Some(b) = self.buildings.get(building_id) {
                total += roster_strength(&b.garrison);
            }
        }
        total
    }

    /// Aggregate strength of enemy armies within `radius` tiles of
    /// `coord`, seen from `player`'s side. An army counts only when
    /// either party has declared the other an enemy; neutral standings
    /// contribute nothing. Consumed by outer AI and presentation
    /// layers; the simulation never reads it.
    #[must_use]
    pub fn threat_near(&self, coord: HexCoord, radius: u32, player: PlayerId) -> u32 {
        self.armies
            .iter()
            .filter(|(_, army)| {
                army.owner != player
                    && army.coord.distance(coord) <= radius
                    && (self.standing_toward(player, army.owner) == Diplomacy::Enemy
                        || self.standing_toward(army.owner, player) == Diplomacy::Enemy)
            })
            .map(|(_, army)| roster_strength(&army.roster))
            .sum()
    }

    /// Whether units can path through a tile, from the perspective of
    /// `player`.
    ///
    /// Water is never passable. A completed wall blocks everyone; a
    /// completed gate, fort, or castle admits only players the owner
    /// counts as own, ally, or guild.
    #[must_use]
    pub fn is_tile_passable(&self, coord: HexCoord, player: PlayerId) -> bool {
        let Some(tile) = self.map.tile(coord) else {
            return false;
        };
        if !tile.terrain.is_walkable() {
            return false;
        }
        let Some(building) = self.map.building_at(coord).and_then(|id| self.buildings.get(id))
        else {
            return true;
        };
        if !building.is_completed() {
            return true;
        }
        match building.kind.movement_block() {
            crate::building::MovementBlock::None => true,
            crate::building::MovementBlock::Always => false,
            crate::building::MovementBlock::DiplomacyGated => {
                self.standing_toward(building.owner, player).allows_passage()
            }
        }
    }

    /// Movement cost of entering a tile, with the road override.
    /// `None` for off-map or unwalkable terrain.
    #[must_use]
    pub fn tile_move_cost(&self, coord: HexCoord) -> Option<Fixed> {
        let tile = self.map.tile(coord)?;
        if !tile.terrain.is_walkable() {
            return None;
        }
        let on_road = self
            .map
            .building_at(coord)
            .and_then(|id| self.buildings.get(id))
            .is_some_and(|b| b.kind.is_road() && b.is_completed());
        if on_road {
            Some(Fixed::ONE)
        } else {
            Some(tile.terrain.movement_cost())
        }
    }

    /// Whether a tile can receive a newly spawned unit for `player`.
    #[must_use]
    pub fn is_spawn_free(&self, coord: HexCoord, player: PlayerId) -> bool {
        self.is_tile_passable(coord, player)
            && self.map.building_at(coord).is_none()
            && self.map.has_army_space(coord)
    }

    /// Hash the simulation-relevant state for desync detection.
    ///
    /// Two states that evolved through the same command and tick
    /// sequence produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);

        for id in self.players.sorted_ids() {
            if let Some(p) = self.players.get(id) {
                id.hash(&mut hasher);
                for kind in crate::resources::ResourceKind::ALL {
                    p.stockpile.amount(kind).hash(&mut hasher);
                }
                p.population_capacity.hash(&mut hasher);
            }
        }
        for id in self.buildings.sorted_ids() {
            if let Some(b) = self.buildings.get(id) {
                id.hash(&mut hasher);
                b.anchor.hash(&mut hasher);
                b.health.hash(&mut hasher);
                b.level.hash(&mut hasher);
                roster_size(&b.garrison).hash(&mut hasher);
            }
        }
        for id in self.armies.sorted_ids() {
            if let Some(a) = self.armies.get(id) {
                id.hash(&mut hasher);
                a.coord.hash(&mut hasher);
                a.progress.to_bits().hash(&mut hasher);
                for (unit, count) in &a.roster {
                    unit.hash(&mut hasher);
                    count.hash(&mut hasher);
                }
            }
        }
        for id in self.villagers.sorted_ids() {
            if let Some(g) = self.villagers.get(id) {
                id.hash(&mut hasher);
                g.coord.hash(&mut hasher);
                g.size.hash(&mut hasher);
            }
        }
        for id in self.commanders.sorted_ids() {
            if let Some(c) = self.commanders.get(id) {
                id.hash(&mut hasher);
                c.level.hash(&mut hasher);
                c.stamina.to_bits().hash(&mut hasher);
            }
        }
        for id in self.resource_points.sorted_ids() {
            if let Some(r) = self.resource_points.get(id) {
                id.hash(&mut hasher);
                r.remaining.hash(&mut hasher);
            }
        }

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::{Building, BuildingKind, BuildingState};
    use crate::units::{UnitRoster, UnitType};

    fn base_state() -> (GameState, PlayerId) {
        let mut state = GameState::new(MapModel::hexagonal(5));
        let player = state.add_player(Player::new("Rhea"));
        (state, player)
    }

    fn completed(kind: BuildingKind, owner: PlayerId, anchor: HexCoord) -> Building {
        let mut b = Building::new(kind, owner, anchor);
        b.state = BuildingState::Completed;
        b
    }

    fn spear_army(owner: PlayerId, coord: HexCoord, home: BuildingId) -> Army {
        let mut roster = UnitRoster::new();
        roster.insert(UnitType::Spearman, 10);
        Army::new(owner, coord, roster, home)
    }

    #[test]
    fn test_add_building_indexes_footprint_and_owner() {
        let (mut state, player) = base_state();
        let id = state
            .add_building(completed(BuildingKind::Castle, player, HexCoord::ORIGIN))
            .unwrap();
        assert_eq!(state.building(id).unwrap().id, id);
        for coord in BuildingKind::Castle.footprint_at(HexCoord::ORIGIN) {
            assert_eq!(state.map().building_at(coord), Some(id));
        }
        assert!(state.player(player).unwrap().buildings.contains(&id));
    }

    #[test]
    fn test_add_building_rolls_back_on_overlap() {
        let (mut state, player) = base_state();
        state
            .add_building(completed(BuildingKind::House, player, HexCoord::ORIGIN))
            .unwrap();
        let before = state.building_ids().len();
        let err = state.add_building(completed(BuildingKind::House, player, HexCoord::ORIGIN));
        assert!(err.is_err());
        assert_eq!(state.building_ids().len(), before);
    }

    #[test]
    fn test_remove_building_rehomes_armies() {
        let (mut state, player) = base_state();
        let fort = state
            .add_building(completed(BuildingKind::Fort, player, HexCoord::new(2, 0)))
            .unwrap();
        let center = state
            .add_building(completed(
                BuildingKind::CityCenter,
                player,
                HexCoord::new(-2, 0),
            ))
            .unwrap();
        let army = state
            .add_army(spear_army(player, HexCoord::new(2, 1), fort))
            .unwrap();

        state.remove_building(fort).unwrap();
        assert_eq!(state.army(army).unwrap().home_base, center);
    }

    #[test]
    fn test_rehome_prefers_strongholds_over_nearer_centers() {
        let (mut state, player) = base_state();
        let lost = state
            .add_building(completed(BuildingKind::Fort, player, HexCoord::ORIGIN))
            .unwrap();
        let center = state
            .add_building(completed(
                BuildingKind::CityCenter,
                player,
                HexCoord::new(0, -3),
            ))
            .unwrap();
        let castle = state
            .add_building(completed(BuildingKind::Castle, player, HexCoord::new(4, 0)))
            .unwrap();
        let army = state
            .add_army(spear_army(player, HexCoord::new(1, 1), lost))
            .unwrap();

        state.remove_building(lost).unwrap();
        // The castle is a tile farther than the center but still wins.
        assert_ne!(center, castle);
        assert_eq!(state.army(army).unwrap().home_base, castle);
    }

    #[test]
    fn test_rehome_falls_back_to_center_when_strongholds_full() {
        let (mut state, player) = base_state();
        let lost = state
            .add_building(completed(BuildingKind::Fort, player, HexCoord::ORIGIN))
            .unwrap();
        let center = state
            .add_building(completed(
                BuildingKind::CityCenter,
                player,
                HexCoord::new(0, -3),
            ))
            .unwrap();
        let fort = state
            .add_building(completed(BuildingKind::Fort, player, HexCoord::new(2, 0)))
            .unwrap();
        state
            .add_army(spear_army(player, HexCoord::new(3, 0), fort))
            .unwrap();
        state
            .add_army(spear_army(player, HexCoord::new(3, -1), fort))
            .unwrap();
        let orphan = state
            .add_army(spear_army(player, HexCoord::new(1, 1), lost))
            .unwrap();

        assert!(!state.has_home_capacity(fort));
        state.remove_building(lost).unwrap();
        assert_eq!(state.army(orphan).unwrap().home_base, center);
    }

    #[test]
    fn test_remove_army_frees_commander() {
        let (mut state, player) = base_state();
        let base = state
            .add_building(completed(BuildingKind::CityCenter, player, HexCoord::ORIGIN))
            .unwrap();
        let commander = state.add_commander(crate::commander::Commander::new(
            player,
            "Aldric",
            crate::commander::Specialty::Offense,
        ));
        let mut army = spear_army(player, HexCoord::new(2, 0), base);
        army.commander = Some(commander);
        let army_id = state.add_army(army).unwrap();
        assert_eq!(state.commander(commander).unwrap().army, Some(army_id));

        state.remove_army(army_id).unwrap();
        assert_eq!(state.commander(commander).unwrap().army, None);
    }

    #[test]
    fn test_population_counts_field_garrison_and_villagers() {
        let (mut state, player) = base_state();
        let base = state
            .add_building(completed(BuildingKind::CityCenter, player, HexCoord::ORIGIN))
            .unwrap();
        state
            .add_army(spear_army(player, HexCoord::new(2, 0), base))
            .unwrap();
        if let Some(b) = state.building_mut(base) {
            b.villager_garrison = 4;
        }
        state.add_villagers(VillagerGroup::new(player, HexCoord::new(0, 2), 6, base));
        // 10 spearmen (pop 1 each) + 4 garrisoned + 6 fielded villagers
        assert_eq!(state.population(player), 20);
    }

    #[test]
    fn test_state_hash_changes_with_state() {
        let (mut state, player) = base_state();
        let before = state.state_hash();
        state
            .add_building(completed(BuildingKind::House, player, HexCoord::ORIGIN))
            .unwrap();
        assert_ne!(state.state_hash(), before);

        let clone = state.clone();
        assert_eq!(state.state_hash(), clone.state_hash());
    }

    #[test]
    fn test_threat_near_counts_hostile_armies_in_range() {
        let (mut state, player) = base_state();
        let rival = state.add_player(Player::new("Korr"));
        let base = state
            .add_building(completed(BuildingKind::CityCenter, player, HexCoord::ORIGIN))
            .unwrap();
        let rival_base = state
            .add_building(completed(BuildingKind::CityCenter, rival, HexCoord::new(4, 0)))
            .unwrap();
        state
            .add_army(spear_army(rival, HexCoord::new(2, 0), rival_base))
            .unwrap();
        state
            .add_army(spear_army(player, HexCoord::new(0, 1), base))
            .unwrap();

        // Neutral standings: nothing counts as a threat
        assert_eq!(state.threat_near(HexCoord::ORIGIN, 3, player), 0);

        if let Some(p) = state.player_mut(player) {
            p.set_diplomacy(rival, Diplomacy::Enemy);
        }
        // 10 spearmen worth of hit-point mass, own army excluded
        let expected = UnitType::Spearman.stats().hit_points * 10;
        assert_eq!(state.threat_near(HexCoord::ORIGIN, 3, player), expected);
        // Out of range
        assert_eq!(state.threat_near(HexCoord::new(-4, 0), 3, player), 0);
    }

    #[test]
    fn test_player_strength_sums_field_and_garrison() {
        let (mut state, player) = base_state();
        let base = state
            .add_building(completed(BuildingKind::CityCenter, player, HexCoord::ORIGIN))
            .unwrap();
        state
            .add_army(spear_army(player, HexCoord::new(2, 0), base))
            .unwrap();
        if let Some(b) = state.building_mut(base) {
            b.garrison.insert(UnitType::Archer, 3);
        }
        let field = UnitType::Spearman.stats().hit_points * 10;
        let garrisoned = UnitType::Archer.stats().hit_points * 3;
        assert_eq!(state.player_strength(player), field + garrisoned);
    }

    #[test]
    fn test_road_overrides_terrain_cost() {
        let (mut state, player) = base_state();
        let coord = HexCoord::new(1, 0);
        state
            .map_mut()
            .set_terrain(coord, crate::map::Terrain::Mountain)
            .unwrap();
        assert_eq!(state.tile_move_cost(coord), Some(Fixed::from_num(3)));
        state
            .add_building(completed(BuildingKind::Road, player, coord))
            .unwrap();
        assert_eq!(state.tile_move_cost(coord), Some(Fixed::ONE));
    }
}
