//! Spatial map model: tiles, terrain, and occupancy indices.
//!
//! The map keeps coordinate-keyed indices alongside the entity
//! registries so spatial queries never scan every entity. The indices
//! are maintained exclusively by the state transactions in
//! [`crate::state`]; code elsewhere treats them as read-only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::army::ArmyId;
use crate::building::BuildingId;
use crate::error::{GameError, Result};
use crate::hex::HexCoord;
use crate::math::{percent, Fixed};
use crate::resources::ResourcePointId;
use crate::villager::VillagerGroupId;

/// Maximum number of armies allowed on one tile.
pub const ARMY_STACK_LIMIT: usize = 3;

/// Terrain kind of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Terrain {
    /// Open ground, baseline movement.
    Plains,
    /// Never walkable.
    Water,
    /// Walkable but slow; strongly favors defenders.
    Mountain,
    /// Open but harsh; slightly penalizes defenders.
    Desert,
    /// Elevated ground; favors defenders.
    Hill,
}

impl Terrain {
    /// Whether units can enter this terrain at all.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        !matches!(self, Self::Water)
    }

    /// Movement cost per tile. Roads override this to 1.
    #[must_use]
    pub fn movement_cost(self) -> Fixed {
        match self {
            Self::Plains | Self::Desert => Fixed::ONE,
            Self::Hill => Fixed::from_num(2),
            Self::Mountain => Fixed::from_num(3),
            Self::Water => Fixed::MAX,
        }
    }

    /// Combat bonus for a defender standing on this terrain.
    /// Negative values penalize the defender.
    #[must_use]
    pub fn defender_bonus(self) -> Fixed {
        match self {
            Self::Hill => percent(20),
            Self::Mountain => percent(30),
            Self::Desert => percent(-10),
            Self::Plains | Self::Water => Fixed::ZERO,
        }
    }

    /// Combat penalty for an attacker striking into this terrain.
    #[must_use]
    pub fn attacker_penalty(self) -> Fixed {
        match self {
            Self::Hill => percent(10),
            Self::Mountain => percent(20),
            Self::Plains | Self::Desert | Self::Water => Fixed::ZERO,
        }
    }
}

/// One hex of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Coordinate of the tile.
    pub coord: HexCoord,
    /// Terrain kind.
    pub terrain: Terrain,
    /// Elevation, informational only.
    pub elevation: i32,
}

/// The hex grid plus occupancy indices.
///
/// `buildings` maps every footprint tile (not just the anchor) to the
/// occupying building. Armies and villager groups may stack on a tile;
/// resource points never share a tile with each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapModel {
    tiles: HashMap<HexCoord, Tile>,
    buildings: HashMap<HexCoord, BuildingId>,
    armies: HashMap<HexCoord, Vec<ArmyId>>,
    villagers: HashMap<HexCoord, Vec<VillagerGroupId>>,
    resources: HashMap<HexCoord, ResourcePointId>,
}

impl MapModel {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hexagonal map of the given radius, all plains.
    #[must_use]
    pub fn hexagonal(radius: u32) -> Self {
        let mut map = Self::new();
        for coord in HexCoord::ORIGIN.spiral(radius) {
            map.insert_tile(Tile {
                coord,
                terrain: Terrain::Plains,
                elevation: 0,
            });
        }
        map
    }

    /// Insert or replace a tile.
    pub fn insert_tile(&mut self, tile: Tile) {
        self.tiles.insert(tile.coord, tile);
    }

    /// Override the terrain of an existing tile.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if the tile does not exist.
    pub fn set_terrain(&mut self, coord: HexCoord, terrain: Terrain) -> Result<()> {
        let tile = self
            .tiles
            .get_mut(&coord)
            .ok_or_else(|| GameError::CorruptState(format!("no tile at {coord}")))?;
        tile.terrain = terrain;
        Ok(())
    }

    /// Look up a tile.
    #[must_use]
    pub fn tile(&self, coord: HexCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    /// Whether a coordinate lies on the map.
    #[must_use]
    pub fn contains(&self, coord: HexCoord) -> bool {
        self.tiles.contains_key(&coord)
    }

    /// Number of tiles on the map.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// The building occupying a coordinate, if any.
    #[must_use]
    pub fn building_at(&self, coord: HexCoord) -> Option<BuildingId> {
        self.buildings.get(&coord).copied()
    }

    /// Armies on a coordinate, in arrival order.
    #[must_use]
    pub fn armies_at(&self, coord: HexCoord) -> &[ArmyId] {
        self.armies.get(&coord).map_or(&[], Vec::as_slice)
    }

    /// Villager groups on a coordinate, in arrival order.
    #[must_use]
    pub fn villagers_at(&self, coord: HexCoord) -> &[VillagerGroupId] {
        self.villagers.get(&coord).map_or(&[], Vec::as_slice)
    }

    /// The resource point on a coordinate, if any.
    #[must_use]
    pub fn resource_at(&self, coord: HexCoord) -> Option<ResourcePointId> {
        self.resources.get(&coord).copied()
    }

    /// Whether another army may step onto this coordinate.
    #[must_use]
    pub fn has_army_space(&self, coord: HexCoord) -> bool {
        self.armies_at(coord).len() < ARMY_STACK_LIMIT
    }

    /// Index a building footprint.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if any footprint tile is
    /// already occupied by another building.
    pub fn index_building(&mut self, id: BuildingId, footprint: &[HexCoord]) -> Result<()> {
        for &coord in footprint {
            if let Some(other) = self.buildings.get(&coord) {
                if *other != id {
                    return Err(GameError::CorruptState(format!(
                        "tile {coord} already indexed to building {other}"
                    )));
                }
            }
        }
        for &coord in footprint {
            self.buildings.insert(coord, id);
        }
        Ok(())
    }

    /// Remove a building footprint from the index.
    pub fn unindex_building(&mut self, id: BuildingId, footprint: &[HexCoord]) {
        for coord in footprint {
            if self.buildings.get(coord) == Some(&id) {
                self.buildings.remove(coord);
            }
        }
    }

    /// Add an army to a tile's stack.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if the stack is full.
    pub fn index_army(&mut self, id: ArmyId, coord: HexCoord) -> Result<()> {
        let stack = self.armies.entry(coord).or_default();
        if stack.len() >= ARMY_STACK_LIMIT {
            return Err(GameError::CorruptState(format!(
                "army stack overflow at {coord}"
            )));
        }
        stack.push(id);
        Ok(())
    }

    /// Remove an army from a tile's stack.
    pub fn unindex_army(&mut self, id: ArmyId, coord: HexCoord) {
        if let Some(stack) = self.armies.get_mut(&coord) {
            stack.retain(|a| *a != id);
            if stack.is_empty() {
                self.armies.remove(&coord);
            }
        }
    }

    /// Move an army between tiles, keeping the index consistent.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if the destination stack is
    /// full; the army stays indexed at `from` in that case.
    pub fn move_army(&mut self, id: ArmyId, from: HexCoord, to: HexCoord) -> Result<()> {
        if !self.has_army_space(to) {
            return Err(GameError::CorruptState(format!(
                "army stack overflow at {to}"
            )));
        }
        self.unindex_army(id, from);
        self.index_army(id, to)
    }

    /// Add a villager group to a tile.
    pub fn index_villagers(&mut self, id: VillagerGroupId, coord: HexCoord) {
        self.villagers.entry(coord).or_default().push(id);
    }

    /// Remove a villager group from a tile.
    pub fn unindex_villagers(&mut self, id: VillagerGroupId, coord: HexCoord) {
        if let Some(stack) = self.villagers.get_mut(&coord) {
            stack.retain(|v| *v != id);
            if stack.is_empty() {
                self.villagers.remove(&coord);
            }
        }
    }

    /// Move a villager group between tiles.
    pub fn move_villagers(&mut self, id: VillagerGroupId, from: HexCoord, to: HexCoord) {
        self.unindex_villagers(id, from);
        self.index_villagers(id, to);
    }

    /// Index a resource point.
    ///
    /// # Errors
    /// Returns [`GameError::CorruptState`] if the tile already holds a
    /// resource point.
    pub fn index_resource(&mut self, id: ResourcePointId, coord: HexCoord) -> Result<()> {
        if let Some(other) = self.resources.get(&coord) {
            if *other != id {
                return Err(GameError::CorruptState(format!(
                    "tile {coord} already holds resource point {other}"
                )));
            }
        }
        self.resources.insert(coord, id);
        Ok(())
    }

    /// Remove a resource point from the index.
    pub fn unindex_resource(&mut self, id: ResourcePointId, coord: HexCoord) {
        if self.resources.get(&coord) == Some(&id) {
            self.resources.remove(&coord);
        }
    }
}
