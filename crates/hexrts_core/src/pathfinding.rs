//! Hex-grid pathfinding using the A* algorithm.
//!
//! All costs use fixed-point math for deterministic results across
//! platforms. The open set is tie-broken on coordinate so identical
//! inputs always produce identical paths, even when several routes
//! share the same cost.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::hex::HexCoord;
use crate::math::Fixed;
use crate::player::PlayerId;
use crate::state::GameState;

/// Parameters for a pathfinding query.
///
/// Passability is evaluated from the perspective of `player`: the same
/// gate is open to the owner's allies and closed to their enemies.
#[derive(Debug, Clone)]
pub struct PathRequest {
    /// Starting coordinate.
    pub from: HexCoord,
    /// Destination coordinate.
    pub to: HexCoord,
    /// Player requesting the path.
    pub player: PlayerId,
    /// Allow the destination tile itself to be impassable (attacking a
    /// fortified building); intermediate tiles still must be passable.
    pub allow_impassable_destination: bool,
    /// Footprint tiles of the target building, all treated as valid
    /// terminals so any face of a multi-tile building is reachable.
    pub target_footprint: Vec<HexCoord>,
}

impl PathRequest {
    /// A plain movement query with no combat escape hatches.
    #[must_use]
    pub fn travel(from: HexCoord, to: HexCoord, player: PlayerId) -> Self {
        Self {
            from,
            to,
            player,
            allow_impassable_destination: false,
            target_footprint: Vec::new(),
        }
    }

    /// A query for attacking a building: the destination may be any
    /// footprint tile and may itself be impassable.
    #[must_use]
    pub fn assault(from: HexCoord, to: HexCoord, player: PlayerId, footprint: Vec<HexCoord>) -> Self {
        Self {
            from,
            to,
            player,
            allow_impassable_destination: true,
            target_footprint: footprint,
        }
    }

    fn is_terminal(&self, coord: HexCoord) -> bool {
        coord == self.to || self.target_footprint.contains(&coord)
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    coord: HexCoord,
    /// f_score = g_score + heuristic.
    f_score: Fixed,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so comparisons are reversed for
        // min-heap behavior: lower f_score = higher priority.
        match other.f_score.cmp(&self.f_score) {
            // Deterministic tie-breaking: prefer the lower coordinate
            Ordering::Equal => other.coord.cmp(&self.coord),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Hex distance heuristic. Admissible because every step costs at
/// least 1.
#[inline]
fn heuristic(from: HexCoord, to: HexCoord) -> Fixed {
    Fixed::from_num(from.distance(to))
}

/// Find a path from `request.from` to `request.to`.
///
/// Returns `None` if no route exists, and an empty sequence if the
/// endpoints coincide. The returned sequence excludes the starting
/// tile and ends on the destination (or on a footprint tile of the
/// target, whichever A* reaches first).
#[must_use]
pub fn find_path(state: &GameState, request: &PathRequest) -> Option<Vec<HexCoord>> {
    if request.from == request.to {
        return Some(Vec::new());
    }
    if !state.map().contains(request.from) || !state.map().contains(request.to) {
        return None;
    }

    let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: HashMap<HexCoord, HexCoord> = HashMap::new();
    let mut g_score: HashMap<HexCoord, Fixed> = HashMap::new();

    g_score.insert(request.from, Fixed::ZERO);
    open_set.push(AStarNode {
        coord: request.from,
        f_score: heuristic(request.from, request.to),
    });

    while let Some(current) = open_set.pop() {
        if request.is_terminal(current.coord) {
            return Some(reconstruct_path(&came_from, current.coord));
        }

        let current_g = g_score.get(&current.coord).copied().unwrap_or(Fixed::MAX);

        for neighbor in current.coord.neighbors() {
            if !state.map().contains(neighbor) {
                continue;
            }

            let terminal = request.is_terminal(neighbor);
            let passable = state.is_tile_passable(neighbor, request.player)
                || (terminal && (request.allow_impassable_destination
                    || request.target_footprint.contains(&neighbor)));
            if !passable {
                continue;
            }

            // Roads negate terrain cost; blocked terminals count as 1.
            let step_cost = state.tile_move_cost(neighbor).unwrap_or(Fixed::ONE);
            let tentative_g = current_g + step_cost;
            let neighbor_g = g_score.get(&neighbor).copied().unwrap_or(Fixed::MAX);

            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.coord);
                g_score.insert(neighbor, tentative_g);
                open_set.push(AStarNode {
                    coord: neighbor,
                    f_score: tentative_g + heuristic(neighbor, request.to),
                });
            }
        }
    }

    None
}

/// Reconstruct the path from goal back to (but excluding) the start.
fn reconstruct_path(came_from: &HashMap<HexCoord, HexCoord>, goal: HexCoord) -> Vec<HexCoord> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    // Drop the starting tile
    path.pop();
    path.reverse();
    path
}

/// Find the nearest tile suitable for placing a unit near `target`.
///
/// Returns `target` itself if it is free; otherwise searches rings of
/// increasing distance up to `max_distance`, preferring the lowest
/// coordinate within a ring for reproducibility. A tile qualifies if
/// it is passable for `player`, hosts no building, and has army stack
/// space.
#[must_use]
pub fn find_nearest_walkable(
    state: &GameState,
    target: HexCoord,
    max_distance: u32,
    player: PlayerId,
) -> Option<HexCoord> {
    if state.is_spawn_free(target, player) {
        return Some(target);
    }
    for radius in 1..=max_distance {
        let candidate = target
            .ring(radius)
            .into_iter()
            .filter(|&c| state.is_spawn_free(c, player))
            .min();
        if candidate.is_some() {
            return candidate;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::{Building, BuildingKind, BuildingState};
    use crate::map::{MapModel, Terrain};
    use crate::player::{Diplomacy, Player};

    fn state_with_map(radius: u32) -> (GameState, PlayerId) {
        let mut state = GameState::new(MapModel::hexagonal(radius));
        let player = state.add_player(Player::new("Rhea"));
        (state, player)
    }

    fn place_completed(
        state: &mut GameState,
        kind: BuildingKind,
        owner: PlayerId,
        anchor: HexCoord,
    ) {
        let mut building = Building::new(kind, owner, anchor);
        building.state = BuildingState::Completed;
        state.add_building(building).unwrap();
    }

    #[test]
    fn test_trivial_and_adjacent_paths() {
        let (state, player) = state_with_map(3);
        let origin = HexCoord::ORIGIN;

        let same = find_path(&state, &PathRequest::travel(origin, origin, player));
        assert_eq!(same, Some(Vec::new()));

        let step = find_path(
            &state,
            &PathRequest::travel(origin, HexCoord::new(1, 0), player),
        );
        assert_eq!(step, Some(vec![HexCoord::new(1, 0)]));
    }

    #[test]
    fn test_path_excludes_start_and_ends_on_goal() {
        let (state, player) = state_with_map(4);
        let goal = HexCoord::new(3, 0);
        let path = find_path(
            &state,
            &PathRequest::travel(HexCoord::ORIGIN, goal, player),
        )
        .unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(*path.last().unwrap(), goal);
        assert!(!path.contains(&HexCoord::ORIGIN));
    }

    #[test]
    fn test_path_routes_around_water() {
        let (mut state, player) = state_with_map(3);
        // Water on the direct line
        state
            .map_mut()
            .set_terrain(HexCoord::new(1, 0), Terrain::Water)
            .unwrap();
        let path = find_path(
            &state,
            &PathRequest::travel(HexCoord::ORIGIN, HexCoord::new(2, 0), player),
        )
        .unwrap();
        assert!(!path.contains(&HexCoord::new(1, 0)));
        assert_eq!(*path.last().unwrap(), HexCoord::new(2, 0));
    }

    #[test]
    fn test_no_path_when_sealed_off() {
        let (mut state, player) = state_with_map(2);
        for neighbor in HexCoord::ORIGIN.neighbors() {
            state.map_mut().set_terrain(neighbor, Terrain::Water).unwrap();
        }
        let result = find_path(
            &state,
            &PathRequest::travel(HexCoord::ORIGIN, HexCoord::new(2, 0), player),
        );
        assert_eq!(result, None);
    }

    #[test]
    fn test_wall_blocks_everyone_including_owner() {
        let (mut state, player) = state_with_map(3);
        place_completed(&mut state, BuildingKind::Wall, player, HexCoord::new(1, 0));
        assert!(!state.is_tile_passable(HexCoord::new(1, 0), player));
    }

    #[test]
    fn test_gate_respects_diplomacy() {
        let (mut state, owner) = state_with_map(3);
        let friend = state.add_player(Player::new("Imre"));
        let stranger = state.add_player(Player::new("Vox"));
        if let Some(p) = state.player_mut(owner) {
            p.set_diplomacy(friend, Diplomacy::Ally);
        }
        place_completed(&mut state, BuildingKind::Gate, owner, HexCoord::new(1, 0));

        assert!(state.is_tile_passable(HexCoord::new(1, 0), owner));
        assert!(state.is_tile_passable(HexCoord::new(1, 0), friend));
        assert!(!state.is_tile_passable(HexCoord::new(1, 0), stranger));
    }

    #[test]
    fn test_assault_reaches_blocked_destination() {
        let (mut state, owner) = state_with_map(4);
        let enemy = state.add_player(Player::new("Vox"));
        let anchor = HexCoord::new(2, 0);
        place_completed(&mut state, BuildingKind::Wall, owner, anchor);

        let travel = find_path(
            &state,
            &PathRequest::travel(HexCoord::ORIGIN, anchor, enemy),
        );
        assert_eq!(travel, None);

        let assault = find_path(
            &state,
            &PathRequest::assault(HexCoord::ORIGIN, anchor, enemy, vec![anchor]),
        )
        .unwrap();
        assert_eq!(*assault.last().unwrap(), anchor);
    }

    #[test]
    fn test_assault_footprint_terminates_on_any_face() {
        let (mut state, owner) = state_with_map(5);
        let enemy = state.add_player(Player::new("Vox"));
        let anchor = HexCoord::new(3, 0);
        place_completed(&mut state, BuildingKind::Castle, owner, anchor);
        let footprint = BuildingKind::Castle.footprint_at(anchor);

        let path = find_path(
            &state,
            &PathRequest::assault(HexCoord::ORIGIN, anchor, enemy, footprint.clone()),
        )
        .unwrap();
        assert!(footprint.contains(path.last().unwrap()));
    }

    #[test]
    fn test_determinism() {
        let (mut state, player) = state_with_map(5);
        state
            .map_mut()
            .set_terrain(HexCoord::new(1, 0), Terrain::Hill)
            .unwrap();
        state
            .map_mut()
            .set_terrain(HexCoord::new(2, -1), Terrain::Water)
            .unwrap();

        let request = PathRequest::travel(HexCoord::new(-3, 0), HexCoord::new(4, 0), player);
        let first = find_path(&state, &request).unwrap();
        for _ in 0..5 {
            assert_eq!(find_path(&state, &request).unwrap(), first);
        }
    }

    #[test]
    fn test_nearest_walkable_prefers_target_then_rings() {
        let (mut state, player) = state_with_map(3);
        let target = HexCoord::ORIGIN;
        assert_eq!(
            find_nearest_walkable(&state, target, 2, player),
            Some(target)
        );

        place_completed(&mut state, BuildingKind::House, player, target);
        let found = find_nearest_walkable(&state, target, 2, player).unwrap();
        assert_eq!(found.distance(target), 1);
    }
}
