//! Property-based tests over pathfinding, combat bounds, and math.

use hexrts_core::combat::AttackTarget;
use hexrts_core::command::Command;
use hexrts_core::hex::HexCoord;
use hexrts_core::map::Terrain;
use hexrts_core::math::{timed_progress, Fixed};
use hexrts_core::pathfinding::{find_path, PathRequest};
use hexrts_core::resources::{Cost, ResourceKind, Stockpile};
use hexrts_core::units::UnitType;

use hexrts_test_utils::determinism::verify_determinism;
use hexrts_test_utils::fixtures::{field_army, two_player_scenario};
use hexrts_test_utils::proptest::prelude::*;

proptest! {
    /// A travel path must be a chain of adjacent, passable tiles that
    /// starts next to the origin and ends on the destination.
    #[test]
    fn prop_travel_paths_are_contiguous_and_passable(
        water in prop::collection::vec((-4i32..=4, -4i32..=4), 0..12),
        from_q in -4i32..=4,
        from_r in -4i32..=4,
        to_q in -4i32..=4,
        to_r in -4i32..=4,
    ) {
        let mut scenario = two_player_scenario(6);
        let state = scenario.sim.state_mut();
        for (q, r) in water {
            let coord = HexCoord::new(q, r);
            // Skip tiles the fixture bases sit on
            if state.map().building_at(coord).is_none() && state.map().contains(coord) {
                state.map_mut().set_terrain(coord, Terrain::Water).unwrap();
            }
        }
        let from = HexCoord::new(from_q, from_r);
        let to = HexCoord::new(to_q, to_r);
        let player = scenario.west;
        let state = scenario.sim.state();

        if let Some(path) = find_path(state, &PathRequest::travel(from, to, player)) {
            if from == to {
                prop_assert!(path.is_empty());
            } else {
                prop_assert_eq!(*path.last().unwrap(), to);
                let mut prev = from;
                for &step in &path {
                    prop_assert_eq!(prev.distance(step), 1);
                    prop_assert!(state.is_tile_passable(step, player));
                    prev = step;
                }
            }
        }
    }

    /// One combat exchange never costs a side more than the casualty
    /// cap allows, even for rosters so small that rounding spares them.
    #[test]
    fn prop_single_exchange_respects_casualty_cap(
        attackers in 1u32..40,
        defenders in 1u32..40,
    ) {
        let mut scenario = two_player_scenario(6);
        let (west, east) = (scenario.west, scenario.east);
        let sim = &mut scenario.sim;
        let a = field_army(sim, west, scenario.west_base, HexCoord::new(0, 0), UnitType::Swordsman, attackers);
        let d = field_army(sim, east, scenario.east_base, HexCoord::new(1, 0), UnitType::Swordsman, defenders);
        sim.submit(west, Command::Attack { army: a, target: AttackTarget::Army { army: d } });
        // First tick opens the engagement and resolves one exchange
        sim.tick();

        let cap = |n: u32| n * 3 / 10;
        let a_size = sim.state().army(a).map_or(0, |x| x.size());
        let d_size = sim.state().army(d).map_or(0, |x| x.size());
        prop_assert!(attackers - a_size <= cap(attackers));
        prop_assert!(defenders - d_size <= cap(defenders));
    }

    /// Any battle configuration must replay to the same hash.
    #[test]
    fn prop_random_battles_are_deterministic(
        attackers in 1u32..30,
        defenders in 1u32..30,
        attacker_unit in prop::sample::select(vec![
            UnitType::Spearman, UnitType::Swordsman, UnitType::Knight, UnitType::Archer,
        ]),
        defender_unit in prop::sample::select(vec![
            UnitType::Spearman, UnitType::Swordsman, UnitType::LightCavalry, UnitType::Crossbowman,
        ]),
    ) {
        let setup = move || {
            let mut scenario = two_player_scenario(6);
            let (west, east) = (scenario.west, scenario.east);
            let sim = &mut scenario.sim;
            let a = field_army(sim, west, scenario.west_base, HexCoord::new(-1, 0), attacker_unit, attackers);
            let d = field_army(sim, east, scenario.east_base, HexCoord::new(1, 0), defender_unit, defenders);
            sim.submit(west, Command::Attack { army: a, target: AttackTarget::Army { army: d } });
            scenario.sim
        };
        let result = verify_determinism(2, 80, setup, |s| { s.tick(); }, |s| s.state().state_hash());
        prop_assert!(result.is_deterministic);
    }

    /// After any amount of marching and fighting, the map occupancy
    /// index and the army registry must agree exactly.
    #[test]
    fn prop_occupancy_index_stays_consistent(
        attackers in 1u32..20,
        defenders in 1u32..20,
        dest_q in -4i32..=4,
        dest_r in -4i32..=4,
        ticks in 1u64..120,
    ) {
        let mut scenario = two_player_scenario(6);
        let (west, east) = (scenario.west, scenario.east);
        let sim = &mut scenario.sim;
        let a = field_army(sim, west, scenario.west_base, HexCoord::new(-2, 0), UnitType::Knight, attackers);
        let d = field_army(sim, east, scenario.east_base, HexCoord::new(2, 0), UnitType::Spearman, defenders);
        sim.submit(west, Command::MoveArmy { army: a, to: HexCoord::new(dest_q, dest_r) });
        sim.submit(east, Command::Attack { army: d, target: AttackTarget::Army { army: a } });
        for _ in 0..ticks {
            sim.tick();
        }

        let state = sim.state();
        for id in state.army_ids() {
            let coord = state.army(id).map(|a| a.coord);
            prop_assert!(coord.is_some_and(|c| state.map().armies_at(c).contains(&id)));
        }
        for id in state.villager_ids() {
            let coord = state.villagers(id).map(|g| g.coord);
            prop_assert!(coord.is_some_and(|c| state.map().villagers_at(c).contains(&id)));
        }
    }

    /// Clock progress stays in `[0, 1]` and hits the endpoints.
    #[test]
    fn prop_timed_progress_is_bounded(
        started in 0u64..1_000_000,
        duration in 0u64..1_000_000,
        now in 0u64..3_000_000,
    ) {
        let p = timed_progress(started, duration, now);
        prop_assert!(p >= Fixed::ZERO);
        prop_assert!(p <= Fixed::ONE);
        if started > 0 && now > started && now >= started + duration {
            prop_assert_eq!(p, Fixed::ONE);
        }
        if now <= started {
            prop_assert_eq!(p, Fixed::ZERO);
        }
    }

    /// A stockpile refuses a spend it cannot cover, and never goes
    /// negative on the spends it accepts.
    #[test]
    fn prop_stockpile_never_overdraws(
        deposits in prop::collection::vec(0u32..500, 4),
        spends in prop::collection::vec((0u32..400, 0u32..400, 0u32..400, 0u32..400), 0..8),
    ) {
        let mut stockpile = Stockpile::default();
        for (kind, amount) in ResourceKind::ALL.iter().zip(&deposits) {
            stockpile.deposit(*kind, *amount);
        }
        for (food, wood, stone, ore) in spends {
            let cost = Cost::new(food, wood, stone, ore);
            let could_afford = stockpile.can_afford(&cost);
            let spent = stockpile.spend(&cost);
            prop_assert_eq!(spent, could_afford);
        }
        for kind in ResourceKind::ALL {
            prop_assert!(stockpile.amount(kind) <= stockpile.capacity(kind));
        }
    }
}
