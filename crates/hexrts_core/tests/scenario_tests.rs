//! End-to-end scenarios driven through the command pipeline.
//!
//! These tests exercise whole gameplay loops: economy (camps on
//! resource points, gathering), warfare (protection, sieges, retreat,
//! reinforcement), and cross-cutting guarantees (determinism under a
//! command schedule, snapshot mid-battle).

use hexrts_core::building::BuildingKind;
use hexrts_core::combat::AttackTarget;
use hexrts_core::command::{Command, CommandRejection};
use hexrts_core::hex::HexCoord;
use hexrts_core::pipeline::CommandOutcome;
use hexrts_core::resources::{ResourceKind, ResourcePoint, ResourcePointKind};
use hexrts_core::snapshot::GameSnapshot;
use hexrts_core::units::UnitType;
use hexrts_core::villager::VillagerTask;

use hexrts_test_utils::determinism::verify_simulation_determinism;
use hexrts_test_utils::fixtures::{
    completed_building, field_army, field_villagers, two_player_scenario,
};

#[test]
fn test_lumber_camp_economy_loop() {
    let mut scenario = two_player_scenario(6);
    let player = scenario.west;
    let sim = &mut scenario.sim;

    let camp_site = HexCoord::new(-1, 0);
    let point = sim
        .state_mut()
        .add_resource_point(ResourcePoint::new(camp_site, ResourcePointKind::Trees, 300))
        .unwrap();
    let builders = field_villagers(sim, player, scenario.west_base, HexCoord::new(-2, 0), 4);

    let outcome = sim.submit(
        player,
        Command::Build {
            kind: BuildingKind::LumberCamp,
            anchor: camp_site,
        },
    );
    assert!(outcome.is_applied());
    let camp = sim.state().map().building_at(camp_site).unwrap();

    let outcome = sim.submit(
        player,
        Command::AssignBuilders {
            building: camp,
            group: builders,
        },
    );
    assert!(outcome.is_applied());

    // Walk in, start the clock, build out
    let deadline = BuildingKind::LumberCamp.build_time() + 50;
    for _ in 0..deadline {
        sim.tick();
        if sim.state().building(camp).is_some_and(|b| b.is_completed()) {
            break;
        }
    }
    assert!(sim.state().building(camp).unwrap().is_completed());

    let outcome = sim.submit(player, Command::Gather { group: builders, point });
    assert!(outcome.is_applied());
    let before = sim
        .state()
        .player(player)
        .unwrap()
        .stockpile
        .amount(ResourceKind::Wood);
    for _ in 0..20 {
        sim.tick();
    }
    let after = sim
        .state()
        .player(player)
        .unwrap()
        .stockpile
        .amount(ResourceKind::Wood);
    assert!(after > before, "gathering produced no wood");

    // Calling the crew off idles them and frees their slot at the point
    let outcome = sim.submit(player, Command::StopGathering { group: builders });
    assert!(outcome.is_applied());
    assert_eq!(
        sim.state().villagers(builders).unwrap().task,
        VillagerTask::Idle
    );
    assert!(!sim
        .state()
        .resource_point(point)
        .unwrap()
        .gatherers
        .contains(&builders));

    let parked = sim
        .state()
        .player(player)
        .unwrap()
        .stockpile
        .amount(ResourceKind::Wood);
    for _ in 0..10 {
        sim.tick();
    }
    let still = sim
        .state()
        .player(player)
        .unwrap()
        .stockpile
        .amount(ResourceKind::Wood);
    assert_eq!(still, parked, "idle crew kept producing wood");
}

#[test]
fn test_siege_must_break_protection_first() {
    let mut scenario = two_player_scenario(8);
    let (attacker, defender) = (scenario.west, scenario.east);
    let sim = &mut scenario.sim;

    let fort = completed_building(sim, BuildingKind::Fort, defender, HexCoord::new(4, 0));
    let house = completed_building(sim, BuildingKind::House, defender, HexCoord::new(5, -1));
    let siege = field_army(
        sim,
        attacker,
        scenario.west_base,
        HexCoord::new(1, 0),
        UnitType::Catapult,
        12,
    );

    // The house is under the fort's umbrella
    let outcome = sim.submit(
        attacker,
        Command::Attack {
            army: siege,
            target: AttackTarget::Building { building: house },
        },
    );
    assert!(matches!(
        outcome,
        CommandOutcome::Rejected(CommandRejection::ProtectedByDefenses { .. })
    ));

    // Breaking the fort is allowed
    let outcome = sim.submit(
        attacker,
        Command::Attack {
            army: siege,
            target: AttackTarget::Building { building: fort },
        },
    );
    assert!(outcome.is_applied());
    for _ in 0..3000 {
        sim.tick();
        if sim.state().building(fort).is_none() {
            break;
        }
    }
    assert!(sim.state().building(fort).is_none(), "fort never fell");
    assert!(sim.state().army(siege).is_some(), "siege army was lost");

    // With the fort gone the house is fair game
    let outcome = sim.submit(
        attacker,
        Command::Attack {
            army: siege,
            target: AttackTarget::Building { building: house },
        },
    );
    assert!(outcome.is_applied());
}

#[test]
fn test_retreat_disengages_and_garrisons() {
    let mut scenario = two_player_scenario(6);
    let (west, east) = (scenario.west, scenario.east);
    let sim = &mut scenario.sim;

    let raiders = field_army(
        sim,
        west,
        scenario.west_base,
        HexCoord::new(0, 0),
        UnitType::Knight,
        10,
    );
    let pikes = field_army(
        sim,
        east,
        scenario.east_base,
        HexCoord::new(1, 0),
        UnitType::Spearman,
        10,
    );

    sim.submit(
        west,
        Command::Attack {
            army: raiders,
            target: AttackTarget::Army { army: pikes },
        },
    );
    for _ in 0..5 {
        sim.tick();
    }
    assert!(sim.state().army(raiders).unwrap().in_combat());

    let outcome = sim.submit(west, Command::Retreat { army: raiders });
    assert!(outcome.is_applied());
    assert!(!sim.state().army(raiders).unwrap().in_combat());
    assert!(sim.state().army(raiders).unwrap().retreating);

    // March home and fold into the garrison
    for _ in 0..200 {
        sim.tick();
        if sim.state().army(raiders).is_none() {
            break;
        }
    }
    assert!(sim.state().army(raiders).is_none(), "army never reached home");
    let garrison = &sim.state().building(scenario.west_base).unwrap().garrison;
    assert!(garrison.get(&UnitType::Knight).copied().unwrap_or(0) > 0);
}

#[test]
fn test_reinforcements_march_and_merge() {
    let mut scenario = two_player_scenario(6);
    let player = scenario.west;
    let sim = &mut scenario.sim;

    if let Some(b) = sim.state_mut().building_mut(scenario.west_base) {
        b.garrison.insert(UnitType::Archer, 12);
    }
    let army = field_army(
        sim,
        player,
        scenario.west_base,
        HexCoord::new(2, 0),
        UnitType::Swordsman,
        8,
    );

    let mut roster = hexrts_core::units::UnitRoster::new();
    roster.insert(UnitType::Archer, 6);
    let outcome = sim.submit(player, Command::Reinforce { army, roster });
    assert!(outcome.is_applied());
    assert_eq!(sim.state().army(army).unwrap().reinforcements.len(), 1);
    assert_eq!(
        sim.state()
            .building(scenario.west_base)
            .unwrap()
            .garrison
            .get(&UnitType::Archer),
        Some(&6)
    );

    for _ in 0..300 {
        sim.tick();
        if sim
            .state()
            .army(army)
            .is_some_and(|a| a.roster.contains_key(&UnitType::Archer))
        {
            break;
        }
    }
    let army_state = sim.state().army(army).unwrap();
    assert_eq!(army_state.roster.get(&UnitType::Archer), Some(&6));
    assert!(army_state.reinforcements.is_empty());
}

#[test]
fn test_command_schedule_is_deterministic() {
    let setup = || {
        let mut scenario = two_player_scenario(6);
        let (west, east) = (scenario.west, scenario.east);
        let sim = &mut scenario.sim;
        let knights = field_army(
            sim,
            west,
            scenario.west_base,
            HexCoord::new(-1, 0),
            UnitType::Knight,
            9,
        );
        let pikes = field_army(
            sim,
            east,
            scenario.east_base,
            HexCoord::new(2, 0),
            UnitType::Spearman,
            9,
        );
        sim.submit(
            west,
            Command::Attack {
                army: knights,
                target: AttackTarget::Army { army: pikes },
            },
        );
        sim.submit(
            east,
            Command::Entrench { army: pikes },
        );
        scenario.sim
    };
    assert!(verify_simulation_determinism(setup, 150));
}

#[test]
fn test_snapshot_mid_battle_resumes_identically() {
    let mut scenario = two_player_scenario(6);
    let (west, east) = (scenario.west, scenario.east);
    let sim = &mut scenario.sim;
    let knights = field_army(
        sim,
        west,
        scenario.west_base,
        HexCoord::new(0, 0),
        UnitType::Knight,
        10,
    );
    let pikes = field_army(
        sim,
        east,
        scenario.east_base,
        HexCoord::new(1, 0),
        UnitType::Spearman,
        10,
    );
    sim.submit(
        west,
        Command::Attack {
            army: knights,
            target: AttackTarget::Army { army: pikes },
        },
    );
    for _ in 0..4 {
        sim.tick();
    }
    assert!(sim.state().army(knights).unwrap().in_combat());

    let bytes = GameSnapshot::capture(sim).to_bytes().unwrap();
    let mut restored = GameSnapshot::from_bytes(&bytes).unwrap().restore().unwrap();
    for _ in 0..30 {
        sim.tick();
        restored.tick();
    }
    assert_eq!(sim.state().state_hash(), restored.state().state_hash());
}
