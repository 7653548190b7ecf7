//! Property-based tests for the factory.
//!
//! Random action sequences are driven through every transport mode, then
//! item conservation, buffer bounds and determinism are checked.

use std::collections::BTreeMap;

use foodline_core::action::{Action, StationRef, Target, TaskIntent};
use foodline_core::config::{FactoryConfig, SpawnPolicy, TransportMode, standard_orders};
use foodline_core::engine::Factory;
use foodline_core::grid::GridPos;
use foodline_core::station::StationType;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_transport() -> impl Strategy<Value = TransportMode> {
    prop_oneof![
        Just(TransportMode::Direct),
        Just(TransportMode::Segmented),
        Just(TransportMode::Nearest),
    ]
}

fn arb_command() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => Just(Action::idle()),
        2 => Just(Action::command("produce_pasta")),
        1 => Just(Action::command("produce_salad")),
        1 => Just(Action::command("produce_next")),
        1 => Just(Action::command("produce_tomato")),
        1 => Just(Action::command("produce_garlic")),
        1 => Just(Action::command("maintain_Cutter_0_1")),
        1 => Just(Action::command("repair_Cooker_1")),
        1 => Just(Action::command("replace_blade_0")),
        1 => Just(Action::command("produce_nothing")),
    ]
}

fn arb_intent() -> impl Strategy<Value = TaskIntent> {
    let stage = prop_oneof![
        Just(StationType::Storage),
        Just(StationType::Washer),
        Just(StationType::Cutter),
        Just(StationType::Cooker),
        Just(StationType::Plater),
    ];
    let station = (stage, 0..2u32).prop_map(|(kind, line)| StationRef::new(kind, line));
    prop_oneof![
        Just(TaskIntent::Wait),
        (0..16i32, 0..30i32).prop_map(|(r, c)| TaskIntent::Move {
            to: Target::Cell(GridPos::new(r, c))
        }),
        (station.clone(), station.clone())
            .prop_map(|(from, to)| TaskIntent::Transport { from, to }),
        station.clone().prop_map(|from| TaskIntent::Pick { from }),
        station.prop_map(|to| TaskIntent::Drop { to }),
        Just(TaskIntent::Operate { station: None }),
    ]
}

fn arb_assign() -> impl Strategy<Value = Action> {
    let robot = prop_oneof![
        (0..20u32).prop_map(|n| format!("logistics_{n}")),
        (0..16u32).prop_map(|n| format!("arm_{n}")),
        Just("robot_x".to_string()),
    ];
    proptest::collection::btree_map(robot, arb_intent(), 0..4)
        .prop_map(|m: BTreeMap<String, TaskIntent>| Action::Assign(m))
}

fn arb_actions(max: usize) -> impl Strategy<Value = Vec<Action>> {
    proptest::collection::vec(
        prop_oneof![4 => arb_command(), 1 => arb_assign()],
        1..=max,
    )
}

fn make(transport: TransportMode, seed: u64, capacity: usize) -> Factory {
    let config = FactoryConfig {
        seed,
        transport,
        spawn: SpawnPolicy::RoundRobin,
        station_capacity: capacity,
        storage_capacity: capacity * 2,
        orders: standard_orders(),
        ..FactoryConfig::default()
    };
    Factory::new(config).unwrap()
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// spawned == completed + rejected + merged + live, and every live id
    /// is physically held somewhere.
    #[test]
    fn items_are_conserved(
        transport in arb_transport(),
        seed in 0..1000u64,
        actions in arb_actions(150),
    ) {
        let mut f = make(transport, seed, 8);
        for action in &actions {
            f.step(action);
            let ledger = f.ledger();
            prop_assert!(ledger.is_balanced(), "tick {}: {:?}", f.tick(), ledger);
        }
    }

    /// No input buffer ever exceeds its capacity. Capacities start at the
    /// widest built-in recipe (fried rice, seven ingredients).
    #[test]
    fn buffers_stay_bounded(
        transport in arb_transport(),
        seed in 0..1000u64,
        capacity in 7..=12usize,
        actions in arb_actions(150),
    ) {
        let mut f = make(transport, seed, capacity);
        for action in &actions {
            f.step(action);
            for s in f.stations() {
                prop_assert!(s.input().len() <= s.capacity, "{} input over capacity", s.name());
            }
            for r in f.robots() {
                prop_assert!(r.queue().len() <= foodline_core::task::TASK_QUEUE_CAPACITY);
            }
        }
    }

    /// Same seed, same actions: same hashes and rewards at every tick.
    #[test]
    fn runs_are_deterministic(
        transport in arb_transport(),
        seed in 0..1000u64,
        actions in arb_actions(100),
    ) {
        let mut a = make(transport, seed, 8);
        let mut b = make(transport, seed, 8);
        for action in &actions {
            let ra = a.step(action);
            let rb = b.step(action);
            prop_assert_eq!(ra.reward, rb.reward);
            prop_assert_eq!(a.state_hash(), b.state_hash());
        }
        prop_assert_eq!(a.observe(), b.observe());
    }

    /// A restored snapshot follows the same trajectory as the original.
    #[test]
    fn snapshot_round_trip_continues(
        seed in 0..1000u64,
        before in arb_actions(60),
        after in arb_actions(60),
    ) {
        let mut original = make(TransportMode::Segmented, seed, 8);
        for action in &before {
            original.step(action);
        }
        let mut restored = Factory::deserialize(&original.serialize().unwrap()).unwrap();
        prop_assert_eq!(restored.state_hash(), original.state_hash());
        for action in &after {
            original.step(action);
            restored.step(action);
            prop_assert_eq!(restored.state_hash(), original.state_hash());
        }
    }
}
