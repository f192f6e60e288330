use proptest::prelude::*;
use shiftree_core::{ConstantRate, EventId, Model};

use generators::*;

fn apply(model: &mut Model<ConstantRate>, op: &Op) -> bool {
    let total = model.tree().total_map_length();
    match op {
        Op::Add(fraction) => {
            let position = (fraction * total).min(total - f64::EPSILON * total);
            model.add_event_to_tree(Some(position)).is_ok()
        }
        Op::AddRandom => model.add_event_to_tree(None).is_ok(),
        Op::Delete => model.delete_random_event().unwrap().is_some(),
        Op::Local => model.event_local_move().unwrap().is_some(),
        Op::Global => model.event_global_move().unwrap().is_some(),
        Op::Relocate => model.propose_event_relocation().unwrap().is_some(),
        Op::EventRate => model.propose_event_rate().is_ok(),
    }
}

fn assert_consistent(model: &Model<ConstantRate>) -> Result<(), TestCaseError> {
    prop_assert_eq!(model.node_assignment(), model.recompute_node_events());
    prop_assert_eq!(
        model.count_events_in_branch_histories(),
        model.number_of_events()
    );
    for event in model.registry().iter() {
        let history = model.branch_history(event.event_node());
        prop_assert!(history.contains(event.id()));
        prop_assert!(model.tree().node(event.event_node()).covers(event.map_time()));
    }
    Ok(())
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn incremental_assignment_matches_recomputation(
        tree in arb_tree(),
        seed in any::<u64>(),
        ops in arb_ops(),
    ) {
        let mut model = constant_model(tree, seed);
        for (op, accept) in &ops {
            let before = model.node_assignment();
            let rate_before = model.event_rate();
            if !apply(&mut model, op) {
                prop_assert!(model.pending_proposal().is_clean());
                continue;
            }
            assert_consistent(&model)?;

            if *accept {
                model.commit_proposal().unwrap();
            } else {
                model.revert_proposal().unwrap();
                prop_assert_eq!(model.node_assignment(), before);
                prop_assert_eq!(model.event_rate().to_bits(), rate_before.to_bits());
            }
            prop_assert!(model.pending_proposal().is_clean());
            assert_consistent(&model)?;
        }
    }

    #[test]
    fn shielded_subtrees_are_untouched(
        tree in arb_tree(),
        seed in any::<u64>(),
        fraction in 0.0_f64..1.0,
    ) {
        let mut model = constant_model(tree, seed);
        let total = model.tree().total_map_length();
        let position = (fraction * total).min(total - f64::EPSILON * total);

        // Shield every tip branch, then add an event anywhere.
        let tips: Vec<_> = model.tree().tips().collect();
        for &tip in &tips {
            let start = model.tree().node(tip).map_start();
            model.add_event_to_tree(Some(start)).unwrap();
            model.commit_proposal().unwrap();
        }
        let before = model.node_assignment();
        let id = model.add_event_to_tree(Some(position)).unwrap();
        let home = model.event(id).unwrap().event_node();

        for &tip in &tips {
            if tip != home {
                prop_assert_eq!(before[tip.index()].node_event, model.node_event(tip));
            }
        }
        prop_assert_ne!(model.node_event(home), EventId::ROOT);
    }
}
