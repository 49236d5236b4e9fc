//! Property tests for synced lists.

use livelist_engine::{EchoMode, GuardState, SyncOptions};
use livelist_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn remote_streams_mirror_without_store_calls(script in remote_script_strategy()) {
        let harness = Harness::new(script.initial.clone());
        for batch in &script.batches {
            harness.publish_settled(batch.clone());
        }

        prop_assert_eq!(harness.list.documents(), script.expected);
        prop_assert!(harness.store_calls().is_empty());
        prop_assert_eq!(harness.list.guard_state(), GuardState::Idle);
    }

    #[test]
    fn overlapping_batches_settle_once(script in remote_script_strategy()) {
        let harness = Harness::new(script.initial.clone());
        for batch in &script.batches {
            harness.publish(batch.clone());
        }
        harness.settle();

        prop_assert_eq!(harness.list.documents(), script.expected);
        prop_assert!(harness.store_calls().is_empty());
        prop_assert!(harness.list.is_watching());
    }

    #[test]
    fn local_edits_converge_with_store(
        edits in local_edits_strategy(12),
        one_by_one in any::<bool>(),
    ) {
        let harness = Harness::new(vec![
            doc("a", serde_json::json!({"a": 1})),
            doc("b", serde_json::json!({"b": "x"})),
            doc("c", serde_json::json!({})),
        ]);

        if one_by_one {
            for edit in &edits {
                harness.edit(|list| edit.apply(list));
            }
        } else {
            harness.edit(|list| {
                for edit in &edits {
                    edit.apply(list);
                }
            });
        }

        harness.assert_converged();
        prop_assert_eq!(harness.list.guard_state(), GuardState::Idle);
        prop_assert!(harness.list.read(|list| list.duplicate_ids().is_empty()));
    }

    #[test]
    fn auto_sync_off_never_writes(edits in local_edits_strategy(12)) {
        let harness = Harness::with_options(
            docs(&["a", "b"]),
            SyncOptions::default().with_auto_sync(false),
            EchoMode::Immediate,
        );
        harness.edit(|list| {
            for edit in &edits {
                edit.apply(list);
            }
        });

        prop_assert!(harness.store_calls().is_empty());
    }

    #[test]
    fn held_inserts_wait_for_confirmation(drafts in 1usize..5) {
        let harness = Harness::held(docs(&["a"]));
        harness.edit(|list| {
            for n in 0..drafts {
                list.push(draft(serde_json::json!({"n": n})));
            }
        });

        prop_assert_eq!(harness.ids(), vec!["a".to_string()]);
        prop_assert_eq!(harness.store_calls().len(), drafts);

        prop_assert_eq!(harness.confirm(), drafts);
        prop_assert_eq!(harness.list.len(), drafts + 1);
        prop_assert_eq!(harness.store_calls().len(), drafts);
        harness.assert_converged();
    }
}
