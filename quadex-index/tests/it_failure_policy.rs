//! Failure policy: every index task runs to completion, the first failure is
//! reported, and nothing is rolled back.

mod support;

use quadex_core::{KeyOrder, StatementRecord};
use quadex_index::{RelationError, SpoRelation, SpoRelationConfig};
use std::sync::Arc;
use support::{explicit, triple, tuples_via, FlakyManager};

fn flaky_relation(flaky: &str, config: SpoRelationConfig) -> (FlakyManager, SpoRelation) {
    let manager = FlakyManager::new(flaky);
    let relation = SpoRelation::create(Arc::new(manager.clone()), "kb", config).unwrap();
    (manager, relation)
}

#[test]
fn secondary_failure_is_reported_after_siblings_finish() {
    let (manager, rel) = flaky_relation("kb.POS", SpoRelationConfig::triples());
    rel.insert(&mut explicit([triple(1, 1, 1)])).unwrap();

    manager.fail(true);
    let mut batch = explicit((2..20).map(|i| triple(i, 1, 1)));
    match rel.insert(&mut batch) {
        Err(RelationError::Index(msg)) => assert!(msg.contains("kb.POS")),
        other => panic!("expected index failure, got {other:?}"),
    }

    // the other tasks ran to completion; no rollback
    assert_eq!(tuples_via(&rel, KeyOrder::Spo).len(), 19);
    assert_eq!(tuples_via(&rel, KeyOrder::Osp).len(), 19);
    assert_eq!(tuples_via(&rel, KeyOrder::Pos).len(), 1);
    assert_eq!(rel.open_cursors(), 0);

    // retrying once the index recovers brings every index into agreement
    manager.fail(false);
    rel.insert(&mut batch).unwrap();
    assert_eq!(tuples_via(&rel, KeyOrder::Pos).len(), 19);
}

#[test]
fn primary_failure_is_reported() {
    let (manager, rel) = flaky_relation("kb.SPO", SpoRelationConfig::triples());
    manager.fail(true);
    let mut batch = explicit([triple(1, 2, 3)]);
    assert!(matches!(rel.insert(&mut batch), Err(RelationError::Index(_))));
    assert_eq!(tuples_via(&rel, KeyOrder::Pos).len(), 1);
}

#[test]
fn delete_failure_is_reported() {
    let (manager, rel) = flaky_relation("kb.OSP", SpoRelationConfig::triples());
    rel.insert(&mut explicit([triple(1, 2, 3), triple(4, 5, 6)]))
        .unwrap();
    manager.fail(true);
    let mut batch = vec![StatementRecord::explicit(triple(1, 2, 3))];
    assert!(rel.delete(&mut batch).is_err());
    assert_eq!(tuples_via(&rel, KeyOrder::Spo).len(), 1);
    assert_eq!(tuples_via(&rel, KeyOrder::Osp).len(), 2);
}

#[test]
fn justification_failure_is_reported() {
    let (manager, rel) = flaky_relation(
        "kb.JUST",
        SpoRelationConfig::triples().with_justify(true),
    );
    manager.fail(true);
    let mut records = explicit([triple(1, 2, 3)]);
    let justifications = vec![quadex_core::Justification::new(
        triple(1, 2, 3),
        vec![triple(4, 5, 6)],
    )];
    assert!(matches!(
        rel.insert_justified(&mut records, &justifications),
        Err(RelationError::Index(_))
    ));
    assert!(rel.contains(&triple(1, 2, 3)).unwrap());
}
