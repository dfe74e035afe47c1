//! Write-write conflict validation for isolated relations.

mod support;

use quadex_core::{KeyBuilder, KeyOrder, StatementRecord};
use quadex_index::{IsolatedIndex, RelationError, SpoRelationConfig};
use support::{memory_relation, triple};

fn isolated_spo() -> IsolatedIndex {
    let (_, rel) = memory_relation(SpoRelationConfig::triples().with_isolation(true, false));
    IsolatedIndex::new("kb.SPO", rel.conflict_resolver())
}

fn key(s: u64, p: u64, o: u64) -> Vec<u8> {
    KeyOrder::Spo.encode_key(&mut KeyBuilder::new(), &triple(s, p, o))
}

fn value() -> [u8; 1] {
    [StatementRecord::explicit(triple(0, 0, 0)).value().encode()]
}

#[test]
fn concurrent_inserts_of_the_same_tuple_both_commit() {
    let index = isolated_spo();
    let k = key(1, 2, 3);
    let mut t1 = index.begin();
    let mut t2 = index.begin();
    t1.insert(&k, &value());
    t2.insert(&k, &value());
    index.commit(t1).unwrap();
    index.commit(t2).unwrap();

    let reader = index.begin();
    assert_eq!(index.read(&reader, &k), Some(value().to_vec()));
}

#[test]
fn delete_racing_insert_fails_validation() {
    let index = isolated_spo();
    let k = key(1, 2, 3);
    let mut seed = index.begin();
    seed.insert(&k, &value());
    index.commit(seed).unwrap();

    let mut t1 = index.begin();
    let mut t2 = index.begin();
    t1.remove(&k);
    t2.insert(&k, &value());
    index.commit(t1).unwrap();
    assert!(matches!(
        index.commit(t2),
        Err(RelationError::ValidationFailed { .. })
    ));
}

#[test]
fn concurrent_deletes_are_not_merged() {
    let index = isolated_spo();
    let k = key(1, 2, 3);
    let mut seed = index.begin();
    seed.insert(&k, &value());
    index.commit(seed).unwrap();

    let mut t1 = index.begin();
    let mut t2 = index.begin();
    t1.remove(&k);
    t2.remove(&k);
    index.commit(t1).unwrap();
    assert!(index.commit(t2).is_err());
}

#[test]
fn disjoint_writes_never_conflict() {
    let index = isolated_spo();
    let mut t1 = index.begin();
    let mut t2 = index.begin();
    t1.remove(&key(1, 1, 1));
    t2.remove(&key(2, 2, 2));
    index.commit(t1).unwrap();
    index.commit(t2).unwrap();
}

#[test]
fn inferencing_relations_have_no_resolver() {
    let (_, rel) = memory_relation(SpoRelationConfig::triples().with_isolation(true, true));
    let index = IsolatedIndex::new("kb.SPO", rel.conflict_resolver());
    let k = key(1, 2, 3);
    let mut t1 = index.begin();
    let mut t2 = index.begin();
    t1.insert(&k, &value());
    t2.insert(&k, &value());
    index.commit(t1).unwrap();
    assert!(index.commit(t2).is_err());
}
