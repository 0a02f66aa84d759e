//! Integration tests over the public `BTreeIndex` facade, using the
//! in-memory reference store.

use btree_index::{testing::MemoryStore, BTreeIndex, Error, Order, Value};
use test_case::test_case;

fn index_with_fanout(fanout: u32) -> BTreeIndex<MemoryStore> {
    let mut index = BTreeIndex::new(MemoryStore::new());
    index.init(None, Some(fanout)).unwrap();
    index
}

fn insert_all(index: &mut BTreeIndex<MemoryStore>, keys: &[i64]) {
    for &k in keys {
        index.insert(None, Value::from(k), k.to_string()).unwrap();
    }
}

fn walk_asc(index: &BTreeIndex<MemoryStore>) -> Vec<i64> {
    let mut out = Vec::new();
    let mut cursor = None;
    loop {
        let page = index.paginate(None, Order::Asc, None, None, cursor.as_deref(), 3).unwrap();
        for (k, _) in page.items {
            let Value::Number(n) = k else { panic!("expected a number key") };
            out.push(n as i64);
        }
        if page.done {
            break;
        }
        cursor = page.cursor;
    }
    out
}

// scenario 1: ascending insert of a mixed sequence, then a full ascending
// walk and a structural validation pass.
#[test]
fn scenario_1_insert_then_full_walk_is_sorted() {
    let mut index = index_with_fanout(4);
    insert_all(&mut index, &[10, 20, 5, 6, 12, 30, 7, 17, 8, 4, 3, 9]);

    assert_eq!(walk_asc(&index), vec![3, 4, 5, 6, 7, 8, 9, 10, 12, 17, 20, 30]);
    index.validate(None).unwrap();
}

// scenario 2: delete from the tree built in scenario 1, re-walk, re-validate.
#[test]
fn scenario_2_delete_then_full_walk_excludes_it() {
    let mut index = index_with_fanout(4);
    insert_all(&mut index, &[10, 20, 5, 6, 12, 30, 7, 17, 8, 4, 3, 9]);

    index.delete(None, &Value::from(6i64)).unwrap();

    assert_eq!(walk_asc(&index), vec![3, 4, 5, 7, 8, 9, 10, 12, 17, 20, 30]);
    index.validate(None).unwrap();
}

// scenario 3: ascending pagination with a fixed page size over 1..=20.
#[test]
fn scenario_3_ascending_pagination_in_fixed_pages() {
    let mut index = index_with_fanout(4);
    insert_all(&mut index, &(1..=20).collect::<Vec<_>>());

    let mut cursor = None;
    let expected_pages: [&[i64]; 4] =
        [&[1, 2, 3, 4, 5], &[6, 7, 8, 9, 10], &[11, 12, 13, 14, 15], &[16, 17, 18, 19, 20]];

    for (i, expected) in expected_pages.iter().enumerate() {
        let page = index.paginate(None, Order::Asc, None, None, cursor.as_deref(), 5).unwrap();
        let got: Vec<i64> = page
            .items
            .iter()
            .map(|(k, _)| {
                let Value::Number(n) = k else { panic!("expected a number key") };
                *n as i64
            })
            .collect();
        assert_eq!(&got, expected, "page {i}");
        assert_eq!(page.done, i == expected_pages.len() - 1, "page {i} done flag");
        cursor = page.cursor;
    }
}

// scenario 4: descending, bounded pagination over [5, 15] with limit 7.
#[test]
fn scenario_4_descending_bounded_pagination() {
    let mut index = index_with_fanout(4);
    insert_all(&mut index, &(1..=20).collect::<Vec<_>>());

    let page1 = index
        .paginate(None, Order::Desc, Some(Value::from(5i64)), Some(Value::from(15i64)), None, 7)
        .unwrap();
    let got1: Vec<i64> = page1
        .items
        .iter()
        .map(|(k, _)| {
            let Value::Number(n) = k else { panic!() };
            *n as i64
        })
        .collect();
    assert_eq!(got1, vec![15, 14, 13, 12, 11, 10, 9]);
    assert!(!page1.done);

    let page2 = index
        .paginate(None, Order::Desc, Some(Value::from(5i64)), Some(Value::from(15i64)), page1.cursor.as_deref(), 7)
        .unwrap();
    let got2: Vec<i64> = page2
        .items
        .iter()
        .map(|(k, _)| {
            let Value::Number(n) = k else { panic!() };
            *n as i64
        })
        .collect();
    assert_eq!(got2, vec![8, 7, 6, 5]);
    assert!(page2.done);
}

// scenario 5: duplicate-key rejection, then replaceOrInsert.
#[test]
fn scenario_5_duplicate_key_then_replace_or_insert() {
    let mut index = index_with_fanout(4);
    index.insert(None, Value::from("x"), "a".to_string()).unwrap();

    let err = index.insert(None, Value::from("x"), "b".to_string()).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey));

    index
        .replace_or_insert(None, None, &Value::from("x"), Value::from("x"), "b".to_string())
        .unwrap();
    assert_eq!(index.get(None, &Value::from("x")).unwrap(), Some((Value::from("x"), "b".to_string())));
}

// scenario 6: clear_all leaves every namespace with an empty tree, and
// preserves the default namespace's fanout.
#[test]
fn scenario_6_clear_all_preserves_default_fanout() {
    let mut index = index_with_fanout(6);
    insert_all(&mut index, &(1..=30).collect::<Vec<_>>());
    index.insert(Some(Value::from("other")), Value::from(1i64), "v".to_string()).unwrap();

    index.clear_all().unwrap();

    assert_eq!(index.get(None, &Value::from(1i64)).unwrap(), None);
    assert_eq!(index.get(Some(Value::from("other")), &Value::from(1i64)).unwrap(), None);

    // the default namespace's fanout of 6 must have survived the clear,
    // since that's where it lives once there's no data to infer it from.
    index.insert(None, Value::from(99i64), "v".to_string()).unwrap();
    index.insert(Some(Value::from("fresh")), Value::from(1i64), "v".to_string()).unwrap();
    // a brand-new namespace created after clear_all should inherit fanout 6
    // from the (recreated, empty) default-namespace tree.
    for k in 0..7 {
        index.insert(Some(Value::from("fresh")), Value::from(k + 100), "v".to_string()).unwrap();
    }
    index.validate(Some(Value::from("fresh"))).unwrap();
}

#[test]
fn get_is_last_value_inserted_or_none() {
    let mut index = BTreeIndex::new(MemoryStore::new());
    let err = index.get(None, &Value::from(1i64)).unwrap_err();
    assert!(matches!(err, Error::NotInitialized));

    index.insert(None, Value::from(1i64), "a".to_string()).unwrap();
    assert_eq!(index.get(None, &Value::from(1i64)).unwrap(), Some((Value::from(1i64), "a".to_string())));
    assert_eq!(index.get(None, &Value::from(2i64)).unwrap(), None);
}

#[test]
fn insert_then_delete_restores_prior_key_set() {
    let mut index = index_with_fanout(4);
    insert_all(&mut index, &[1, 2, 3, 4, 5]);
    let before = walk_asc(&index);

    index.insert(None, Value::from(42i64), "v".to_string()).unwrap();
    index.delete(None, &Value::from(42i64)).unwrap();

    assert_eq!(walk_asc(&index), before);
}

#[test]
fn delete_then_insert_if_does_not_exist_matches_insert_if_does_not_exist() {
    let mut a = index_with_fanout(4);
    let mut b = index_with_fanout(4);

    a.insert(None, Value::from(1i64), "a".to_string()).unwrap();
    b.insert(None, Value::from(1i64), "a".to_string()).unwrap();

    a.delete(None, &Value::from(1i64)).unwrap();
    a.insert_if_does_not_exist(None, Value::from(1i64), "b".to_string()).unwrap();

    b.insert_if_does_not_exist(None, Value::from(1i64), "b".to_string()).unwrap();

    assert_eq!(a.get(None, &Value::from(1i64)).unwrap(), b.get(None, &Value::from(1i64)).unwrap());
}

// boundary: inserting M+1 ascending keys into an empty tree produces
// height 1 (one root split) with the (MIN+1)th key pushed up.
#[test]
fn boundary_first_split_pushes_up_the_min_plus_one_th_key() {
    let mut index = index_with_fanout(4); // MAX=4, MIN=2
    insert_all(&mut index, &[1, 2, 3, 4, 5]); // M+1 = 5 keys

    assert_eq!(walk_asc(&index), vec![1, 2, 3, 4, 5]);
    index.validate(None).unwrap();
    // the root now has exactly one item and two leaf children
    let page = index.paginate(None, Order::Asc, None, None, None, 1).unwrap();
    assert!(!page.done);
}

#[test]
fn boundary_delete_on_empty_tree_is_missing_key() {
    let mut index = index_with_fanout(4);
    let err = index.delete(None, &Value::from(1i64)).unwrap_err();
    assert!(matches!(err, Error::MissingKey));
}

#[test]
fn boundary_pagination_limit_zero_is_rejected() {
    let index = index_with_fanout(4);
    let err = index.paginate(None, Order::Asc, None, None, None, 0).unwrap_err();
    assert!(matches!(err, Error::InvalidLimit));
}

#[test_case(3; "odd fanout below four")]
#[test_case(5; "odd fanout")]
#[test_case(7; "odd fanout again")]
fn boundary_invalid_fanout_is_rejected(fanout: u32) {
    let mut index = BTreeIndex::new(MemoryStore::new());
    let err = index.init(None, Some(fanout)).unwrap_err();
    assert!(matches!(err, Error::InvalidFanout(f) if f == fanout));
}

#[test]
fn init_twice_is_already_initialized() {
    let mut index = BTreeIndex::new(MemoryStore::new());
    index.init(None, Some(8)).unwrap();
    let err = index.init(None, Some(8)).unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized));
}

#[test]
fn replace_can_cross_namespaces() {
    let mut index = BTreeIndex::new(MemoryStore::new());
    index.insert(Some(Value::from("a")), Value::from(1i64), "v".to_string()).unwrap();

    index
        .replace(Some(Value::from("a")), Some(Value::from("b")), &Value::from(1i64), Value::from(1i64), "v".to_string())
        .unwrap();

    assert_eq!(index.get(Some(Value::from("a")), &Value::from(1i64)).unwrap(), None);
    assert_eq!(
        index.get(Some(Value::from("b")), &Value::from(1i64)).unwrap(),
        Some((Value::from(1i64), "v".to_string()))
    );
}

#[test]
fn paginate_namespaces_enumerates_every_namespace() {
    let mut index = BTreeIndex::new(MemoryStore::new());
    index.insert(None, Value::from(1i64), "v".to_string()).unwrap();
    index.insert(Some(Value::from("a")), Value::from(1i64), "v".to_string()).unwrap();
    index.insert(Some(Value::from("b")), Value::from(1i64), "v".to_string()).unwrap();

    let mut namespaces = Vec::new();
    let mut cursor = None;
    loop {
        let page = index.paginate_namespaces(cursor.as_deref(), 1).unwrap();
        namespaces.extend(page.namespaces);
        if page.done {
            break;
        }
        cursor = page.cursor;
    }

    assert_eq!(namespaces, vec![None, Some(Value::from("a")), Some(Value::from("b"))]);
}

// deferred deletion: clearing a namespace removes it from lookups
// immediately, but its nodes are only reclaimed as the scheduled-deletion
// queue is drained.
#[test]
fn clear_schedules_deferred_node_deletion() {
    let mut index = index_with_fanout(4);
    insert_all(&mut index, &(1..=20).collect::<Vec<_>>());

    let nodes_before = index.store().node_count();
    assert!(nodes_before > 1);

    index.clear(None, None).unwrap();
    assert_eq!(index.get(None, &Value::from(1i64)).unwrap(), None);
    assert!(index.store().node_count() > 1, "old nodes are not yet reclaimed");

    let mut steps = 0;
    while index.run_scheduled_deletion_step().unwrap() {
        steps += 1;
        assert!(steps < 10_000, "deferred deletion did not converge");
    }

    // only the freshly (re)created empty root remains from the old tree
    assert_eq!(index.store().node_count(), 1);
    assert_eq!(index.store().pending_deletions(), 0);
}

#[test]
fn invariant_violation_is_detected_by_validate() {
    use btree_index::{NodeRecord, Store};

    let mut index = index_with_fanout(4);
    index.insert(None, Value::from(1i64), "a".to_string()).unwrap();

    let (tree_id, tree) = index.store().get_tree_by_namespace(&None).unwrap().unwrap();
    index
        .store_mut()
        .patch_node(
            tree.root,
            NodeRecord {
                items: vec![(Value::from(2i64), "b".into()), (Value::from(1i64), "a".into())],
                subtrees: vec![],
            },
        )
        .unwrap();
    let _ = tree_id;

    let err = index.validate(None).unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
}

// The range walker must not load every node to serve a bounded or
// deep-cursor page (§4.3.5's "fast path that avoids loading every node").
// A subtree already provably within the requested bounds, from its
// parent's own separator keys, should never be fetched from the store at
// all unless a caller actually needs an item out of it.
#[test]
fn pagination_does_not_load_every_node_for_a_bounded_page() {
    let mut index = index_with_fanout(4);
    insert_all(&mut index, &(1..=500).collect::<Vec<_>>());

    let total_nodes = index.store().node_count();
    assert!(total_nodes > 100, "fixture should build a multi-level tree, got {total_nodes} nodes");

    index.store().reset_node_reads();
    let page = index.paginate(None, Order::Asc, Some(Value::from(498i64)), None, None, 3).unwrap();
    assert_eq!(page.items.len(), 3);
    assert!(page.done);

    let reads = index.store().node_reads();
    assert!(reads < total_nodes / 4, "range walk read {reads} of {total_nodes} nodes, expected a small fraction");
}
