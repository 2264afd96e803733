use miner_graph::{GraphNode, NewMethod, NewSubset, RecordStore};
use miner_protocol::{DocumentId, MethodId, MethodType, SubsetId};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    CreateMethod(usize),
    CreateSubset(usize),
    DeleteSubset(usize),
    DeleteMethod(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..32).prop_map(Op::CreateMethod),
        3 => (0usize..32).prop_map(Op::CreateSubset),
        1 => (0usize..32).prop_map(Op::DeleteSubset),
        1 => (0usize..32).prop_map(Op::DeleteMethod),
    ]
}

fn seeded_store() -> RecordStore {
    let mut store = RecordStore::new();
    for _ in 0..4 {
        store.add_document(Default::default());
    }
    store
        .create_subset(NewSubset::new(
            "root",
            (0..4).map(DocumentId).collect(),
        ))
        .unwrap();
    store
}

fn apply(store: &mut RecordStore, op: &Op) {
    match *op {
        Op::CreateMethod(i) => {
            let n = store.subsets().len();
            let _ = store.create_method(NewMethod {
                method_type: MethodType::Clustering,
                parameters: json!({}),
                applied_on: Some(SubsetId((i % n) as u64)),
            });
        }
        Op::CreateSubset(i) => {
            let n = store.methods().len();
            let mut new = NewSubset::new("out", vec![DocumentId((i % 4) as u64)]);
            if n > 0 {
                new = new.with_resulted_in(MethodId((i % n) as u64));
            }
            store.create_subset(new).unwrap();
        }
        Op::DeleteSubset(i) => {
            let n = store.subsets().len();
            store.delete_subset(SubsetId((i % n) as u64));
        }
        Op::DeleteMethod(i) => {
            let n = store.methods().len().max(1);
            store.delete_method(MethodId((i % n) as u64));
        }
    }
}

fn assert_consistent(store: &RecordStore) {
    store.validate().unwrap();
    for method in store.live_methods() {
        if let Some(input) = method.applied_on {
            assert!(
                store.subset(input).unwrap().is_live(),
                "live method {} applied on deleted subset {input}",
                method.id
            );
        }
        for &output in &method.produced {
            assert!(
                store.subset(output).unwrap().is_live(),
                "live method {} still lists deleted output {output}",
                method.id
            );
        }
    }
    for subset in store.live_subsets() {
        if let Some(parent) = subset.resulted_in {
            assert!(
                store.method(parent).unwrap().is_live(),
                "live subset {} produced by deleted method {parent}",
                subset.id
            );
        }
    }
    for method in store.methods().iter().filter(|m| !m.is_live()) {
        for &output in &method.produced {
            assert!(!store.subset(output).unwrap().is_live());
        }
    }
}

proptest! {
    #[test]
    fn graph_stays_consistent(ops in prop::collection::vec(op(), 1..60)) {
        let mut store = seeded_store();
        let mut deleted_subsets = HashSet::new();
        let mut deleted_methods = HashSet::new();
        for op in &ops {
            apply(&mut store, op);
            assert_consistent(&store);

            // soft delete is monotonic
            for id in &deleted_subsets {
                prop_assert!(!store.subset(*id).unwrap().is_live());
            }
            for id in &deleted_methods {
                prop_assert!(!store.method(*id).unwrap().is_live());
            }
            deleted_subsets.extend(store.subsets().iter().filter(|s| !s.is_live()).map(|s| s.id));
            deleted_methods.extend(store.methods().iter().filter(|m| !m.is_live()).map(|m| m.id));
        }
    }

    #[test]
    fn method_delete_reaches_every_descendant(ops in prop::collection::vec(op(), 1..40), pick in 0usize..32) {
        let mut store = seeded_store();
        for op in ops.iter().filter(|op| matches!(op, Op::CreateMethod(_) | Op::CreateSubset(_))) {
            apply(&mut store, op);
        }
        prop_assume!(!store.methods().is_empty());
        let target = MethodId((pick % store.methods().len()) as u64);

        // descendants computed independently by walking produced/used_by edges
        let mut expected = HashSet::new();
        let mut stack = vec![GraphNode::Method(target)];
        while let Some(node) = stack.pop() {
            if !expected.insert(node) {
                continue;
            }
            match node {
                GraphNode::Method(id) => {
                    stack.extend(store.method(id).unwrap().produced.iter().map(|&s| GraphNode::Subset(s)));
                }
                GraphNode::Subset(id) => {
                    stack.extend(store.subset(id).unwrap().used_by.iter().map(|&m| GraphNode::Method(m)));
                }
            }
        }

        let deleted: HashSet<GraphNode> = store.delete_method(target).into_iter().collect();
        prop_assert_eq!(&deleted, &expected);
        assert_consistent(&store);
    }
}

#[test]
fn test_subset_delete_does_not_touch_siblings() {
    let mut store = seeded_store();
    let method = store
        .create_method(NewMethod {
            method_type: MethodType::Clustering,
            parameters: json!({}),
            applied_on: Some(SubsetId::ROOT),
        })
        .unwrap();
    let a = store
        .create_subset(NewSubset::new("a", vec![]).with_resulted_in(method))
        .unwrap();
    let b = store
        .create_subset(NewSubset::new("b", vec![]).with_resulted_in(method))
        .unwrap();

    store.delete_subset(a);
    assert!(store.live_subset(b).is_ok());
    assert!(store.live_method(method).is_ok());

    store.delete_subset(b);
    assert!(store.live_method(method).is_err());
    assert!(store.live_subset(SubsetId::ROOT).is_ok());
}
