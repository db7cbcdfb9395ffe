// Call tree reconstruction from recorded caller edges

use stopwatch::call_tree::{CallTree, Edge, IterState};
use stopwatch::counter_source::ManualSource;
use stopwatch::store::MeasurementStore;
use stopwatch::StopwatchError;

fn build(pairs: &[(usize, usize)]) -> stopwatch::Result<CallTree> {
    let edges: Vec<Edge> = pairs.iter().copied().map(Edge::from).collect();
    CallTree::build(&edges)
}

fn ids_and_depths(tree: &CallTree) -> (Vec<usize>, Vec<usize>) {
    tree.iter().map(|n| (n.function_id, n.stack_depth)).unzip()
}

#[test]
fn test_flat_tree_under_root() {
    let tree = build(&[(1, 0), (3, 0), (9, 0)]).unwrap();
    let (ids, depths) = ids_and_depths(&tree);
    assert_eq!(ids, vec![0, 1, 3, 9]);
    assert_eq!(depths, vec![0, 1, 1, 1]);
}

#[test]
fn test_chain_from_unordered_edges() {
    let tree = build(&[(1, 5), (5, 0), (4, 10), (9, 4), (10, 1)]).unwrap();
    let (ids, depths) = ids_and_depths(&tree);
    assert_eq!(ids, vec![0, 5, 1, 10, 4, 9]);
    assert_eq!(depths, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_mixed_depth_siblings() {
    // main -> {1 -> {2, 3 -> 4}, 5}
    let tree = build(&[(1, 0), (2, 1), (3, 1), (4, 3), (5, 0)]).unwrap();
    let (ids, depths) = ids_and_depths(&tree);
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(depths, vec![0, 1, 2, 2, 3, 1]);
}

#[test]
fn test_manual_iteration_protocol() {
    let tree = build(&[(1, 0), (2, 1)]).unwrap();
    let mut iter = tree.iter();

    let mut visited = Vec::new();
    while iter.has_next() {
        visited.push(iter.next_node().unwrap().function_id);
    }
    assert_eq!(visited, vec![0, 1, 2]);
    assert_eq!(iter.state(), IterState::Exhausted);
    assert!(matches!(
        iter.next_node(),
        Err(StopwatchError::IteratorExhausted)
    ));

    iter.reset();
    assert_eq!(iter.count(), 3);
}

#[test]
fn test_for_loop_over_tree() {
    let tree = build(&[(2, 0), (7, 2)]).unwrap();
    let mut total_depth = 0;
    for node in &tree {
        total_depth += node.stack_depth;
    }
    assert_eq!(total_depth, 3);
}

#[test]
fn test_invalid_edge_sets() {
    assert!(matches!(
        build(&[(1, 0), (2, 6)]),
        Err(StopwatchError::DanglingCaller {
            function_id: 2,
            caller_id: 6
        })
    ));
    assert!(matches!(
        build(&[(3, 0), (3, 0)]),
        Err(StopwatchError::DuplicateRoutine(3))
    ));
    assert!(matches!(
        build(&[(1, 2), (2, 1)]),
        Err(StopwatchError::CyclicCallGraph { unreachable: 2 })
    ));
}

#[test]
fn test_tree_from_store_edges() {
    let mut store = MeasurementStore::new(ManualSource::new());
    store.init(&[]).unwrap();

    store.begin(1, "total-loop", 0).unwrap();
    store.begin(2, "single-cycle", 1).unwrap();
    store.end(2).unwrap();
    store.end(1).unwrap();
    store.begin(3, "teardown", 0).unwrap();
    store.end(3).unwrap();

    let tree = CallTree::build(&store.edges()).unwrap();
    let (ids, depths) = ids_and_depths(&tree);
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(depths, vec![0, 1, 2, 1]);
}
