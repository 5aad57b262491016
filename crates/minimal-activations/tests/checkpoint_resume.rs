//! Derivation resumes from stored checkpoints.

use std::sync::Arc;

use minimal_activations::{
    find_minimal_activations, ActivationsGraph, CheckpointStore, Decomposer,
    DerivedActivationsGraph, MemoryCheckpointStore, ScanOrder, SearchOptions,
    SqliteCheckpointStore,
};
use piano_roll::{
    dilate_stack, erode_texture, Activations, ActivationsStack, FrequencyPoint, Hit, PianoRoll,
    Rational, Rhythm, Texture, TimePoint,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn texture() -> Texture {
    Texture::from_rhythms(vec![
        Rhythm::from_hits(&[Hit::from_literal((0, 1), (1, 2))]).unwrap(),
        Rhythm::from_hits(&[Hit::from_literal((1, 4), (1, 4))]).unwrap(),
    ])
}

/// Both voices struck at each half-note time, pitch 60.
fn roll_at(halves: &[i64]) -> PianoRoll {
    let points: Vec<_> = halves
        .iter()
        .map(|&h| (TimePoint::new(h, 2), FrequencyPoint::from_integer(60)))
        .collect();
    let voice = Activations::from_points(&points, Rational::new(1, 2), Rational::from_integer(1)).unwrap();
    dilate_stack(&ActivationsStack::new(vec![voice.clone(), voice]), &texture()).unwrap()
}

fn graph_of(roll: &PianoRoll) -> ActivationsGraph {
    let eroded = erode_texture(roll, &texture()).unwrap();
    ActivationsGraph::build(roll, &eroded, &texture(), ScanOrder::TimeMajor).unwrap()
}

fn graph() -> ActivationsGraph {
    graph_of(&roll_at(&[2, 3]))
}

fn options(order: usize) -> SearchOptions {
    SearchOptions {
        order: Some(order),
        ..SearchOptions::default()
    }
}

#[test]
fn every_order_is_saved() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("checkpoints.db");
    let store = Arc::new(SqliteCheckpointStore::open(&db, "passage").unwrap());

    let graph = graph();
    let result = Decomposer::new(store.clone()).decompose(&graph, &options(2)).unwrap();
    assert_eq!(result.order, 2);
    assert_eq!(store.stored_orders(&graph.content_hash().unwrap()).unwrap(), vec![0, 1, 2]);
}

#[test]
fn resumed_run_matches_fresh_run() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("checkpoints.db");
    let graph = graph();

    let fresh = find_minimal_activations(&graph, &options(2)).unwrap();

    let first = Decomposer::new(Arc::new(SqliteCheckpointStore::open(&db, "passage").unwrap()));
    first.decompose(&graph, &options(1)).unwrap();

    // A new connection finds order 1 and only derives once more.
    let store = Arc::new(SqliteCheckpointStore::open(&db, "passage").unwrap());
    let resumed = Decomposer::new(store.clone()).decompose(&graph, &options(2)).unwrap();

    assert_eq!(resumed.stacks, fresh.stacks);
    assert_eq!(resumed.paths.len(), fresh.paths.len());
    assert_eq!(resumed.graph.node_count(), fresh.graph.node_count());
    assert_eq!(store.stored_orders(&graph.content_hash().unwrap()).unwrap(), vec![0, 1, 2]);
}

#[test]
fn resume_starts_from_highest_stored_order() {
    let graph = graph();
    let hash = graph.content_hash().unwrap();
    let store = Arc::new(MemoryCheckpointStore::new());
    let order1 = DerivedActivationsGraph::from_graph(&graph).derive();
    store.save(&hash, 1, &order1).unwrap();

    Decomposer::new(store.clone()).decompose(&graph, &options(3)).unwrap();

    // Order 0 was never recomputed.
    assert_eq!(store.stored_orders(&hash), vec![1, 2, 3]);
    assert_eq!(
        store.load(&hash, 3).unwrap().unwrap().node_count(),
        order1.derive().derive().node_count()
    );
}

#[test]
fn edited_input_does_not_reuse_checkpoints() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let decomposer = Decomposer::new(store.clone());

    let before = roll_at(&[2]);
    let first = decomposer.decompose(&graph_of(&before), &options(1)).unwrap();
    assert_eq!(first.stacks.len(), 1);

    // Same store and run, but the roll now has three onsets.
    let after = roll_at(&[2, 3, 4]);
    let edited = graph_of(&after);
    let second = decomposer.decompose(&edited, &options(1)).unwrap();
    let fresh = find_minimal_activations(&edited, &options(1)).unwrap();

    assert_eq!(second.stacks, fresh.stacks);
    for stack in &second.stacks {
        assert_eq!(dilate_stack(stack, &texture()).unwrap().reduce(), after.reduce());
    }
    assert_eq!(store.stored_orders(&edited.content_hash().unwrap()), vec![0, 1]);
    assert_eq!(store.stored_orders(&graph_of(&before).content_hash().unwrap()), vec![0, 1]);
}
