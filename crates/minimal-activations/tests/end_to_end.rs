//! Decomposition of a two-voice passage back into its activations.

use minimal_activations::{find_minimal_activations, ActivationsGraph, ScanOrder, SearchOptions};
use piano_roll::{
    dilate_stack, erode_texture, Activations, ActivationsStack, Chord, FrequencyPoint, Harmony,
    Hit, PianoRoll, Rational, Rhythm, Texture, TimePoint,
};
use pretty_assertions::assert_eq;

fn texture() -> Texture {
    Texture::from_rhythms(vec![
        Rhythm::from_hits(&[Hit::from_literal((0, 1), (1, 2))]).unwrap(),
        Rhythm::from_hits(&[Hit::from_literal((1, 4), (1, 4))]).unwrap(),
    ])
}

fn both_voices_at(time: TimePoint) -> ActivationsStack {
    let point = [(time, FrequencyPoint::from_integer(60))];
    let voice = Activations::from_points(&point, Rational::new(1, 2), Rational::from_integer(1)).unwrap();
    ActivationsStack::new(vec![voice.clone(), voice])
}

/// Chords {0, 3}, {0}, {0, 3} struck at 1, 3/2 and 2.
fn passage(texture: &Texture) -> PianoRoll {
    let sections = [
        (TimePoint::new(1, 1), Chord::new(&[0, 3])),
        (TimePoint::new(3, 2), Chord::new(&[0])),
        (TimePoint::new(2, 1), Chord::new(&[0, 3])),
    ];
    sections
        .into_iter()
        .map(|(time, chord)| {
            let harmonized = texture.harmonize(&Harmony::Uniform(chord)).unwrap();
            dilate_stack(&both_voices_at(time), &harmonized).unwrap()
        })
        .reduce(|acc, roll| acc.supremum(&roll).unwrap())
        .unwrap()
}

#[test]
fn single_minimal_cover_reconstructs_the_roll() {
    let texture = texture();
    let roll = passage(&texture);
    let eroded = erode_texture(&roll, &texture).unwrap();
    let graph = ActivationsGraph::build(&roll, &eroded, &texture, ScanOrder::TimeMajor).unwrap();
    assert_eq!(graph.clusters().len(), 10);

    let result = find_minimal_activations(&graph, &SearchOptions::default()).unwrap();
    assert_eq!(result.order, 1);
    assert_eq!(result.paths.len(), 1);
    assert_eq!(result.stacks.len(), 1);

    let stack = &result.stacks[0];
    let expected = vec![
        (TimePoint::new(1, 1), FrequencyPoint::from_integer(60)),
        (TimePoint::new(1, 1), FrequencyPoint::from_integer(63)),
        (TimePoint::new(3, 2), FrequencyPoint::from_integer(60)),
        (TimePoint::new(2, 1), FrequencyPoint::from_integer(60)),
        (TimePoint::new(2, 1), FrequencyPoint::from_integer(63)),
    ];
    for voice in stack.iter() {
        assert_eq!(voice.points(), expected);
    }

    let rebuilt = dilate_stack(stack, &texture).unwrap();
    assert_eq!(rebuilt.reduce(), roll.reduce());
}

#[test]
fn every_path_through_the_final_graph_is_consistent() {
    let texture = texture();
    let roll = passage(&texture);
    let eroded = erode_texture(&roll, &texture).unwrap();
    let graph = ActivationsGraph::build(&roll, &eroded, &texture, ScanOrder::TimeMajor).unwrap();

    let result = find_minimal_activations(&graph, &SearchOptions::default()).unwrap();
    let voices = result.graph.context().voice_count;
    for path in &result.paths {
        for &index in &path.nodes {
            let node = result.graph.activation(index).unwrap();
            assert!(node.is_consistent(voices), "inconsistent node {node}");
        }
    }
}

#[test]
fn frequency_major_scan_finds_the_same_cover() {
    let texture = texture();
    let roll = passage(&texture);
    let eroded = erode_texture(&roll, &texture).unwrap();
    let graph = ActivationsGraph::build(&roll, &eroded, &texture, ScanOrder::FrequencyMajor).unwrap();
    assert_eq!(graph.clusters().len(), 10);
    assert_eq!(graph.context().max_cells_per_slice, 2);

    // Chord cells of one time slice are consecutive clusters, so the
    // window has to cover two slices of two cells each.
    let result = find_minimal_activations(&graph, &SearchOptions::default()).unwrap();
    assert_eq!(result.order, 3);
    assert_eq!(result.paths.len(), 1);

    let time_major = ActivationsGraph::build(&roll, &eroded, &texture, ScanOrder::TimeMajor).unwrap();
    let expected = find_minimal_activations(&time_major, &SearchOptions::default()).unwrap();
    assert_eq!(result.stacks, expected.stacks);

    let rebuilt = dilate_stack(&result.stacks[0], &texture).unwrap();
    assert_eq!(rebuilt.reduce(), roll.reduce());
}
