//! Order-0 activation graph: one cluster of candidate explanations per
//! active roll cell, consecutive clusters fully connected.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use petgraph::graph::{DiGraph, NodeIndex};
use piano_roll::{
    rational_gcd_all, ActivationsStack, FrequencyPoint, PianoRoll, Rational, Texture, TimePoint,
    TimeShift,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::node::ActivationNode;
use crate::Result;

/// Order in which roll cells become clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanOrder {
    /// Outer loop over time, inner over frequency.
    FrequencyMajor,
    /// Outer loop over frequency, inner over time.
    #[default]
    TimeMajor,
}

impl FromStr for ScanOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "frequency-major" => Ok(ScanOrder::FrequencyMajor),
            "time-major" => Ok(ScanOrder::TimeMajor),
            other => Err(format!(
                "unknown scan order '{other}', expected time-major or frequency-major"
            )),
        }
    }
}

impl fmt::Display for ScanOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOrder::FrequencyMajor => write!(f, "frequency-major"),
            ScanOrder::TimeMajor => write!(f, "time-major"),
        }
    }
}

/// What a graph remembers about the roll and texture it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphContext {
    pub voice_count: usize,
    pub tatum: Rational,
    pub step: Rational,
    /// Latest time offset of any sounding texture cell.
    pub scope_lag: TimeShift,
    /// Texture length in texture tatums.
    pub texture_cells: usize,
    pub max_simultaneous_voices: usize,
    /// Most active roll cells in one time slice.
    #[serde(default)]
    pub max_cells_per_slice: usize,
    #[serde(default)]
    pub scan: ScanOrder,
}

#[derive(Debug, Clone)]
pub struct ActivationsGraph {
    graph: DiGraph<ActivationNode, ()>,
    clusters: Vec<Vec<NodeIndex>>,
    context: GraphContext,
}

impl ActivationsGraph {
    /// Scan the active cells of `roll` and record, for every voice and every
    /// offset of its pattern, the onsets that could have produced each cell.
    ///
    /// An onset qualifies when the voice's erosion holds it and the pattern
    /// value at that offset is at least the cell value.
    pub fn build(
        roll: &PianoRoll,
        stack: &ActivationsStack,
        texture: &Texture,
        scan: ScanOrder,
    ) -> Result<Self> {
        if stack.len() != texture.len() {
            return Err(piano_roll::Error::UnknownCorrespondence(format!(
                "{} activation tables for {} voices",
                stack.len(),
                texture.len()
            ))
            .into());
        }
        for voice in stack.iter() {
            if voice.step() != roll.step() {
                return Err(piano_roll::Error::UnsupportedStep {
                    left: roll.step(),
                    right: voice.step(),
                }
                .into());
            }
        }

        let tatum = rational_gcd_all(
            std::iter::once(roll.tatum())
                .chain(std::iter::once(texture.tatum()))
                .chain(stack.iter().map(|v| v.tatum())),
        )
        .unwrap_or_else(|| roll.tatum());
        let step = roll.step();
        let roll = roll.change_tatum(tatum)?;
        let stack = stack.change_tatum(tatum)?;
        let patterns = texture.patterns_at(tatum)?;
        let supports: Vec<Vec<(i64, i64, u8)>> =
            patterns.iter().map(|p| p.active_cells().collect()).collect();

        let mut slices = BTreeMap::<i64, usize>::new();
        for (_, t, _) in roll.active_cells() {
            *slices.entry(t).or_default() += 1;
        }
        let context = GraphContext {
            voice_count: texture.len(),
            tatum,
            step,
            scope_lag: texture.scope_lag(tatum)?,
            texture_cells: (texture.length().value() / texture.tatum()).to_integer().max(0) as usize,
            max_simultaneous_voices: texture.max_simultaneous_voices()?,
            max_cells_per_slice: slices.into_values().max().unwrap_or(0),
            scan,
        };

        let mut cells: Vec<(i64, i64, u8)> = roll.active_cells().collect();
        match scan {
            ScanOrder::TimeMajor => cells.sort_by_key(|&(f, t, _)| (f, t)),
            ScanOrder::FrequencyMajor => cells.sort_by_key(|&(f, t, _)| (t, f)),
        }

        let mut clusters = Vec::with_capacity(cells.len());
        for (f, t, value) in cells {
            let mut cluster = Vec::new();
            for (voice, support) in supports.iter().enumerate() {
                let Some(erosion) = stack.voice(voice) else {
                    continue;
                };
                for &(df, dt, pattern_value) in support {
                    if pattern_value < value || !erosion.contains(t - dt, f - df) {
                        continue;
                    }
                    cluster.push(ActivationNode {
                        t_p: TimePoint(tatum * t),
                        t_a: TimePoint(tatum * (t - dt)),
                        frequency: FrequencyPoint(step * (f - df)),
                        voice,
                    });
                }
            }
            clusters.push(cluster);
        }

        Ok(Self::from_clusters(clusters, context))
    }

    /// Assemble a graph from explicit clusters. Empty clusters are dropped.
    pub fn from_clusters(clusters: Vec<Vec<ActivationNode>>, context: GraphContext) -> Self {
        let mut graph = DiGraph::new();
        let mut indices: Vec<Vec<NodeIndex>> = Vec::with_capacity(clusters.len());
        let mut dropped = 0;

        for cluster in clusters {
            if cluster.is_empty() {
                dropped += 1;
                continue;
            }
            let current: Vec<NodeIndex> = cluster.into_iter().map(|n| graph.add_node(n)).collect();
            if let Some(previous) = indices.last() {
                for &u in previous {
                    for &v in &current {
                        graph.add_edge(u, v, ());
                    }
                }
            }
            indices.push(current);
        }

        debug!(
            clusters = indices.len(),
            dropped,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built activation graph"
        );

        Self {
            graph,
            clusters: indices,
            context,
        }
    }

    pub fn graph(&self) -> &DiGraph<ActivationNode, ()> {
        &self.graph
    }

    pub fn clusters(&self) -> &[Vec<NodeIndex>] {
        &self.clusters
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.clusters.iter().map(Vec::len).collect()
    }

    /// Nodes of one cluster, in insertion order.
    pub fn cluster_nodes(&self, cluster: usize) -> impl Iterator<Item = &ActivationNode> + '_ {
        self.clusters
            .get(cluster)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.graph.node_weight(i))
    }

    pub fn context(&self) -> &GraphContext {
        &self.context
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// BLAKE3 of the context and clusters, truncated to 128 bits (32 hex
    /// chars). Graphs built from different rolls or textures differ.
    pub fn content_hash(&self) -> Result<String> {
        let clusters: Vec<Vec<&ActivationNode>> = (0..self.clusters.len())
            .map(|c| self.cluster_nodes(c).collect())
            .collect();
        let bytes = serde_json::to_vec(&(&self.context, clusters))
            .map_err(|e| crate::Error::Snapshot(format!("hashing graph: {e}")))?;
        let hash = blake3::hash(&bytes);
        Ok(hex::encode(&hash.as_bytes()[..16]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use piano_roll::{dilate_stack, erode_texture, Activations, Hit, Rhythm};
    use pretty_assertions::assert_eq;

    fn r(numer: i64, denom: i64) -> Rational {
        Rational::new(numer, denom)
    }

    fn texture() -> Texture {
        Texture::from_rhythms(vec![
            Rhythm::from_hits(&[Hit::from_literal((0, 1), (1, 2))]).unwrap(),
            Rhythm::from_hits(&[Hit::from_literal((1, 4), (1, 4))]).unwrap(),
        ])
    }

    fn single_onset_roll() -> (PianoRoll, ActivationsStack) {
        let texture = texture();
        let point = [(TimePoint::new(1, 1), FrequencyPoint::from_integer(60))];
        let voice = Activations::from_points(&point, r(1, 2), r(1, 1)).unwrap();
        let stack = ActivationsStack::new(vec![voice.clone(), voice]);
        let roll = dilate_stack(&stack, &texture).unwrap();
        let eroded = erode_texture(&roll, &texture).unwrap();
        (roll, eroded)
    }

    #[test]
    fn clusters_follow_cells_and_connect_fully() {
        let (roll, eroded) = single_onset_roll();
        let graph = ActivationsGraph::build(&roll, &eroded, &texture(), ScanOrder::TimeMajor).unwrap();

        // Cells at 1 and 5/4, both onsets.
        assert_eq!(graph.cluster_sizes(), vec![2, 1]);
        assert_eq!(graph.edge_count(), 2);

        let first: Vec<_> = graph.cluster_nodes(0).map(|n| (n.voice, n.t_a)).collect();
        assert_eq!(
            first,
            vec![(0, TimePoint::new(1, 1)), (1, TimePoint::new(3, 4))]
        );

        let context = graph.context();
        assert_eq!(context.tatum, r(1, 4));
        assert_eq!(context.scope_lag, TimeShift::new(1, 4));
        assert_eq!(context.texture_cells, 2);
        assert_eq!(context.max_simultaneous_voices, 2);
        assert_eq!(context.max_cells_per_slice, 1);
        assert_eq!(context.scan, ScanOrder::TimeMajor);
    }

    #[test]
    fn texture_cells_count_texture_tatums() {
        // A roll quantized at 1/8 keeps the texture two cells long, while the
        // held notes of the patterns reach one finer cell further.
        let (roll, _) = single_onset_roll();
        let fine = roll.change_tatum(r(1, 8)).unwrap();
        let eroded = erode_texture(&fine, &texture()).unwrap();
        let graph = ActivationsGraph::build(&fine, &eroded, &texture(), ScanOrder::TimeMajor).unwrap();
        assert_eq!(graph.context().tatum, r(1, 8));
        assert_eq!(graph.context().texture_cells, 2);
        assert_eq!(graph.context().scope_lag, TimeShift::new(3, 8));
    }

    #[test]
    fn chords_widen_time_slices() {
        let cells = [(60, 0, 2u8), (64, 0, 2), (67, 0, 2), (60, 1, 2)];
        let roll = PianoRoll::from_cells(cells, r(1, 4), r(1, 1));
        let texture = Texture::from_rhythms(vec![
            Rhythm::from_hits(&[Hit::from_literal((0, 1), (1, 4))]).unwrap(),
        ]);
        let eroded = erode_texture(&roll, &texture).unwrap();
        let graph =
            ActivationsGraph::build(&roll, &eroded, &texture, ScanOrder::FrequencyMajor).unwrap();
        assert_eq!(graph.context().max_cells_per_slice, 3);
        assert_eq!(graph.context().scan, ScanOrder::FrequencyMajor);
    }

    #[test]
    fn content_hash_tracks_the_roll() {
        let (roll, eroded) = single_onset_roll();
        let graph = ActivationsGraph::build(&roll, &eroded, &texture(), ScanOrder::TimeMajor).unwrap();
        let again = ActivationsGraph::build(&roll, &eroded, &texture(), ScanOrder::TimeMajor).unwrap();
        let hash = graph.content_hash().unwrap();
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, again.content_hash().unwrap());

        let shifted = roll.supremum(&PianoRoll::from_cells([(62, 8, 2u8)], r(1, 4), r(1, 1))).unwrap();
        let shifted_eroded = erode_texture(&shifted, &texture()).unwrap();
        let other =
            ActivationsGraph::build(&shifted, &shifted_eroded, &texture(), ScanOrder::TimeMajor).unwrap();
        assert_ne!(hash, other.content_hash().unwrap());
    }

    #[test]
    fn softer_pattern_values_cannot_claim_onsets() {
        let (roll, eroded) = single_onset_roll();
        let graph = ActivationsGraph::build(&roll, &eroded, &texture(), ScanOrder::TimeMajor).unwrap();

        // The sustain of voice 0 at 5/4 never explains the onset of voice 1 there.
        let second: Vec<_> = graph.cluster_nodes(1).map(|n| (n.voice, n.t_a)).collect();
        assert_eq!(second, vec![(1, TimePoint::new(1, 1))]);
    }

    #[test]
    fn scan_order_changes_clustering_only() {
        let cells = [(60, 0, 2u8), (60, 1, 2), (64, 0, 2)];
        let roll = PianoRoll::from_cells(cells, r(1, 4), r(1, 1));
        let texture = Texture::from_rhythms(vec![
            Rhythm::from_hits(&[Hit::from_literal((0, 1), (1, 4))]).unwrap(),
        ]);
        let eroded = erode_texture(&roll, &texture).unwrap();

        let time_major = ActivationsGraph::build(&roll, &eroded, &texture, ScanOrder::TimeMajor).unwrap();
        let frequency_major =
            ActivationsGraph::build(&roll, &eroded, &texture, ScanOrder::FrequencyMajor).unwrap();

        let pitches = |g: &ActivationsGraph| -> Vec<i64> {
            (0..g.clusters().len())
                .flat_map(|c| g.cluster_nodes(c).map(|n| n.frequency.value().to_integer()).collect::<Vec<_>>())
                .collect()
        };
        assert_eq!(pitches(&time_major), vec![60, 60, 64]);
        assert_eq!(pitches(&frequency_major), vec![60, 64, 60]);
        assert_eq!(time_major.node_count(), frequency_major.node_count());
    }

    #[test]
    fn voice_count_must_match() {
        let (roll, eroded) = single_onset_roll();
        let one_voice = Texture::from_rhythms(vec![
            Rhythm::from_hits(&[Hit::from_literal((0, 1), (1, 2))]).unwrap(),
        ]);
        assert!(ActivationsGraph::build(&roll, &eroded, &one_voice, ScanOrder::TimeMajor).is_err());
    }

    #[test]
    fn empty_clusters_are_dropped() {
        let context = GraphContext {
            voice_count: 1,
            tatum: r(1, 4),
            step: r(1, 1),
            scope_lag: TimeShift::zero(),
            texture_cells: 1,
            max_simultaneous_voices: 1,
            max_cells_per_slice: 1,
            scan: ScanOrder::TimeMajor,
        };
        let node = ActivationNode {
            t_p: TimePoint::from_integer(0),
            t_a: TimePoint::from_integer(0),
            frequency: FrequencyPoint::from_integer(60),
            voice: 0,
        };
        let graph = ActivationsGraph::from_clusters(vec![vec![node], vec![], vec![node, node]], context);
        assert_eq!(graph.cluster_sizes(), vec![1, 2]);
        assert_eq!(graph.edge_count(), 2);
    }
}
