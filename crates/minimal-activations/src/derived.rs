//! Derived activation graphs.
//!
//! Derivation turns every edge `(u, v)` of an order-k graph into a node of
//! the order-(k+1) graph and connects `(u, v)` to `(v, w)`. At order k a node
//! is a chain of k+1 consecutive cluster choices, so the node count is the
//! number of length-(k+1) paths through the order-0 clusters.

use std::collections::HashMap;

use petgraph::algo::dijkstra;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use piano_roll::{Activations, ActivationsStack, FrequencyPoint, TimePoint};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{ActivationsGraph, GraphContext};
use crate::node::{DerivedActivationNode, GraphNode};
use crate::{Error, Result};

/// A start-to-end route through a weighted graph, sentinels excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub nodes: Vec<NodeIndex>,
    pub cost: u64,
}

/// Serializable form of a derived graph without sentinels.
///
/// `edges` index into the concatenation of `clusters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub order: usize,
    pub context: GraphContext,
    pub clusters: Vec<Vec<DerivedActivationNode>>,
    pub edges: Vec<(usize, usize, u64)>,
}

#[derive(Debug, Clone)]
pub struct DerivedActivationsGraph {
    graph: StableGraph<GraphNode, u64>,
    clusters: Vec<Vec<NodeIndex>>,
    context: GraphContext,
    order: usize,
    sentinels: Option<(NodeIndex, NodeIndex)>,
}

impl DerivedActivationsGraph {
    /// Order-0 wrapper: one single-element chain per node, scoped at
    /// `t_p - scope_lag`.
    pub fn from_graph(source: &ActivationsGraph) -> Self {
        let lag = source.context().scope_lag;
        let mut graph = StableGraph::with_capacity(source.node_count(), source.edge_count());
        let mut mapping = HashMap::new();

        let clusters: Vec<Vec<NodeIndex>> = source
            .clusters()
            .iter()
            .enumerate()
            .map(|(c, members)| {
                members
                    .iter()
                    .filter_map(|&old| {
                        let node = source.graph().node_weight(old)?;
                        let derived = DerivedActivationNode::new(*node, c, node.t_p - lag);
                        let index = graph.add_node(GraphNode::Activation(derived));
                        mapping.insert(old, index);
                        Some(index)
                    })
                    .collect()
            })
            .collect();

        for edge in source.graph().edge_references() {
            if let (Some(&u), Some(&v)) = (mapping.get(&edge.source()), mapping.get(&edge.target())) {
                graph.add_edge(u, v, 0);
            }
        }

        Self {
            graph,
            clusters,
            context: source.context().clone(),
            order: 0,
            sentinels: None,
        }
    }

    /// The next order. Sentinels and weights are not carried over.
    pub fn derive(&self) -> Self {
        let mut graph = StableGraph::with_capacity(self.graph.edge_count(), 0);
        let mut clusters: Vec<Vec<NodeIndex>> =
            vec![Vec::new(); self.clusters.len().saturating_sub(1)];
        let mut lifted: HashMap<EdgeIndex, NodeIndex> = HashMap::new();

        for (c, members) in self.clusters.iter().enumerate().take(clusters.len()) {
            for &u in members {
                let Some(head) = self.activation(u) else {
                    continue;
                };
                for (edge, v) in self.successors(u) {
                    let Some(tail) = self.activation(v) else {
                        continue;
                    };
                    let index = graph.add_node(GraphNode::Activation(head.extend(tail)));
                    clusters[c].push(index);
                    lifted.insert(edge, index);
                }
            }
        }

        for members in self.clusters.iter() {
            for &u in members {
                for (first, v) in self.successors(u) {
                    let Some(&from) = lifted.get(&first) else {
                        continue;
                    };
                    for (second, _) in self.successors(v) {
                        if let Some(&to) = lifted.get(&second) {
                            graph.add_edge(from, to, 0);
                        }
                    }
                }
            }
        }

        Self {
            graph,
            clusters,
            context: self.context.clone(),
            order: self.order + 1,
            sentinels: None,
        }
    }

    /// Drop nodes whose scope boundary is reached by some voices but not all.
    /// Returns how many were removed.
    pub fn remove_inconsistent_nodes(&mut self) -> usize {
        let voice_count = self.context.voice_count;
        let mut clusters = std::mem::take(&mut self.clusters);
        let mut removed = 0;

        for members in clusters.iter_mut() {
            members.retain(|&index| {
                let keep = self
                    .graph
                    .node_weight(index)
                    .and_then(GraphNode::as_activation)
                    .map_or(true, |node| node.is_consistent(voice_count));
                if !keep {
                    self.graph.remove_node(index);
                    removed += 1;
                }
                keep
            });
        }

        self.clusters = clusters;
        debug!(order = self.order, removed, remaining = self.node_count(), "pruned inconsistent nodes");
        removed
    }

    /// Add a start node feeding the first cluster and an end node fed by the
    /// last one. Does nothing if they already exist.
    pub fn add_start_end_nodes(&mut self) {
        if self.sentinels.is_some() {
            return;
        }
        let start = self.graph.add_node(GraphNode::Start);
        let end = self.graph.add_node(GraphNode::End);

        if let Some(first) = self.clusters.first() {
            for &v in first {
                self.graph.add_edge(start, v, 0);
            }
        }
        if let Some(last) = self.clusters.last() {
            for &u in last {
                self.graph.add_edge(u, end, 0);
            }
        }
        self.sentinels = Some((start, end));
    }

    /// Cost every edge by the commitments its target adds over its source.
    pub fn weight_graph(&mut self) {
        let edges: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        for edge in edges {
            let Some((u, v)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let cost = match self.graph.node_weight(v) {
                Some(GraphNode::Activation(target)) => target.transition_cost(self.activation(u)),
                _ => 0,
            };
            if let Some(weight) = self.graph.edge_weight_mut(edge) {
                *weight = cost;
            }
        }
    }

    /// Every minimum-cost start-to-end path, at most `max_paths` of them.
    /// An unreachable end yields no paths.
    pub fn shortest_paths(&self, max_paths: usize) -> Result<Vec<Path>> {
        let (start, end) = self.sentinels.ok_or(Error::MissingSentinels)?;
        let distances = dijkstra(&self.graph, start, None, |e| *e.weight());
        let Some(&cost) = distances.get(&end) else {
            return Ok(Vec::new());
        };

        let mut paths = Vec::new();
        let mut suffix = Vec::new();
        self.collect_paths(end, start, &distances, &mut suffix, &mut paths, max_paths);

        Ok(paths
            .into_iter()
            .map(|nodes| Path { nodes, cost })
            .collect())
    }

    fn collect_paths(
        &self,
        node: NodeIndex,
        start: NodeIndex,
        distances: &HashMap<NodeIndex, u64>,
        suffix: &mut Vec<NodeIndex>,
        paths: &mut Vec<Vec<NodeIndex>>,
        max_paths: usize,
    ) {
        if paths.len() >= max_paths {
            return;
        }
        if node == start {
            let nodes = suffix
                .iter()
                .rev()
                .copied()
                .filter(|&i| self.activation(i).is_some())
                .collect();
            paths.push(nodes);
            return;
        }
        let Some(&here) = distances.get(&node) else {
            return;
        };

        let mut tight: Vec<NodeIndex> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .filter(|e| distances.get(&e.source()).is_some_and(|&d| d + *e.weight() == here))
            .map(|e| e.source())
            .collect();
        tight.sort();

        suffix.push(node);
        for previous in tight {
            self.collect_paths(previous, start, distances, suffix, paths, max_paths);
        }
        suffix.pop();
    }

    /// Per-voice activations along `path`: the whole chain of its first node,
    /// then the newest element of each following node.
    pub fn reassemble(&self, path: &Path) -> Result<ActivationsStack> {
        let mut voices: Vec<Vec<(TimePoint, FrequencyPoint)>> =
            vec![Vec::new(); self.context.voice_count];

        for (position, &index) in path.nodes.iter().enumerate() {
            let Some(node) = self.activation(index) else {
                continue;
            };
            let contributed = if position == 0 {
                node.chain()
            } else {
                node.last().map(std::slice::from_ref).unwrap_or_default()
            };
            for element in contributed {
                let bucket = voices.get_mut(element.voice).ok_or_else(|| {
                    Error::Snapshot(format!(
                        "voice {} outside a {}-voice texture",
                        element.voice, self.context.voice_count
                    ))
                })?;
                bucket.push((element.t_a, element.frequency));
            }
        }

        let voices = voices
            .iter()
            .map(|points| Activations::from_points(points, self.context.tatum, self.context.step))
            .collect::<piano_roll::Result<Vec<_>>>()?;
        Ok(ActivationsStack::new(voices))
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn context(&self) -> &GraphContext {
        &self.context
    }

    pub fn clusters(&self) -> &[Vec<NodeIndex>] {
        &self.clusters
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.clusters.iter().map(Vec::len).collect()
    }

    pub fn graph(&self) -> &StableGraph<GraphNode, u64> {
        &self.graph
    }

    pub fn sentinels(&self) -> Option<(NodeIndex, NodeIndex)> {
        self.sentinels
    }

    pub fn activation(&self, index: NodeIndex) -> Option<&DerivedActivationNode> {
        self.graph.node_weight(index).and_then(GraphNode::as_activation)
    }

    /// Activation nodes, cluster by cluster.
    pub fn activations(&self) -> impl Iterator<Item = &DerivedActivationNode> + '_ {
        self.clusters
            .iter()
            .flatten()
            .filter_map(|&i| self.activation(i))
    }

    /// Activation nodes, sentinels excluded.
    pub fn node_count(&self) -> usize {
        self.clusters.iter().map(Vec::len).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges in target order.
    fn successors(&self, node: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut out: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        out.sort_by_key(|&(_, target)| target);
        out
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let mut position = HashMap::new();
        let clusters: Vec<Vec<DerivedActivationNode>> = self
            .clusters
            .iter()
            .map(|members| {
                members
                    .iter()
                    .filter_map(|&i| {
                        let node = self.activation(i)?;
                        position.insert(i, position.len());
                        Some(node.clone())
                    })
                    .collect()
            })
            .collect();

        let position = &position;
        let edges = self
            .clusters
            .iter()
            .flatten()
            .flat_map(|&u| {
                self.successors(u).into_iter().filter_map(move |(edge, v)| {
                    Some((*position.get(&u)?, *position.get(&v)?, *self.graph.edge_weight(edge)?))
                })
            })
            .collect();

        GraphSnapshot {
            order: self.order,
            context: self.context.clone(),
            clusters,
            edges,
        }
    }

    /// Rebuild from a snapshot, rejecting edges that skip or reverse clusters.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = StableGraph::new();
        let mut indices = Vec::new();
        let mut cluster_of = Vec::new();

        let clusters = snapshot
            .clusters
            .into_iter()
            .enumerate()
            .map(|(c, members)| {
                members
                    .into_iter()
                    .map(|node| {
                        if node.chain().len() != snapshot.order + 1 {
                            return Err(Error::Snapshot(format!(
                                "chain of length {} in an order-{} graph",
                                node.chain().len(),
                                snapshot.order
                            )));
                        }
                        let index = graph.add_node(GraphNode::Activation(node));
                        indices.push(index);
                        cluster_of.push(c);
                        Ok(index)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        for (u, v, weight) in snapshot.edges {
            let (Some(&from), Some(&to)) = (indices.get(u), indices.get(v)) else {
                return Err(Error::Snapshot(format!("edge {u} -> {v} names a missing node")));
            };
            if cluster_of[v] != cluster_of[u] + 1 {
                return Err(Error::Snapshot(format!(
                    "edge {u} -> {v} joins clusters {} and {}",
                    cluster_of[u], cluster_of[v]
                )));
            }
            graph.add_edge(from, to, weight);
        }

        Ok(Self {
            graph,
            clusters,
            context: snapshot.context,
            order: snapshot.order,
            sentinels: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ScanOrder;
    use crate::node::ActivationNode;
    use piano_roll::{Rational, TimeShift};
    use pretty_assertions::assert_eq;

    fn context(voice_count: usize) -> GraphContext {
        GraphContext {
            voice_count,
            tatum: Rational::new(1, 4),
            step: Rational::from_integer(1),
            scope_lag: TimeShift::zero(),
            texture_cells: 1,
            max_simultaneous_voices: 1,
            max_cells_per_slice: 1,
            scan: ScanOrder::TimeMajor,
        }
    }

    fn node(quarter: i64, voice: usize) -> ActivationNode {
        ActivationNode {
            t_p: TimePoint::new(quarter, 4),
            t_a: TimePoint::new(quarter, 4),
            frequency: FrequencyPoint::from_integer(60),
            voice,
        }
    }

    fn diamond() -> ActivationsGraph {
        ActivationsGraph::from_clusters(
            vec![vec![node(0, 0)], vec![node(1, 0), node(2, 0)], vec![node(3, 0)]],
            context(1),
        )
    }

    #[test]
    fn derive_lifts_edges_into_nodes() {
        let order0 = DerivedActivationsGraph::from_graph(&diamond());
        assert_eq!(order0.cluster_sizes(), vec![1, 2, 1]);

        let order1 = order0.derive();
        assert_eq!(order1.order(), 1);
        assert_eq!(order1.cluster_sizes(), vec![2, 2]);
        assert_eq!(order1.edge_count(), 2);
        for node in order1.activations() {
            assert_eq!(node.chain().len(), 2);
        }

        let order2 = order1.derive();
        assert_eq!(order2.cluster_sizes(), vec![2]);
        assert_eq!(order2.edge_count(), 0);
    }

    #[test]
    fn two_equal_routes_are_both_found() {
        let mut graph = DerivedActivationsGraph::from_graph(&diamond());
        graph.add_start_end_nodes();
        graph.weight_graph();

        let paths = graph.shortest_paths(10).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.cost == 6 && p.nodes.len() == 3));
        assert_eq!(graph.shortest_paths(1).unwrap().len(), 1);
    }

    #[test]
    fn cheaper_route_wins() {
        // The middle choice that reuses the first onset time adds nothing new.
        let repeat = ActivationNode {
            t_p: TimePoint::new(1, 4),
            ..node(0, 0)
        };
        let clusters = vec![vec![node(0, 0)], vec![repeat, node(2, 0)], vec![node(3, 0)]];
        let mut graph =
            DerivedActivationsGraph::from_graph(&ActivationsGraph::from_clusters(clusters, context(1)));
        graph.add_start_end_nodes();
        graph.weight_graph();

        let paths = graph.shortest_paths(10).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].cost, 4);

        let stack = graph.reassemble(&paths[0]).unwrap();
        let points = stack.voice(0).unwrap().points();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn paths_need_sentinels() {
        let graph = DerivedActivationsGraph::from_graph(&diamond());
        assert!(matches!(graph.shortest_paths(10), Err(Error::MissingSentinels)));
    }

    #[test]
    fn snapshot_roundtrip_keeps_structure() {
        let graph = DerivedActivationsGraph::from_graph(&diamond()).derive();
        let restored = DerivedActivationsGraph::from_snapshot(graph.snapshot()).unwrap();

        assert_eq!(restored.order(), 1);
        assert_eq!(restored.cluster_sizes(), graph.cluster_sizes());
        assert_eq!(restored.edge_count(), graph.edge_count());
        assert_eq!(restored.snapshot(), graph.snapshot());
    }

    #[test]
    fn snapshot_rejects_cluster_skips() {
        let mut snapshot = DerivedActivationsGraph::from_graph(&diamond()).snapshot();
        snapshot.edges.push((0, 3, 0));
        assert!(matches!(
            DerivedActivationsGraph::from_snapshot(snapshot),
            Err(Error::Snapshot(_))
        ));
    }
}
