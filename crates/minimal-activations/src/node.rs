use std::collections::BTreeSet;
use std::fmt;

use piano_roll::{FrequencyPoint, TimePoint};
use serde::{Deserialize, Serialize};

/// One way to explain one roll cell: the cell at `t_p` is sounded by an
/// onset of `voice` at time `t_a` and pitch `frequency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivationNode {
    pub t_p: TimePoint,
    pub t_a: TimePoint,
    pub frequency: FrequencyPoint,
    pub voice: usize,
}

impl ActivationNode {
    /// The activation this node commits to, independent of the cell it explains.
    pub fn identity(&self) -> (TimePoint, FrequencyPoint, usize) {
        (self.t_a, self.frequency, self.voice)
    }
}

impl fmt::Display for ActivationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}@{}:{} (cell {})", self.voice, self.t_a, self.frequency, self.t_p)
    }
}

/// A run of consecutive [`ActivationNode`]s, one per cluster.
///
/// Identity is the whole chain together with its cluster and scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedActivationNode {
    chain: Vec<ActivationNode>,
    cluster: usize,
    t_scope: TimePoint,
}

impl DerivedActivationNode {
    pub fn new(node: ActivationNode, cluster: usize, t_scope: TimePoint) -> Self {
        Self {
            chain: vec![node],
            cluster,
            t_scope,
        }
    }

    /// This chain followed by the newest element of `next`, scoped like `next`.
    pub fn extend(&self, next: &DerivedActivationNode) -> Self {
        let mut chain = self.chain.clone();
        chain.extend(next.chain.last().copied());
        Self {
            chain,
            cluster: self.cluster,
            t_scope: next.t_scope,
        }
    }

    pub fn chain(&self) -> &[ActivationNode] {
        &self.chain
    }

    pub fn cluster(&self) -> usize {
        self.cluster
    }

    pub fn t_scope(&self) -> TimePoint {
        self.t_scope
    }

    pub fn first(&self) -> Option<&ActivationNode> {
        self.chain.first()
    }

    pub fn last(&self) -> Option<&ActivationNode> {
        self.chain.last()
    }

    /// Distinct `(onset, pitch, voice)` commitments along the chain.
    pub fn identities(&self) -> BTreeSet<(TimePoint, FrequencyPoint, usize)> {
        self.chain.iter().map(ActivationNode::identity).collect()
    }

    /// Distinct onset times along the chain.
    pub fn onset_times(&self) -> BTreeSet<TimePoint> {
        self.chain.iter().map(|n| n.t_a).collect()
    }

    /// Voices with an onset exactly at the scope boundary.
    pub fn boundary_voices(&self) -> BTreeSet<usize> {
        self.chain
            .iter()
            .filter(|n| n.t_a == self.t_scope)
            .map(|n| n.voice)
            .collect()
    }

    /// Either no voice or every voice reaches the scope boundary.
    pub fn is_consistent(&self, voice_count: usize) -> bool {
        let voices = self.boundary_voices();
        voices.is_empty() || voices.len() == voice_count
    }

    /// Cost of stepping from `previous` to `self`: new commitments plus new
    /// onset times. From the start sentinel everything is new.
    pub fn transition_cost(&self, previous: Option<&DerivedActivationNode>) -> u64 {
        let identities = self.identities();
        let times = self.onset_times();
        let (new_identities, new_times) = match previous {
            None => (identities.len(), times.len()),
            Some(previous) => (
                identities.difference(&previous.identities()).count(),
                times.difference(&previous.onset_times()).count(),
            ),
        };
        (new_identities + new_times) as u64
    }
}

impl fmt::Display for DerivedActivationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, node) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{node}")?;
        }
        write!(f, "] scope {}", self.t_scope)
    }
}

/// Vertex of a derived graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Start,
    End,
    Activation(DerivedActivationNode),
}

impl GraphNode {
    pub fn as_activation(&self) -> Option<&DerivedActivationNode> {
        match self {
            GraphNode::Activation(node) => Some(node),
            GraphNode::Start | GraphNode::End => None,
        }
    }
}
