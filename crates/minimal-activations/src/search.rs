//! Drives derivation to a chosen order and extracts minimal activations.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use piano_roll::ActivationsStack;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checkpoint::{CheckpointStore, SqliteCheckpointStore};
use crate::config::DecompositionConfig;
use crate::derived::{DerivedActivationsGraph, Path};
use crate::graph::{ActivationsGraph, GraphContext, ScanOrder};

/// Which size bound picks the derivation order when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderRegime {
    /// Dense for time-major scans, sparse for frequency-major ones.
    #[default]
    Auto,
    /// Texture length in tatums, minus one.
    Dense,
    /// Texture length in tatums times the widest time slice, minus one.
    Sparse,
}

impl OrderRegime {
    /// The concrete regime for a graph scanned in `scan` order.
    ///
    /// A frequency-major scan visits every cell of a chord before moving on
    /// in time, so its windows have to span whole slices.
    pub fn resolve(self, scan: ScanOrder) -> OrderRegime {
        match (self, scan) {
            (OrderRegime::Auto, ScanOrder::TimeMajor) => OrderRegime::Dense,
            (OrderRegime::Auto, ScanOrder::FrequencyMajor) => OrderRegime::Sparse,
            (regime, _) => regime,
        }
    }
}

impl FromStr for OrderRegime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(OrderRegime::Auto),
            "dense" => Ok(OrderRegime::Dense),
            "sparse" => Ok(OrderRegime::Sparse),
            other => Err(format!(
                "unknown order regime '{other}', expected auto, dense or sparse"
            )),
        }
    }
}

impl fmt::Display for OrderRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderRegime::Auto => write!(f, "auto"),
            OrderRegime::Dense => write!(f, "dense"),
            OrderRegime::Sparse => write!(f, "sparse"),
        }
    }
}

/// Heuristic derivation order for a graph built from `context`.
///
/// The sparse width is the larger of the most voices sounding together in
/// the texture and the most active cells in one slice of the roll.
pub fn derivation_order(context: &GraphContext, regime: OrderRegime) -> usize {
    let window = match regime.resolve(context.scan) {
        OrderRegime::Sparse => {
            let width = context
                .max_simultaneous_voices
                .max(context.max_cells_per_slice);
            context.texture_cells * width
        }
        OrderRegime::Dense | OrderRegime::Auto => context.texture_cells,
    };
    window.saturating_sub(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Derivation order; chosen by `regime` when unset.
    pub order: Option<usize>,
    pub max_paths: usize,
    pub regime: OrderRegime,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            order: None,
            max_paths: 10,
            regime: OrderRegime::Auto,
        }
    }
}

/// Result of a search: the cheapest paths, their per-voice activations and
/// the pruned, weighted graph they run through.
#[derive(Debug, Clone)]
pub struct MinimalActivations {
    pub paths: Vec<Path>,
    pub stacks: Vec<ActivationsStack>,
    pub graph: DerivedActivationsGraph,
    pub order: usize,
}

impl MinimalActivations {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn cost(&self) -> Option<u64> {
        self.paths.first().map(|p| p.cost)
    }
}

/// Derive `graph` to the requested order, prune, weight and enumerate the
/// cheapest paths. No path is an empty result, not an error.
pub fn find_minimal_activations(
    graph: &ActivationsGraph,
    options: &SearchOptions,
) -> Result<MinimalActivations> {
    search(graph, options, None)
}

/// [`find_minimal_activations`] with every derived order checkpointed.
pub struct Decomposer {
    store: Arc<dyn CheckpointStore>,
}

impl Decomposer {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Open the SQLite store named by `config` for `run`.
    pub fn from_config(config: &DecompositionConfig, run: &str) -> Result<Self> {
        let path = config.checkpoint_path();
        let store = SqliteCheckpointStore::open(&path, run)
            .with_context(|| format!("opening checkpoints for run '{run}'"))?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn decompose(
        &self,
        graph: &ActivationsGraph,
        options: &SearchOptions,
    ) -> Result<MinimalActivations> {
        search(graph, options, Some(self.store.as_ref()))
    }
}

fn search(
    graph: &ActivationsGraph,
    options: &SearchOptions,
    store: Option<&dyn CheckpointStore>,
) -> Result<MinimalActivations> {
    let requested = options
        .order
        .unwrap_or_else(|| derivation_order(graph.context(), options.regime));
    let target = requested.min(graph.clusters().len().saturating_sub(1));
    if target < requested {
        debug!(requested, target, "derivation order capped by cluster count");
    }

    // Checkpoints are only shared between runs over the same order-0 graph.
    let store = match store {
        Some(store) => Some((store, graph.content_hash()?)),
        None => None,
    };
    let resumed = match &store {
        Some((store, graph_hash)) => resume(*store, graph_hash, target)?,
        None => None,
    };
    let mut derived = match resumed {
        Some(checkpoint) => checkpoint,
        None => {
            let base = DerivedActivationsGraph::from_graph(graph);
            if let Some((store, graph_hash)) = &store {
                store
                    .save(graph_hash, 0, &base)
                    .context("saving order-0 checkpoint")?;
            }
            base
        }
    };

    while derived.order() < target {
        let started = Instant::now();
        derived = derived.derive();
        info!(
            order = derived.order(),
            nodes = derived.node_count(),
            edges = derived.edge_count(),
            clusters = derived.clusters().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "derived activation graph"
        );
        if let Some((store, graph_hash)) = &store {
            store
                .save(graph_hash, derived.order(), &derived)
                .with_context(|| format!("saving order-{} checkpoint", derived.order()))?;
        }
    }

    derived.remove_inconsistent_nodes();
    derived.add_start_end_nodes();
    derived.weight_graph();

    let paths = derived.shortest_paths(options.max_paths)?;
    match paths.first() {
        Some(path) => info!(paths = paths.len(), cost = path.cost, order = target, "found minimal activations"),
        None => info!(order = target, "no covering path"),
    }

    let stacks = paths
        .iter()
        .map(|path| derived.reassemble(path))
        .collect::<crate::Result<Vec<_>>>()?;
    for (i, stack) in stacks.iter().enumerate() {
        debug!(path = i, activations = stack.total(), "reassembled path");
    }

    Ok(MinimalActivations {
        paths,
        stacks,
        graph: derived,
        order: target,
    })
}

/// Highest checkpointed order not above `target`.
fn resume(
    store: &dyn CheckpointStore,
    graph_hash: &str,
    target: usize,
) -> Result<Option<DerivedActivationsGraph>> {
    for order in (0..=target).rev() {
        if let Some(graph) = store.load(graph_hash, order)? {
            info!(order, graph_hash, nodes = graph.node_count(), "checkpoint hit");
            return Ok(Some(graph));
        }
    }
    info!(target, graph_hash, "checkpoint miss");
    Ok(None)
}
