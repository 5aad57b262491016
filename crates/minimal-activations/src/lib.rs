//! Minimal voice activations for a piano roll.
//!
//! Builds a layered graph of candidate onsets from a roll's erosion by a
//! texture, derives it to widen the window over which consistency is
//! checked, prunes partial voice boundaries and enumerates the cheapest
//! covering paths. Each path reassembles into an [`ActivationsStack`] that
//! dilates back to the roll.
//!
//! [`ActivationsStack`]: piano_roll::ActivationsStack

pub mod checkpoint;
pub mod config;
pub mod derived;
pub mod graph;
pub mod node;
pub mod search;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore, CHECKPOINT_VERSION};
pub use config::DecompositionConfig;
pub use derived::{DerivedActivationsGraph, GraphSnapshot, Path};
pub use graph::{ActivationsGraph, GraphContext, ScanOrder};
pub use node::{ActivationNode, DerivedActivationNode, GraphNode};
pub use search::{
    derivation_order, find_minimal_activations, Decomposer, MinimalActivations, OrderRegime,
    SearchOptions,
};

/// Errors from graph construction, derivation and path search.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Roll(#[from] piano_roll::Error),

    #[error("graph has no start and end sentinels")]
    MissingSentinels,

    #[error("invalid graph snapshot: {0}")]
    Snapshot(String),
}

pub type Result<T> = std::result::Result<T, Error>;
