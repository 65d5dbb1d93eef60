//! Node-level errors.

use ebft_config::ConfigError;
use ebft_consensus::ConsensusError;
use thiserror::Error;

/// Errors raised while setting up or running validator workers.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The round-progress loop failed
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Malformed validator identity
    #[error("invalid identity: {0}")]
    Identity(#[from] ebft_types::Error),

    /// A worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread panicked
    #[error("worker {0} panicked")]
    WorkerPanicked(String),

    /// The configuration does not name this node as a validator
    #[error("node is not in the validator set")]
    NotValidator,
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;
