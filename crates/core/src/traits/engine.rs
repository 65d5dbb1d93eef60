//! Block engine traits.
//!
//! The block engine builds, validates, stores and commits blocks. The
//! round-progress loop only tells it what to do next; every request returns
//! immediately and reports its outcome later as an [`EngineEvent`].

use ebft_types::{BlockRid, Signature, ValidatorIndex};
use thiserror::Error;

/// Errors returned when the engine cannot accept a request.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine is shutting down or not started.
    #[error("block engine unavailable: {0}")]
    Unavailable(String),

    /// The engine has no data for the block.
    #[error("unknown block {0}")]
    UnknownBlock(BlockRid),

    /// Any other engine failure.
    #[error("block engine error: {0}")]
    Internal(String),
}

/// Result type for block engine requests.
pub type EngineResult<T> = Result<T, EngineError>;

/// Outcome of an earlier engine request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A block requested with [`BlockEngine::build_block`] is ready and signed.
    BlockBuilt {
        /// Identifier of the built block
        rid: BlockRid,
        /// This node's signature over it
        signature: Signature,
    },
    /// A candidate requested with [`BlockEngine::load_unfinished_block`] was
    /// fetched, validated and signed.
    BlockLoaded {
        /// Identifier of the candidate
        rid: BlockRid,
        /// This node's signature over it
        signature: Signature,
    },
    /// A block handed to [`BlockEngine::commit_block`] is durable.
    BlockCommitted {
        /// Identifier of the committed block
        rid: BlockRid,
    },
    /// A finished block fetched with [`BlockEngine::fetch_block_at_height`]
    /// was applied.
    BlockAdded {
        /// Height of the applied block
        height: u64,
    },
}

/// The block pipeline as seen by the round-progress loop.
pub trait BlockEngine: Send {
    /// Start building a block at `height`.
    fn build_block(&mut self, height: u64) -> EngineResult<()>;

    /// Fetch and validate the candidate `rid` from `from`.
    fn load_unfinished_block(&mut self, rid: BlockRid, from: ValidatorIndex) -> EngineResult<()>;

    /// Fetch the finished block at `height` from `from`.
    fn fetch_block_at_height(&mut self, height: u64, from: ValidatorIndex) -> EngineResult<()>;

    /// Commit `rid` with the collected signatures, one slot per validator.
    fn commit_block(&mut self, rid: BlockRid, signatures: Vec<Option<Signature>>)
        -> EngineResult<()>;

    /// This node's signature for an already committed block.
    fn block_signature(&self, rid: &BlockRid) -> Option<Signature>;

    /// Whether there is work that justifies a new block right now.
    fn should_build_block(&self) -> bool;

    /// Timestamp (milliseconds) of the last committed block, or `-1` if none.
    fn last_block_timestamp(&self) -> i64;

    /// Take every event produced since the last call.
    fn poll_events(&mut self) -> Vec<EngineEvent>;
}
