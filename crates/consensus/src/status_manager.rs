//! Status intake, revolt accounting and the per-height block protocol.
//!
//! The [`StatusManager`] owns the [`StatusTable`] and everything that must
//! change together with it: the reported-revolt flags, the round tally, the
//! commit signatures and the revolt metrics. It is single-owner state; the
//! round-progress loop holds it by value and mutates it on its own thread.
//!
//! ## Per-height protocol
//!
//! ```text
//!                    primary builds / candidate loaded
//! AwaitingProposal ─────────────────────────────────────▶ HaveBlock
//!        ▲                                                    │
//!        │                        quorum on the same candidate│
//!        │                                                    ▼
//!        │            block committed                     Prepared
//!        └──────────────── (height + 1) ◀──────────── quorum of commit
//!                                                         signatures
//! ```
//!
//! A quorum of revolters at the current round (or peers already on a later
//! round) moves the node to `round + 1`, dropping an unprepared candidate.
//! After every input the state is recomputed until it settles, yielding the
//! next [`BlockIntent`].

use std::sync::Arc;

use ebft_core::Clock;
use ebft_types::{BlockRid, NodePhase, NodeStatus, Signature, ValidatorIndex};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::error::{StatusError, StatusResult};
use crate::quorum::{primary_for_round, required_signatures};
use crate::revolt::{RevoltMetrics, RoundRevoltTally};
use crate::status_table::StatusTable;

/// Epoch (milliseconds) that status serials count from.
///
/// Seeding the serial from the wall clock keeps a restarted node's statuses
/// fresher than the ones it sent before the restart.
pub const ZERO_SERIAL_TIME: i64 = 1_518_000_000_000;

/// Upper bound on recompute iterations per input
const MAX_RECOMPUTE_ITERATIONS: usize = 1_000;

/// What the node should do next for the current block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockIntent {
    /// Nothing to do
    DoNothing,
    /// This node is primary: build a candidate
    BuildBlock,
    /// Enough commit signatures: commit the candidate
    CommitBlock,
    /// Behind the network: fetch the finished block at `height`
    FetchBlockAtHeight {
        /// Height of the missing block
        height: u64,
    },
    /// The primary published a candidate: fetch and validate it
    FetchUnfinishedBlock {
        /// Candidate block
        rid: BlockRid,
    },
    /// Prepared: request missing commit signatures
    FetchCommitSignatures {
        /// Candidate block
        rid: BlockRid,
        /// Validators whose signatures are missing
        nodes: Vec<ValidatorIndex>,
    },
}

/// Outcome of one recompute step
enum Flow {
    /// State changed, evaluate again
    Again,
    /// Settled
    Done,
    /// Nothing decided yet, continue with the phase handlers
    RunOn,
}

/// Coordinator of the local node's view of consensus progress.
pub struct StatusManager {
    table: StatusTable,
    commit_signatures: Vec<Option<Signature>>,
    intent: BlockIntent,
    round_revolts: RoundRevoltTally,
    metrics: RevoltMetrics,
    latest_status_timestamps: Vec<Option<i64>>,
    work_allowed: bool,
    clock: Arc<dyn Clock>,
}

impl StatusManager {
    /// Creates a manager for `node_count` validators, starting at
    /// `my_next_height`.
    pub fn new(
        node_count: usize,
        my_index: ValidatorIndex,
        my_next_height: u64,
        clock: Arc<dyn Clock>,
    ) -> StatusResult<Self> {
        let serial = (clock.now_millis() - ZERO_SERIAL_TIME).max(0) as u64;
        let table = StatusTable::new(node_count, my_index, NodeStatus::new(my_next_height, serial))?;
        let mut manager = Self {
            table,
            commit_signatures: vec![None; node_count],
            intent: BlockIntent::DoNothing,
            round_revolts: RoundRevoltTally::new(node_count, 0),
            metrics: RevoltMetrics::default(),
            latest_status_timestamps: vec![None; node_count],
            work_allowed: true,
            clock,
        };
        manager.recompute();
        Ok(manager)
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Number of validators.
    pub fn node_count(&self) -> usize {
        self.table.len()
    }

    /// Index of the local node.
    pub fn my_index(&self) -> ValidatorIndex {
        self.table.my_index()
    }

    /// The local node's status.
    pub fn my_status(&self) -> &NodeStatus {
        self.table.mine()
    }

    /// Height the local node works on.
    pub fn current_height(&self) -> u64 {
        self.my_status().height
    }

    /// The status table.
    pub fn table(&self) -> &StatusTable {
        &self.table
    }

    /// Copy of every status, in index order.
    pub fn snapshot(&self) -> Vec<NodeStatus> {
        self.table.snapshot()
    }

    /// Primary of the local node's current round.
    pub fn primary_index(&self) -> ValidatorIndex {
        primary_for_round(self.my_status().round, self.node_count()).unwrap_or(0)
    }

    /// Whether the local node is the current primary.
    pub fn is_my_node_primary(&self) -> bool {
        self.primary_index() == self.my_index()
    }

    /// Current intent.
    pub fn block_intent(&self) -> &BlockIntent {
        &self.intent
    }

    /// The local node's signature over its candidate, if it has one.
    pub fn commit_signature(&self) -> Option<&Signature> {
        self.commit_signatures[self.my_index()].as_ref()
    }

    /// Collected commit signatures, one slot per validator.
    pub fn commit_signatures(&self) -> &[Option<Signature>] {
        &self.commit_signatures
    }

    /// Revolt counters.
    pub fn revolt_metrics(&self) -> RevoltMetrics {
        self.metrics
    }

    /// Distinct revolters counted at the current round.
    pub fn round_revolt_count(&self) -> usize {
        self.round_revolts.count()
    }

    /// Local time (milliseconds) the last accepted status from `index`
    /// arrived, if any.
    pub fn latest_status_timestamp(&self, index: ValidatorIndex) -> Option<i64> {
        self.latest_status_timestamps.get(index).copied().flatten()
    }

    /// Whether a commit signature carried in a peer status in `phase` should
    /// be applied.
    pub fn should_apply_signature(&self, phase: NodePhase) -> bool {
        phase == NodePhase::Prepared && self.my_status().phase == NodePhase::Prepared
    }

    // =========================================================================
    // Revolt accounting
    // =========================================================================

    /// Counts a revolt reported by `reporter` in `status`.
    ///
    /// Reports for another height are dropped. Each reporter is counted once
    /// per height; the count lands on exactly one of the three metrics.
    pub fn report_revolt(&mut self, reporter: ValidatorIndex, status: &NodeStatus) -> StatusResult<()> {
        self.table.get(reporter)?;

        let my = self.table.mine();
        if status.height != my.height {
            trace!(
                reporter,
                height = status.height,
                my_height = my.height,
                "Ignoring revolt report for another height"
            );
            return Ok(());
        }

        let my_round = my.round;
        let my_index = self.my_index();
        let target = primary_for_round(status.round, self.node_count()).unwrap_or(0);

        if status.round == my_round {
            self.round_revolts.record(reporter);
        }

        if !self.table.mark_reported_revolt(reporter)? {
            trace!(reporter, round = status.round, "Revolt already counted at this height");
            return Ok(());
        }

        if target == my_index {
            self.metrics.record_on_node();
            info!(
                reporter,
                height = status.height,
                round = status.round,
                "Validator revolted against this node"
            );
        } else if reporter == my_index {
            self.metrics.record_by_node();
            info!(
                target,
                height = status.height,
                round = status.round,
                "This node revolted"
            );
        } else {
            self.metrics.record_between_others();
            info!(
                reporter,
                target,
                height = status.height,
                round = status.round,
                "Validator revolted against another validator"
            );
        }

        Ok(())
    }

    /// Records a revolt started by `node_index` (the local node).
    pub fn log_revolt(&mut self, node_index: ValidatorIndex, status: &NodeStatus) {
        self.metrics.record_by_node();
        info!(
            node = node_index,
            height = status.height,
            round = status.round,
            primary = primary_for_round(status.round, self.node_count()).unwrap_or(0),
            "Revolting against primary"
        );
    }

    /// Clears the height-scoped reported-revolt flags.
    pub fn reset(&mut self) {
        self.table.clear_reported_revolts();
        debug!(height = self.current_height(), "Revolt flags reset");
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Allows or withholds the prepared vote. While withheld the node stays
    /// in `HaveBlock` even when a quorum agrees on its candidate.
    pub fn set_work_allowed(&mut self, allowed: bool) {
        if self.work_allowed == allowed {
            return;
        }
        self.work_allowed = allowed;
        if allowed {
            self.recompute();
        }
    }

    /// Whether the prepared vote may be cast.
    pub fn work_allowed(&self) -> bool {
        self.work_allowed
    }

    /// Applies a status received from validator `index`.
    ///
    /// The status replaces the stored one only if it
    /// [supersedes](NodeStatus::supersedes) it; anything else is stale and
    /// ignored.
    pub fn on_status_update(&mut self, index: ValidatorIndex, status: NodeStatus) -> StatusResult<()> {
        if index == self.my_index() {
            return Err(StatusError::LocalSlot(index));
        }
        if !status.supersedes(self.table.get(index)?) {
            trace!(node = index, serial = status.serial, "Ignoring stale status");
            return Ok(());
        }

        let revolting = status.revolting;
        let reported = status.clone();
        self.table.set_peer(index, status)?;
        self.latest_status_timestamps[index] = Some(self.clock.now_millis());

        if revolting {
            self.report_revolt(index, &reported)?;
        }

        self.recompute();
        Ok(())
    }

    /// Replaces the local status wholesale, e.g. when the block engine
    /// reports where the chain actually is.
    pub fn set_my_status(&mut self, status: NodeStatus) {
        let height_changed = status.height != self.current_height();
        self.table.set_mine(status);
        if height_changed {
            self.reset_commit_signatures();
            self.intent = BlockIntent::DoNothing;
            self.reset();
        }
        self.reseed_round_tally();
        self.recompute();
    }

    /// Moves to `height` after a block was added outside the normal commit
    /// path. Only the next height is accepted.
    pub fn on_height_advance(&mut self, height: u64) -> bool {
        if height == self.current_height() + 1 {
            self.advance_height();
            true
        } else {
            error!(
                my_height = self.current_height(),
                height, "Height mismatch on height advance"
            );
            false
        }
    }

    /// Jumps forward to `next_height` after a bulk catch-up.
    pub fn fast_forward_height(&mut self, next_height: u64) -> bool {
        if next_height <= self.current_height() {
            return false;
        }
        while self.current_height() < next_height {
            self.advance_height_without_recompute();
        }
        self.recompute();
        true
    }

    /// The local candidate was committed.
    pub fn on_committed_block(&mut self, rid: &BlockRid) -> bool {
        if self.my_status().block_rid.as_ref() == Some(rid) {
            self.advance_height();
            true
        } else {
            error!(rid = %rid, "Committed block with wrong RID");
            false
        }
    }

    /// A candidate fetched from the primary was validated and signed.
    pub fn on_received_block(&mut self, rid: BlockRid, my_signature: Signature) -> bool {
        match &self.intent {
            BlockIntent::FetchUnfinishedBlock { rid: wanted } if *wanted == rid => {
                self.accept_block(rid, my_signature);
                true
            }
            BlockIntent::FetchUnfinishedBlock { rid: wanted } => {
                warn!(wanted = %wanted, got = %rid, "Received block which is irrelevant");
                false
            }
            other => {
                warn!(intent = ?other, "Received block while not fetching one");
                false
            }
        }
    }

    /// The local node finished building a candidate.
    pub fn on_built_block(&mut self, rid: BlockRid, my_signature: Signature) -> bool {
        if self.intent != BlockIntent::BuildBlock {
            warn!(rid = %rid, "Received built block while not requesting it");
            return false;
        }
        if !self.is_my_node_primary() {
            warn!(rid = %rid, "Inconsistent state: built a block while not primary");
            return false;
        }
        self.accept_block(rid, my_signature);
        true
    }

    /// A commit signature from `index` for `rid` arrived.
    pub fn on_commit_signature(
        &mut self,
        index: ValidatorIndex,
        rid: &BlockRid,
        signature: Signature,
    ) -> StatusResult<()> {
        self.table.get(index)?;
        let my = self.my_status();
        if my.phase == NodePhase::Prepared && my.block_rid.as_ref() == Some(rid) {
            self.commit_signatures[index] = Some(signature);
            self.recompute();
        } else {
            debug!(node = index, rid = %rid, "Commit signature not needed");
        }
        Ok(())
    }

    /// The local node gives up on the current primary.
    pub fn on_start_revolting(&mut self) {
        let my_index = self.my_index();
        let status = {
            let my = self.table.mine_mut();
            my.revolting = true;
            my.serial += 1;
            my.clone()
        };
        self.log_revolt(my_index, &status);
        self.round_revolts.record(my_index);
        self.recompute();
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    fn accept_block(&mut self, rid: BlockRid, my_signature: Signature) {
        self.reset_commit_signatures();
        let my_index = self.my_index();
        {
            let my = self.table.mine_mut();
            my.block_rid = Some(rid);
            my.serial += 1;
            my.phase = NodePhase::HaveBlock;
        }
        self.commit_signatures[my_index] = Some(my_signature);
        self.intent = BlockIntent::DoNothing;
        debug!(rid = %rid, height = self.current_height(), "Accepted candidate block");
        self.recompute();
    }

    fn advance_height(&mut self) {
        self.advance_height_without_recompute();
        self.recompute();
    }

    fn advance_height_without_recompute(&mut self) {
        {
            let my = self.table.mine_mut();
            my.height += 1;
            my.serial += 1;
            my.block_rid = None;
            my.signature = None;
            my.round = 0;
            my.revolting = false;
            my.phase = NodePhase::AwaitingProposal;
        }
        self.reset_commit_signatures();
        self.intent = BlockIntent::DoNothing;
        self.reset();
        self.reseed_round_tally();
        info!(height = self.current_height(), "Advanced to next height");
    }

    fn reset_block(&mut self) {
        {
            let my = self.table.mine_mut();
            my.phase = NodePhase::AwaitingProposal;
            my.block_rid = None;
            my.signature = None;
            my.serial += 1;
        }
        self.reset_commit_signatures();
    }

    fn reset_commit_signatures(&mut self) {
        self.commit_signatures.iter_mut().for_each(|s| *s = None);
    }

    /// Rebuilds the round tally from the table after the local round or
    /// height moved.
    fn reseed_round_tally(&mut self) {
        let (height, round) = {
            let my = self.my_status();
            (my.height, my.round)
        };
        self.round_revolts.reset(round);
        let revolters: Vec<ValidatorIndex> = self
            .table
            .iter()
            .filter(|(_, s)| s.height == height && s.round == round && s.revolting)
            .map(|(i, _)| i)
            .collect();
        for index in revolters {
            self.round_revolts.record(index);
        }
    }

    // =========================================================================
    // Recompute
    // =========================================================================

    fn recompute(&mut self) {
        for _ in 0..MAX_RECOMPUTE_ITERATIONS {
            if !self.recompute_step() {
                return;
            }
        }
        warn!(
            height = self.current_height(),
            round = self.my_status().round,
            "Status recompute did not settle"
        );
    }

    /// One evaluation of the state. Returns `true` if something changed.
    fn recompute_step(&mut self) -> bool {
        if self.my_status().phase != NodePhase::Prepared {
            match self.potentially_sync() {
                Flow::Again => return true,
                Flow::Done => return false,
                Flow::RunOn => {}
            }
        }

        match self.potentially_revolt() {
            Flow::Again => return true,
            Flow::Done => return false,
            Flow::RunOn => {}
        }

        match self.my_status().phase {
            NodePhase::AwaitingProposal => self.handle_awaiting_proposal(),
            NodePhase::HaveBlock => self.handle_have_block(),
            NodePhase::Prepared => self.handle_prepared(),
            NodePhase::Committed => false,
        }
    }

    /// Too few validators at our height and some ahead: fetch the block.
    fn potentially_sync(&mut self) -> Flow {
        let height = self.current_height();
        let same_height = self.table.iter().filter(|(_, s)| s.height == height).count();
        let higher = self.table.iter().filter(|(_, s)| s.height > height).count();

        if same_height >= required_signatures(self.node_count()) || higher == 0 {
            return Flow::RunOn;
        }

        if let BlockIntent::FetchBlockAtHeight { height: wanted } = self.intent {
            if wanted == height {
                return Flow::Done;
            }
        }

        if self.my_status().phase == NodePhase::HaveBlock {
            warn!(height, "Dropping candidate block to catch up");
            self.reset_block();
        }

        self.intent = BlockIntent::FetchBlockAtHeight { height };
        Flow::Again
    }

    /// A quorum revolts against the current primary: move to the next round.
    fn potentially_revolt(&mut self) -> Flow {
        let (height, round) = {
            let my = self.my_status();
            (my.height, my.round)
        };
        let votes = self
            .table
            .iter()
            .filter(|(i, s)| {
                s.height == height && (s.round > round || self.round_revolts.contains(*i))
            })
            .count();

        if votes < required_signatures(self.node_count()) {
            return Flow::RunOn;
        }

        let phase = self.my_status().phase;
        if phase == NodePhase::HaveBlock {
            self.reset_block();
        }
        {
            let my = self.table.mine_mut();
            my.revolting = false;
            my.round += 1;
            my.serial += 1;
        }
        // A prepared candidate may already be committed elsewhere; keep it and
        // its pending commit work.
        if phase != NodePhase::Prepared {
            self.intent = BlockIntent::DoNothing;
        }
        self.reseed_round_tally();
        info!(
            height,
            round = round + 1,
            votes,
            primary = self.primary_index(),
            "Round advanced"
        );
        Flow::Again
    }

    fn handle_awaiting_proposal(&mut self) -> bool {
        if self.is_my_node_primary() {
            if self.intent != BlockIntent::BuildBlock {
                self.intent = BlockIntent::BuildBlock;
                return true;
            }
            return false;
        }

        let height = self.current_height();
        let primary = match self.table.get(self.primary_index()) {
            Ok(status) => status,
            Err(_) => return false,
        };
        let Some(rid) = primary.block_rid.filter(|_| primary.height == height) else {
            return false;
        };

        let wanted = BlockIntent::FetchUnfinishedBlock { rid };
        if self.intent != wanted {
            self.intent = wanted;
            return true;
        }
        false
    }

    fn handle_have_block(&mut self) -> bool {
        let (height, rid) = {
            let my = self.my_status();
            (my.height, my.block_rid)
        };
        let agreeing = self
            .table
            .iter()
            .filter(|(_, s)| s.height == height && s.phase.has_block() && s.block_rid == rid)
            .count();

        if agreeing < required_signatures(self.node_count()) {
            return false;
        }
        if !self.work_allowed {
            trace!(height, agreeing, "Prepared vote withheld");
            return false;
        }

        let my_index = self.my_index();
        let signature = self.commit_signatures[my_index].clone();
        {
            let my = self.table.mine_mut();
            my.phase = NodePhase::Prepared;
            my.signature = signature;
            my.serial += 1;
        }
        debug!(height, agreeing, "Prepared");
        true
    }

    fn handle_prepared(&mut self) -> bool {
        if self.intent == BlockIntent::CommitBlock {
            return false;
        }

        let signed = self.commit_signatures.iter().filter(|s| s.is_some()).count();
        if signed >= required_signatures(self.node_count()) {
            self.intent = BlockIntent::CommitBlock;
            return true;
        }

        let (height, rid) = {
            let my = self.my_status();
            (my.height, my.block_rid)
        };
        let Some(rid) = rid else {
            error!(height, "Prepared without a candidate block");
            return false;
        };

        let missing: Vec<ValidatorIndex> = self
            .table
            .iter()
            .filter(|(i, s)| {
                self.commit_signatures[*i].is_none()
                    && (s.height > height
                        || (s.height == height
                            && s.phase == NodePhase::Prepared
                            && s.block_rid == Some(rid)))
            })
            .map(|(i, _)| i)
            .collect();

        let next = if missing.is_empty() {
            BlockIntent::DoNothing
        } else {
            BlockIntent::FetchCommitSignatures { rid, nodes: missing }
        };

        if self.intent != next {
            self.intent = next;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebft_core::ManualClock;

    fn manager(count: usize, my_index: usize, height: u64) -> StatusManager {
        let clock = Arc::new(ManualClock::new(ZERO_SERIAL_TIME + 1_000));
        StatusManager::new(count, my_index, height, clock).unwrap()
    }

    #[test]
    fn test_serial_seeded_from_clock() {
        let sm = manager(4, 1, 10);
        assert_eq!(sm.my_status().serial, 1_000);
        assert_eq!(sm.my_status().height, 10);
    }

    #[test]
    fn test_primary_builds_on_start() {
        let sm = manager(4, 0, 1);
        assert!(sm.is_my_node_primary());
        assert_eq!(sm.block_intent(), &BlockIntent::BuildBlock);
    }

    #[test]
    fn test_non_primary_does_nothing_on_start() {
        let sm = manager(4, 2, 1);
        assert_eq!(sm.block_intent(), &BlockIntent::DoNothing);
    }

    #[test]
    fn test_new_rejects_out_of_range_index() {
        let clock = Arc::new(ManualClock::new(0));
        assert!(StatusManager::new(3, 3, 0, clock).is_err());
    }

    #[test]
    fn test_own_slot_cannot_be_updated_as_peer() {
        let mut sm = manager(4, 1, 1);
        assert_eq!(
            sm.on_status_update(1, NodeStatus::new(5, 5)),
            Err(StatusError::LocalSlot(1))
        );
    }
}
