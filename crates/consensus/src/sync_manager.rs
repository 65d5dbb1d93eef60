//! The round-progress loop.
//!
//! [`SyncManager::tick`] is called repeatedly by a single worker thread. Each
//! tick:
//!
//! 1. asks the heartbeat gate whether new work may start, and withholds the
//!    prepared vote while it may not
//! 2. drains block engine events into the [`StatusManager`]
//! 3. decodes and applies inbound packets
//! 4. acts on the current [`BlockIntent`], with a retry back-off
//! 5. lets the [`RevoltTracker`] decide on a revolt
//! 6. broadcasts the local status when needed
//! 7. publishes [`NodeDiagnostics`]
//!
//! A [`StatusError`](crate::StatusError) from the status manager means a bug
//! upstream; the tick returns it and the worker stops.

use std::collections::HashMap;
use std::sync::Arc;

use ebft_core::{BlockEngine, Clock, EngineEvent, InboundPacket, StatusTransport};
use ebft_types::{NodeRid, ValidatorIndex};
use rand::seq::SliceRandom;
use tracing::{debug, trace, warn};

use crate::diagnostics::{DiagnosticsHandle, NodeDiagnostics};
use crate::error::{ConsensusError, ConsensusResult};
use crate::heartbeat::HeartbeatListener;
use crate::messages::{EbftMessage, MessageCodec};
use crate::revolt::{RevoltConfig, RevoltTracker};
use crate::status_manager::{BlockIntent, StatusManager};
use crate::status_sender::StatusSender;

/// Growth of the retry interval each time an intent is re-issued
const INTENT_BACKOFF_FACTOR: f64 = 1.1;

/// Settings of the round-progress loop, in milliseconds.
#[derive(Debug, Clone)]
pub struct SyncManagerConfig {
    /// Revolt deadline settings
    pub revolt: RevoltConfig,
    /// Longest gap between two status broadcasts
    pub max_status_interval_ms: u64,
    /// Initial wait before an unanswered intent is re-issued
    pub intent_timeout_ms: u64,
    /// Interval of the periodic status log
    pub status_log_interval_ms: u64,
    /// Packet cache capacity
    pub packet_cache_capacity: usize,
}

impl Default for SyncManagerConfig {
    fn default() -> Self {
        Self {
            revolt: RevoltConfig::default(),
            max_status_interval_ms: 1_000,
            intent_timeout_ms: 1_000,
            status_log_interval_ms: 10_000,
            packet_cache_capacity: 1_024,
        }
    }
}

/// Drives one validator through heights and rounds.
pub struct SyncManager<T, E> {
    config: SyncManagerConfig,
    validators: Vec<NodeRid>,
    indices: HashMap<NodeRid, ValidatorIndex>,
    manager: StatusManager,
    revolt: RevoltTracker,
    sender: StatusSender,
    codec: MessageCodec,
    heartbeat: Arc<dyn HeartbeatListener>,
    transport: T,
    engine: E,
    clock: Arc<dyn Clock>,
    diagnostics: DiagnosticsHandle,
    processing_intent: Option<BlockIntent>,
    intent_deadline: i64,
    intent_wait_ms: f64,
    heartbeat_ok: bool,
    ticks: u64,
    last_status_log: i64,
}

impl<T: StatusTransport, E: BlockEngine> SyncManager<T, E> {
    /// Creates the loop for validator `my_index` of `validators`, starting at
    /// `next_height`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SyncManagerConfig,
        validators: Vec<NodeRid>,
        my_index: ValidatorIndex,
        next_height: u64,
        transport: T,
        engine: E,
        heartbeat: Arc<dyn HeartbeatListener>,
        clock: Arc<dyn Clock>,
    ) -> ConsensusResult<Self> {
        if validators.is_empty() {
            return Err(ConsensusError::InvalidConfig("empty validator set".to_string()));
        }
        let indices: HashMap<NodeRid, ValidatorIndex> = validators
            .iter()
            .enumerate()
            .map(|(i, rid)| (rid.clone(), i))
            .collect();
        if indices.len() != validators.len() {
            return Err(ConsensusError::InvalidConfig("duplicate validator".to_string()));
        }

        let manager = StatusManager::new(validators.len(), my_index, next_height, clock.clone())?;
        let revolt = RevoltTracker::new(config.revolt.clone(), &manager, clock.clone());
        let sender = StatusSender::new(config.max_status_interval_ms, clock.clone());
        let codec = MessageCodec::new(config.packet_cache_capacity);
        let intent_wait_ms = config.intent_timeout_ms as f64;

        debug!(
            my_index,
            validators = validators.len(),
            height = next_height,
            "Round-progress loop created"
        );

        Ok(Self {
            config,
            validators,
            indices,
            manager,
            revolt,
            sender,
            codec,
            heartbeat,
            transport,
            engine,
            clock,
            diagnostics: DiagnosticsHandle::new(),
            processing_intent: None,
            intent_deadline: 0,
            intent_wait_ms,
            heartbeat_ok: false,
            ticks: 0,
            last_status_log: 0,
        })
    }

    /// Runs one iteration of the loop.
    pub fn tick(&mut self) -> ConsensusResult<()> {
        self.ticks += 1;

        self.heartbeat_ok = self
            .heartbeat
            .check_heartbeat(self.engine.last_block_timestamp());
        self.manager.set_work_allowed(self.heartbeat_ok);

        self.drain_engine_events();

        for packet in self.transport.poll_packets() {
            self.dispatch_packet(packet)?;
        }

        self.process_intent();

        if self.heartbeat_ok {
            let should_build = self.engine.should_build_block();
            self.revolt.update(&mut self.manager, should_build);
        } else {
            self.revolt.observe(&self.manager);
        }

        self.sender.update(self.manager.my_status(), &mut self.transport);

        self.publish_diagnostics();
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The status manager.
    pub fn status_manager(&self) -> &StatusManager {
        &self.manager
    }

    /// The revolt tracker.
    pub fn revolt_tracker(&self) -> &RevoltTracker {
        &self.revolt
    }

    /// Handle to the published diagnostics.
    pub fn diagnostics(&self) -> DiagnosticsHandle {
        self.diagnostics.clone()
    }

    /// The heartbeat listener, for wiring up the heartbeat source.
    pub fn heartbeat(&self) -> Arc<dyn HeartbeatListener> {
        self.heartbeat.clone()
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The block engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The block engine, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Ordered validator identities.
    pub fn validators(&self) -> &[NodeRid] {
        &self.validators
    }

    // =========================================================================
    // Engine events
    // =========================================================================

    fn drain_engine_events(&mut self) {
        for event in self.engine.poll_events() {
            trace!(?event, "Engine event");
            match event {
                EngineEvent::BlockBuilt { rid, signature } => {
                    self.manager.on_built_block(rid, signature);
                }
                EngineEvent::BlockLoaded { rid, signature } => {
                    self.manager.on_received_block(rid, signature);
                }
                EngineEvent::BlockCommitted { rid } => {
                    self.manager.on_committed_block(&rid);
                }
                EngineEvent::BlockAdded { height } => {
                    let next = height + 1;
                    let current = self.manager.current_height();
                    if next == current + 1 {
                        self.manager.on_height_advance(next);
                    } else if next > current {
                        self.manager.fast_forward_height(next);
                    } else {
                        debug!(height, current, "Ignoring block added below current height");
                    }
                }
            }
        }
    }

    // =========================================================================
    // Packets
    // =========================================================================

    fn dispatch_packet(&mut self, packet: InboundPacket) -> ConsensusResult<()> {
        let Some(&index) = self.indices.get(&packet.sender) else {
            trace!(sender = %packet.sender.short(), "Ignoring packet from non-validator");
            return Ok(());
        };
        if index == self.manager.my_index() {
            trace!("Ignoring own packet");
            return Ok(());
        }

        let message = match self.codec.decode(&packet.sender, &packet.topic, &packet.data) {
            Ok(message) => message,
            Err(e) => {
                warn!(node = index, topic = %packet.topic, error = %e, "Dropping undecodable packet");
                return Ok(());
            }
        };

        match message {
            EbftMessage::Status(status) => {
                let phase = status.phase;
                let carried = status.block_rid.zip(status.signature.clone());
                self.manager.on_status_update(index, status)?;

                if let Some((rid, signature)) = carried {
                    if self.manager.should_apply_signature(phase)
                        && self.manager.my_status().block_rid == Some(rid)
                    {
                        self.manager.on_commit_signature(index, &rid, signature)?;
                    }
                }
            }
            EbftMessage::GetBlockSignature { block_rid } => {
                let signature = if self.manager.my_status().block_rid == Some(block_rid) {
                    self.manager.commit_signature().cloned()
                } else {
                    self.engine.block_signature(&block_rid)
                };
                let Some(signature) = signature else {
                    debug!(node = index, rid = %block_rid, "No signature to share");
                    return Ok(());
                };
                let reply = EbftMessage::BlockSignature {
                    block_rid,
                    signature,
                };
                self.send(index, &reply);
            }
            EbftMessage::BlockSignature {
                block_rid,
                signature,
            } => {
                let wanted = matches!(
                    self.manager.block_intent(),
                    BlockIntent::FetchCommitSignatures { rid, .. } if *rid == block_rid
                );
                if wanted {
                    self.manager.on_commit_signature(index, &block_rid, signature)?;
                } else {
                    trace!(node = index, rid = %block_rid, "Unrequested block signature");
                }
            }
        }
        Ok(())
    }

    fn send(&mut self, index: ValidatorIndex, message: &EbftMessage) {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode message");
                return;
            }
        };
        let topic = message.message_topic();
        if let Err(e) = self
            .transport
            .send_to(&self.validators[index], topic.as_str(), payload)
        {
            debug!(node = index, topic = %topic, error = %e, "Send failed");
        }
    }

    // =========================================================================
    // Intents
    // =========================================================================

    fn process_intent(&mut self) {
        let intent = self.manager.block_intent().clone();
        if intent == BlockIntent::DoNothing {
            self.processing_intent = None;
            return;
        }

        let now = self.clock.now_millis();
        if self.processing_intent.as_ref() == Some(&intent) {
            if now < self.intent_deadline {
                return;
            }
            self.intent_wait_ms *= INTENT_BACKOFF_FACTOR;
            debug!(?intent, wait_ms = self.intent_wait_ms, "Re-issuing intent");
        } else {
            self.intent_wait_ms = self.config.intent_timeout_ms as f64;
        }

        if self.execute_intent(&intent) {
            self.processing_intent = Some(intent);
            self.intent_deadline = now.saturating_add(self.intent_wait_ms as i64);
        } else {
            self.processing_intent = None;
        }
    }

    /// Hands `intent` to the engine or the network. Returns `false` if nothing
    /// could be started this tick.
    fn execute_intent(&mut self, intent: &BlockIntent) -> bool {
        let height = self.manager.current_height();
        match intent {
            BlockIntent::DoNothing => false,
            BlockIntent::BuildBlock => {
                if !self.heartbeat_ok {
                    return false;
                }
                if let Err(e) = self.engine.build_block(height) {
                    warn!(height, error = %e, "Block build request failed");
                }
                true
            }
            BlockIntent::FetchUnfinishedBlock { rid } => {
                if !self.heartbeat_ok {
                    return false;
                }
                let Some(from) = self.pick_peer(|_, s| s.height == height && s.block_rid == Some(*rid)) else {
                    return false;
                };
                if let Err(e) = self.engine.load_unfinished_block(*rid, from) {
                    warn!(rid = %rid, from, error = %e, "Candidate load request failed");
                }
                true
            }
            BlockIntent::FetchBlockAtHeight { height: wanted } => {
                let wanted = *wanted;
                let Some(from) = self.pick_peer(|_, s| s.height > wanted) else {
                    return false;
                };
                if let Err(e) = self.engine.fetch_block_at_height(wanted, from) {
                    warn!(height = wanted, from, error = %e, "Block fetch request failed");
                }
                true
            }
            BlockIntent::FetchCommitSignatures { rid, nodes } => {
                let request = EbftMessage::GetBlockSignature { block_rid: *rid };
                for &node in nodes {
                    self.send(node, &request);
                }
                true
            }
            BlockIntent::CommitBlock => {
                if !self.heartbeat_ok {
                    return false;
                }
                let Some(rid) = self.manager.my_status().block_rid else {
                    warn!(height, "Commit intent without a candidate block");
                    return false;
                };
                let signatures = self.manager.commit_signatures().to_vec();
                if let Err(e) = self.engine.commit_block(rid, signatures) {
                    warn!(rid = %rid, error = %e, "Commit request failed");
                }
                true
            }
        }
    }

    fn pick_peer<F>(&self, filter: F) -> Option<ValidatorIndex>
    where
        F: Fn(ValidatorIndex, &ebft_types::NodeStatus) -> bool,
    {
        let my_index = self.manager.my_index();
        let candidates: Vec<ValidatorIndex> = self
            .manager
            .table()
            .iter()
            .filter(|(i, s)| *i != my_index && filter(*i, s))
            .map(|(i, _)| i)
            .collect();
        candidates.choose(&mut rand::thread_rng()).copied()
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    fn publish_diagnostics(&mut self) {
        let my = self.manager.my_status();
        let now = self.clock.now_millis();
        let interval = i64::try_from(self.config.status_log_interval_ms).unwrap_or(i64::MAX);
        if now.saturating_sub(self.last_status_log) >= interval {
            self.last_status_log = now;
            debug!(
                height = my.height,
                round = my.round,
                phase = %my.phase,
                revolting = my.revolting,
                intent = ?self.manager.block_intent(),
                heartbeat_ok = self.heartbeat_ok,
                "Node status"
            );
        }

        self.diagnostics.publish(NodeDiagnostics {
            my_index: self.manager.my_index(),
            statuses: self.manager.snapshot(),
            intent: self.manager.block_intent().clone(),
            primary: self.manager.primary_index(),
            revolts: self.manager.revolt_metrics(),
            revolt_deadline: self.revolt.deadline(),
            heartbeat_ok: self.heartbeat_ok,
            packet_cache: self.codec.cache().stats(),
            ticks: self.ticks,
        });
    }
}
