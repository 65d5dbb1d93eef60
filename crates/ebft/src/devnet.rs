//! In-process devnet.
//!
//! Runs every validator of a small network inside one process: each gets its
//! own round-progress thread, a [`LocalTransport`] on a shared [`LocalHub`],
//! and a [`LocalEngine`] on a shared [`ChainRegistry`] standing in for block
//! storage. A heartbeat pump feeds every validator's heartbeat gate.
//!
//! One validator can be made silent: it never finishes building a block, so
//! the others have to revolt past it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use ebft_config::Config;
use ebft_consensus::{DiagnosticsHandle, HeartbeatListener, NodeDiagnostics};
use ebft_core::{
    BlockEngine, Clock, EngineError, EngineEvent, EngineResult, InboundPacket, StatusTransport,
    SystemClock, TransportError, TransportResult,
};
use ebft_types::{BlockRid, HeartbeatEvent, NodeRid, Signature, ValidatorIndex};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::error::NodeResult;
use crate::node::{heartbeat_listener, start_validator};
use crate::worker::ValidatorWorker;

// =============================================================================
// Transport
// =============================================================================

/// Shared mailbox of every devnet validator.
#[derive(Clone, Default)]
pub struct LocalHub {
    inboxes: Arc<Mutex<HashMap<NodeRid, VecDeque<InboundPacket>>>>,
}

impl LocalHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node` and returns its transport.
    pub fn connect(&self, node: NodeRid) -> LocalTransport {
        self.inboxes.lock().entry(node.clone()).or_default();
        LocalTransport {
            me: node,
            hub: self.clone(),
        }
    }

    fn deliver(&self, to: &NodeRid, packet: InboundPacket) -> bool {
        match self.inboxes.lock().get_mut(to) {
            Some(inbox) => {
                inbox.push_back(packet);
                true
            }
            None => false,
        }
    }
}

/// One validator's view of the [`LocalHub`].
pub struct LocalTransport {
    me: NodeRid,
    hub: LocalHub,
}

impl StatusTransport for LocalTransport {
    fn poll_packets(&mut self) -> Vec<InboundPacket> {
        self.hub
            .inboxes
            .lock()
            .get_mut(&self.me)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    fn broadcast(&mut self, topic: &str, data: Bytes) -> TransportResult<()> {
        let mut inboxes = self.hub.inboxes.lock();
        for (peer, inbox) in inboxes.iter_mut() {
            if *peer != self.me {
                inbox.push_back(InboundPacket {
                    sender: self.me.clone(),
                    topic: topic.to_string(),
                    data: data.clone(),
                });
            }
        }
        Ok(())
    }

    fn send_to(&mut self, peer: &NodeRid, topic: &str, data: Bytes) -> TransportResult<()> {
        let packet = InboundPacket {
            sender: self.me.clone(),
            topic: topic.to_string(),
            data,
        };
        if self.hub.deliver(peer, packet) {
            Ok(())
        } else {
            Err(TransportError::PeerNotConnected(peer.to_hex()))
        }
    }
}

// =============================================================================
// Chain
// =============================================================================

#[derive(Default)]
struct ChainState {
    candidates: HashMap<BlockRid, u64>,
    committed: BTreeMap<u64, BlockRid>,
    last_commit_at: Option<i64>,
    conflicts: u64,
}

/// Blocks known to the devnet, shared by every [`LocalEngine`].
#[derive(Clone, Default)]
pub struct ChainRegistry {
    state: Arc<Mutex<ChainState>>,
}

impl ChainRegistry {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest committed height, or `None` before the first commit.
    pub fn tip(&self) -> Option<u64> {
        self.state.lock().committed.keys().next_back().copied()
    }

    /// Block committed at `height`.
    pub fn block_at(&self, height: u64) -> Option<BlockRid> {
        self.state.lock().committed.get(&height).copied()
    }

    /// Number of commits that disagreed with an earlier commit at the same
    /// height.
    pub fn conflicts(&self) -> u64 {
        self.state.lock().conflicts
    }

    fn propose(&self, rid: BlockRid, height: u64) {
        self.state.lock().candidates.insert(rid, height);
    }

    fn candidate_height(&self, rid: &BlockRid) -> Option<u64> {
        self.state.lock().candidates.get(rid).copied()
    }

    fn is_committed(&self, rid: &BlockRid) -> bool {
        self.state.lock().committed.values().any(|c| c == rid)
    }

    fn commit(&self, height: u64, rid: BlockRid, now: i64) {
        let mut state = self.state.lock();
        match state.committed.get(&height).copied() {
            Some(existing) if existing != rid => {
                state.conflicts += 1;
                error!(height, existing = %existing, rid = %rid, "Conflicting commit");
            }
            Some(_) => {}
            None => {
                state.committed.insert(height, rid);
                state.last_commit_at = Some(now);
                info!(height, rid = %rid.short(), "Block committed");
            }
        }
    }

    fn last_commit_at(&self) -> Option<i64> {
        self.state.lock().last_commit_at
    }
}

// =============================================================================
// Block engine
// =============================================================================

/// Simulated block engine of one devnet validator.
pub struct LocalEngine {
    index: ValidatorIndex,
    node: NodeRid,
    chain: ChainRegistry,
    clock: Arc<dyn Clock>,
    silent: bool,
    built: HashMap<u64, BlockRid>,
    events: Vec<EngineEvent>,
}

impl LocalEngine {
    /// Creates the engine of validator `index`.
    pub fn new(
        index: ValidatorIndex,
        node: NodeRid,
        chain: ChainRegistry,
        clock: Arc<dyn Clock>,
        silent: bool,
    ) -> Self {
        Self {
            index,
            node,
            chain,
            clock,
            silent,
            built: HashMap::new(),
            events: Vec::new(),
        }
    }

    fn sign(&self, rid: &BlockRid) -> Signature {
        let mut hasher = Sha256::new();
        hasher.update(self.node.as_bytes());
        hasher.update(rid.as_bytes());
        Signature::new(self.node.as_bytes().to_vec(), hasher.finalize().to_vec())
    }
}

impl BlockEngine for LocalEngine {
    fn build_block(&mut self, height: u64) -> EngineResult<()> {
        if self.silent {
            debug!(node = self.index, height, "Silent validator ignoring build request");
            return Ok(());
        }
        let rid = match self.built.get(&height) {
            Some(rid) => *rid,
            None => {
                let nonce: u64 = rand::random();
                let seed = format!("ebft-devnet:{}:{}:{}", height, self.index, nonce);
                let rid = BlockRid::sha256(seed.as_bytes());
                self.built.insert(height, rid);
                self.chain.propose(rid, height);
                rid
            }
        };
        debug!(node = self.index, height, rid = %rid.short(), "Block built");
        let signature = self.sign(&rid);
        self.events.push(EngineEvent::BlockBuilt { rid, signature });
        Ok(())
    }

    fn load_unfinished_block(&mut self, rid: BlockRid, from: ValidatorIndex) -> EngineResult<()> {
        if self.chain.candidate_height(&rid).is_none() {
            return Err(EngineError::UnknownBlock(rid));
        }
        debug!(node = self.index, from, rid = %rid.short(), "Candidate loaded");
        let signature = self.sign(&rid);
        self.events.push(EngineEvent::BlockLoaded { rid, signature });
        Ok(())
    }

    fn fetch_block_at_height(&mut self, height: u64, from: ValidatorIndex) -> EngineResult<()> {
        if self.chain.block_at(height).is_none() {
            return Err(EngineError::Unavailable(format!("no block at height {}", height)));
        }
        debug!(node = self.index, from, height, "Block fetched");
        self.events.push(EngineEvent::BlockAdded { height });
        Ok(())
    }

    fn commit_block(&mut self, rid: BlockRid, signatures: Vec<Option<Signature>>) -> EngineResult<()> {
        let height = self
            .chain
            .candidate_height(&rid)
            .ok_or(EngineError::UnknownBlock(rid))?;
        debug!(
            node = self.index,
            height,
            signatures = signatures.iter().flatten().count(),
            "Committing block"
        );
        self.chain.commit(height, rid, self.clock.now_millis());
        self.events.push(EngineEvent::BlockCommitted { rid });
        Ok(())
    }

    fn block_signature(&self, rid: &BlockRid) -> Option<Signature> {
        self.chain.is_committed(rid).then(|| self.sign(rid))
    }

    fn should_build_block(&self) -> bool {
        true
    }

    fn last_block_timestamp(&self) -> i64 {
        self.chain.last_commit_at().unwrap_or(-1)
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }
}

// =============================================================================
// Devnet
// =============================================================================

/// A running in-process network.
pub struct Devnet {
    validators: Vec<NodeRid>,
    workers: Vec<ValidatorWorker>,
    chain: ChainRegistry,
    pump_stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl Devnet {
    /// Starts `config.devnet.validators` validators from height 0.
    pub fn start(config: &Config) -> NodeResult<Self> {
        config.validate()?;
        let count = config.devnet.validators;
        let validators = (0..count)
            .map(|_| generate_node_key())
            .collect::<NodeResult<Vec<NodeRid>>>()?;

        let hub = LocalHub::new();
        let chain = ChainRegistry::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let mut listeners: Vec<Arc<dyn HeartbeatListener>> = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);
        for (index, node) in validators.iter().enumerate() {
            let silent = config.devnet.silent_validator == Some(index);
            let heartbeat = heartbeat_listener(&config.heartbeat);
            listeners.push(heartbeat.clone());

            let transport = hub.connect(node.clone());
            let engine = LocalEngine::new(index, node.clone(), chain.clone(), clock.clone(), silent);
            let worker = start_validator(
                config,
                validators.clone(),
                index,
                0,
                transport,
                engine,
                heartbeat,
                clock.clone(),
            )?;
            workers.push(worker);
        }

        let pump_stop = Arc::new(AtomicBool::new(false));
        let pump = spawn_heartbeat_pump(
            listeners,
            clock,
            Duration::from_millis(config.devnet.heartbeat_interval_ms),
            pump_stop.clone(),
        )?;

        info!(
            validators = count,
            silent = ?config.devnet.silent_validator,
            "Devnet started"
        );

        Ok(Self {
            validators,
            workers,
            chain,
            pump_stop,
            pump: Some(pump),
        })
    }

    /// Validator identities, in index order.
    pub fn validators(&self) -> &[NodeRid] {
        &self.validators
    }

    /// The shared chain.
    pub fn chain(&self) -> &ChainRegistry {
        &self.chain
    }

    /// Number of committed blocks.
    pub fn committed_blocks(&self) -> u64 {
        self.chain.tip().map_or(0, |tip| tip + 1)
    }

    /// Diagnostics handle of every validator.
    pub fn diagnostics_handles(&self) -> Vec<DiagnosticsHandle> {
        self.workers.iter().map(ValidatorWorker::diagnostics).collect()
    }

    /// Latest diagnostics of every validator that has ticked.
    pub fn diagnostics(&self) -> Vec<NodeDiagnostics> {
        self.workers
            .iter()
            .filter_map(|w| w.diagnostics().snapshot())
            .collect()
    }

    /// Whether every worker thread is still running.
    pub fn all_running(&self) -> bool {
        self.workers.iter().all(ValidatorWorker::is_running)
    }

    /// Waits until `blocks` blocks are committed or `timeout` passes.
    pub fn wait_for_blocks(&self, blocks: u64, timeout: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < timeout {
            if self.committed_blocks() >= blocks {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.committed_blocks() >= blocks
    }

    /// Logs a one-line summary per validator.
    pub fn report(&self) {
        info!(
            committed = self.committed_blocks(),
            conflicts = self.chain.conflicts(),
            "Devnet progress"
        );
        for diag in self.diagnostics() {
            let Some(status) = diag.my_status() else {
                continue;
            };
            info!(
                node = diag.my_index,
                height = status.height,
                round = status.round,
                phase = %status.phase,
                revolting = status.revolting,
                revolts_on_node = diag.revolts.revolts_on_node(),
                revolts_by_node = diag.revolts.revolts_by_node(),
                revolts_between_others = diag.revolts.revolts_between_others(),
                "Validator"
            );
        }
    }

    /// Stops every validator and the heartbeat pump.
    pub fn stop(mut self) -> NodeResult<()> {
        self.pump_stop.store(true, Ordering::Release);
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
        let mut outcome = Ok(());
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.stop() {
                error!(error = %e, "Validator stopped with an error");
                outcome = Err(e);
            }
        }
        info!(committed = self.committed_blocks(), "Devnet stopped");
        outcome
    }
}

impl Drop for Devnet {
    fn drop(&mut self) {
        self.pump_stop.store(true, Ordering::Release);
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

/// Random compressed-key-shaped validator identity.
pub fn generate_node_key() -> NodeResult<NodeRid> {
    let mut key = vec![0x02u8];
    key.extend_from_slice(&rand::random::<[u8; 32]>());
    Ok(NodeRid::new(key)?)
}

fn spawn_heartbeat_pump(
    listeners: Vec<Arc<dyn HeartbeatListener>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ebft-heartbeat".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Acquire) {
                let event = HeartbeatEvent::new(clock.now_millis());
                for listener in &listeners {
                    listener.on_heartbeat(event);
                }
                thread::sleep(interval);
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(b: u8) -> NodeRid {
        NodeRid::new(vec![b; 33]).unwrap()
    }

    #[test]
    fn test_hub_broadcast_skips_sender() {
        let hub = LocalHub::new();
        let mut a = hub.connect(node(1));
        let mut b = hub.connect(node(2));
        let mut c = hub.connect(node(3));

        a.broadcast("t", Bytes::from_static(b"x")).unwrap();
        assert!(a.poll_packets().is_empty());
        assert_eq!(b.poll_packets().len(), 1);
        assert_eq!(c.poll_packets()[0].sender, node(1));
        assert!(b.poll_packets().is_empty());
    }

    #[test]
    fn test_send_to_unknown_peer_fails() {
        let hub = LocalHub::new();
        let mut a = hub.connect(node(1));
        assert!(a.send_to(&node(9), "t", Bytes::new()).is_err());
    }

    #[test]
    fn test_engine_build_load_commit() {
        let chain = ChainRegistry::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut primary = LocalEngine::new(0, node(1), chain.clone(), clock.clone(), false);
        let mut other = LocalEngine::new(1, node(2), chain.clone(), clock, false);

        primary.build_block(0).unwrap();
        let rid = match primary.poll_events().pop() {
            Some(EngineEvent::BlockBuilt { rid, .. }) => rid,
            other => panic!("unexpected {:?}", other),
        };

        other.load_unfinished_block(rid, 0).unwrap();
        assert!(matches!(other.poll_events()[0], EngineEvent::BlockLoaded { .. }));
        assert!(other.load_unfinished_block(BlockRid::sha256(b"nope"), 0).is_err());

        assert_eq!(other.block_signature(&rid), None);
        primary.commit_block(rid, vec![None, None]).unwrap();
        other.commit_block(rid, vec![None, None]).unwrap();
        assert_eq!(chain.tip(), Some(0));
        assert_eq!(chain.conflicts(), 0);
        assert!(other.block_signature(&rid).is_some());
        assert!(other.last_block_timestamp() > 0);
    }

    #[test]
    fn test_silent_engine_never_builds() {
        let chain = ChainRegistry::new();
        let mut engine = LocalEngine::new(0, node(1), chain, Arc::new(SystemClock), true);
        engine.build_block(0).unwrap();
        assert!(engine.poll_events().is_empty());
    }
}
