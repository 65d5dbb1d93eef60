//! Decoded-packet cache.
//!
//! Validators rebroadcast the same status many times. The cache remembers the
//! last decoded message per `(sender, topic)` together with the SHA-256 digest
//! of the raw bytes it came from, so an identical packet skips decoding.
//!
//! ## Eviction Policy
//!
//! The cache holds at most `capacity` entries. Replacing an entry moves it to
//! the back of the insertion queue; when full, the oldest insertion is
//! evicted. Each insertion is stamped with a generation, so a replaced entry
//! leaves a stale queue slot behind instead of being searched for. Stale
//! slots are skipped on eviction and swept once the queue grows past twice
//! the capacity.

use std::collections::{HashMap, VecDeque};

use ebft_types::NodeRid;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::trace;

/// Digest of a raw packet
pub type PacketDigest = [u8; 32];

/// Messages that know which topic they belong to.
pub trait Topical {
    /// Topic name of this message.
    fn topic(&self) -> &'static str;
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that required decoding
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Current number of entries
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type CacheKey = (NodeRid, String);

struct Entry<T> {
    digest: PacketDigest,
    value: T,
    generation: u64,
}

struct Inner<T> {
    entries: HashMap<CacheKey, Entry<T>>,
    order: VecDeque<(CacheKey, u64)>,
    next_generation: u64,
    stats: CacheStats,
}

impl<T> Inner<T> {
    fn is_live(&self, key: &CacheKey, generation: u64) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
    }

    fn evict_oldest(&mut self) {
        while let Some((key, generation)) = self.order.pop_front() {
            if !self.is_live(&key, generation) {
                continue;
            }
            self.entries.remove(&key);
            self.stats.evictions += 1;
            trace!(sender = %key.0.short(), topic = %key.1, "Evicted cached packet");
            return;
        }
    }

    fn compact(&mut self) {
        let Inner { entries, order, .. } = self;
        order.retain(|(key, generation)| {
            entries
                .get(key)
                .is_some_and(|entry| entry.generation == *generation)
        });
    }
}

/// Bounded cache of decoded packets, keyed by sender and topic.
pub struct PacketCache<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
}

/// Digest used to match raw packets.
pub fn packet_digest(raw: &[u8]) -> PacketDigest {
    Sha256::digest(raw).into()
}

impl<T: Topical + Clone> PacketCache<T> {
    /// Creates a cache holding up to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_generation: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Stores `decoded` as the message `sender` last sent on its topic and
    /// returns it.
    pub fn put(&self, sender: &NodeRid, raw: &[u8], decoded: T) -> T {
        let key = (sender.clone(), decoded.topic().to_string());
        let digest = packet_digest(raw);

        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            inner.evict_oldest();
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.order.push_back((key.clone(), generation));
        inner.entries.insert(
            key,
            Entry {
                digest,
                value: decoded.clone(),
                generation,
            },
        );
        if inner.order.len() > self.capacity.saturating_mul(2) {
            inner.compact();
        }
        inner.stats.entries = inner.entries.len();
        decoded
    }

    /// Returns the cached message if `raw` is byte-identical to what `sender`
    /// last sent on `topic`.
    pub fn get(&self, sender: &NodeRid, raw: &[u8], topic: &str) -> Option<T> {
        let digest = packet_digest(raw);
        let mut inner = self.inner.lock();

        let key = (sender.clone(), topic.to_string());
        let found = inner
            .entries
            .get(&key)
            .filter(|entry| entry.digest == digest)
            .map(|entry| entry.value.clone());

        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        found
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry. Statistics are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.stats.entries = 0;
    }
}
