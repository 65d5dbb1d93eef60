//! Tests for the decoded-packet cache and the message codec.

use ebft_consensus::{CacheStats, EbftMessage, MessageCodec, MessageTopic, PacketCache, Topical};
use ebft_types::{BlockRid, NodeRid, NodeStatus, Signature};

fn rid(b: u8) -> NodeRid {
    NodeRid::new(vec![b; 33]).unwrap()
}

fn status(height: u64) -> EbftMessage {
    EbftMessage::Status(NodeStatus::new(height, 1))
}

#[test]
fn test_put_then_get() {
    let cache = PacketCache::new(16);
    let raw = status(54).encode().unwrap();

    let stored = cache.put(&rid(1), &raw, status(54));
    assert_eq!(stored, status(54));
    assert_eq!(
        cache.get(&rid(1), &raw, MessageTopic::Status.as_str()),
        Some(status(54))
    );
}

#[test]
fn test_get_requires_identical_bytes() {
    let cache = PacketCache::new(16);
    let raw = status(54).encode().unwrap();
    cache.put(&rid(1), &raw, status(54));

    let other = status(55).encode().unwrap();
    assert_eq!(cache.get(&rid(1), &other, MessageTopic::Status.as_str()), None);
}

#[test]
fn test_get_is_per_sender_and_topic() {
    let cache = PacketCache::new(16);
    let raw = status(54).encode().unwrap();
    cache.put(&rid(1), &raw, status(54));

    assert_eq!(cache.get(&rid(2), &raw, MessageTopic::Status.as_str()), None);
    assert_eq!(
        cache.get(&rid(1), &raw, MessageTopic::BlockSignature.as_str()),
        None
    );
}

#[test]
fn test_newer_packet_replaces_entry() {
    let cache = PacketCache::new(16);
    let first = status(54).encode().unwrap();
    let second = status(55).encode().unwrap();

    cache.put(&rid(1), &first, status(54));
    cache.put(&rid(1), &second, status(55));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&rid(1), &first, MessageTopic::Status.as_str()), None);
    assert_eq!(
        cache.get(&rid(1), &second, MessageTopic::Status.as_str()),
        Some(status(55))
    );
}

#[test]
fn test_topics_cached_separately() {
    let cache = PacketCache::new(16);
    let request = EbftMessage::GetBlockSignature {
        block_rid: BlockRid::sha256(b"b"),
    };
    assert_eq!(request.topic(), MessageTopic::GetBlockSignature.as_str());

    let raw_status = status(1).encode().unwrap();
    let raw_request = request.encode().unwrap();
    cache.put(&rid(1), &raw_status, status(1));
    cache.put(&rid(1), &raw_request, request.clone());

    assert_eq!(cache.len(), 2);
    assert_eq!(
        cache.get(&rid(1), &raw_request, request.topic()),
        Some(request)
    );
}

#[test]
fn test_evicts_oldest_insertion() {
    let cache = PacketCache::new(2);
    let raw = |h| status(h).encode().unwrap();

    cache.put(&rid(1), &raw(1), status(1));
    cache.put(&rid(2), &raw(2), status(2));
    // Refreshing sender 1 makes sender 2 the oldest.
    cache.put(&rid(1), &raw(3), status(3));
    cache.put(&rid(3), &raw(4), status(4));

    let topic = MessageTopic::Status.as_str();
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&rid(2), &raw(2), topic), None);
    assert_eq!(cache.get(&rid(1), &raw(3), topic), Some(status(3)));
    assert_eq!(cache.get(&rid(3), &raw(4), topic), Some(status(4)));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_stats() {
    let cache = PacketCache::new(4);
    assert_eq!(cache.stats(), CacheStats::default());
    assert_eq!(cache.stats().hit_rate(), 0.0);

    let raw = status(7).encode().unwrap();
    let topic = MessageTopic::Status.as_str();
    assert!(cache.get(&rid(1), &raw, topic).is_none());
    cache.put(&rid(1), &raw, status(7));
    assert!(cache.get(&rid(1), &raw, topic).is_some());
    assert!(cache.get(&rid(1), &raw, topic).is_some());

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.entries, 1);

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.stats().hits, 2);
}

#[test]
fn test_codec_rejects_garbage() {
    let codec = MessageCodec::new(4);
    assert!(codec
        .decode(&rid(1), MessageTopic::Status.as_str(), b"not json")
        .is_err());
    assert!(codec.decode(&rid(1), "ebft/unknown", b"{}").is_err());
    assert!(codec.cache().is_empty());
}

#[test]
fn test_signature_message_wire_format() {
    let message = EbftMessage::BlockSignature {
        block_rid: BlockRid::from([0xab; 32]),
        signature: Signature::new(vec![1, 2], vec![3, 4]),
    };
    let json: serde_json::Value = serde_json::from_slice(&message.encode().unwrap()).unwrap();
    assert_eq!(json["type"], "block_signature");
    assert_eq!(json["block_rid"], format!("0x{}", "ab".repeat(32)));

    let decoded = EbftMessage::decode(MessageTopic::BlockSignature.as_str(), &message.encode().unwrap())
        .unwrap();
    assert_eq!(decoded, message);
}
