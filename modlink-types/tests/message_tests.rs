use modlink_types::{Message, MessageId, MessageIdGenerator, MessageType, Payload, Priority};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

// ── MessageId ────────────────────────────────────────────────────

#[test]
fn generator_starts_at_one_and_increments() {
    let ids = MessageIdGenerator::new();
    assert_eq!(ids.next_id(), MessageId::from_raw(1));
    assert_eq!(ids.next_id(), MessageId::from_raw(2));
    assert_eq!(ids.issued(), 2);
}

#[test]
fn generator_unique_across_threads() {
    let ids = Arc::new(MessageIdGenerator::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ids = ids.clone();
            std::thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
        })
        .collect();

    let mut seen = HashSet::new();
    for h in handles {
        for id in h.join().unwrap() {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), 4000);
}

#[test]
fn message_id_display_and_parse() {
    let id = MessageId::from_raw(42);
    assert_eq!(id.to_string(), "msg_42");
    assert_eq!("msg_42".parse::<MessageId>().unwrap(), id);
    assert_eq!("42".parse::<MessageId>().unwrap(), id);
    assert!("msg_x".parse::<MessageId>().is_err());
}

// ── Priority / MessageType ───────────────────────────────────────

#[test]
fn priority_is_ordered() {
    assert!(Priority::Low < Priority::Normal);
    assert!(Priority::Normal < Priority::High);
    assert!(Priority::High < Priority::Urgent);
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn message_type_serializes_snake_case() {
    let json = serde_json::to_string(&MessageType::Notification).unwrap();
    assert_eq!(json, "\"notification\"");
    assert_eq!(MessageType::Broadcast.to_string(), "broadcast");
}

// ── Message ──────────────────────────────────────────────────────

#[test]
fn message_builder_sets_fields() {
    let msg = Message::new(MessageId::from_raw(7), MessageType::Request, "editor", "save")
        .with_target("storage")
        .with_payload(Payload::new().with("path", "a.json"))
        .with_priority(Priority::High);

    assert_eq!(msg.id(), MessageId::from_raw(7));
    assert_eq!(msg.kind(), MessageType::Request);
    assert_eq!(msg.sender(), "editor");
    assert_eq!(msg.target(), Some("storage"));
    assert_eq!(msg.action(), "save");
    assert_eq!(msg.priority(), Priority::High);
    assert_eq!(msg.payload().get_str("path").unwrap(), "a.json");
    assert!(!msg.is_untargeted());
    assert_eq!(msg.correlation_id(), None);
}

#[test]
fn message_stats_key_combines_type_and_action() {
    let msg = Message::new(MessageId::from_raw(1), MessageType::Event, "nav", "navigate_to_home");
    assert_eq!(msg.stats_key(), "event_navigate_to_home");
}

#[test]
fn response_carries_correlation() {
    let req = MessageId::from_raw(3);
    let msg = Message::new(MessageId::from_raw(4), MessageType::Response, "storage", "save")
        .with_correlation(req);
    assert_eq!(msg.correlation_id(), Some(req));
}

#[test]
fn message_serde_roundtrip_uses_type_field() {
    let msg = Message::new(MessageId::from_raw(9), MessageType::Broadcast, "system", "tick");
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "broadcast");
    assert_eq!(json["id"], 9);

    let back: Message = serde_json::from_value(json).unwrap();
    assert_eq!(back, msg);
}
