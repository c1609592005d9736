use modlink_bus::{BusError, MessageBus};
use modlink_types::{Message, MessageType, Payload, Priority};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn request_gets_response_from_target() {
    let bus = MessageBus::default();
    bus.subscribe_action("storage", "load", |msg: Message| async move {
        let name = msg.payload().get_str("name")?.to_string();
        Ok(Some(Payload::new().with("content", format!("data of {name}"))))
    })
    .await;

    let response = bus
        .request(
            "editor",
            Some("storage"),
            "load",
            Payload::new().with("name", "a.proj"),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(response.kind(), MessageType::Response);
    assert_eq!(response.sender(), "storage");
    assert_eq!(response.target(), Some("editor"));
    assert_eq!(response.action(), "load");
    assert_eq!(response.payload().get_str("content").unwrap(), "data of a.proj");
    assert!(response.correlation_id().is_some());
    assert_eq!(bus.pending_request_count().await, 0);
}

#[tokio::test]
async fn request_only_reaches_target_module() {
    let bus = MessageBus::default();
    let other_calls = Arc::new(AtomicUsize::new(0));

    let calls = other_calls.clone();
    bus.subscribe_action("cache", "load", move |_| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Payload::new().with("from", "cache")))
        }
    })
    .await;
    bus.subscribe_action("storage", "load", |_| async {
        Ok(Some(Payload::new().with("from", "storage")))
    })
    .await;

    let response = bus
        .request("editor", Some("storage"), "load", Payload::new(), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(response.payload().get_str("from").unwrap(), "storage");
    assert_eq!(other_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn untargeted_request_uses_first_match() {
    let bus = MessageBus::default();
    let second_calls = Arc::new(AtomicUsize::new(0));

    bus.subscribe_action("first", "ask", |_| async {
        Ok(Some(Payload::new().with("who", "first")))
    })
    .await;
    let calls = second_calls.clone();
    bus.subscribe_action("second", "ask", move |_| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Payload::new().with("who", "second")))
        }
    })
    .await;

    let response = bus
        .request("x", None, "ask", Payload::new(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(response.payload().get_str("who").unwrap(), "first");
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn request_times_out_and_releases_slot() {
    let bus = MessageBus::default();
    // Handler never answers.
    bus.subscribe_action("slow", "work", |_| async { Ok(None) }).await;

    let err = bus
        .request("x", Some("slow"), "work", Payload::new(), Duration::from_millis(200))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    match err {
        BusError::Timeout { timeout, .. } => assert_eq!(timeout, Duration::from_millis(200)),
        other => panic!("Expected Timeout, got {other:?}"),
    }
    assert_eq!(bus.pending_request_count().await, 0);
    assert_eq!(bus.statistics().await.timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn request_without_subscriber_times_out() {
    let bus = MessageBus::default();
    let err = bus
        .request("x", Some("nobody"), "work", Payload::new(), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(bus.pending_request_count().await, 0);
}

#[tokio::test]
async fn external_responder_answers_from_stream() {
    let bus = MessageBus::default();
    let mut rx = bus.messages();

    let responder_bus = bus.clone();
    let responder = tokio::spawn(async move {
        loop {
            let msg = rx.recv().await.unwrap();
            if msg.kind() == MessageType::Request {
                let first = responder_bus
                    .respond(&msg, "worker", Payload::new().with("ok", true))
                    .await;
                let second = responder_bus
                    .respond(&msg, "worker", Payload::new().with("ok", false))
                    .await;
                return (first, second);
            }
        }
    });

    let response = bus
        .request("x", Some("worker"), "compute", Payload::new(), Duration::from_secs(2))
        .await
        .unwrap();

    assert!(response.payload().get_bool("ok").unwrap());
    let (first, second) = responder.await.unwrap();
    assert!(first);
    assert!(!second, "only one response may complete a request");
}

#[tokio::test]
async fn respond_to_unknown_request_returns_false() {
    let bus = MessageBus::default();
    let stray = bus.publish("x", "y", Payload::new(), Priority::Normal).await;
    assert!(!bus.respond(&stray, "z", Payload::new()).await);
}

#[tokio::test]
async fn request_and_response_counted_in_statistics() {
    let bus = MessageBus::default();
    bus.subscribe_action("s", "load", |_| async { Ok(Some(Payload::new())) })
        .await;
    bus.request("c", Some("s"), "load", Payload::new(), Duration::from_secs(1))
        .await
        .unwrap();

    let stats = bus.statistics().await;
    assert_eq!(stats.count("request_load"), 1);
    assert_eq!(stats.count("response_load"), 1);
}

#[tokio::test]
async fn failing_responder_leads_to_timeout() {
    let bus = MessageBus::default();
    bus.subscribe_action("s", "load", |_| async { Err(anyhow::anyhow!("disk gone")) })
        .await;

    let err = bus
        .request("c", Some("s"), "load", Payload::new(), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(bus.statistics().await.handler_failures, 1);
}
