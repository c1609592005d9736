//! The message bus.

use crate::error::{BusError, Result};
use crate::stats::{BusStatistics, Counters};
use crate::subscription::{
    HandlerResult, Subscriber, SubscriberList, SubscriptionHandle, SubscriptionId,
};
use futures::FutureExt;
use modlink_router::EventRouter;
use modlink_types::{Message, MessageId, MessageIdGenerator, MessageType, Payload, Priority};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tracing::{debug, warn};

/// Configuration for the message bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Timeout used by [`MessageBus::request_default`].
    pub request_timeout: Duration,
    /// Capacity of the observable message stream.
    pub stream_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            stream_capacity: 256,
        }
    }
}

/// In-process message bus.
///
/// Cloning is cheap; clones share subscribers, statistics and the stream.
#[derive(Clone)]
pub struct MessageBus {
    config: BusConfig,
    ids: Arc<MessageIdGenerator>,
    subscribers: Arc<SubscriberList>,
    next_subscription: Arc<AtomicU64>,
    /// Pending request slots keyed by request id.
    pending: Arc<Mutex<HashMap<MessageId, oneshot::Sender<Message>>>>,
    by_type_action: Arc<RwLock<HashMap<String, u64>>>,
    counters: Arc<Counters>,
    stream: broadcast::Sender<Message>,
    router: Option<Arc<EventRouter>>,
}

impl MessageBus {
    /// Creates a bus without a router.
    pub fn new(config: BusConfig) -> Self {
        let (stream, _) = broadcast::channel(config.stream_capacity.max(1));
        Self {
            config,
            ids: Arc::new(MessageIdGenerator::new()),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscription: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            by_type_action: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            stream,
            router: None,
        }
    }

    /// Attaches a router consulted for every dispatched message. A filter
    /// veto suppresses delivery to subscribers.
    pub fn with_router(mut self, router: Arc<EventRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Returns the attached router, if any.
    pub fn router(&self) -> Option<&Arc<EventRouter>> {
        self.router.as_ref()
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Registers a handler for every message the predicate accepts.
    pub async fn subscribe<P, F, Fut>(
        &self,
        module_id: impl Into<String>,
        predicate: P,
        handler: F,
    ) -> SubscriptionHandle
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let module_id = module_id.into();
        let subscriber = Subscriber {
            id,
            module_id: module_id.clone(),
            predicate: Arc::new(predicate),
            handler: Arc::new(move |msg| handler(msg).boxed()),
        };

        self.subscribers.write().await.push(Arc::new(subscriber));
        debug!("Module {} subscribed ({})", module_id, id);
        SubscriptionHandle::new(id, module_id, &self.subscribers)
    }

    /// Registers a handler for a single action name.
    pub async fn subscribe_action<F, Fut>(
        &self,
        module_id: impl Into<String>,
        action: impl Into<String>,
        handler: F,
    ) -> SubscriptionHandle
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let action = action.into();
        self.subscribe(module_id, move |m: &Message| m.action() == action, handler)
            .await
    }

    /// Removes every subscription owned by a module. Returns how many.
    pub async fn unsubscribe_module(&self, module_id: &str) -> usize {
        let mut subs = self.subscribers.write().await;
        let before = subs.len();
        subs.retain(|s| s.module_id != module_id);
        before - subs.len()
    }

    /// Number of registered subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    // ── Publishing ───────────────────────────────────────────────

    /// Publishes an event to every matching subscriber and returns it.
    pub async fn publish(
        &self,
        sender: impl Into<String>,
        action: impl Into<String>,
        payload: Payload,
        priority: Priority,
    ) -> Message {
        let message = Message::new(self.ids.next_id(), MessageType::Event, sender, action)
            .with_payload(payload)
            .with_priority(priority);
        self.dispatch(&message).await;
        message
    }

    /// Publishes a broadcast to every matching subscriber.
    pub async fn broadcast(
        &self,
        sender: impl Into<String>,
        action: impl Into<String>,
        payload: Payload,
    ) -> Message {
        let message = Message::new(self.ids.next_id(), MessageType::Broadcast, sender, action)
            .with_payload(payload);
        self.dispatch(&message).await;
        message
    }

    /// Sends a notification to the subscribers owned by `target` only.
    pub async fn notify(
        &self,
        sender: impl Into<String>,
        target: impl Into<String>,
        action: impl Into<String>,
        payload: Payload,
    ) -> Message {
        let message = Message::new(self.ids.next_id(), MessageType::Notification, sender, action)
            .with_target(target)
            .with_payload(payload);
        self.dispatch(&message).await;
        message
    }

    /// Records, routes and delivers a message. Returns the handler count.
    async fn dispatch(&self, message: &Message) -> usize {
        self.record(message).await;

        if self.is_filtered(message) {
            return 0;
        }

        let targets = self.matching_subscribers(message).await;
        for subscriber in &targets {
            self.invoke(subscriber, message.clone()).await;
        }
        targets.len()
    }

    fn is_filtered(&self, message: &Message) -> bool {
        match &self.router {
            Some(router) if router.route(message).is_filtered() => {
                Counters::bump(&self.counters.filtered);
                debug!("Message {} ({}) vetoed by router", message.id(), message.action());
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the subscribers a message reaches, in registration order.
    async fn matching_subscribers(&self, message: &Message) -> Vec<Arc<Subscriber>> {
        let snapshot: Vec<Arc<Subscriber>> = self.subscribers.read().await.clone();
        let owner = match message.kind() {
            MessageType::Notification | MessageType::Request => message.target(),
            _ => None,
        };
        snapshot
            .into_iter()
            .filter(|s| owner.is_none_or(|t| s.module_id == t))
            .filter(|s| s.accepts(message))
            .collect()
    }

    /// Runs one handler, isolating its errors and panics.
    async fn invoke(&self, subscriber: &Subscriber, message: Message) -> Option<Payload> {
        let message_id = message.id();
        let action = message.action().to_string();

        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            (subscriber.handler)(message)
        })) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match outcome {
            Ok(Ok(response)) => {
                Counters::bump(&self.counters.delivered);
                response
            }
            Ok(Err(e)) => {
                Counters::bump(&self.counters.handler_failures);
                warn!(
                    "Handler {} of {} failed on {} ({}): {}",
                    subscriber.id, subscriber.module_id, message_id, action, e
                );
                None
            }
            Err(_) => {
                Counters::bump(&self.counters.handler_failures);
                warn!(
                    "Handler {} of {} panicked on {} ({})",
                    subscriber.id, subscriber.module_id, message_id, action
                );
                None
            }
        }
    }

    /// Counts the message and emits it on the stream.
    async fn record(&self, message: &Message) {
        *self
            .by_type_action
            .write()
            .await
            .entry(message.stats_key())
            .or_insert(0) += 1;
        // Err only means nobody is listening.
        let _ = self.stream.send(message.clone());
    }

    // ── Request / response ───────────────────────────────────────

    /// Sends a request and waits for its response.
    ///
    /// The request goes to the first matching subscriber owned by `target`,
    /// or to the first matching subscriber of any module when `target` is
    /// `None`. If that handler returns a payload it becomes the response;
    /// otherwise the request waits for [`MessageBus::respond`]. With no
    /// matching subscriber the request still waits, since observers of the
    /// message stream may answer it.
    pub async fn request(
        &self,
        sender: impl Into<String>,
        target: Option<&str>,
        action: impl Into<String>,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Message> {
        let request = Message::new(self.ids.next_id(), MessageType::Request, sender, action)
            .with_optional_target(target.map(str::to_string))
            .with_payload(payload);
        let request_id = request.id();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);
        self.record(&request).await;

        let outcome = tokio::time::timeout(timeout, self.await_response(&request, rx)).await;

        // The slot is released whatever happened.
        self.pending.lock().await.remove(&request_id);

        match outcome {
            Ok(result) => result,
            Err(_) => {
                Counters::bump(&self.counters.timeouts);
                warn!(
                    "Request {} ({}) timed out after {:?}",
                    request_id,
                    request.action(),
                    timeout
                );
                Err(BusError::Timeout {
                    request_id,
                    timeout,
                })
            }
        }
    }

    /// Sends a request using the configured default timeout.
    pub async fn request_default(
        &self,
        sender: impl Into<String>,
        target: Option<&str>,
        action: impl Into<String>,
        payload: Payload,
    ) -> Result<Message> {
        let timeout = self.config.request_timeout;
        self.request(sender, target, action, payload, timeout).await
    }

    async fn await_response(
        &self,
        request: &Message,
        rx: oneshot::Receiver<Message>,
    ) -> Result<Message> {
        if self.is_filtered(request) {
            return Err(BusError::Filtered(request.id()));
        }

        match self.matching_subscribers(request).await.into_iter().next() {
            Some(responder) => {
                if let Some(payload) = self.invoke(&responder, request.clone()).await {
                    self.respond(request, &responder.module_id, payload).await;
                }
            }
            None => debug!(
                "No subscriber for request {} ({}) to {:?}, awaiting external response",
                request.id(),
                request.action(),
                request.target()
            ),
        }

        rx.await.map_err(|_| BusError::ChannelClosed(request.id()))
    }

    /// Answers a pending request. Returns false if the request is no longer
    /// pending, e.g. it already received a response or timed out.
    pub async fn respond(
        &self,
        request: &Message,
        responder: impl Into<String>,
        payload: Payload,
    ) -> bool {
        let Some(tx) = self.pending.lock().await.remove(&request.id()) else {
            debug!("Dropping response to {}: no pending request", request.id());
            return false;
        };

        let response = Message::new(
            self.ids.next_id(),
            MessageType::Response,
            responder,
            request.action(),
        )
        .with_target(request.sender())
        .with_payload(payload)
        .with_priority(request.priority())
        .with_correlation(request.id());

        self.record(&response).await;
        tx.send(response).is_ok()
    }

    /// Number of requests currently awaiting a response.
    pub async fn pending_request_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    // ── Observability ────────────────────────────────────────────

    /// Subscribes to the stream of every constructed message.
    pub fn messages(&self) -> broadcast::Receiver<Message> {
        self.stream.subscribe()
    }

    /// Returns a statistics snapshot.
    pub async fn statistics(&self) -> BusStatistics {
        let by_type_action = self.by_type_action.read().await.clone();
        self.counters.snapshot(by_type_action)
    }

    /// Clears all statistics.
    pub async fn reset_statistics(&self) {
        self.by_type_action.write().await.clear();
        self.counters.reset();
    }

    /// Number of message ids issued so far.
    pub fn messages_issued(&self) -> u64 {
        self.ids.issued()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}
