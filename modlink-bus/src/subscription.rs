//! Subscriptions and their cancellable handles.

use futures::future::BoxFuture;
use modlink_types::{Message, Payload};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::debug;

/// What a handler returns: an optional response payload, used only when the
/// delivered message is a request.
pub type HandlerResult = anyhow::Result<Option<Payload>>;

pub(crate) type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;
pub(crate) type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
pub(crate) type SubscriberList = RwLock<Vec<Arc<Subscriber>>>;

/// Identifier of a subscription, unique per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

pub(crate) struct Subscriber {
    pub(crate) id: SubscriptionId,
    pub(crate) module_id: String,
    pub(crate) predicate: Predicate,
    pub(crate) handler: Handler,
}

impl Subscriber {
    pub(crate) fn accepts(&self, message: &Message) -> bool {
        (self.predicate)(message)
    }
}

/// Handle returned by `subscribe`. Cancelling it stops future deliveries;
/// messages already being dispatched still reach the handler.
///
/// Dropping the handle does not cancel the subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    module_id: String,
    subscribers: Weak<SubscriberList>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId, module_id: String, subscribers: &Arc<SubscriberList>) -> Self {
        Self {
            id,
            module_id,
            subscribers: Arc::downgrade(subscribers),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The module owning this subscription.
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Removes the subscription. Returns false if it was already gone.
    pub async fn cancel(&self) -> bool {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return false;
        };
        let mut subs = subscribers.write().await;
        let before = subs.len();
        subs.retain(|s| s.id != self.id);
        let removed = before != subs.len();
        if removed {
            debug!("Cancelled subscription {} of {}", self.id, self.module_id);
        }
        removed
    }

    /// Returns true while the subscription is registered.
    pub async fn is_active(&self) -> bool {
        match self.subscribers.upgrade() {
            Some(subscribers) => subscribers.read().await.iter().any(|s| s.id == self.id),
            None => false,
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("module_id", &self.module_id)
            .finish()
    }
}
