//! The message envelope exchanged between modules.
//!
//! A message is immutable once it has been handed to the bus. The builder
//! methods take `self` by value so a message can only be shaped before it is
//! shared.

use crate::{MessageId, Payload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of communication a message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Fire-and-forget event.
    Event,
    /// Request awaiting exactly one response.
    Request,
    /// Response correlated to a request.
    Response,
    /// Point-to-point notification for a single module.
    Notification,
    /// Event addressed to every interested module.
    Broadcast,
}

impl MessageType {
    /// Returns the lowercase name used in statistics keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Request => "request",
            Self::Response => "response",
            Self::Notification => "notification",
            Self::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority. Ordered `Low < Normal < High < Urgent`.
///
/// Priority is informational: the bus never reorders handlers by it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Returns the lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// A unit of communication between modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    #[serde(rename = "type")]
    kind: MessageType,
    action: String,
    sender: String,
    target: Option<String>,
    payload: Payload,
    priority: Priority,
    timestamp: DateTime<Utc>,
    correlation_id: Option<MessageId>,
}

impl Message {
    /// Creates a message with an empty payload and normal priority.
    pub fn new(
        id: MessageId,
        kind: MessageType,
        sender: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind,
            action: action.into(),
            sender: sender.into(),
            target: None,
            payload: Payload::new(),
            priority: Priority::Normal,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Sets the target module.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the target module, leaving it absent for `None`.
    pub fn with_optional_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Marks this message as answering the given request.
    pub fn with_correlation(mut self, request_id: MessageId) -> Self {
        self.correlation_id = Some(request_id);
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The request this message answers, for `Response` messages.
    pub fn correlation_id(&self) -> Option<MessageId> {
        self.correlation_id
    }

    /// Statistics key of the form `<type>_<action>`.
    pub fn stats_key(&self) -> String {
        format!("{}_{}", self.kind.as_str(), self.action)
    }

    /// Returns true if the message has no target and may reach any module.
    pub fn is_untargeted(&self) -> bool {
        self.target.is_none()
    }
}
