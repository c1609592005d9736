//! Allow/deny filters applied before rule matching.

use crate::glob;
use modlink_types::Message;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Custom filter predicate. Returns true to allow the message.
pub type FilterPredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// A filter that either allows or vetoes a message.
#[derive(Clone)]
pub enum MessageFilter {
    /// Only these senders may pass.
    AllowSenders(HashSet<String>),
    /// These senders are dropped.
    DenySenders(HashSet<String>),
    /// Only actions matching one of these patterns may pass.
    AllowActions(Vec<String>),
    /// Actions matching any of these patterns are dropped.
    DenyActions(Vec<String>),
    /// Arbitrary predicate.
    Custom(FilterPredicate),
}

impl MessageFilter {
    pub fn allow_senders<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowSenders(senders.into_iter().map(Into::into).collect())
    }

    pub fn deny_senders<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::DenySenders(senders.into_iter().map(Into::into).collect())
    }

    pub fn allow_actions<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowActions(patterns.into_iter().map(Into::into).collect())
    }

    pub fn deny_actions<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::DenyActions(patterns.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Returns true if the message passes this filter.
    pub fn allows(&self, message: &Message) -> bool {
        match self {
            Self::AllowSenders(set) => set.contains(message.sender()),
            Self::DenySenders(set) => !set.contains(message.sender()),
            Self::AllowActions(patterns) => patterns
                .iter()
                .any(|p| glob::matches(p, message.action())),
            Self::DenyActions(patterns) => !patterns
                .iter()
                .any(|p| glob::matches(p, message.action())),
            Self::Custom(predicate) => predicate(message),
        }
    }
}

impl fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowSenders(s) => f.debug_tuple("AllowSenders").field(s).finish(),
            Self::DenySenders(s) => f.debug_tuple("DenySenders").field(s).finish(),
            Self::AllowActions(p) => f.debug_tuple("AllowActions").field(p).finish(),
            Self::DenyActions(p) => f.debug_tuple("DenyActions").field(p).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
