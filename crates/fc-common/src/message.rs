//! The message envelope (C2).
//!
//! Commands, queries, and events all share this envelope shape; what
//! differs between the three kinds is how many handlers are resolved and
//! whether a result is required (enforced by the processors in
//! `fc-pipeline`, not by the envelope itself). Field naming follows the
//! camelCase-on-the-wire convention `fc_common::Message` uses for
//! cross-language compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Arbitrary envelope metadata. Keys are set once; see [`Envelope::set_metadata`].
pub type Metadata = HashMap<String, serde_json::Value>;

/// Which of the three dispatch shapes a message uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Exactly one handler, an optional result.
    Command,
    /// Exactly one handler, a required result.
    Query,
    /// Zero or more handlers, no result.
    Event,
}

/// The structured carrier for a message body of type `T`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub message_id: Uuid,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    #[serde(default)]
    pub causation_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Metadata,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(kind: MessageKind, body: T, now: DateTime<Utc>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            kind,
            timestamp: now,
            correlation_id: None,
            causation_id: None,
            metadata: Metadata::new(),
            body,
        }
    }

    pub fn command(body: T, now: DateTime<Utc>) -> Self {
        Self::new(MessageKind::Command, body, now)
    }

    pub fn query(body: T, now: DateTime<Utc>) -> Self {
        Self::new(MessageKind::Query, body, now)
    }

    pub fn event(body: T, now: DateTime<Utc>) -> Self {
        Self::new(MessageKind::Event, body, now)
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_causation_id(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Ensures both ids are set, defaulting correlation to this message's own id
    /// and causation to the parent id if one is supplied. Idempotent: an
    /// already-set id is left untouched. Mirrors the Correlation decorator's
    /// contract in §4.1.
    pub fn ensure_correlation(&mut self, parent_causation_id: Option<Uuid>) {
        if self.correlation_id.is_none() {
            self.correlation_id = Some(self.message_id);
        }
        if self.causation_id.is_none() {
            self.causation_id = parent_causation_id;
        }
    }

    /// Inserts metadata only if the key is unset. Returns `false` if the key
    /// already existed (the existing value is left untouched).
    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) -> bool {
        use std::collections::hash_map::Entry;
        match self.metadata.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn map_body<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            message_id: self.message_id,
            kind: self.kind,
            timestamp: self.timestamp,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            metadata: self.metadata,
            body: f(self.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_correlation_defaults_to_self_id() {
        let mut env = Envelope::command("ping", Utc::now());
        env.ensure_correlation(None);
        assert_eq!(env.correlation_id, Some(env.message_id));
        assert_eq!(env.causation_id, None);
    }

    #[test]
    fn ensure_correlation_is_idempotent() {
        let parent = Uuid::new_v4();
        let mut env = Envelope::event("tick", Utc::now()).with_correlation_id(parent);
        env.ensure_correlation(Some(Uuid::new_v4()));
        assert_eq!(env.correlation_id, Some(parent));
    }

    #[test]
    fn set_metadata_is_set_once() {
        let mut env = Envelope::command((), Utc::now());
        assert!(env.set_metadata("k", serde_json::json!(1)));
        assert!(!env.set_metadata("k", serde_json::json!(2)));
        assert_eq!(env.metadata.get("k"), Some(&serde_json::json!(1)));
    }
}
