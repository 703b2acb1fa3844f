//! The message: unit of the ledger and the bus.
//!
//! [`NewMessage`] is the pre-append form (no id, optional timestamp);
//! [`Message`] is the stored form the ledger hands back. Once appended a
//! message is immutable, and `(cluster_id, id)` is the total ordering key
//! within a cluster.
//!
//! Wire format is camelCase JSON matching the cluster config dialect.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default receiver when none is specified.
pub const BROADCAST_RECEIVER: &str = "broadcast";

/// Structured message body: optional free-form text plus a nested data map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    /// Free-form text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Structured payload; shape varies by topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl MessageContent {
    /// Content with only a text body.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            data: None,
        }
    }

    /// Content with only a structured payload.
    #[must_use]
    pub fn data(data: Value) -> Self {
        Self {
            text: None,
            data: Some(data),
        }
    }

    /// Returns `true` when both text and data are absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.data.is_none()
    }
}

/// A message prior to append: the ledger assigns `id` and, when absent,
/// `timestamp`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    /// Owning cluster. Required, non-empty.
    pub cluster_id: String,
    /// Topic tag. Required, non-empty.
    pub topic: String,
    /// Originating agent id, or `system` / `user` / `state-snapshotter`.
    pub sender: String,
    /// Destination; defaults to `broadcast`.
    #[serde(default = "default_receiver")]
    pub receiver: String,
    /// Message body.
    #[serde(default)]
    pub content: MessageContent,
    /// Optional metadata (e.g. `{"source": "issue"}`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Epoch milliseconds; assigned on append when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

fn default_receiver() -> String {
    BROADCAST_RECEIVER.to_string()
}

impl NewMessage {
    /// Build a broadcast message with the given body.
    #[must_use]
    pub fn broadcast(
        cluster_id: impl Into<String>,
        topic: impl Into<String>,
        sender: impl Into<String>,
        content: MessageContent,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            topic: topic.into(),
            sender: sender.into(),
            receiver: default_receiver(),
            content,
            metadata: None,
            timestamp: None,
        }
    }

    /// Attach metadata, builder-style.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A stored, immutable message as returned by the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Monotonic id assigned on append, unique within the cluster database.
    pub id: i64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Owning cluster.
    pub cluster_id: String,
    /// Topic tag.
    pub topic: String,
    /// Originator.
    pub sender: String,
    /// Destination.
    pub receiver: String,
    /// Message body.
    pub content: MessageContent,
    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    /// Convenience accessor for `content.data` at a dotted path
    /// (`"completionStatus.canValidate"`).
    #[must_use]
    pub fn data_at(&self, path: &str) -> Option<&Value> {
        let mut current = self.content.data.as_ref()?;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
