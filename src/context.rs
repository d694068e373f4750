//! Per-message correlation context for logging.
//!
//! A `MessageContext` is created once at submission and handed read-only to
//! generation and playback. Its `span()` carries the message id and the
//! correlation id so every log line of a message can be grepped together.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

use crate::scheduler::MessageKind;

/// Opaque message identifier assigned at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tracing identifier, constant across a message's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Short random id: first 8 hex chars of a v4 UUID.
    pub fn generate() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(8);
        Self(hex)
    }

    /// Adopt a caller-supplied id (e.g. an `x-request-id` header).
    /// Blank or overlong values are replaced with a generated one.
    pub fn from_external(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.len() > 64 || value.chars().any(char::is_control) {
            Self::generate()
        } else {
            Self(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only context threaded through generation and playback.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub id: MessageId,
    pub correlation_id: CorrelationId,
    pub kind: MessageKind,
}

impl MessageContext {
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "message",
            id = %self.id,
            cid = %self.correlation_id,
            kind = %self.kind,
        )
    }
}

/// Make text safe for single-line logging: escape newlines, truncate.
pub fn sanitize_for_log(text: &str, max_chars: usize) -> String {
    let escaped = text.replace('\n', "\\n").replace('\r', "");
    if escaped.chars().count() > max_chars {
        let head: String = escaped.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_correlation_ids_are_short_hex() {
        let cid = CorrelationId::generate();
        assert_eq!(cid.as_str().len(), 8);
        assert!(cid.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(cid, CorrelationId::generate());
    }

    #[test]
    fn external_correlation_id_is_kept_when_sane() {
        assert_eq!(CorrelationId::from_external(" req-42 ").as_str(), "req-42");
        assert_eq!(CorrelationId::from_external("").as_str().len(), 8);
        assert_eq!(CorrelationId::from_external("a\nb").as_str().len(), 8);
    }

    #[test]
    fn message_id_round_trips_through_display() {
        let id = MessageId::new();
        assert_eq!(MessageId::parse(&id.to_string()), Some(id));
        assert_eq!(MessageId::parse("not-a-uuid"), None);
    }

    #[test]
    fn sanitize_escapes_and_truncates() {
        assert_eq!(sanitize_for_log("a\nb\r", 80), "a\\nb");
        assert_eq!(sanitize_for_log("abcdef", 3), "abc...");
        assert_eq!(sanitize_for_log("héllo", 5), "héllo");
    }
}
