//! Claude Code JSONL transcript reader.
//!
//! The hook binary uses it to find what the assistant last said, which
//! becomes the text of the completion summary.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

fn entries_newest_first(transcript_path: &Path) -> Vec<Value> {
    let contents = match fs::read_to_string(transcript_path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read transcript {}: {e}", transcript_path.display());
            return Vec::new();
        }
    };
    contents
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

fn entry_type(entry: &Value) -> Option<&str> {
    entry.get("type").and_then(Value::as_str)
}

/// Text of the most recent assistant message, truncated to `max_chars`.
pub fn last_assistant_text(transcript_path: &Path, max_chars: usize) -> Option<String> {
    entries_newest_first(transcript_path)
        .iter()
        .filter(|entry| entry_type(entry) == Some("assistant"))
        .find_map(|entry| {
            entry
                .pointer("/message/content")
                .and_then(Value::as_array)?
                .iter()
                .filter(|block| entry_type(block) == Some("text"))
                .find_map(|block| block.get("text").and_then(Value::as_str))
                .map(|text| text.chars().take(max_chars).collect())
        })
}

/// Timestamp of the most recent user message.
pub fn last_user_timestamp(transcript_path: &Path) -> Option<String> {
    entries_newest_first(transcript_path)
        .iter()
        .filter(|entry| entry_type(entry) == Some("user"))
        .find_map(|entry| entry.get("timestamp").and_then(Value::as_str))
        .map(str::to_string)
}
