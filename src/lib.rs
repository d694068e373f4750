//! code-speaker: spoken feedback for Claude Code.
//!
//! Components:
//! - `scheduler`: priority queue, look-ahead generation and preemption
//! - `audio`: waveforms, synthesized cues and the playback controller
//! - `speech`: TTS backends (Kokoro ONNX, remote HTTP) and the generation pipeline
//! - `api`: axum HTTP server (port 8767) for hook integration
//! - `summarizer`: Ollama or Groq rewriting of assistant text before speaking
//! - `reminder`: periodic re-submission until the user responds
//! - `transcript`: Claude Code JSONL transcript reader

pub mod api;
pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod reminder;
pub mod scheduler;
pub mod speech;
pub mod summarizer;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testing;
