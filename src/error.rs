//! Error types for code-speaker.
//!
//! Submission-time rejections (`QueueFull`, `InvalidParameters`,
//! `ShuttingDown`) reach the caller of `submit`. Everything that goes wrong
//! later is attached to a single message, which ends `Failed`.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeakerError {
    /// Backlog bound exceeded; the submission was rejected
    #[error("queue full ({0} live messages)")]
    QueueFull(usize),

    /// Malformed synthesis parameters or message text
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Speech backend did not answer within the configured bound
    #[error("speech generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// Speech backend failed
    #[error("speech generation failed: {0}")]
    Generation(String),

    /// Summarizer backend failed; callers fall back to local text
    #[error("summarizer failed: {0}")]
    Summarizer(String),

    /// A second `play` was attempted while the device is owned
    #[error("audio device busy")]
    DeviceBusy,

    /// Audio output device failure
    #[error("audio device error: {0}")]
    PlaybackDevice(String),

    /// Teardown started; no further submissions are accepted
    #[error("audio manager is shutting down")]
    ShuttingDown,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpeakerError>;
