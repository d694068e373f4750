//! Configuration management for code-speaker.
//!
//! Loads config from YAML files in standard locations. Every section and
//! field is optional; missing values take the defaults below.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::audio::ToneParams;
use crate::scheduler::{MessageKind, PriorityTable};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8767,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// "kokoro" (local ONNX) or "remote" (HTTP service returning WAV)
    pub backend: String,
    pub voice: String,
    pub speed: f32,
    pub model_path: String,
    pub voices_path: String,
    pub tokenizer_path: String,
    pub remote_url: String,
    /// Seconds
    pub remote_timeout: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: "kokoro".into(),
            voice: "af_heart".into(),
            speed: 1.0,
            model_path: String::new(),
            voices_path: String::new(),
            tokenizer_path: String::new(),
            remote_url: String::new(),
            remote_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Live (not yet playing) messages allowed before `QueueFull`
    pub max_queue: usize,
    pub generation_timeout_ms: u64,
    /// Concurrent generations, including look-ahead (1-2)
    pub generation_workers: usize,
    pub drop_tone_on_preempt: bool,
    /// Finished messages kept for status queries
    pub retain_finished: usize,
    pub max_text_chars: usize,
}

impl SchedulerConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queue: 32,
            generation_timeout_ms: 15_000,
            generation_workers: 2,
            drop_tone_on_preempt: true,
            retain_finished: 128,
            max_text_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrioritiesConfig {
    pub chime: i32,
    pub summary: i32,
    pub permission: i32,
    pub drop_tone: i32,
    /// Kinds allowed to cut off lower-priority speech. Priority alone only
    /// orders the queue: Chime and DropTone outrank Summary by default yet
    /// are left out of this list, so they wait for running speech to end.
    /// Permission must rank at least as high as Summary and Chime.
    pub preempting: Vec<MessageKind>,
}

impl Default for PrioritiesConfig {
    fn default() -> Self {
        Self {
            chime: 25,
            summary: 20,
            permission: 30,
            drop_tone: 25,
            preempting: vec![MessageKind::Summary, MessageKind::Permission],
        }
    }
}

impl PrioritiesConfig {
    pub fn table(&self) -> PriorityTable {
        PriorityTable::new(
            [
                (MessageKind::Chime, self.chime),
                (MessageKind::Summary, self.summary),
                (MessageKind::Permission, self.permission),
                (MessageKind::DropTone, self.drop_tone),
            ],
            self.preempting.iter().copied(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SoundsConfig {
    pub chime: ToneParams,
    pub drop_tone: ToneParams,
}

impl Default for SoundsConfig {
    fn default() -> Self {
        Self {
            chime: ToneParams::chime(24000),
            drop_tone: ToneParams::drop_tone(24000),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub enabled: bool,
    /// "ollama" or "groq"
    pub backend: String,
    /// Ollama model for short responses and permission announcements
    pub model: String,
    /// Ollama model for long responses
    pub model_large: String,
    pub host: String,
    /// Falls back to GROQ_API_KEY
    pub groq_api_key: Option<String>,
    pub groq_url: String,
    pub groq_model_small: String,
    pub groq_model_large: String,
    /// Text at or below this length is spoken as-is
    pub max_direct_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: "ollama".into(),
            model: "llama3.2:3b".into(),
            model_large: "llama3.2:3b".into(),
            host: "http://localhost:11434".into(),
            groq_api_key: None,
            groq_url: "https://api.groq.com/openai/v1".into(),
            groq_model_small: "llama-3.1-8b-instant".into(),
            groq_model_large: "llama-3.3-70b-versatile".into(),
            max_direct_chars: 150,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Seconds between repeats
    pub interval: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self { interval: 300 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tts: TtsConfig,
    pub scheduler: SchedulerConfig,
    pub priorities: PrioritiesConfig,
    pub sounds: SoundsConfig,
    pub summarizer: SummarizerConfig,
    pub reminder: ReminderConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/code-speaker/config.yaml
    /// 3. /etc/code-speaker/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/code-speaker/config.yaml")),
                Some(PathBuf::from("/etc/code-speaker/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}
