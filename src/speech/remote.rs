//! Remote TTS backend: POSTs text to an HTTP synthesis service that
//! answers with WAV bytes.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use super::SpeechSynthesizer;
use crate::audio::Waveform;
use crate::config::TtsConfig;
use crate::error::{Result, SpeakerError};

pub struct RemoteEngine {
    url: String,
    voice: Mutex<String>,
    speed: f32,
    client: Client,
}

impl RemoteEngine {
    pub fn new(config: &TtsConfig) -> Result<Self> {
        if config.remote_url.is_empty() {
            return Err(SpeakerError::Config("tts.remote_url is required for the remote backend".into()));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(config.remote_timeout))
            .build()
            .map_err(|e| SpeakerError::Config(format!("Failed to create HTTP client: {e}")))?;

        info!("Remote TTS backend at {}", config.remote_url);
        Ok(Self {
            url: config.remote_url.clone(),
            voice: Mutex::new(config.voice.clone()),
            speed: config.speed,
            client,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for RemoteEngine {
    fn name(&self) -> &str {
        "remote"
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Waveform> {
        let t_start = Instant::now();
        let voice = self.current_voice().unwrap_or_default();
        let body = json!({
            "text": text,
            "voice": voice,
            "speed": self.speed,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SpeakerError::Generation(format!("Cannot connect to TTS service at {}", self.url))
                } else if e.is_timeout() {
                    SpeakerError::Generation("TTS service request timed out".into())
                } else {
                    SpeakerError::Generation(format!("TTS service request failed: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            warn!("TTS service returned status {}", resp.status());
            return Err(SpeakerError::Generation(format!(
                "TTS service returned status {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SpeakerError::Generation(format!("Failed to read TTS response: {e}")))?;
        let waveform = Waveform::from_wav_bytes(&bytes)?;

        debug!(
            "Remote TTS: {} bytes → {:.1}s of audio ({:.0}ms)",
            bytes.len(),
            waveform.duration().as_secs_f64(),
            t_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(waveform)
    }

    fn current_voice(&self) -> Option<String> {
        Some(self.voice.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    /// The remote service validates voices itself; any name is accepted here.
    fn set_voice(&self, voice: &str) -> bool {
        if voice.trim().is_empty() {
            return false;
        }
        *self.voice.lock().unwrap_or_else(|e| e.into_inner()) = voice.to_string();
        info!("Voice changed to: {voice}");
        true
    }
}
