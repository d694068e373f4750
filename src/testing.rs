//! Test doubles for the audio device and the TTS backend. Both run on
//! tokio time so tests can use `start_paused`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::audio::{ActivePlayback, AudioOutput, Waveform};
use crate::error::{Result, SpeakerError};
use crate::speech::SpeechSynthesizer;

#[derive(Default)]
struct OutputCounters {
    active: AtomicUsize,
    max_concurrent: AtomicUsize,
    stopped: AtomicUsize,
}

/// Records what would have been played. A waveform "finishes" once its
/// duration has elapsed.
#[derive(Default)]
pub(crate) struct FakeOutput {
    played: Mutex<Vec<Waveform>>,
    counters: Arc<OutputCounters>,
    fail: bool,
}

impl FakeOutput {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn played(&self) -> Vec<Waveform> {
        self.played.lock().unwrap().clone()
    }

    pub(crate) fn stopped(&self) -> usize {
        self.counters.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.counters.max_concurrent.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }
}

impl AudioOutput for FakeOutput {
    fn start(&self, waveform: &Waveform) -> Result<Box<dyn ActivePlayback>> {
        if self.fail {
            return Err(SpeakerError::PlaybackDevice("no device".into()));
        }
        self.played.lock().unwrap().push(waveform.clone());
        let now_active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_concurrent
            .fetch_max(now_active, Ordering::SeqCst);
        Ok(Box::new(FakePlayback {
            ends_at: Instant::now() + waveform.duration(),
            counters: self.counters.clone(),
        }))
    }
}

struct FakePlayback {
    ends_at: Instant,
    counters: Arc<OutputCounters>,
}

impl ActivePlayback for FakePlayback {
    fn is_finished(&self) -> bool {
        Instant::now() >= self.ends_at
    }

    fn stop(&mut self) {
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakePlayback {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Behavior {
    Delay(Duration),
    Hang,
    Fail,
    Silent,
}

/// Scripted speech backend. Audio is a constant 1 kHz-rate waveform of
/// `audio` length; every requested text is recorded.
pub(crate) struct FakeSpeech {
    behavior: Behavior,
    audio: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeSpeech {
    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            audio: Duration::from_millis(500),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn instant() -> Self {
        Self::with(Behavior::Delay(Duration::ZERO))
    }

    pub(crate) fn delayed(delay: Duration) -> Self {
        Self::with(Behavior::Delay(delay))
    }

    pub(crate) fn hanging() -> Self {
        Self::with(Behavior::Hang)
    }

    pub(crate) fn failing() -> Self {
        Self::with(Behavior::Fail)
    }

    pub(crate) fn silent() -> Self {
        Self::with(Behavior::Silent)
    }

    pub(crate) fn audio(mut self, length: Duration) -> Self {
        self.audio = length;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    fn name(&self) -> &str {
        "fake"
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Waveform> {
        self.calls.lock().unwrap().push(text.to_string());
        match self.behavior {
            Behavior::Delay(delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let samples = self.audio.as_millis() as usize;
                Ok(Waveform::new(vec![0.1; samples], 1000))
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::Fail => Err(SpeakerError::Generation("synthesis exploded".into())),
            Behavior::Silent => Ok(Waveform::new(Vec::new(), 1000)),
        }
    }
}
