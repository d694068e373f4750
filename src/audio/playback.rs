//! Playback controller: the only owner of the audio output device.
//!
//! IDLE → PLAYING → IDLE
//!
//! `play` holds a session slot for as long as the waveform is sounding. The
//! slot and the device handle are released by a drop guard, so an
//! interrupted, failed or dropped `play` never leaves the device locked.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};

use super::Waveform;
use crate::context::{MessageContext, MessageId};
use crate::error::{Result, SpeakerError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Something that can start sounding a waveform.
pub trait AudioOutput: Send + Sync {
    fn start(&self, waveform: &Waveform) -> Result<Box<dyn ActivePlayback>>;
}

/// Handle to a waveform that is currently sounding.
pub trait ActivePlayback: Send {
    fn is_finished(&self) -> bool;
    fn stop(&mut self);
}

/// Default output device via rodio.
pub struct RodioOutput {
    // Kept alive for process lifetime; in rodio 0.21 the stream is the handle
    stream: OutputStream,
}

impl RodioOutput {
    pub fn open_default() -> Result<Self> {
        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| SpeakerError::PlaybackDevice(format!("Failed to open audio output: {e}")))?;
        info!("Audio output opened");
        Ok(Self { stream })
    }
}

impl AudioOutput for RodioOutput {
    fn start(&self, waveform: &Waveform) -> Result<Box<dyn ActivePlayback>> {
        let sink = Sink::connect_new(self.stream.mixer());
        let source = SamplesBuffer::new(1, waveform.sample_rate(), waveform.samples().to_vec());
        sink.append(source);
        Ok(Box::new(RodioPlayback { sink }))
    }
}

struct RodioPlayback {
    sink: Sink,
}

impl ActivePlayback for RodioPlayback {
    fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Playing => write!(f, "PLAYING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayResult {
    Completed,
    Interrupted,
}

/// The live binding of a message to the device.
struct PlaybackSession {
    message: MessageId,
    started: Instant,
    interrupt: CancellationToken,
}

pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    session: Mutex<Option<PlaybackSession>>,
    poll_interval: Duration,
}

/// Releases the session slot and stops the device on every exit path.
struct SessionGuard<'a> {
    controller: &'a PlaybackController,
    handle: Option<Box<dyn ActivePlayback>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.stop();
            }
        }
        self.controller.lock_session().take();
    }
}

impl PlaybackController {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            session: Mutex::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<PlaybackSession>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> PlaybackState {
        if self.lock_session().is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    /// Message currently bound to the device, if any.
    pub fn current(&self) -> Option<MessageId> {
        self.lock_session().as_ref().map(|s| s.message)
    }

    /// Time since the current session started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.lock_session().as_ref().map(|s| s.started.elapsed())
    }

    /// Play `waveform` to completion or until interrupted.
    ///
    /// `cancel` is the caller's own stop signal; `interrupt()` stops the
    /// session as well. Fails with `DeviceBusy` if a session is live.
    pub async fn play(
        &self,
        waveform: &Waveform,
        ctx: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<PlayResult> {
        self.play_inner(waveform, ctx, cancel)
            .instrument(ctx.span())
            .await
    }

    async fn play_inner(
        &self,
        waveform: &Waveform,
        ctx: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<PlayResult> {
        let interrupt = cancel.child_token();
        {
            let mut session = self.lock_session();
            if session.is_some() {
                warn!("Refusing to play: device already owned");
                return Err(SpeakerError::DeviceBusy);
            }
            *session = Some(PlaybackSession {
                message: ctx.id,
                started: Instant::now(),
                interrupt: interrupt.clone(),
            });
        }
        let mut guard = SessionGuard {
            controller: self,
            handle: None,
        };

        if interrupt.is_cancelled() {
            debug!("Interrupted before playback started");
            return Ok(PlayResult::Interrupted);
        }

        let t_play = Instant::now();
        guard.handle = Some(self.output.start(waveform)?);
        debug!(
            "Playing {:.2}s of audio",
            waveform.duration().as_secs_f64()
        );

        let result = loop {
            let finished = guard.handle.as_ref().map_or(true, |h| h.is_finished());
            if finished {
                break PlayResult::Completed;
            }
            tokio::select! {
                () = interrupt.cancelled() => break PlayResult::Interrupted,
                () = tokio::time::sleep(self.poll_interval) => trace!("playback poll"),
            }
        };

        let play_ms = t_play.elapsed().as_secs_f64() * 1000.0;
        match result {
            PlayResult::Completed => debug!("Playback complete ({play_ms:.0}ms)"),
            PlayResult::Interrupted => info!("Playback interrupted after {play_ms:.0}ms"),
        }
        drop(guard);
        Ok(result)
    }

    /// Ask the in-progress `play` to stop. No-op when idle.
    pub fn interrupt(&self) {
        if let Some(session) = self.lock_session().as_ref() {
            debug!(message = %session.message, "Interrupt requested");
            session.interrupt.cancel();
        }
    }
}
