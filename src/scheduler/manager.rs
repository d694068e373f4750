//! Audio manager: accepts messages, orders them by priority, generates
//! audio ahead of playback and hands ready waveforms to the playback
//! controller one at a time.
//!
//! All bookkeeping lives behind one mutex and is only touched for short,
//! non-blocking sections. Work that waits (generation, playback) runs in
//! spawned tasks that report back by taking the lock and waking the
//! scheduler loop.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::message::{Message, MessageKind, MessageState, PriorityTable, StateChange, Submission};
use super::queue::MessageQueue;
use crate::audio::{PlayResult, PlaybackController, SoundSynthesizer, Waveform};
use crate::config::SchedulerConfig;
use crate::context::{sanitize_for_log, CorrelationId, MessageContext, MessageId};
use crate::error::{Result, SpeakerError};
use crate::speech::GenerationPipeline;

const EVENT_CAPACITY: usize = 256;

struct Entry {
    message: Message,
    cancel: CancellationToken,
    waveform: Option<Waveform>,
}

struct SchedulerState {
    live: HashMap<MessageId, Entry>,
    /// Messages not yet handed to playback
    queue: MessageQueue,
    playing: Option<MessageId>,
    /// Playback worker owns a job
    worker_busy: bool,
    finished: VecDeque<(MessageId, MessageState)>,
    retain_finished: usize,
    next_seq: u64,
    accepting: bool,
}

impl SchedulerState {
    /// Apply a state change if the lifecycle allows it and publish it.
    /// Terminal states release every resource the message held.
    fn transition(
        &mut self,
        id: MessageId,
        next: MessageState,
        events: &broadcast::Sender<StateChange>,
    ) -> bool {
        let Some(entry) = self.live.get_mut(&id) else {
            return false;
        };
        let current = entry.message.state;
        if !current.can_transition_to(next) {
            debug!(message = %id, "Ignoring transition {current} -> {next}");
            return false;
        }
        entry.message.state = next;
        let _ = events.send(StateChange {
            id,
            correlation_id: entry.message.correlation_id.clone(),
            kind: entry.message.kind,
            state: next,
        });

        if next.is_terminal() {
            entry.cancel.cancel();
            self.live.remove(&id);
            self.queue.remove(&id);
            if self.playing == Some(id) {
                self.playing = None;
            }
            self.finished.push_back((id, next));
            while self.finished.len() > self.retain_finished {
                self.finished.pop_front();
            }
        }
        true
    }

    fn state_of(&self, id: &MessageId) -> Option<MessageState> {
        if let Some(entry) = self.live.get(id) {
            return Some(entry.message.state);
        }
        self.finished
            .iter()
            .rev()
            .find(|(finished, _)| finished == id)
            .map(|(_, state)| *state)
    }

    fn enqueue(
        &mut self,
        kind: MessageKind,
        text: Option<String>,
        priority: i32,
        correlation_id: CorrelationId,
        events: &broadcast::Sender<StateChange>,
    ) -> MessageId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let message = Message {
            id: MessageId::new(),
            kind,
            text,
            priority,
            correlation_id,
            state: MessageState::Queued,
            seq,
        };
        let id = message.id;
        {
            let _entered = message.context().span().entered();
            match &message.text {
                Some(text) => info!("Queued (priority {priority}): \"{}\"", sanitize_for_log(text, 80)),
                None => info!("Queued (priority {priority})"),
            }
        }
        let _ = events.send(StateChange {
            id,
            correlation_id: message.correlation_id.clone(),
            kind,
            state: MessageState::Queued,
        });
        self.queue.push(id, priority, seq);
        self.live.insert(
            id,
            Entry {
                message,
                cancel: CancellationToken::new(),
                waveform: None,
            },
        );
        id
    }

    /// The speech a new arrival of `priority` would cut off: the message on
    /// the device, or the one about to be. Tones are never cut off.
    fn preemption_target(&self, priority: i32) -> Option<MessageId> {
        let candidate = self.playing.or_else(|| self.queue.head())?;
        let entry = self.live.get(&candidate)?;
        let outranked = entry.message.kind.is_speech()
            && entry.message.priority < priority
            && !entry.cancel.is_cancelled();
        outranked.then_some(candidate)
    }

    /// Messages counted against `max_queue`: everything live except the
    /// one on the device.
    fn backlog(&self) -> usize {
        self.live.len() - usize::from(self.playing.is_some())
    }
}

struct PlayJob {
    id: MessageId,
    ctx: MessageContext,
    waveform: Waveform,
    cancel: CancellationToken,
}

struct Shared {
    state: Mutex<SchedulerState>,
    wake: Notify,
    events: broadcast::Sender<StateChange>,
    playback: Arc<PlaybackController>,
    pipeline: GenerationPipeline,
    sounds: SoundSynthesizer,
    priorities: PriorityTable,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

/// Point-in-time view for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerSnapshot {
    pub accepting: bool,
    pub playing: Option<PlayingSummary>,
    pub queued: usize,
    pub generating: usize,
    pub ready: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayingSummary {
    pub id: MessageId,
    pub kind: MessageKind,
    pub priority: i32,
    pub correlation_id: CorrelationId,
}

pub struct AudioManager {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AudioManager {
    /// Spawn the scheduler loop and the playback worker. Must be called
    /// from within a tokio runtime.
    pub fn start(
        config: SchedulerConfig,
        priorities: PriorityTable,
        playback: Arc<PlaybackController>,
        pipeline: GenerationPipeline,
        sounds: SoundSynthesizer,
    ) -> Result<Self> {
        if !(1..=2).contains(&config.generation_workers) {
            return Err(SpeakerError::Config(format!(
                "scheduler.generation_workers must be 1 or 2, got {}",
                config.generation_workers
            )));
        }
        if config.max_queue == 0 {
            return Err(SpeakerError::Config("scheduler.max_queue must be at least 1".into()));
        }
        priorities.validate()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (jobs_tx, jobs_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState {
                live: HashMap::new(),
                queue: MessageQueue::new(),
                playing: None,
                worker_busy: false,
                finished: VecDeque::new(),
                retain_finished: config.retain_finished,
                next_seq: 0,
                accepting: true,
            }),
            wake: Notify::new(),
            events,
            playback,
            pipeline,
            sounds,
            priorities,
            config,
            shutdown: CancellationToken::new(),
        });

        let scheduler = tokio::spawn(run_scheduler(shared.clone(), jobs_tx));
        let worker = tokio::spawn(run_playback_worker(shared.clone(), jobs_rx));
        info!(
            "Audio manager started (queue {}, {} generation worker(s), timeout {}ms)",
            shared.config.max_queue,
            shared.config.generation_workers,
            shared.config.generation_timeout_ms
        );

        Ok(Self {
            shared,
            tasks: Mutex::new(vec![scheduler, worker]),
        })
    }

    /// Enqueue a message with the kind's default priority.
    pub fn submit(&self, kind: MessageKind, text: Option<&str>, priority: Option<i32>) -> Result<MessageId> {
        self.submit_with(Submission {
            kind,
            text: text.map(str::to_string),
            priority,
            correlation_id: None,
        })
    }

    pub fn submit_with(&self, submission: Submission) -> Result<MessageId> {
        let shared = &self.shared;
        let kind = submission.kind;
        let text = self.check_text(kind, submission.text.as_deref())?;
        let priority = submission
            .priority
            .unwrap_or_else(|| shared.priorities.priority(kind));

        let id = {
            let mut state = shared.lock();
            if !state.accepting {
                return Err(SpeakerError::ShuttingDown);
            }
            let backlog = state.backlog();
            if backlog >= shared.config.max_queue {
                warn!("Rejecting {kind}: {backlog} messages pending");
                return Err(SpeakerError::QueueFull(backlog));
            }

            let correlation_id = submission
                .correlation_id
                .unwrap_or_else(CorrelationId::generate);
            let target = if shared.priorities.can_preempt(kind) {
                state.preemption_target(priority)
            } else {
                None
            };

            // The drop tone sorts just ahead of the message that caused it
            if let (Some(target), true) = (target, shared.config.drop_tone_on_preempt) {
                let tone_cid = state
                    .live
                    .get(&target)
                    .map_or_else(|| correlation_id.clone(), |e| e.message.correlation_id.clone());
                state.enqueue(MessageKind::DropTone, None, priority, tone_cid, &shared.events);
            }
            let id = state.enqueue(kind, text, priority, correlation_id, &shared.events);

            if let Some(target) = target {
                info!(message = %target, "Preempted by {kind} {id} (priority {priority})");
                self.cancel_locked(&mut state, target);
            }
            id
        };

        shared.wake.notify_one();
        Ok(id)
    }

    /// The text `submit` would store for `kind`: trimmed speech text, or
    /// nothing for tones. Lets callers reject bad input before queueing
    /// anything else on its behalf.
    pub fn check_text(&self, kind: MessageKind, text: Option<&str>) -> Result<Option<String>> {
        if !kind.is_speech() {
            return Ok(None);
        }
        let trimmed = text.unwrap_or_default().trim();
        if trimmed.is_empty() {
            return Err(SpeakerError::InvalidParameters(format!("{kind} requires text")));
        }
        let limit = self.shared.config.max_text_chars;
        let chars = trimmed.chars().count();
        if chars > limit {
            return Err(SpeakerError::InvalidParameters(format!(
                "text is {chars} chars, limit is {limit}"
            )));
        }
        Ok(Some(trimmed.to_string()))
    }

    /// Stop a message wherever it is in its lifecycle. Unknown or already
    /// finished ids are ignored.
    pub fn cancel(&self, id: MessageId) {
        self.cancel_locked(&mut self.shared.lock(), id);
        self.shared.wake.notify_one();
    }

    /// Cancel every live message. Returns how many were affected.
    pub fn cancel_all(&self) -> usize {
        let count = {
            let mut state = self.shared.lock();
            let ids: Vec<MessageId> = state.live.keys().copied().collect();
            for &id in &ids {
                self.cancel_locked(&mut state, id);
            }
            ids.len()
        };
        self.shared.wake.notify_one();
        if count > 0 {
            info!("Cancelled {count} message(s)");
        }
        count
    }

    /// A Playing message is stopped through its own token, which only its
    /// playback session watches.
    fn cancel_locked(&self, state: &mut SchedulerState, id: MessageId) {
        let Some(entry) = state.live.get(&id) else {
            debug!(message = %id, "Cancel for unknown or finished message");
            return;
        };
        let current = entry.message.state;
        let cancel = entry.cancel.clone();
        let _entered = entry.message.context().span().entered();
        match current {
            // The playback worker records the outcome once the device stops
            MessageState::Playing => {
                info!("Cancelling during playback");
                cancel.cancel();
            }
            from => {
                info!("Cancelled while {from}");
                state.transition(id, MessageState::Cancelled, &self.shared.events);
            }
        }
    }

    pub fn status(&self, id: MessageId) -> Option<MessageState> {
        self.shared.lock().state_of(&id)
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        let state = self.shared.lock();
        let count = |wanted: MessageState| {
            state
                .live
                .values()
                .filter(|e| e.message.state == wanted)
                .count()
        };
        ManagerSnapshot {
            accepting: state.accepting,
            playing: state.playing.and_then(|id| state.live.get(&id)).map(|e| PlayingSummary {
                id: e.message.id,
                kind: e.message.kind,
                priority: e.message.priority,
                correlation_id: e.message.correlation_id.clone(),
            }),
            queued: count(MessageState::Queued),
            generating: count(MessageState::Generating),
            ready: count(MessageState::Ready),
        }
    }

    /// Every state transition, in the order it happened.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.shared.events.subscribe()
    }

    pub fn priorities(&self) -> &PriorityTable {
        &self.shared.priorities
    }

    pub fn playback(&self) -> &Arc<PlaybackController> {
        &self.shared.playback
    }

    pub fn pipeline(&self) -> &GenerationPipeline {
        &self.shared.pipeline
    }

    /// Stop accepting work, cancel everything in flight and wait for the
    /// background tasks to exit.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            if !state.accepting {
                return;
            }
            state.accepting = false;
        }
        info!("Audio manager shutting down");
        self.cancel_all();
        self.shared.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {e}");
            }
        }

        // A job may have been handed to the worker after it stopped listening
        let mut state = self.shared.lock();
        let leftover: Vec<MessageId> = state.live.keys().copied().collect();
        for id in leftover {
            state.transition(id, MessageState::Cancelled, &self.shared.events);
        }
        state.worker_busy = false;
        info!("Audio manager stopped");
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start generation inside the look-ahead window and feed the
    /// playback worker when the head of the queue is ready.
    fn dispatch(self: &Arc<Self>, jobs: &mpsc::Sender<PlayJob>) {
        let mut state = self.lock();

        // Generation tasks already running hold their slot even when a
        // higher-priority arrival has pushed them down the queue
        let in_flight = state
            .live
            .values()
            .filter(|e| e.message.state == MessageState::Generating)
            .count();
        let free = self.config.generation_workers.saturating_sub(in_flight);
        let next: Vec<MessageId> = state
            .queue
            .iter()
            .filter(|id| {
                state
                    .live
                    .get(id)
                    .is_some_and(|e| e.message.state == MessageState::Queued)
            })
            .take(free)
            .collect();
        for id in next {
            let Some(entry) = state.live.get(&id) else { continue };
            let ctx = entry.message.context();
            let text = entry.message.text.clone();
            let cancel = entry.cancel.clone();
            state.transition(id, MessageState::Generating, &self.events);
            tokio::spawn(generate(self.clone(), ctx, text, cancel));
        }

        if state.worker_busy {
            return;
        }
        let Some(head) = state.queue.head() else { return };
        let Some(entry) = state.live.get_mut(&head) else { return };
        if entry.message.state != MessageState::Ready {
            return;
        }
        let Some(waveform) = entry.waveform.take() else {
            warn!(message = %head, "Ready without audio");
            state.transition(head, MessageState::Failed, &self.events);
            self.wake.notify_one();
            return;
        };
        let job = PlayJob {
            id: head,
            ctx: entry.message.context(),
            waveform,
            cancel: entry.cancel.clone(),
        };

        state.queue.remove(&head);
        state.transition(head, MessageState::Playing, &self.events);
        state.playing = Some(head);
        state.worker_busy = true;
        if jobs.try_send(job).is_err() {
            warn!(message = %head, "Playback worker unavailable");
            state.worker_busy = false;
            state.transition(head, MessageState::Failed, &self.events);
        }
    }

    async fn produce(&self, ctx: &MessageContext, text: Option<&str>) -> Result<Waveform> {
        match ctx.kind.tone() {
            Some(tone) => self.sounds.tone(tone),
            None => {
                let text = text.ok_or_else(|| SpeakerError::InvalidParameters("missing text".into()))?;
                self.pipeline.generate(text, ctx).await
            }
        }
    }
}

async fn run_scheduler(shared: Arc<Shared>, jobs: mpsc::Sender<PlayJob>) {
    loop {
        shared.dispatch(&jobs);
        tokio::select! {
            () = shared.shutdown.cancelled() => break,
            () = shared.wake.notified() => {}
        }
    }
    debug!("Scheduler loop stopped");
}

async fn generate(shared: Arc<Shared>, ctx: MessageContext, text: Option<String>, cancel: CancellationToken) {
    let span = ctx.span();
    let result = tokio::select! {
        () = cancel.cancelled() => {
            debug!(parent: &span, "Generation abandoned");
            return;
        }
        result = shared.produce(&ctx, text.as_deref()) => result,
    };

    {
        let mut state = shared.lock();
        match result {
            Ok(waveform) => {
                if state.transition(ctx.id, MessageState::Ready, &shared.events) {
                    if let Some(entry) = state.live.get_mut(&ctx.id) {
                        entry.waveform = Some(waveform);
                    }
                } else {
                    debug!(parent: &span, "Discarding audio for message no longer generating");
                }
            }
            Err(e) => {
                warn!(parent: &span, "Generation failed: {e}");
                state.transition(ctx.id, MessageState::Failed, &shared.events);
            }
        }
    }
    shared.wake.notify_one();
}

async fn run_playback_worker(shared: Arc<Shared>, mut jobs: mpsc::Receiver<PlayJob>) {
    loop {
        let job = tokio::select! {
            () = shared.shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let span = job.ctx.span();
        let result = shared.playback.play(&job.waveform, &job.ctx, &job.cancel).await;

        {
            let mut state = shared.lock();
            let outcome = match result {
                Ok(PlayResult::Completed) if !job.cancel.is_cancelled() => MessageState::Played,
                Ok(_) => MessageState::Cancelled,
                Err(e) => {
                    warn!(parent: &span, "Playback failed: {e}");
                    MessageState::Failed
                }
            };
            state.transition(job.id, outcome, &shared.events);
            state.worker_busy = false;
            info!(parent: &span, "Finished: {outcome}");
        }
        shared.wake.notify_one();
    }
    debug!("Playback worker stopped");
}
