//! Periodic reminders.
//!
//! Re-submits a message at a fixed interval until cancelled. Used for
//! "Claude is waiting" prompts after a task completes or a permission
//! request goes unanswered.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SpeakerError;
use crate::scheduler::{AudioManager, MessageKind};

pub struct ReminderManager {
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    active: Arc<AtomicBool>,
    count: Arc<AtomicU32>,
}

impl ReminderManager {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn reminder_count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Start repeating `text`. Replaces any running reminder.
    pub fn start(&self, manager: Arc<AudioManager>, kind: MessageKind, text: String) {
        self.cancel();
        self.active.store(true, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);

        let active = self.active.clone();
        let count = self.count.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !active.load(Ordering::Relaxed) {
                    break;
                }
                let n = count.fetch_add(1, Ordering::Relaxed) + 1;
                match manager.submit(kind, Some(&text), None) {
                    Ok(id) => info!("Reminder #{n}: queued {id}"),
                    Err(SpeakerError::ShuttingDown) => break,
                    Err(e) => warn!("Reminder #{n} rejected: {e}"),
                }
            }
            active.store(false, Ordering::Relaxed);
            debug!("Reminder loop ended");
        });

        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop the reminder. Returns how many times it fired.
    pub fn cancel(&self) -> u32 {
        self.active.store(false, Ordering::Relaxed);
        if let Some(handle) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        self.count.swap(0, Ordering::Relaxed)
    }
}

impl Drop for ReminderManager {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{PlaybackController, SoundSynthesizer};
    use crate::config::{PrioritiesConfig, SchedulerConfig};
    use crate::scheduler::MessageState;
    use crate::speech::GenerationPipeline;
    use crate::testing::{FakeOutput, FakeSpeech};

    fn manager(speech: Arc<FakeSpeech>) -> Arc<AudioManager> {
        let config = SchedulerConfig::default();
        Arc::new(
            AudioManager::start(
                config.clone(),
                PrioritiesConfig::default().table(),
                Arc::new(PlaybackController::new(Arc::new(FakeOutput::new()))),
                GenerationPipeline::new(speech, config.generation_timeout()),
                SoundSynthesizer::default(),
            )
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fires_every_interval_until_cancelled() {
        let speech = Arc::new(FakeSpeech::instant());
        let manager = manager(speech.clone());
        let mut events = manager.subscribe();
        let reminder = ReminderManager::new(Duration::from_secs(60));

        reminder.start(manager.clone(), MessageKind::Summary, "Claude is waiting".into());
        assert!(reminder.is_active());

        let mut played = 0;
        while played < 2 {
            let event = events.recv().await.unwrap();
            if event.state == MessageState::Played {
                played += 1;
            }
        }
        assert_eq!(reminder.reminder_count(), 2);

        assert_eq!(reminder.cancel(), 2);
        assert!(!reminder.is_active());
        assert_eq!(reminder.reminder_count(), 0);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(speech.calls(), ["Claude is waiting", "Claude is waiting"]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_reminder() {
        let speech = Arc::new(FakeSpeech::instant());
        let manager = manager(speech.clone());
        let reminder = ReminderManager::new(Duration::from_secs(10));

        reminder.start(manager.clone(), MessageKind::Summary, "old".into());
        reminder.start(manager.clone(), MessageKind::Permission, "new".into());
        tokio::time::sleep(Duration::from_secs(15)).await;
        reminder.cancel();

        assert_eq!(speech.calls(), ["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_manager_shuts_down() {
        let manager = manager(Arc::new(FakeSpeech::instant()));
        let reminder = ReminderManager::new(Duration::from_secs(5));
        reminder.start(manager.clone(), MessageKind::Summary, "hello".into());

        manager.shutdown().await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!reminder.is_active());
    }
}
