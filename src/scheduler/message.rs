//! Message model: kinds, lifecycle states and the priority policy.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::ToneKind;
use crate::context::{CorrelationId, MessageContext, MessageId};
use crate::error::{Result, SpeakerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chime,
    Summary,
    Permission,
    DropTone,
}

impl MessageKind {
    /// Tone kinds are synthesized locally; the rest go through the TTS backend.
    pub fn tone(self) -> Option<ToneKind> {
        match self {
            Self::Chime => Some(ToneKind::Chime),
            Self::DropTone => Some(ToneKind::DropTone),
            Self::Summary | Self::Permission => None,
        }
    }

    pub fn is_speech(self) -> bool {
        self.tone().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chime => "chime",
            Self::Summary => "summary",
            Self::Permission => "permission",
            Self::DropTone => "drop_tone",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// QUEUED → GENERATING → READY → PLAYING → PLAYED, with CANCELLED and
/// FAILED reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Queued,
    Generating,
    Ready,
    Playing,
    Played,
    Cancelled,
    Failed,
}

impl MessageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Played | Self::Cancelled | Self::Failed)
    }

    fn successor(self) -> Option<Self> {
        match self {
            Self::Queued => Some(Self::Generating),
            Self::Generating => Some(Self::Ready),
            Self::Ready => Some(Self::Playing),
            Self::Playing => Some(Self::Played),
            Self::Played | Self::Cancelled | Self::Failed => None,
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(next, Self::Cancelled | Self::Failed) || self.successor() == Some(next)
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Generating => write!(f, "GENERATING"),
            Self::Ready => write!(f, "READY"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Played => write!(f, "PLAYED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub priority: i32,
    pub correlation_id: CorrelationId,
    pub state: MessageState,
    /// Arrival order
    pub seq: u64,
}

impl Message {
    pub fn context(&self) -> MessageContext {
        MessageContext {
            id: self.id,
            correlation_id: self.correlation_id.clone(),
            kind: self.kind,
        }
    }
}

/// A request to speak or sound something.
#[derive(Debug, Clone)]
pub struct Submission {
    pub kind: MessageKind,
    pub text: Option<String>,
    pub priority: Option<i32>,
    pub correlation_id: Option<CorrelationId>,
}

impl Submission {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            text: None,
            priority: None,
            correlation_id: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

/// Published on every state transition.
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub id: MessageId,
    pub correlation_id: CorrelationId,
    pub kind: MessageKind,
    pub state: MessageState,
}

/// Default priority per kind and which kinds may interrupt playback.
#[derive(Debug, Clone)]
pub struct PriorityTable {
    priorities: HashMap<MessageKind, i32>,
    preempting: HashSet<MessageKind>,
}

impl PriorityTable {
    pub fn new(
        priorities: impl IntoIterator<Item = (MessageKind, i32)>,
        preempting: impl IntoIterator<Item = MessageKind>,
    ) -> Self {
        Self {
            priorities: priorities.into_iter().collect(),
            preempting: preempting.into_iter().collect(),
        }
    }

    pub fn priority(&self, kind: MessageKind) -> i32 {
        self.priorities.get(&kind).copied().unwrap_or(0)
    }

    pub fn can_preempt(&self, kind: MessageKind) -> bool {
        self.preempting.contains(&kind)
    }

    /// Permission requests must never queue behind a summary or a chime.
    pub fn validate(&self) -> Result<()> {
        let permission = self.priority(MessageKind::Permission);
        for kind in [MessageKind::Summary, MessageKind::Chime] {
            let other = self.priority(kind);
            if permission < other {
                return Err(SpeakerError::Config(format!(
                    "priorities.permission ({permission}) must be at least priorities.{kind} ({other})"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [MessageState; 7] = [
        MessageState::Queued,
        MessageState::Generating,
        MessageState::Ready,
        MessageState::Playing,
        MessageState::Played,
        MessageState::Cancelled,
        MessageState::Failed,
    ];

    #[test]
    fn happy_path_steps_one_at_a_time() {
        use MessageState::*;
        assert!(Queued.can_transition_to(Generating));
        assert!(Generating.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Played));

        assert!(!Queued.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Generating));
        assert!(!Playing.can_transition_to(Queued));
    }

    #[test]
    fn terminal_states_are_final() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn cancel_and_fail_reachable_from_every_live_state() {
        for from in ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(MessageState::Cancelled));
            assert!(from.can_transition_to(MessageState::Failed));
        }
    }

    #[test]
    fn kinds_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&MessageKind::DropTone).unwrap(), "\"drop_tone\"");
        let kind: MessageKind = serde_json::from_str("\"permission\"").unwrap();
        assert_eq!(kind, MessageKind::Permission);
        assert!(MessageKind::Summary.is_speech());
        assert_eq!(MessageKind::Chime.tone(), Some(ToneKind::Chime));
    }

    #[test]
    fn permission_may_not_rank_below_summary_or_chime() {
        let table = |permission| {
            PriorityTable::new(
                [
                    (MessageKind::Summary, 20),
                    (MessageKind::Chime, 25),
                    (MessageKind::Permission, permission),
                ],
                [],
            )
        };
        assert!(table(30).validate().is_ok());
        assert!(table(25).validate().is_ok());
        let err = table(22).validate().unwrap_err();
        assert!(err.to_string().contains("priorities.chime"), "{err}");
    }

    #[test]
    fn unknown_kind_priority_defaults_to_zero() {
        let table = PriorityTable::new([(MessageKind::Permission, 30)], []);
        assert_eq!(table.priority(MessageKind::Permission), 30);
        assert_eq!(table.priority(MessageKind::Chime), 0);
        assert!(!table.can_preempt(MessageKind::Permission));
    }
}
