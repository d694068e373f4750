//! Message scheduling: priority queue, look-ahead generation, preemption.

mod manager;
mod message;
mod queue;


pub use manager::{AudioManager, ManagerSnapshot, PlayingSummary};
pub use message::{Message, MessageKind, MessageState, PriorityTable, StateChange, Submission};
pub use queue::MessageQueue;
