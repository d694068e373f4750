//! Audio primitives: waveforms, synthesized cues and the playback controller.

pub mod playback;
pub mod sounds;
mod waveform;

pub use playback::{ActivePlayback, AudioOutput, PlayResult, PlaybackController, PlaybackState, RodioOutput};
pub use sounds::{SoundSynthesizer, ToneKind, ToneParams};
pub use waveform::Waveform;
