//! Mono f32 PCM buffer shared between generation and playback.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SpeakerError};

/// Immutable mono waveform. Cloning shares the sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Join waveforms of the same sample rate (e.g. per-sentence TTS output).
    pub fn concat(parts: &[Waveform], sample_rate: u32) -> Result<Self> {
        let total = parts.iter().map(Waveform::len).sum();
        let mut samples = Vec::with_capacity(total);
        for part in parts {
            if part.sample_rate != sample_rate {
                return Err(SpeakerError::InvalidParameters(format!(
                    "cannot join {} Hz audio into a {sample_rate} Hz waveform",
                    part.sample_rate
                )));
            }
            samples.extend_from_slice(&part.samples);
        }
        Ok(Self::new(samples, sample_rate))
    }

    /// Decode WAV bytes (16/24/32-bit int or 32-bit float), down-mixing to mono.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| SpeakerError::Generation(format!("Invalid WAV data: {e}")))?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| SpeakerError::Generation(format!("Failed to read WAV samples: {e}")))?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| {
                        SpeakerError::Generation(format!("Failed to read WAV samples: {e}"))
                    })?
            }
        };

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        Ok(Self::new(samples, spec.sample_rate))
    }
}
