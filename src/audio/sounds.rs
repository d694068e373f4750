//! Synthesized sound cues: a two-note chime and a soft drop tone.
//!
//! Generation is pure: the same `ToneParams` always yield the same samples.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Waveform;
use crate::error::{Result, SpeakerError};

const MAX_TONE_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneKind {
    /// Two-note acknowledgement (G5 → C6 by default)
    Chime,
    /// Kalimba-like pluck marking an interrupted message
    DropTone,
}

/// Waveform parameters for a tone. All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneParams {
    pub sample_rate: u32,
    pub frequency: f64,
    /// Second note of the chime; ignored by the drop tone.
    #[serde(default)]
    pub second_frequency: Option<f64>,
    /// Length of each note.
    pub duration: f64,
    /// Silence between chime notes.
    #[serde(default)]
    pub gap: f64,
    pub amplitude: f64,
    #[serde(default)]
    pub fade_out: f64,
}

impl ToneParams {
    pub fn chime(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frequency: 784.0,
            second_frequency: Some(1047.0),
            duration: 0.08,
            gap: 0.03,
            amplitude: 0.25,
            fade_out: 0.02,
        }
    }

    pub fn drop_tone(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frequency: 659.0,
            second_frequency: None,
            duration: 0.15,
            gap: 0.0,
            amplitude: 0.18,
            fade_out: 0.03,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SpeakerError::InvalidParameters(msg));

        if !(8000..=192_000).contains(&self.sample_rate) {
            return invalid(format!("sample rate {} out of range", self.sample_rate));
        }
        let nyquist = f64::from(self.sample_rate) / 2.0;
        for freq in std::iter::once(self.frequency).chain(self.second_frequency) {
            if !freq.is_finite() || freq <= 0.0 || freq >= nyquist {
                return invalid(format!("frequency {freq} Hz outside (0, {nyquist})"));
            }
        }
        if !self.duration.is_finite() || self.duration <= 0.0 || self.duration > MAX_TONE_SECONDS {
            return invalid(format!("duration {}s outside (0, {MAX_TONE_SECONDS}]", self.duration));
        }
        if !self.gap.is_finite() || self.gap < 0.0 || self.gap > MAX_TONE_SECONDS {
            return invalid(format!("gap {}s outside [0, {MAX_TONE_SECONDS}]", self.gap));
        }
        if !self.amplitude.is_finite() || self.amplitude <= 0.0 || self.amplitude > 1.0 {
            return invalid(format!("amplitude {} outside (0, 1]", self.amplitude));
        }
        if !self.fade_out.is_finite() || self.fade_out < 0.0 || self.fade_out > MAX_TONE_SECONDS {
            return invalid(format!("fade-out {}s outside [0, {MAX_TONE_SECONDS}]", self.fade_out));
        }
        Ok(())
    }
}

/// Generate a tone. Fails only on invalid parameters.
pub fn synthesize(kind: ToneKind, params: &ToneParams) -> Result<Waveform> {
    params.validate()?;

    let samples = match kind {
        ToneKind::Chime => chime(params),
        ToneKind::DropTone => drop_tone(params),
    };
    Ok(Waveform::new(samples, params.sample_rate))
}

fn sample_count(sample_rate: u32, seconds: f64) -> usize {
    (f64::from(sample_rate) * seconds) as usize
}

/// Point `i` of an `n`-point linear ramp from `from` to `to`, endpoints included.
fn linspace_at(i: usize, n: usize, from: f64, to: f64) -> f64 {
    if n <= 1 {
        from
    } else if i + 1 == n {
        to
    } else {
        from + (to - from) * i as f64 / (n - 1) as f64
    }
}

fn ramp(n: usize, from: f64, to: f64) -> impl Iterator<Item = f64> {
    (0..n).map(move |i| linspace_at(i, n, from, to))
}

fn apply_fade_out(samples: &mut [f64], fade: usize) {
    let fade = fade.min(samples.len());
    let start = samples.len() - fade;
    for (s, gain) in samples[start..].iter_mut().zip(ramp(fade, 1.0, 0.0)) {
        *s *= gain;
    }
}

fn chime_note(sample_rate: u32, freq: f64, duration: f64, amplitude: f64) -> Vec<f64> {
    let n = sample_count(sample_rate, duration);
    let sr = f64::from(sample_rate);
    let mut note: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 / sr;
            let w = 2.0 * PI * freq * t;
            let tone = amplitude * w.sin()
                + amplitude * 0.3 * (2.0 * w).sin()
                + amplitude * 0.1 * (3.0 * w).sin();
            tone * (-t * 8.0).exp()
        })
        .collect();

    let attack = (n as f64 * 0.05) as usize;
    for (s, gain) in note[..attack].iter_mut().zip(ramp(attack, 0.0, 1.0)) {
        *s *= gain;
    }
    note
}

fn chime(p: &ToneParams) -> Vec<f32> {
    let mut out = chime_note(p.sample_rate, p.frequency, p.duration, p.amplitude);
    if let Some(second) = p.second_frequency {
        out.extend(std::iter::repeat(0.0).take(sample_count(p.sample_rate, p.gap)));
        out.extend(chime_note(p.sample_rate, second, p.duration, p.amplitude));
    }
    apply_fade_out(&mut out, sample_count(p.sample_rate, p.fade_out));
    out.into_iter().map(|s| s as f32).collect()
}

fn drop_tone(p: &ToneParams) -> Vec<f32> {
    let n = sample_count(p.sample_rate, p.duration);
    let sr = f64::from(p.sample_rate);
    let attack = sample_count(p.sample_rate, 0.005).min(n);

    let mut out: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 / sr;
            let w = 2.0 * PI * p.frequency * t;
            // Fundamental plus fast-decaying upper harmonics
            let tone = w.sin()
                + 0.5 * (2.0 * w).sin() * (-t * 20.0).exp()
                + 0.25 * (3.0 * w).sin() * (-t * 30.0).exp()
                + 0.1 * (4.0 * w).sin() * (-t * 40.0).exp();
            // Pluck: linear attack, then exponential decay
            let envelope = if i < attack {
                linspace_at(i, attack, 0.0, 1.0)
            } else {
                (-t * 10.0).exp()
            };
            tone * envelope * p.amplitude
        })
        .collect();

    apply_fade_out(&mut out, sample_count(p.sample_rate, p.fade_out));
    out.into_iter().map(|s| s as f32).collect()
}

/// Tone generator holding the validated parameters for each cue.
#[derive(Debug, Clone)]
pub struct SoundSynthesizer {
    chime: ToneParams,
    drop_tone: ToneParams,
}

impl SoundSynthesizer {
    pub fn new(chime: ToneParams, drop_tone: ToneParams) -> Result<Self> {
        chime.validate()?;
        drop_tone.validate()?;
        debug!(
            "Sound cues ready: chime {} Hz, drop tone {} Hz",
            chime.frequency, drop_tone.frequency
        );
        Ok(Self { chime, drop_tone })
    }

    pub fn tone(&self, kind: ToneKind) -> Result<Waveform> {
        match kind {
            ToneKind::Chime => synthesize(kind, &self.chime),
            ToneKind::DropTone => synthesize(kind, &self.drop_tone),
        }
    }

    pub fn chime(&self) -> Result<Waveform> {
        self.tone(ToneKind::Chime)
    }

    pub fn drop_tone(&self) -> Result<Waveform> {
        self.tone(ToneKind::DropTone)
    }
}

impl Default for SoundSynthesizer {
    fn default() -> Self {
        Self {
            chime: ToneParams::chime(24000),
            drop_tone: ToneParams::drop_tone(24000),
        }
    }
}
