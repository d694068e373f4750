//! Local Kokoro TTS engine: text → phonemes → ONNX inference → waveform.
//!
//! Pipeline:
//! 1. Text → sentences (split on .!?)
//! 2. Sentence → phonemes (misaki-rs G2P)
//! 3. Phonemes → token IDs (tokenizer.json vocabulary)
//! 4. Token IDs + voice style + speed → ONNX inference → f32 audio (24kHz)
//! 5. Sentences joined into one waveform for the scheduler

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use ndarray::{Array2, Array3};
use ndarray_npy::NpzReader;
use ort::value::Tensor;
use tracing::{debug, info, trace, warn};

use super::{split_sentences, SpeechSynthesizer};
use crate::audio::Waveform;
use crate::config::TtsConfig;
use crate::error::{Result, SpeakerError};

pub const SAMPLE_RATE: u32 = 24000;
const MAX_TOKENS: usize = 510; // Voice style array first dimension

/// Loaded voice style data: shape (510, 256) after squeezing.
struct VoiceData {
    /// Style vectors indexed by token count.
    styles: Array2<f32>,
}

struct KokoroModel {
    // ort 2.0 Session::run needs &mut
    session: Mutex<ort::session::Session>,
    phonemizer: misaki_rs::G2P,
    vocab: HashMap<char, i64>,
    voices: HashMap<String, VoiceData>,
    voice: Mutex<String>,
    speed: f32,
}

/// Kokoro-82M backend. Inference runs on the blocking pool.
pub struct KokoroEngine {
    model: Arc<KokoroModel>,
}

/// Model file locations, defaulting to the working directory.
pub struct KokoroPaths {
    pub model: PathBuf,
    pub voices: PathBuf,
    pub tokenizer: PathBuf,
}

impl KokoroPaths {
    pub fn from_config(config: &TtsConfig) -> Self {
        let base_dir = std::env::current_dir().unwrap_or_default();
        let pick = |configured: &str, default: &str| {
            if configured.is_empty() {
                base_dir.join(default)
            } else {
                PathBuf::from(configured)
            }
        };
        Self {
            model: pick(&config.model_path, "kokoro-v1.0.onnx"),
            voices: pick(&config.voices_path, "voices-v1.0.bin"),
            tokenizer: pick(&config.tokenizer_path, "tokenizer.json"),
        }
    }
}

fn gen_err(what: &str, e: impl std::fmt::Display) -> SpeakerError {
    SpeakerError::Generation(format!("{what}: {e}"))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl KokoroEngine {
    /// Load the ONNX model, tokenizer, voices, and phonemizer.
    /// This is blocking and should be called in spawn_blocking.
    pub fn load(config: &TtsConfig) -> Result<Self> {
        let t0 = Instant::now();
        let paths = KokoroPaths::from_config(config);

        info!("Loading tokenizer from {}", paths.tokenizer.display());
        let vocab = load_tokenizer(&paths.tokenizer)?;
        info!("Tokenizer loaded: {} tokens", vocab.len());

        info!("Loading voices from {}", paths.voices.display());
        let voices = load_voices(&paths.voices)?;
        info!("Loaded {} voices", voices.len());
        if !voices.contains_key(&config.voice) {
            return Err(SpeakerError::Config(format!("Unknown voice: {}", config.voice)));
        }

        info!("Loading ONNX model from {}", paths.model.display());
        let session = ort::session::Session::builder()
            .map_err(|e| SpeakerError::Config(format!("Failed to create ONNX session builder: {e}")))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| SpeakerError::Config(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| SpeakerError::Config(format!("Failed to set thread count: {e}")))?
            .commit_from_file(&paths.model)
            .map_err(|e| SpeakerError::Config(format!("Failed to load ONNX model: {e}")))?;

        info!("Initializing misaki-rs phonemizer...");
        let phonemizer = misaki_rs::G2P::new(misaki_rs::Language::EnglishUS);

        info!("Kokoro TTS loaded in {}ms", t0.elapsed().as_millis());

        Ok(Self {
            model: Arc::new(KokoroModel {
                session: Mutex::new(session),
                phonemizer,
                vocab,
                voices,
                voice: Mutex::new(config.voice.clone()),
                speed: config.speed,
            }),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for KokoroEngine {
    fn name(&self) -> &str {
        "kokoro"
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Waveform> {
        let model = self.model.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.synthesize_text(&text))
            .await
            .map_err(|e| SpeakerError::Generation(format!("Kokoro task failed: {e}")))?
    }

    fn current_voice(&self) -> Option<String> {
        Some(lock(&self.model.voice).clone())
    }

    fn set_voice(&self, voice: &str) -> bool {
        if self.model.voices.contains_key(voice) {
            *lock(&self.model.voice) = voice.to_string();
            info!("Voice changed to: {voice}");
            true
        } else {
            warn!("Unknown voice: {voice}");
            false
        }
    }

    fn list_voices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.model.voices.keys().cloned().collect();
        names.sort();
        names
    }
}

impl KokoroModel {
    fn synthesize_text(&self, text: &str) -> Result<Waveform> {
        let sentences = split_sentences(text.trim());
        let mut parts = Vec::with_capacity(sentences.len());
        let mut last_err = None;

        for (i, sentence) in sentences.iter().enumerate() {
            let t_gen = Instant::now();
            match self.generate_audio(sentence) {
                Ok(samples) if samples.is_empty() => {}
                Ok(samples) => {
                    trace!(
                        "Sentence {}/{}: {} samples in {:.0}ms",
                        i + 1,
                        sentences.len(),
                        samples.len(),
                        t_gen.elapsed().as_secs_f64() * 1000.0
                    );
                    parts.push(Waveform::new(samples, SAMPLE_RATE));
                }
                Err(e) => {
                    warn!("TTS generation failed for sentence {}: {e}", i + 1);
                    last_err = Some(e);
                }
            }
        }

        if parts.is_empty() {
            return Err(last_err
                .unwrap_or_else(|| SpeakerError::Generation("no speakable text".into())));
        }
        Waveform::concat(&parts, SAMPLE_RATE)
    }

    /// Generate audio samples for a single sentence.
    fn generate_audio(&self, text: &str) -> Result<Vec<f32>> {
        // 1. Text → phonemes via misaki-rs G2P
        let (phonemes, _tokens) = self
            .phonemizer
            .g2p(text)
            .map_err(|e| gen_err("Phonemization failed", e))?;

        if phonemes.is_empty() {
            return Ok(Vec::new());
        }

        // 2. Phonemes → token IDs, unknown characters skipped
        let mut token_ids: Vec<i64> = Vec::with_capacity(phonemes.len() + 2);
        token_ids.push(0);
        token_ids.extend(phonemes.chars().filter_map(|ch| self.vocab.get(&ch).copied()));
        token_ids.push(0);

        let n_tokens = token_ids.len().min(MAX_TOKENS);
        token_ids.truncate(n_tokens);

        // 3. Voice style vector for this token count
        let voice_name = lock(&self.voice).clone();
        let voice_data = self
            .voices
            .get(&voice_name)
            .ok_or_else(|| SpeakerError::Generation(format!("Voice not found: {voice_name}")))?;

        let style_idx = (n_tokens.saturating_sub(2)).min(voice_data.styles.nrows() - 1);
        let style_vec: Vec<f32> = voice_data.styles.row(style_idx).to_vec();

        // 4. ONNX input tensors
        let tokens_array = Array2::from_shape_vec((1, n_tokens), token_ids)
            .map_err(|e| gen_err("Failed to create tokens tensor", e))?;
        let tokens_tensor =
            Tensor::from_array(tokens_array).map_err(|e| gen_err("Failed to create tokens ort tensor", e))?;

        let style_array = Array2::from_shape_vec((1, 256), style_vec)
            .map_err(|e| gen_err("Failed to create style tensor", e))?;
        let style_tensor =
            Tensor::from_array(style_array).map_err(|e| gen_err("Failed to create style ort tensor", e))?;

        let speed_array = ndarray::Array1::from_vec(vec![self.speed]);
        let speed_tensor =
            Tensor::from_array(speed_array).map_err(|e| gen_err("Failed to create speed ort tensor", e))?;

        // 5. Inference
        let mut session = lock(&self.session);
        let outputs = session
            .run(ort::inputs![
                "tokens" => tokens_tensor,
                "style" => style_tensor,
                "speed" => speed_tensor
            ])
            .map_err(|e| gen_err("ONNX inference failed", e))?;

        // 6. ort 2.0: try_extract_tensor returns (&Shape, &[T])
        let first_output = outputs
            .iter()
            .next()
            .ok_or_else(|| SpeakerError::Generation("No output tensor from model".into()))?;

        let (_shape, audio_slice) = first_output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| gen_err("Failed to extract audio tensor", e))?;

        let samples: Vec<f32> = audio_slice.to_vec();
        debug!(
            "Generated {} samples ({:.1}s)",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32
        );

        Ok(samples)
    }
}

/// Load tokenizer vocabulary from tokenizer.json.
fn load_tokenizer(path: &Path) -> Result<HashMap<char, i64>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| SpeakerError::Config(format!("Failed to read tokenizer: {e}")))?;
    parse_vocab(&contents)
}

fn parse_vocab(contents: &str) -> Result<HashMap<char, i64>> {
    let data: serde_json::Value = serde_json::from_str(contents)
        .map_err(|e| SpeakerError::Config(format!("Failed to parse tokenizer JSON: {e}")))?;

    let vocab = data["model"]["vocab"]
        .as_object()
        .ok_or_else(|| SpeakerError::Config("Missing model.vocab in tokenizer.json".into()))?;

    let mut map = HashMap::new();
    for (token, id) in vocab {
        let id = id
            .as_i64()
            .ok_or_else(|| SpeakerError::Config(format!("Token ID for {token:?} is not an integer")))?;
        // Each token should be a single character
        if let Some(ch) = token.chars().next() {
            map.insert(ch, id);
        }
    }

    Ok(map)
}

/// Load all voice styles from an NPZ file.
fn load_voices(path: &Path) -> Result<HashMap<String, VoiceData>> {
    let file = fs::File::open(path).map_err(|e| SpeakerError::Config(format!("Failed to open voices file: {e}")))?;

    let mut npz =
        NpzReader::new(file).map_err(|e| SpeakerError::Config(format!("Failed to read NPZ voices file: {e}")))?;

    let names: Vec<String> = npz
        .names()
        .map_err(|e| SpeakerError::Config(format!("Failed to list NPZ entries: {e}")))?
        .into_iter()
        .map(|n| n.trim_end_matches(".npy").to_string())
        .collect();

    let mut voices = HashMap::new();
    for name in names {
        let arr: Array3<f32> = npz
            .by_name(&format!("{name}.npy"))
            .map_err(|e| SpeakerError::Config(format!("Failed to read voice '{name}': {e}")))?;

        // Shape is (510, 1, 256). Squeeze the middle dimension to (510, 256).
        let dim0 = arr.shape()[0];
        let dim2 = arr.shape()[2];
        let styles = arr
            .into_shape_with_order((dim0, dim2))
            .map_err(|e| SpeakerError::Config(format!("Failed to reshape voice '{name}': {e}")))?;

        voices.insert(name, VoiceData { styles });
    }

    Ok(voices)
}
