//! Generation pipeline: text → waveform through the injected backend,
//! bounded by a timeout the backend is not trusted to honour itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, Instrument};

use super::SpeechSynthesizer;
use crate::audio::Waveform;
use crate::context::{sanitize_for_log, MessageContext};
use crate::error::{Result, SpeakerError};

#[derive(Clone)]
pub struct GenerationPipeline {
    backend: Arc<dyn SpeechSynthesizer>,
    timeout: Duration,
}

impl GenerationPipeline {
    pub fn new(backend: Arc<dyn SpeechSynthesizer>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &Arc<dyn SpeechSynthesizer> {
        &self.backend
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Generate speech for `text`. On timeout the backend call is abandoned
    /// and its eventual result ignored.
    pub async fn generate(&self, text: &str, ctx: &MessageContext) -> Result<Waveform> {
        async {
            let t_gen = Instant::now();
            debug!(
                "Generating with {}: \"{}\"",
                self.backend.name(),
                sanitize_for_log(text, 80)
            );

            let waveform = tokio::time::timeout(self.timeout, self.backend.synthesize_speech(text))
                .await
                .map_err(|_| SpeakerError::GenerationTimeout(self.timeout))??;

            if waveform.is_empty() {
                return Err(SpeakerError::Generation(format!(
                    "{} produced no audio",
                    self.backend.name()
                )));
            }

            let gen_ms = t_gen.elapsed().as_secs_f64() * 1000.0;
            debug!(
                "Generated {} samples ({:.1}s) in {gen_ms:.0}ms",
                waveform.len(),
                waveform.duration().as_secs_f64()
            );
            Ok(waveform)
        }
        .instrument(ctx.span())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CorrelationId, MessageId};
    use crate::scheduler::MessageKind;
    use crate::testing::FakeSpeech;

    fn ctx() -> MessageContext {
        MessageContext {
            id: MessageId::new(),
            correlation_id: CorrelationId::generate(),
            kind: MessageKind::Summary,
        }
    }

    #[tokio::test]
    async fn returns_backend_waveform() {
        let backend = Arc::new(FakeSpeech::instant());
        let pipeline = GenerationPipeline::new(backend.clone(), Duration::from_secs(1));

        let wave = pipeline.generate("build finished", &ctx()).await.unwrap();
        assert!(!wave.is_empty());
        assert_eq!(backend.calls(), vec!["build finished".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_backend_times_out() {
        let pipeline = GenerationPipeline::new(Arc::new(FakeSpeech::hanging()), Duration::from_millis(250));

        let t0 = tokio::time::Instant::now();
        let err = pipeline.generate("hello", &ctx()).await.unwrap_err();
        assert!(matches!(err, SpeakerError::GenerationTimeout(d) if d == Duration::from_millis(250)));
        assert!(t0.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let pipeline = GenerationPipeline::new(Arc::new(FakeSpeech::failing()), Duration::from_secs(1));
        assert!(matches!(
            pipeline.generate("hello", &ctx()).await,
            Err(SpeakerError::Generation(_))
        ));
    }

    #[tokio::test]
    async fn empty_audio_is_an_error() {
        let pipeline = GenerationPipeline::new(Arc::new(FakeSpeech::silent()), Duration::from_secs(1));
        assert!(matches!(
            pipeline.generate("hello", &ctx()).await,
            Err(SpeakerError::Generation(_))
        ));
    }
}
