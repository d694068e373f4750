//! code-speaker: prioritized spoken notifications for Claude Code.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use code_speaker::api::{self, ApiState};
use code_speaker::audio::{PlaybackController, RodioOutput, SoundSynthesizer};
use code_speaker::config::{Config, TtsConfig};
use code_speaker::error::SpeakerError;
use code_speaker::reminder::ReminderManager;
use code_speaker::scheduler::AudioManager;
use code_speaker::speech::{GenerationPipeline, KokoroEngine, RemoteEngine, SpeechSynthesizer};
use code_speaker::summarizer::{self, Summarizer};

#[derive(Parser, Debug)]
#[command(name = "code-speaker", about = "Spoken notifications for Claude Code")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP API port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// TTS backend: kokoro or remote (overrides config)
    #[arg(short, long)]
    backend: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

async fn load_backend(config: &TtsConfig) -> Result<Arc<dyn SpeechSynthesizer>, SpeakerError> {
    match config.backend.as_str() {
        "kokoro" => {
            // Blocking, takes a few seconds
            info!("Loading Kokoro TTS model...");
            let tts_config = config.clone();
            let engine = tokio::task::spawn_blocking(move || KokoroEngine::load(&tts_config))
                .await
                .map_err(|e| SpeakerError::Config(format!("Model loader panicked: {e}")))??;
            Ok(Arc::new(engine))
        }
        "remote" => Ok(Arc::new(RemoteEngine::new(config)?)),
        other => Err(SpeakerError::Config(format!(
            "Unknown tts.backend '{other}' (expected kokoro or remote)"
        ))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise keep ort internals quiet
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("debug,ort=info")
        } else {
            EnvFilter::new("info,ort=warn")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("code-speaker starting");

    let mut config = Config::load(args.config.as_deref());
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(backend) = args.backend {
        config.tts.backend = backend;
    }

    let backend = load_backend(&config.tts).await?;
    info!(
        "TTS backend: {} (voice: {}, speed: {})",
        backend.name(),
        backend.current_voice().unwrap_or_else(|| "-".into()),
        config.tts.speed
    );

    let output = Arc::new(RodioOutput::open_default()?);
    let playback = Arc::new(PlaybackController::new(output));
    let sounds = SoundSynthesizer::new(config.sounds.chime.clone(), config.sounds.drop_tone.clone())?;
    let pipeline = GenerationPipeline::new(backend, config.scheduler.generation_timeout());

    let manager = Arc::new(AudioManager::start(
        config.scheduler.clone(),
        config.priorities.table(),
        playback,
        pipeline,
        sounds,
    )?);

    let summarizer: Option<Arc<dyn Summarizer>> = if config.summarizer.enabled {
        let summarizer = summarizer::from_config(&config.summarizer)?;
        if summarizer.health_check().await {
            info!("Summarizer: {}", summarizer.name());
        } else {
            warn!("Summarizer {} unreachable, long text will be truncated locally", summarizer.name());
        }
        Some(summarizer)
    } else {
        None
    };
    let reminder = Arc::new(ReminderManager::new(Duration::from_secs(config.reminder.interval)));

    let shutdown = CancellationToken::new();
    let server = api::serve(
        ApiState {
            manager: manager.clone(),
            summarizer,
            reminder: reminder.clone(),
            max_direct_chars: config.summarizer.max_direct_chars,
        },
        &config.server.host,
        config.server.port,
        shutdown.clone(),
    )
    .await?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");

    reminder.cancel();
    shutdown.cancel();
    manager.shutdown().await;
    if let Err(e) = server.await {
        warn!("HTTP server task failed: {e}");
    }

    info!("code-speaker stopped");
    Ok(())
}
