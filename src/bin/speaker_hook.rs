//! speaker-hook: Claude Code hook binary for spoken notifications.
//!
//! Reads the hook event JSON from stdin and forwards it to the code-speaker
//! HTTP API. Exits quietly when the API is not running.

use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use code_speaker::context::CorrelationId;
use code_speaker::scheduler::MessageKind;
use code_speaker::transcript::last_assistant_text;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_API: &str = "http://127.0.0.1:8767";
const MAX_TRANSCRIPT_CHARS: usize = 2000;

// --- Event JSON from Claude Code ---

#[derive(Deserialize, Default)]
struct HookEvent {
    hook_event_name: Option<String>,
    source: Option<String>,
    transcript_path: Option<String>,
    tool_name: Option<String>,
    notification_type: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
struct SpeakRequest {
    text: String,
    kind: MessageKind,
    summarize: bool,
    chime: bool,
    start_reminder: bool,
    event_type: String,
}

#[derive(Debug, PartialEq)]
enum HookAction {
    Chime,
    Speak(SpeakRequest),
    CancelReminder,
    Skip(String),
}

fn speak(text: String, kind: MessageKind, event_type: &str) -> SpeakRequest {
    SpeakRequest {
        text,
        kind,
        summarize: false,
        chime: false,
        start_reminder: true,
        event_type: event_type.into(),
    }
}

/// Decide what a hook event should sound like.
fn plan(event: &HookEvent) -> HookAction {
    match event.hook_event_name.as_deref() {
        Some("SessionStart") => match event.source.as_deref() {
            Some(source @ ("resume" | "compact")) => HookAction::Skip(format!("source={source}")),
            _ => HookAction::Chime,
        },
        Some("Stop") => {
            let Some(path) = event.transcript_path.as_deref().filter(|p| !p.is_empty()) else {
                return HookAction::Skip("no transcript path".into());
            };
            match last_assistant_text(Path::new(path), MAX_TRANSCRIPT_CHARS)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
            {
                Some(text) => HookAction::Speak(SpeakRequest {
                    summarize: true,
                    chime: true,
                    ..speak(text, MessageKind::Summary, "stop")
                }),
                None => HookAction::Skip("no assistant text found".into()),
            }
        }
        Some("PermissionRequest") => {
            let tool = event.tool_name.as_deref().unwrap_or("unknown tool");
            HookAction::Speak(speak(
                format!("Claude needs permission to use {tool}."),
                MessageKind::Permission,
                "permission",
            ))
        }
        Some("Notification") => match event.notification_type.as_deref() {
            Some("idle_prompt") => HookAction::Speak(speak(
                "Claude is waiting for your input.".into(),
                MessageKind::Summary,
                "notification",
            )),
            Some("permission_prompt") => HookAction::Speak(speak(
                "Permission needed.".into(),
                MessageKind::Permission,
                "permission",
            )),
            Some(other) => HookAction::Skip(format!("unknown notification: {other}")),
            None => HookAction::Skip("no notification_type".into()),
        },
        Some("UserPromptSubmit") => HookAction::CancelReminder,
        Some(other) => HookAction::Skip(format!("unknown event: {other}")),
        None => HookAction::Skip("no hook_event_name".into()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        return;
    }
    let Ok(event) = serde_json::from_str::<HookEvent>(&input) else {
        debug!("Ignoring unparseable hook input");
        return;
    };

    let api = std::env::var("CODE_SPEAKER_URL").unwrap_or_else(|_| DEFAULT_API.to_string());
    let client = Client::builder()
        .connect_timeout(Duration::from_millis(300))
        .timeout(Duration::from_secs(3))
        .build()
        .unwrap_or_else(|_| Client::new());

    // Exit cleanly if the API is down
    if client.get(format!("{api}/status")).send().await.is_err() {
        debug!("code-speaker API unreachable at {api}");
        return;
    }

    let cid = CorrelationId::generate();
    let event_name = event.hook_event_name.clone().unwrap_or_default();
    let request = match plan(&event) {
        HookAction::Chime => client.post(format!("{api}/chime")),
        HookAction::Speak(body) => client.post(format!("{api}/speak")).json(&body),
        HookAction::CancelReminder => client.post(format!("{api}/cancel-reminder")),
        HookAction::Skip(reason) => {
            debug!("{event_name}: skipped ({reason})");
            return;
        }
    };

    match request.header("x-request-id", cid.as_str()).send().await {
        Ok(resp) => info!(
            "{event_name} [{cid}]: {} in {}ms",
            resp.status(),
            t0.elapsed().as_millis()
        ),
        Err(e) => debug!("{event_name} [{cid}]: request failed: {e}"),
    }
}
