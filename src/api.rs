//! HTTP API for hook integration.
//!
//! Translates JSON requests into audio manager calls. Every endpoint
//! returns immediately; generation and playback happen in the background.
//! Runs on port 8767 (configurable) using axum.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::{sanitize_for_log, CorrelationId, MessageId};
use crate::error::{Result, SpeakerError};
use crate::reminder::ReminderManager;
use crate::scheduler::{AudioManager, MessageKind, MessageState, PlayingSummary, Submission};
use crate::summarizer::{Summarizer, SummaryType};

#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<AudioManager>,
    /// None disables the summarize path; text is spoken as-is.
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub reminder: Arc<ReminderManager>,
    pub max_direct_chars: usize,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct SpeakRequest {
    #[serde(default)]
    text: String,
    #[serde(default = "default_kind")]
    kind: MessageKind,
    priority: Option<i32>,
    #[serde(default)]
    summarize: bool,
    /// Prompt to summarize with; inferred from kind and text when absent
    summary_type: Option<SummaryType>,
    #[serde(default)]
    chime: bool,
    #[serde(default)]
    start_reminder: bool,
    #[serde(default = "default_event_type")]
    event_type: String,
    correlation_id: Option<String>,
}

fn default_kind() -> MessageKind {
    MessageKind::Summary
}

fn default_event_type() -> String {
    "unknown".to_string()
}

#[derive(Deserialize)]
struct CancelRequest {
    id: Option<String>,
}

#[derive(Deserialize)]
struct SetVoiceRequest {
    voice: String,
}

#[derive(Serialize)]
struct StatusResponse {
    accepting: bool,
    playing: Option<PlayingSummary>,
    queued: usize,
    voice: Option<String>,
    voices: Vec<String>,
    backend: String,
    reminder_active: bool,
    reminder_count: u32,
}

#[derive(Serialize)]
struct MessageResponse {
    id: MessageId,
    state: MessageState,
}

#[derive(Serialize, Default)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reminders_fired: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancelled: Option<usize>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Manager rejections as HTTP responses.
struct ApiError(SpeakerError);

impl From<SpeakerError> for ApiError {
    fn from(e: SpeakerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self.0 {
            SpeakerError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            SpeakerError::QueueFull(_) | SpeakerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, Json(SimpleResponse::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/speak", post(handle_speak))
        .route("/chime", post(handle_chime))
        .route("/cancel", post(handle_cancel))
        .route("/cancel-reminder", post(handle_cancel_reminder))
        .route("/messages/{id}", get(handle_message))
        .route("/set-voice", post(handle_set_voice))
        .with_state(state)
}

/// Bind and serve in a background task until `shutdown` fires.
pub async fn serve(
    state: ApiState,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP API listening on {addr}");

    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            warn!("HTTP API server error: {e}");
        }
    }))
}

/// Body field wins over the `x-request-id` header.
fn correlation_id(headers: &HeaderMap, from_body: Option<&str>) -> CorrelationId {
    from_body
        .or_else(|| headers.get("x-request-id").and_then(|v| v.to_str().ok()))
        .map(CorrelationId::from_external)
        .unwrap_or_else(CorrelationId::generate)
}

// --- Handlers ---

async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let snapshot = state.manager.snapshot();
    let backend = state.manager.pipeline().backend();
    Json(StatusResponse {
        accepting: snapshot.accepting,
        playing: snapshot.playing,
        queued: snapshot.queued + snapshot.generating + snapshot.ready,
        voice: backend.current_voice(),
        voices: backend.list_voices(),
        backend: backend.name().to_string(),
        reminder_active: state.reminder.is_active(),
        reminder_count: state.reminder.reminder_count(),
    })
}

async fn handle_speak(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<SpeakRequest>,
) -> ApiResult<SimpleResponse> {
    let cid = correlation_id(&headers, req.correlation_id.as_deref());
    info!(
        cid = %cid,
        "HTTP /speak [{}]: \"{}\" ({} chars, kind={}, summarize={})",
        req.event_type,
        sanitize_for_log(&req.text, 80),
        req.text.chars().count(),
        req.kind,
        req.summarize,
    );

    if req.kind.is_speech() && req.text.trim().is_empty() {
        return Err(SpeakerError::InvalidParameters("empty text".into()).into());
    }

    let needs_summary = req.summarize
        && state.summarizer.is_some()
        && (req.summary_type.is_some() || req.text.chars().count() > state.max_direct_chars);
    // Text spoken as-is is checked before the chime so a rejection stays silent
    let direct_text = if needs_summary {
        None
    } else {
        state.manager.check_text(req.kind, Some(&req.text))?
    };

    // A new event supersedes whatever we were reminding about
    state.reminder.cancel();

    let chime_id = if req.chime {
        Some(
            state
                .manager
                .submit_with(Submission::new(MessageKind::Chime).correlation_id(cid.clone()))?,
        )
    } else {
        None
    };

    if let (true, Some(summarizer)) = (needs_summary, state.summarizer.clone()) {
        tokio::spawn(summarize_and_submit(state, summarizer, req, cid));
        return Ok(Json(SimpleResponse {
            id: chime_id,
            ..SimpleResponse::ok("summarizing")
        }));
    }

    let text = direct_text.unwrap_or_default();
    let id = submit_speech(&state, &req, text, cid)?;
    Ok(Json(SimpleResponse {
        id: Some(id),
        ..SimpleResponse::ok("queued")
    }))
}

fn submit_speech(
    state: &ApiState,
    req: &SpeakRequest,
    text: String,
    cid: CorrelationId,
) -> Result<MessageId> {
    let mut submission = Submission::new(req.kind)
        .text(text.clone())
        .correlation_id(cid);
    submission.priority = req.priority;
    let id = state.manager.submit_with(submission)?;

    if req.start_reminder && req.kind.is_speech() {
        state
            .reminder
            .start(state.manager.clone(), req.kind, text);
    }
    Ok(id)
}

async fn summarize_and_submit(
    state: ApiState,
    summarizer: Arc<dyn Summarizer>,
    req: SpeakRequest,
    cid: CorrelationId,
) {
    let summary_type = req
        .summary_type
        .unwrap_or_else(|| SummaryType::classify(req.kind, &req.text));
    let (summary, latency_ms) = summarizer.summarize(&req.text, summary_type).await;
    info!(cid = %cid, "Summary ready ({latency_ms:.0}ms): \"{}\"", sanitize_for_log(&summary, 80));
    if let Err(e) = submit_speech(&state, &req, summary, cid.clone()) {
        warn!(cid = %cid, "Summary rejected: {e}");
    }
}

async fn handle_chime(State(state): State<ApiState>, headers: HeaderMap) -> ApiResult<SimpleResponse> {
    let cid = correlation_id(&headers, None);
    let id = state
        .manager
        .submit_with(Submission::new(MessageKind::Chime).correlation_id(cid))?;
    Ok(Json(SimpleResponse {
        id: Some(id),
        ..SimpleResponse::ok("queued")
    }))
}

/// An empty body cancels everything live.
async fn handle_cancel(State(state): State<ApiState>, body: Bytes) -> ApiResult<SimpleResponse> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        CancelRequest { id: None }
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| SpeakerError::InvalidParameters(format!("bad cancel body: {e}")))?
    };

    match req.id {
        Some(raw) => {
            let id = MessageId::parse(&raw)
                .ok_or_else(|| SpeakerError::InvalidParameters(format!("bad message id: {raw}")))?;
            state.manager.cancel(id);
            Ok(Json(SimpleResponse {
                id: Some(id),
                ..SimpleResponse::ok("cancelled")
            }))
        }
        None => {
            let count = state.manager.cancel_all();
            Ok(Json(SimpleResponse {
                cancelled: Some(count),
                ..SimpleResponse::ok("cancelled")
            }))
        }
    }
}

async fn handle_cancel_reminder(State(state): State<ApiState>) -> Json<SimpleResponse> {
    let fired = state.reminder.cancel();
    state.manager.cancel_all();
    Json(SimpleResponse {
        reminders_fired: Some(fired),
        ..SimpleResponse::ok("cancelled")
    })
}

async fn handle_message(State(state): State<ApiState>, Path(raw): Path<String>) -> Response {
    let found = MessageId::parse(&raw).and_then(|id| state.manager.status(id).map(|s| (id, s)));
    match found {
        Some((id, message_state)) => Json(MessageResponse {
            id,
            state: message_state,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(SimpleResponse::err(format!("unknown message: {raw}"))),
        )
            .into_response(),
    }
}

async fn handle_set_voice(
    State(state): State<ApiState>,
    Json(req): Json<SetVoiceRequest>,
) -> Response {
    let backend = state.manager.pipeline().backend();
    if backend.set_voice(&req.voice) {
        Json(SimpleResponse {
            voice: Some(req.voice),
            ..SimpleResponse::ok("ok")
        })
        .into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(SimpleResponse::err(format!("Unknown voice: {}", req.voice))),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{PlaybackController, SoundSynthesizer};
    use crate::config::{PrioritiesConfig, SchedulerConfig};
    use crate::speech::GenerationPipeline;
    use crate::testing::{FakeOutput, FakeSpeech};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct FixedSummarizer;

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _text: &str, summary_type: SummaryType) -> Result<String> {
            Ok(match summary_type {
                SummaryType::PermissionRequest => "Permission requested: Run tests".into(),
                _ => "Short summary.".into(),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct TestServer {
        base: String,
        manager: Arc<AudioManager>,
        speech: Arc<FakeSpeech>,
        client: reqwest::Client,
    }

    async fn server(speech: FakeSpeech, config: SchedulerConfig) -> TestServer {
        let speech = Arc::new(speech);
        let manager = Arc::new(
            AudioManager::start(
                config.clone(),
                PrioritiesConfig::default().table(),
                Arc::new(PlaybackController::new(Arc::new(FakeOutput::new()))),
                GenerationPipeline::new(speech.clone(), config.generation_timeout()),
                SoundSynthesizer::default(),
            )
            .unwrap(),
        );
        let state = ApiState {
            manager: manager.clone(),
            summarizer: Some(Arc::new(FixedSummarizer)),
            reminder: Arc::new(ReminderManager::new(Duration::from_secs(300))),
            max_direct_chars: 20,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        TestServer {
            base: format!("http://{addr}"),
            manager,
            speech,
            client: reqwest::Client::new(),
        }
    }

    fn quick_speech() -> FakeSpeech {
        FakeSpeech::instant().audio(Duration::from_millis(30))
    }

    impl TestServer {
        async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
            let resp = self
                .client
                .post(format!("{}{path}", self.base))
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
            (status, resp.json().await.unwrap())
        }

        async fn get(&self, path: &str) -> (StatusCode, Value) {
            let resp = self
                .client
                .get(format!("{}{path}", self.base))
                .send()
                .await
                .unwrap();
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
            (status, resp.json().await.unwrap())
        }

        async fn wait_for_state(&self, id: &str, state: &str) {
            for _ in 0..200 {
                let (_, body) = self.get(&format!("/messages/{id}")).await;
                if body["state"] == state {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("message {id} never reached {state}");
        }
    }

    #[tokio::test]
    async fn speak_queues_and_message_reaches_played() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;

        let (code, body) = srv.post("/speak", json!({ "text": "Build finished." })).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "queued");
        let id = body["id"].as_str().unwrap().to_string();

        srv.wait_for_state(&id, "played").await;
        assert_eq!(srv.speech.calls(), ["Build finished."]);
    }

    #[tokio::test]
    async fn request_id_header_becomes_correlation_id() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let mut events = srv.manager.subscribe();

        let resp = srv
            .client
            .post(format!("{}/chime", srv.base))
            .header("x-request-id", "req-abc")
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, MessageKind::Chime);
        assert_eq!(event.correlation_id.as_str(), "req-abc");
    }

    #[tokio::test]
    async fn empty_text_is_bad_request() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let (code, body) = srv.post("/speak", json!({ "text": "  " })).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn full_queue_is_service_unavailable() {
        let config = SchedulerConfig {
            max_queue: 1,
            ..SchedulerConfig::default()
        };
        let srv = server(FakeSpeech::hanging(), config).await;

        let (first, _) = srv.post("/speak", json!({ "text": "one" })).await;
        let (second, body) = srv.post("/speak", json!({ "text": "two" })).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("full"));
    }

    #[tokio::test]
    async fn chime_flag_queues_chime_before_speech() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let mut events = srv.manager.subscribe();

        let (_, body) = srv
            .post("/speak", json!({ "text": "Done.", "chime": true, "event_type": "stop" }))
            .await;
        assert_eq!(body["status"], "queued");

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!((first.kind, first.state), (MessageKind::Chime, MessageState::Queued));
        assert_eq!((second.kind, second.state), (MessageKind::Summary, MessageState::Queued));
        assert_eq!(first.correlation_id, second.correlation_id);
    }

    #[tokio::test]
    async fn long_text_is_summarized_in_background() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let mut events = srv.manager.subscribe();

        let (_, body) = srv
            .post(
                "/speak",
                json!({ "text": "A very long explanation of everything that happened.", "summarize": true }),
            )
            .await;
        assert_eq!(body["status"], "summarizing");
        assert!(body["id"].is_null());

        loop {
            let event = events.recv().await.unwrap();
            if event.state == MessageState::Played {
                break;
            }
        }
        assert_eq!(srv.speech.calls(), ["Short summary."]);
    }

    #[tokio::test]
    async fn explicit_summary_type_selects_prompt() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let mut events = srv.manager.subscribe();

        let (_, body) = srv
            .post(
                "/speak",
                json!({
                    "text": "Tool: Bash",
                    "kind": "permission",
                    "summarize": true,
                    "summary_type": "permission_request"
                }),
            )
            .await;
        assert_eq!(body["status"], "summarizing");

        loop {
            let event = events.recv().await.unwrap();
            if event.state == MessageState::Played {
                assert_eq!(event.kind, MessageKind::Permission);
                break;
            }
        }
        assert_eq!(srv.speech.calls(), ["Permission requested: Run tests"]);
    }

    #[tokio::test]
    async fn oversized_text_is_rejected_before_chime() {
        let config = SchedulerConfig {
            max_text_chars: 10,
            ..SchedulerConfig::default()
        };
        let srv = server(quick_speech(), config).await;
        let mut events = srv.manager.subscribe();

        let (code, _) = srv
            .post("/speak", json!({ "text": "This is far too long.", "chime": true }))
            .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(events.try_recv().is_err(), "nothing may be queued");
        assert_eq!(srv.manager.snapshot().queued, 0);
    }

    #[tokio::test]
    async fn cancel_without_body_cancels_everything() {
        let srv = server(FakeSpeech::hanging(), SchedulerConfig::default()).await;
        let (_, a) = srv.post("/speak", json!({ "text": "one" })).await;
        srv.post("/speak", json!({ "text": "two" })).await;

        let resp = srv.client.post(format!("{}/cancel", srv.base)).send().await.unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["cancelled"], 2);

        let (_, message) = srv.get(&format!("/messages/{}", a["id"].as_str().unwrap())).await;
        assert_eq!(message["state"], "cancelled");
    }

    #[tokio::test]
    async fn cancel_single_message_by_id() {
        let srv = server(FakeSpeech::hanging(), SchedulerConfig::default()).await;
        let (_, a) = srv.post("/speak", json!({ "text": "one" })).await;
        let (_, b) = srv.post("/speak", json!({ "text": "two" })).await;

        let (code, _) = srv.post("/cancel", json!({ "id": a["id"] })).await;
        assert_eq!(code, StatusCode::OK);
        srv.wait_for_state(a["id"].as_str().unwrap(), "cancelled").await;

        let (_, other) = srv.get(&format!("/messages/{}", b["id"].as_str().unwrap())).await;
        assert_ne!(other["state"], "cancelled");

        let (code, _) = srv.post("/cancel", json!({ "id": "nope" })).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_message_is_not_found() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let (code, _) = srv.get(&format!("/messages/{}", MessageId::new())).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        let (code, _) = srv.get("/messages/garbage").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_reports_backend_and_reminder() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let (code, body) = srv.get("/status").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["accepting"], true);
        assert_eq!(body["backend"], "fake");
        assert_eq!(body["reminder_active"], false);
        assert!(body["playing"].is_null());

        let (_, body) = srv.post("/cancel-reminder", json!({})).await;
        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["reminders_fired"], 0);
    }

    #[tokio::test]
    async fn voiceless_backend_rejects_set_voice() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let (code, body) = srv.post("/set-voice", json!({ "voice": "af_heart" })).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("af_heart"));
    }

    #[tokio::test]
    async fn start_reminder_activates_reminder() {
        let srv = server(quick_speech(), SchedulerConfig::default()).await;
        let (_, body) = srv
            .post("/speak", json!({ "text": "Waiting for input.", "start_reminder": true }))
            .await;
        assert_eq!(body["status"], "queued");

        let (_, status) = srv.get("/status").await;
        assert_eq!(status["reminder_active"], true);
    }
}
