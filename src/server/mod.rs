//! HTTP front end: the page, its form actions and a JSON status endpoint.

pub mod messages;
pub mod page;

use crate::config::ServerConfig;
use crate::engine::{DiagnosisEngine, EngineOutcome, EngineResult, lock};
use crate::gemini::GeminiClient;
use crate::model::DiagnosisRequest;
use crate::prompt::PromptTemplate;
use crate::session::{Session, SessionEffect, SessionInput};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use messages::StatusResponse;
use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

/// Name of the multipart field carrying the photo.
pub const UPLOAD_FIELD: &str = "file";

pub struct AppState {
    engine: DiagnosisEngine<GeminiClient>,
    session: Mutex<Session>,
    prompt: PromptTemplate,
    max_upload_bytes: usize,
    engine_lost: AtomicBool,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Builds the model client and starts the engine. Needs a tokio runtime.
    pub fn new(config: &ServerConfig) -> Self {
        let client = GeminiClient::new(config.gemini.clone(), config.prompt.clone());
        Self {
            engine: DiagnosisEngine::new(client, config.timeout),
            session: Mutex::new(Session::new(config.progress_duration)),
            prompt: config.prompt.clone(),
            max_upload_bytes: config.max_upload_bytes,
            engine_lost: AtomicBool::new(false),
        }
    }

    /// Locks the session after folding in every finished job.
    fn session(&self) -> MutexGuard<'_, Session> {
        let mut session = lock(&self.session);
        loop {
            match self.engine.try_poll_response() {
                EngineResult::Success(response) => {
                    let metadata = &response.request_metadata;
                    log::info!(
                        "Job {} settled after {:?} ({} {}x{})",
                        response.id,
                        response.duration,
                        metadata.kind,
                        metadata.width,
                        metadata.height
                    );
                    let input = match response.outcome {
                        EngineOutcome::Completed(diagnosis) => SessionInput::DiagnosisReady {
                            id: response.id,
                            text: diagnosis.text,
                        },
                        EngineOutcome::Failed(message) => SessionInput::DiagnosisFailed {
                            id: response.id,
                            message,
                        },
                        EngineOutcome::Cancelled => continue,
                    };
                    session.handle(input);
                }
                EngineResult::Empty(_) => break,
                EngineResult::Error(e) => {
                    // Every later read hits the same dead channel.
                    if !self.engine_lost.swap(true, Ordering::Relaxed) {
                        log::error!(
                            "Diagnosis engine unavailable (last seen {}): {e}",
                            self.engine.state().as_str()
                        );
                    }
                    break;
                }
            }
        }
        session
    }

    fn apply(&self, session: &mut Session, effect: SessionEffect) {
        match effect {
            SessionEffect::None => {}
            SessionEffect::Analyze(image) => {
                let id = self.engine.schedule_inference(DiagnosisRequest {
                    prompt: self.prompt.as_str().to_string(),
                    image,
                });
                session.track(id);
                log::info!("Analysis scheduled as job {id}");
            }
            SessionEffect::Cancel(id) => {
                log::info!("Cancelling job {id}");
                self.engine.cancel(id);
            }
        }
    }
}

pub fn router(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/analyze", post(analyze))
        .route("/status", get(status))
        .route("/image", get(image))
        .route("/report.txt", get(download_report))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn index(State(state): State<SharedState>) -> Html<String> {
    let session = state.session();
    Html(page::render(&session, Instant::now()))
}

async fn upload(State(state): State<SharedState>, multipart: Multipart) -> Redirect {
    let input = match read_upload(multipart, state.max_upload_bytes).await {
        Ok((file_name, bytes)) => SessionInput::ImageSelected { file_name, bytes },
        Err(reason) => SessionInput::UploadRejected { reason },
    };

    let mut session = state.session();
    let effect = session.handle(input);
    state.apply(&mut session, effect);
    Redirect::to("/")
}

async fn read_upload(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<(String, Vec<u8>), String> {
    let describe = |e: MultipartError| upload_error(e, max_upload_bytes);
    while let Some(field) = multipart.next_field().await.map_err(describe)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(describe)?;
        return Ok((file_name, bytes.to_vec()));
    }
    Err(format!("no '{UPLOAD_FIELD}' field in the upload"))
}

fn upload_error(e: MultipartError, max_upload_bytes: usize) -> String {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        format!(
            "the file is larger than the {} MiB upload limit",
            max_upload_bytes / (1024 * 1024)
        )
    } else {
        e.body_text()
    }
}

async fn analyze(State(state): State<SharedState>) -> Redirect {
    let mut session = state.session();
    let effect = session.handle(SessionInput::TriggerPressed {
        now: Instant::now(),
    });
    state.apply(&mut session, effect);
    Redirect::to("/")
}

async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let session = state.session();
    Json(StatusResponse::from_session(&session, Instant::now()))
}

async fn image(State(state): State<SharedState>) -> Response {
    let session = state.session();
    match session.upload() {
        Some(upload) => (
            [
                (header::CONTENT_TYPE, upload.image.kind().mime_type()),
                (header::CACHE_CONTROL, "no-store"),
            ],
            upload.image.bytes().to_vec(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "No image uploaded").into_response(),
    }
}

async fn download_report(State(state): State<SharedState>) -> Response {
    let session = state.session();
    match session.report() {
        Some(report) => {
            let download = report.download();
            (
                [
                    (
                        header::CONTENT_TYPE,
                        format!("{}; charset=utf-8", download.mime_type),
                    ),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", download.file_name),
                    ),
                ],
                download.body,
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "No diagnosis available").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerArgs;
    use crate::session::SessionState;
    use argh::FromArgs;
    use std::time::Duration;

    fn state() -> AppState {
        let args = ServerArgs::from_args(&["crop-doctor"], &[]).unwrap();
        let config = ServerConfig::from_args(args, |_| Some("test-key".to_string())).unwrap();
        AppState::new(&config)
    }

    #[tokio::test]
    async fn stopped_engine_is_reported_once() {
        let mut state = state();
        state.engine.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!state.engine_lost.load(Ordering::Relaxed));

        assert_eq!(state.session().state(), SessionState::Idle);
        assert!(state.engine_lost.load(Ordering::Relaxed));

        // Later reads still serve the session without reporting again.
        assert_eq!(state.session().state(), SessionState::Idle);
        assert!(state.engine_lost.load(Ordering::Relaxed));
    }
}
