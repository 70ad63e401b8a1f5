//! The page's state machine.
//!
//! Every user action and every engine result is fed in as a [`SessionInput`].
//! The session answers with a [`SessionEffect`] telling the caller whether a
//! job has to be scheduled or cancelled; it never performs I/O itself.

use crate::photo::PlantImage;
use crate::report::Report;
use std::time::{Duration, Instant};

pub const ANALYSIS_FAILED_WARNING: &str = "Analysis failed. Please try again with a clearer image.";
pub const UPLOAD_FIRST_NOTICE: &str = "Upload a plant image before launching the analysis.";

const PROGRESS_STEPS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ImageLoaded,
    Analyzing,
    Done,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::ImageLoaded => "image_loaded",
            SessionState::Analyzing => "analyzing",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    Warning(String),
    Info(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Error(m) | Notice::Warning(m) | Notice::Info(m) => m,
        }
    }

    pub fn level(&self) -> &'static str {
        match self {
            Notice::Error(_) => "error",
            Notice::Warning(_) => "warning",
            Notice::Info(_) => "info",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionInput {
    ImageSelected { file_name: String, bytes: Vec<u8> },
    /// The upload could not be read at all, e.g. a broken multipart body.
    UploadRejected { reason: String },
    TriggerPressed { now: Instant },
    DiagnosisReady { id: u64, text: String },
    DiagnosisFailed { id: u64, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    None,
    /// Schedule an analysis of this image, then report its job id with [`Session::track`].
    Analyze(PlantImage),
    Cancel(u64),
}

/// Cosmetic progress bar, driven by elapsed time only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressIndicator {
    started: Instant,
    duration: Duration,
}

impl ProgressIndicator {
    pub fn new(started: Instant, duration: Duration) -> Self {
        Self { started, duration }
    }

    /// Percent complete in whole steps, reaching 100 once `duration` elapsed.
    pub fn percent(&self, now: Instant) -> u8 {
        let elapsed = now.saturating_duration_since(self.started);
        if self.duration.is_zero() || elapsed >= self.duration {
            return 100;
        }
        let step = self.duration / PROGRESS_STEPS;
        let done = if step.is_zero() {
            PROGRESS_STEPS
        } else {
            (elapsed.as_nanos() / step.as_nanos()) as u32
        };
        done.min(PROGRESS_STEPS) as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub image: PlantImage,
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    upload: Option<Upload>,
    report: Option<Report>,
    notices: Vec<Notice>,
    pending: Option<u64>,
    progress: Option<ProgressIndicator>,
    progress_duration: Duration,
}

impl Session {
    pub fn new(progress_duration: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            upload: None,
            report: None,
            notices: Vec::new(),
            pending: None,
            progress: None,
            progress_duration,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn upload(&self) -> Option<&Upload> {
        self.upload.as_ref()
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn pending(&self) -> Option<u64> {
        self.pending
    }

    pub fn progress(&self, now: Instant) -> Option<u8> {
        match self.state {
            SessionState::Analyzing => self.progress.map(|p| p.percent(now)),
            SessionState::Done => Some(100),
            _ => None,
        }
    }

    /// Records the job id of the analysis requested by the last [`SessionEffect::Analyze`].
    pub fn track(&mut self, id: u64) {
        if self.state == SessionState::Analyzing {
            self.pending = Some(id);
        }
    }

    pub fn handle(&mut self, input: SessionInput) -> SessionEffect {
        match input {
            SessionInput::ImageSelected { file_name, bytes } => self.select_image(file_name, bytes),
            SessionInput::UploadRejected { reason } => {
                let effect = self.reset();
                log::warn!("Rejected upload: {reason}");
                self.notices
                    .push(Notice::Error(format!("Error processing image: {reason}")));
                effect
            }
            SessionInput::TriggerPressed { now } => self.trigger(now),
            SessionInput::DiagnosisReady { id, text } => {
                if !self.is_pending(id) {
                    log::debug!("Ignoring stale diagnosis for job {id}");
                    return SessionEffect::None;
                }
                if text.is_empty() {
                    self.fail("The model returned an empty diagnosis".to_string());
                } else {
                    log::info!("Diagnosis for job {id} ready");
                    self.finish_analysis(SessionState::Done);
                    self.report = Some(Report::render(text));
                }
                SessionEffect::None
            }
            SessionInput::DiagnosisFailed { id, message } => {
                if !self.is_pending(id) {
                    log::debug!("Ignoring stale failure for job {id}");
                    return SessionEffect::None;
                }
                self.fail(message);
                SessionEffect::None
            }
        }
    }

    /// Drops the image and any diagnosis, cancelling the job in flight.
    fn reset(&mut self) -> SessionEffect {
        let effect = match self.pending.take() {
            Some(id) => SessionEffect::Cancel(id),
            None => SessionEffect::None,
        };
        self.state = SessionState::Idle;
        self.upload = None;
        self.report = None;
        self.progress = None;
        self.notices.clear();
        effect
    }

    fn select_image(&mut self, file_name: String, bytes: Vec<u8>) -> SessionEffect {
        let effect = self.reset();

        match PlantImage::from_upload(&file_name, bytes) {
            Ok(image) => {
                log::info!(
                    "Loaded {file_name} ({}, {}x{})",
                    image.kind(),
                    image.width(),
                    image.height()
                );
                self.upload = Some(Upload { file_name, image });
                self.state = SessionState::ImageLoaded;
            }
            Err(e) => {
                log::warn!("Rejected upload {file_name}: {e}");
                self.notices
                    .push(Notice::Error(format!("Error processing image: {e}")));
            }
        }
        effect
    }

    fn trigger(&mut self, now: Instant) -> SessionEffect {
        match self.state {
            SessionState::Idle => {
                self.notices = vec![Notice::Info(UPLOAD_FIRST_NOTICE.to_string())];
                SessionEffect::None
            }
            SessionState::Analyzing => SessionEffect::None,
            SessionState::ImageLoaded | SessionState::Done | SessionState::Failed => {
                let Some(upload) = &self.upload else {
                    self.state = SessionState::Idle;
                    return SessionEffect::None;
                };
                let image = upload.image.clone();
                self.state = SessionState::Analyzing;
                self.report = None;
                self.notices.clear();
                self.pending = None;
                self.progress = Some(ProgressIndicator::new(now, self.progress_duration));
                SessionEffect::Analyze(image)
            }
        }
    }

    fn fail(&mut self, message: String) {
        log::warn!("Analysis failed: {message}");
        self.finish_analysis(SessionState::Failed);
        self.report = None;
        self.notices = vec![
            Notice::Error(format!("Error analyzing image: {message}")),
            Notice::Warning(ANALYSIS_FAILED_WARNING.to_string()),
        ];
    }

    fn finish_analysis(&mut self, state: SessionState) {
        self.state = state;
        self.pending = None;
        self.progress = None;
    }

    fn is_pending(&self, id: u64) -> bool {
        self.state == SessionState::Analyzing && self.pending == Some(id)
    }
}
