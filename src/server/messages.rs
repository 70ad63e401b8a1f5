use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageInfo {
    pub file_name: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NoticeMessage {
    pub level: String,
    pub message: String,
}

/// Snapshot of the session returned by `GET /status`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub state: String,
    pub progress: Option<u8>,
    pub image: Option<ImageInfo>,
    pub notices: Vec<NoticeMessage>,
    pub rating: Option<String>,
    pub diagnosis: Option<String>,
}

impl StatusResponse {
    pub fn from_session(session: &Session, now: Instant) -> Self {
        Self {
            state: session.state().as_str().to_string(),
            progress: session.progress(now),
            image: session.upload().map(|upload| ImageInfo {
                file_name: upload.file_name.clone(),
                format: upload.image.kind().to_string(),
                width: upload.image.width(),
                height: upload.image.height(),
            }),
            notices: session
                .notices()
                .iter()
                .map(|notice| NoticeMessage {
                    level: notice.level().to_string(),
                    message: notice.message().to_string(),
                })
                .collect(),
            rating: session.report().map(|report| report.rating().to_string()),
            diagnosis: session.report().map(|report| report.text().to_string()),
        }
    }
}
