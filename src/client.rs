//! HTTP client for a running Crop Doctor server.

use crate::photo::{ImageError, ImageKind};
use crate::server::{UPLOAD_FIELD, messages::StatusResponse};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Invalid image path {0:?}")]
    InvalidPath(PathBuf),

    #[error("Upload rejected: {0}")]
    UploadRejected(String),
}

pub struct DoctorClient {
    http: reqwest::Client,
    base: String,
}

impl DoctorClient {
    /// `base` is the server URL without a trailing slash, e.g. `http://localhost:3000`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    pub async fn upload(&self, path: &Path) -> Result<StatusResponse, ClientError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::InvalidPath(path.to_path_buf()))?
            .to_string();
        let kind = ImageKind::from_file_name(&file_name)?;
        let bytes = tokio::fs::read(path).await?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(kind.mime_type())?;
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

        self.http
            .post(format!("{}/upload", self.base))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        self.status().await
    }

    pub async fn analyze(&self) -> Result<StatusResponse, ClientError> {
        self.http
            .post(format!("{}/analyze", self.base))
            .send()
            .await?
            .error_for_status()?;
        self.status().await
    }

    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        let status = self
            .http
            .get(format!("{}/status", self.base))
            .send()
            .await?
            .error_for_status()?
            .json::<StatusResponse>()
            .await?;
        Ok(status)
    }

    pub async fn report(&self) -> Result<String, ClientError> {
        let report = self
            .http
            .get(format!("{}/report.txt", self.base))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(report)
    }

    /// Uploads the photo, launches the analysis and polls until it settles.
    ///
    /// Returns the final status, `done` or `failed`.
    pub async fn diagnose(
        &self,
        path: &Path,
        poll_interval: Duration,
    ) -> Result<StatusResponse, ClientError> {
        let status = self.upload(path).await?;
        if status.state != "image_loaded" {
            let reason = status
                .notices
                .first()
                .map(|notice| notice.message.clone())
                .unwrap_or_else(|| format!("server is {}", status.state));
            return Err(ClientError::UploadRejected(reason));
        }

        let mut status = self.analyze().await?;
        while status.state == "analyzing" {
            if let Some(progress) = status.progress {
                log::debug!("Progress: {progress}%");
            }
            tokio::time::sleep(poll_interval).await;
            status = self.status().await?;
        }
        Ok(status)
    }
}
