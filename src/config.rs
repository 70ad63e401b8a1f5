use crate::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL, GeminiConfig};
use crate::prompt::{PromptError, PromptTemplate};
use argh::FromArgs;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Environment variable holding the model API key.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

// defaults for the server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PROGRESS_MS: u64 = 2000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GOOGLE_API_KEY is not set")]
    MissingApiKey,

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Invalid value for --{flag}: {reason}")]
    Invalid { flag: &'static str, reason: String },
}

#[derive(FromArgs, Debug)]
/// Crop Doctor serves a page that diagnoses plant photos with a hosted multimodal model.
pub struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    pub host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    pub port: u16,

    /// the model to ask for a diagnosis
    #[argh(option, default = "DEFAULT_MODEL.to_string()")]
    pub model: String,

    /// base URL of the model API
    #[argh(option, default = "DEFAULT_ENDPOINT.to_string()")]
    pub endpoint: String,

    /// seconds to wait for the model before giving up
    #[argh(option, default = "DEFAULT_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// duration of the progress bar animation in milliseconds
    #[argh(option, default = "DEFAULT_PROGRESS_MS")]
    pub progress_ms: u64,

    /// largest accepted upload in MiB
    #[argh(option, default = "DEFAULT_MAX_UPLOAD_MB")]
    pub max_upload_mb: usize,

    /// file with the instruction prompt, replacing the built-in one
    #[argh(option)]
    pub prompt_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub gemini: GeminiConfig,
    pub prompt: PromptTemplate,
    pub timeout: Duration,
    pub progress_duration: Duration,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Validates the parsed arguments; `env` looks up environment variables.
    pub fn from_args(
        args: ServerArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = env(API_KEY_ENV)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        if args.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                flag: "timeout-secs",
                reason: "must be at least 1".to_string(),
            });
        }
        let max_upload_bytes = match args.max_upload_mb.checked_mul(1024 * 1024) {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    flag: "max-upload-mb",
                    reason: "must be at least 1".to_string(),
                });
            }
            Some(bytes) => bytes,
            None => {
                return Err(ConfigError::Invalid {
                    flag: "max-upload-mb",
                    reason: format!("{} MiB does not fit in memory", args.max_upload_mb),
                });
            }
        };
        if !args.endpoint.starts_with("http://") && !args.endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid {
                flag: "endpoint",
                reason: format!("'{}' is not an http(s) URL", args.endpoint),
            });
        }

        let prompt = match &args.prompt_file {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default(),
        };

        Ok(Self {
            addr: format!("{}:{}", args.host, args.port),
            gemini: GeminiConfig {
                endpoint: args.endpoint,
                model: args.model,
                api_key,
            },
            prompt,
            timeout: Duration::from_secs(args.timeout_secs),
            progress_duration: Duration::from_millis(args.progress_ms),
            max_upload_bytes,
        })
    }
}
