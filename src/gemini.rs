//! Client for the Gemini `generateContent` REST endpoint.
//!
//! One request per diagnosis: the instruction prompt and the photo are sent as
//! two parts of a single user turn, with fixed sampling parameters and safety
//! thresholds.

use crate::model::{Diagnosis, DiagnosisModel, DiagnosisRequest};
use crate::photo::{ImageError, PlantImage};
use crate::prompt::PromptTemplate;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("Request to the model failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Could not read the model response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("The request was blocked by the model: {0}")]
    Blocked(String),

    #[error("The model returned no text")]
    EmptyResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: 1.0,
            top_k: 32,
            max_output_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Blocks medium and above in every category.
pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GenerateContentResponse {
    /// Text of the first candidate, all parts joined in order.
    pub fn text(&self) -> Result<String, DiagnosisError> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone())
        {
            return Err(DiagnosisError::Blocked(reason));
        }

        let candidate = self.candidates.first().ok_or(DiagnosisError::EmptyResponse)?;
        let text: String = candidate
            .content
            .iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .collect();

        if !text.is_empty() {
            return Ok(text);
        }
        match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
                Err(DiagnosisError::Blocked(reason.to_string()))
            }
            _ => Err(DiagnosisError::EmptyResponse),
        }
    }
}

pub fn build_request(
    prompt: &str,
    image: &PlantImage,
    generation_config: &GenerationConfig,
    safety_settings: &[SafetySetting],
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part {
                    text: Some(prompt.to_string()),
                    inline_data: None,
                },
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: image.kind().mime_type().to_string(),
                        data: BASE64.encode(image.bytes()),
                    }),
                },
            ],
        }],
        generation_config: generation_config.clone(),
        safety_settings: safety_settings.to_vec(),
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
    prompt: PromptTemplate,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, prompt: PromptTemplate) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            prompt,
            generation_config: GenerationConfig::default(),
            safety_settings: default_safety_settings(),
        }
    }

    /// Decodes `image_bytes` and asks the model for a diagnosis.
    ///
    /// Bytes that are not a JPEG or PNG are rejected before any request is made.
    pub async fn analyze(&self, image_bytes: &[u8]) -> Result<String, DiagnosisError> {
        let image = PlantImage::decode(image_bytes.to_vec())?;
        self.generate(self.prompt.as_str(), &image).await
    }

    pub async fn generate(&self, prompt: &str, image: &PlantImage) -> Result<String, DiagnosisError> {
        let body = build_request(prompt, image, &self.generation_config, &self.safety_settings);

        log::debug!(
            "Sending {} image ({} bytes) to {}",
            image.kind(),
            image.bytes().len(),
            self.config.model
        );

        let response = self
            .client
            .post(self.config.url())
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&raw)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| raw.trim().to_string());
            log::warn!("Model API returned {status}: {message}");
            return Err(DiagnosisError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str::<GenerateContentResponse>(&raw)?.text()
    }
}

impl DiagnosisModel for GeminiClient {
    type Request = DiagnosisRequest;
    type Response = Diagnosis;
    type Error = DiagnosisError;

    async fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
        let text = self.generate(&request.prompt, &request.image).await?;
        Ok(Diagnosis { text })
    }
}
