//! Plant health diagnosis from a single photo.
//!
//! A small web tool: a photo is uploaded, validated, sent together with an
//! instruction prompt to a hosted multimodal model, and the model's reply is
//! rendered as a report that can be downloaded as plain text.

pub mod client;
pub mod config;
pub mod engine;
pub mod gemini;
pub mod model;
pub mod photo;
pub mod prompt;
pub mod report;
pub mod server;
pub mod session;

pub use engine::{DiagnosisEngine, EngineOutcome, EngineResponse, EngineResult, EngineState};
pub use gemini::{DiagnosisError, GeminiClient, GeminiConfig};
pub use model::{Diagnosis, DiagnosisModel, DiagnosisRequest, RequestMetadata};
pub use photo::{ImageError, ImageKind, PlantImage};
pub use prompt::PromptTemplate;
pub use report::{REPORT_FILE_NAME, Report, StarRating};
pub use session::{Session, SessionEffect, SessionInput, SessionState};
