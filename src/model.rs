use crate::photo::{ImageKind, PlantImage};
use std::future::Future;

/// Trait for implementing diagnosis models that can be used with the [`DiagnosisEngine`].
///
/// Implementors define the request and response types and the inference logic.
/// The returned future must be `Send` so the engine can drive it on a background task.
///
/// [`DiagnosisEngine`]: crate::engine::DiagnosisEngine
pub trait DiagnosisModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(
        &mut self,
        request: Self::Request,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

/// Trait for extracting lightweight metadata from inference requests.
///
/// This allows the engine to keep essential information (like the image size)
/// without cloning heavy data for telemetry and debugging purposes.
pub trait RequestMetadata {
    /// The lightweight metadata type that represents the request.
    type Metadata: Send + 'static;

    /// Extracts lightweight metadata from the request.
    fn metadata(&self) -> Self::Metadata;
}

/// A plant image paired with the instruction prompt sent along with it.
#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    pub prompt: String,
    pub image: PlantImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisMetadata {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub byte_len: usize,
    pub prompt_len: usize,
}

impl RequestMetadata for DiagnosisRequest {
    type Metadata = DiagnosisMetadata;

    fn metadata(&self) -> Self::Metadata {
        DiagnosisMetadata {
            kind: self.image.kind(),
            width: self.image.width(),
            height: self.image.height(),
            byte_len: self.image.bytes().len(),
            prompt_len: self.prompt.len(),
        }
    }
}

/// Free-form diagnosis text exactly as the model returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub text: String,
}
