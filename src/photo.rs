//! Validation of uploaded plant photos.
//!
//! Only JPEG and PNG are accepted. An upload is checked twice: the file name
//! must carry one of the accepted extensions, and the bytes themselves must
//! fully decode in the format their signature announces.

use std::{fmt, path::Path, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("The uploaded file is empty")]
    Empty,

    #[error("Unsupported file type '{0}', expected one of jpg, jpeg, png")]
    UnsupportedExtension(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Could not decode image: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpeg",
            ImageKind::Png => "png",
        }
    }

    /// Maps a file name to the kind its extension claims, case-insensitively.
    pub fn from_file_name(file_name: &str) -> Result<Self, ImageError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ImageError::UnsupportedExtension(file_name.to_string()))?;

        match extension.as_str() {
            "jpg" | "jpeg" => Ok(ImageKind::Jpeg),
            "png" => Ok(ImageKind::Png),
            _ => Err(ImageError::UnsupportedExtension(extension)),
        }
    }

    fn from_format(format: ::image::ImageFormat) -> Option<Self> {
        match format {
            ::image::ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ::image::ImageFormat::Png => Some(ImageKind::Png),
            _ => None,
        }
    }

    fn format(&self) -> ::image::ImageFormat {
        match self {
            ImageKind::Jpeg => ::image::ImageFormat::Jpeg,
            ImageKind::Png => ::image::ImageFormat::Png,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded photo that is known to decode.
///
/// The original bytes are kept untouched and shared, so handing the image to
/// the engine does not copy the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct PlantImage {
    bytes: Arc<[u8]>,
    kind: ImageKind,
    width: u32,
    height: u32,
}

impl PlantImage {
    /// Sniffs the format from the content and decodes the whole image.
    pub fn decode(bytes: impl Into<Arc<[u8]>>) -> Result<Self, ImageError> {
        let bytes: Arc<[u8]> = bytes.into();
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }

        let format = ::image::guess_format(&bytes)
            .map_err(|_| ImageError::Decode("unrecognized image signature".to_string()))?;
        let kind = ImageKind::from_format(format)
            .ok_or_else(|| ImageError::UnsupportedFormat(format!("{format:?}")))?;

        let decoded = ::image::load_from_memory_with_format(&bytes, kind.format())
            .map_err(|e| ImageError::Decode(e.to_string()))?;

        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            bytes,
            kind,
        })
    }

    /// Checks the upload's file name before decoding its content.
    pub fn from_upload(file_name: &str, bytes: impl Into<Arc<[u8]>>) -> Result<Self, ImageError> {
        ImageKind::from_file_name(file_name)?;
        Self::decode(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Debug for PlantImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlantImage")
            .field("kind", &self.kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}
