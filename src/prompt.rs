use std::{fs, path::Path};
use thiserror::Error;

const DEFAULT_TEMPLATE: &str = include_str!("../prompts/plant_diagnosis.txt");

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to read prompt template {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Prompt template {0} is empty")]
    Empty(String),
}

/// Instruction text sent in front of every plant photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.trim_end().to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self, PromptError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PromptError::Empty("<inline>".to_string()));
        }
        Ok(Self {
            text: text.trim_end().to_string(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PromptError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PromptError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::new(text).map_err(|_| PromptError::Empty(path.display().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}
