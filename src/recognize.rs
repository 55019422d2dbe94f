//! The visual-recognition collaborator.
//!
//! OCR and layout analysis are not part of this crate. A
//! [`PageRecognizer`] turns a page image into positioned content blocks and
//! the engine takes it from there. Recognisers receive the marked regions so
//! they can leave those pixels out of their output.

use crate::layout::{MarkedRegion, PageImage, Recognition};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recogniser backend failed: {0}")]
    Backend(String),

    #[error("cannot read layout file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("layout is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Recognise the content of one page.
///
/// A call either returns the whole page or fails; partial results are not
/// part of the contract.
#[async_trait]
pub trait PageRecognizer: Send + Sync {
    async fn recognize(
        &self,
        page: &PageImage,
        regions: &[MarkedRegion],
    ) -> Result<Recognition, RecognitionError>;
}

/// Serves a recognition computed ahead of time (e.g. by an external OCR
/// run and saved as layout JSON).
#[derive(Debug, Clone)]
pub struct PrecomputedRecognizer {
    recognition: Recognition,
}

impl PrecomputedRecognizer {
    pub fn new(recognition: Recognition) -> Self {
        Self { recognition }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RecognitionError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RecognitionError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| RecognitionError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    pub fn recognition(&self) -> &Recognition {
        &self.recognition
    }
}

#[async_trait]
impl PageRecognizer for PrecomputedRecognizer {
    async fn recognize(
        &self,
        _page: &PageImage,
        _regions: &[MarkedRegion],
    ) -> Result<Recognition, RecognitionError> {
        Ok(self.recognition.clone())
    }
}
