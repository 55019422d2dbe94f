//! Transcription result types.

use crate::error::RegionWarning;
use serde::Serialize;
use std::fmt;

/// The Markdown reconstruction of one page plus bookkeeping.
///
/// `placeholders` always equals the number of marked regions supplied;
/// a region that could not be placed exactly is still emitted and listed in
/// `warnings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionResult {
    /// The page content. No trailing newline.
    pub markdown: String,
    /// Image-reference placeholders written for marked regions.
    pub placeholders: usize,
    /// Content blocks dropped by the omission policy. Always 0 on the VLM
    /// path, where the model applies omission itself.
    pub omitted: usize,
    /// Dominant language reported by the recogniser, if any.
    pub language: Option<String>,
    pub warnings: Vec<RegionWarning>,
}

impl TranscriptionResult {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl fmt::Display for TranscriptionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.markdown)
    }
}

/// Outcome of one page in a batch.
#[derive(Debug)]
pub struct PageOutcome {
    /// 0-based position of the page in the batch input.
    pub index: usize,
    pub result: Result<TranscriptionResult, crate::error::Page2MdError>,
}
