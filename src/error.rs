//! Error types for the edgequake-page2md library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`Page2MdError`] — **Fatal**: the page cannot be transcribed at all
//!   (malformed image, incomplete rule set, recognition failed). A failed
//!   call never returns partial Markdown.
//!
//! * [`RegionWarning`] — **Non-fatal**: a marked region could not be placed
//!   exactly, so it was placed at the nearest plausible position instead.
//!   Stored in [`crate::output::TranscriptionResult::warnings`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-page2md library.
#[derive(Debug, Error)]
pub enum Page2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The page image or region list is malformed (multi-page image, empty
    /// image, duplicate region identifier, …).
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A rule-set policy is missing or inconsistent.
    #[error("Invalid configuration: '{field}' {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// The rule-set file could not be read.
    #[error("Failed to read rule set '{path}': {source}")]
    RulesFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Recognition errors ────────────────────────────────────────────────
    /// The visual-recognition collaborator failed; nothing was transcribed.
    #[error("Recognition failed: {detail}")]
    RecognitionFailed { detail: String },

    /// The page could not be PNG-encoded for the vision model.
    #[error("Image encoding failed: {0}")]
    ImageEncodingFailed(#[from] image::ImageError),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The vision model failed on every attempt.
    #[error("LLM call failed after {retries} retries: {detail}")]
    LlmFailed { retries: u32, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Page2MdError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Page2MdError::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A non-fatal placement problem for one marked region.
///
/// The region's placeholder is still emitted; the warning only records
/// that its position is a best-effort guess.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum RegionWarning {
    #[error("Region '{identifier}' could not be resolved exactly: {reason}")]
    UnresolvedRegion { identifier: String, reason: String },
}

impl RegionWarning {
    pub(crate) fn unresolved(identifier: &str, reason: impl Into<String>) -> Self {
        RegionWarning::UnresolvedRegion {
            identifier: identifier.to_string(),
            reason: reason.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            RegionWarning::UnresolvedRegion { identifier, .. } => identifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_display() {
        let e = Page2MdError::config("omission", "is not set");
        assert_eq!(e.to_string(), "Invalid configuration: 'omission' is not set");
    }

    #[test]
    fn llm_failed_display() {
        let e = Page2MdError::LlmFailed {
            retries: 3,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 retries"), "got: {msg}");
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn region_warning_display() {
        let w = RegionWarning::unresolved("page_0_1.png", "outside the page");
        assert_eq!(w.identifier(), "page_0_1.png");
        assert!(w.to_string().contains("outside the page"));
    }
}
