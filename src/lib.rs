//! # edgequake-page2md
//!
//! Transcribe a rendered page image into Markdown, following an explicit
//! rule set and substituting pre-marked regions (figures, photos, diagrams)
//! with image-reference placeholders.
//!
//! ## Why this crate?
//!
//! A page that is already a picture (a scan, a rasterised PDF page, a
//! screenshot) still has to end up as text in the right reading order, with
//! formulae in LaTeX and figures left where they were. The rules for that
//! ("skip running headers", "escape literal asterisks", "put the figure
//! *here*") are data in this crate, not prose buried in a prompt, so the
//! same rule set drives both a deterministic engine and a vision LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page image + marked regions + rule set
//!  │
//!  ├─ 1. Validate   single page, unique region ids, complete rule set
//!  ├─ 2. Recognise  PageRecognizer → positioned blocks      ─┐ deterministic
//!  ├─ 3. Order      bands + columns, regions merged in       │ engine
//!  ├─ 4. Omit       headers, footers, page numbers           │
//!  ├─ 5. Render     emphasis, LaTeX, escaping, placeholders ─┘
//!  │
//!  ├─ 2'. Prompt    framing bundles + page PNG → vision LLM  ─┐ VLM
//!  ├─ 3'. Enforce   strip fences & chatter, repair tables,    │ path
//!  │                reconcile placeholders                   ─┘
//!  └─ Output        TranscriptionResult (Markdown + warnings)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_page2md::{
//!     transcribe_recognized, BoundingBox, ContentBlock, MarkedRegion, PageImage,
//!     Recognition, TranscriptionRuleSet,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let page = PageImage::decode(&std::fs::read("page_0.png")?)?;
//!     let recognition = Recognition::new(vec![ContentBlock::text(
//!         BoundingBox::new(40.0, 120.0, 560.0, 140.0),
//!         "The quick brown fox.",
//!     )]);
//!     let regions = [MarkedRegion::new("page_0_1.png", 0)];
//!
//!     let rules = TranscriptionRuleSet::standard();
//!     let result = transcribe_recognized(&page, &recognition, &regions, &rules)?;
//!     println!("{}", result.markdown);
//!     Ok(())
//! }
//! ```
//!
//! For a vision model instead of a recogniser, see [`transcribe_with_vlm`]
//! and [`transcribe_vlm_batch`]; the provider is auto-detected from
//! `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` / `GEMINI_API_KEY`.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `page2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-page2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod recognize;
pub mod rules;
pub mod transcribe;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{VlmConfig, VlmConfigBuilder};
pub use error::{Page2MdError, RegionWarning};
pub use layout::{
    BlockKind, BoundingBox, ContentBlock, MarkedRegion, PageImage, Recognition, Script, Span,
    SpanStyle,
};
pub use output::{PageOutcome, TranscriptionResult};
pub use progress::{NoopProgressCallback, ProgressCallback, TranscriptionProgress};
pub use recognize::{PageRecognizer, PrecomputedRecognizer, RecognitionError};
pub use rules::{
    EmphasisPolicy, EscapingPolicy, FramingPolicy, LanguagePolicy, MathPolicy, OmissionPolicy,
    RegionPolicy, RuleSetBuilder, ScriptRendering, TranscriptionRuleSet,
};
pub use transcribe::{
    resolve_provider, transcribe, transcribe_batch, transcribe_recognized, transcribe_sync,
    transcribe_vlm_batch, transcribe_with_vlm, PageInput,
};
