//! Pipeline stages for page-to-Markdown transcription.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own.
//!
//! ## Data Flow
//!
//! Deterministic engine (recognised layout in, Markdown out):
//!
//! ```text
//! order ──▶ omit ──▶ render (──▶ escape)
//! (merge)   (drop)   (math, emphasis, placeholders, joining)
//! ```
//!
//! Vision-model path (page image in, Markdown out):
//!
//! ```text
//! encode ──▶ llm ──▶ postprocess
//! (base64)   (VLM)   (enforce the rules on the reply)
//! ```
//!
//! 1. [`order`]  merge content blocks and marked regions into one reading order
//! 2. [`omit`]   drop headers, footers, page numbers and over-long lines
//! 3. [`render`] produce Markdown text; literal text goes through [`escape`]
//! 4. [`encode`] PNG-encode and base64-wrap the page for the multimodal request
//! 5. [`llm`]    drive the VLM call with retry/backoff; the only stage with
//!    network I/O
//! 6. [`postprocess`] deterministic cleanup so the VLM reply obeys the same
//!    guarantees as the engine (no fences, no commentary, one placeholder
//!    per region, single paragraph breaks)

pub mod encode;
pub mod escape;
pub mod llm;
pub(crate) mod omit;
pub(crate) mod order;
pub mod postprocess;
pub(crate) mod render;
