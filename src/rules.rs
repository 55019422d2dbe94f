//! The transcription rule set: every policy the engine consults.
//!
//! A [`TranscriptionRuleSet`] is built once (from code via
//! [`RuleSetBuilder`], or from a JSON document) and then only ever read.
//! It is `Clone + Send + Sync`, so a process shares one instance by
//! reference or `Arc` across concurrent transcriptions.
//!
//! # Configuration bundles
//!
//! The JSON form has one top-level key per policy. Every key is required:
//! a rule set with a hole in it is rejected with
//! [`Page2MdError::InvalidConfiguration`] before any page is touched.
//!
//! ```json
//! {
//!   "language":  "mirror",
//!   "math":      { "inline_open": "$", "inline_close": "$",
//!                  "display_open": "$$", "display_close": "$$" },
//!   "omission":  { "header_margin": 0.05, "footer_margin": 0.05,
//!                  "drop_page_numbers": true, "max_line_chars": null },
//!   "escaping":  { "inline": { "*": "\\*" }, "line_start": { "#": "\\#" },
//!                  "ordered_lists": true },
//!   "emphasis":  { "bold": "**", "italic": "*", "script": "plain" },
//!   "regions":   { "placeholder": "![{id}]({id})" },
//!   "framing":   { "role": "…", "general": "…", "regions": "… {regions} …" }
//! }
//! ```

use crate::error::Page2MdError;
use crate::prompts::{DEFAULT_GENERAL_PROMPT, DEFAULT_REGION_PROMPT, DEFAULT_ROLE_PROMPT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Placeholder token replaced by a region identifier.
pub const REGION_ID_TOKEN: &str = "{id}";

/// Placeholder token replaced by the comma-separated identifier list in the
/// region prompt.
pub const REGION_LIST_TOKEN: &str = "{regions}";

/// Immutable policy object consulted during every transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRuleSet {
    pub language: LanguagePolicy,
    pub math: MathPolicy,
    pub omission: OmissionPolicy,
    pub escaping: EscapingPolicy,
    pub emphasis: EmphasisPolicy,
    pub regions: RegionPolicy,
    pub framing: FramingPolicy,
}

impl TranscriptionRuleSet {
    /// Empty builder; every policy must be supplied.
    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    /// The built-in policy: Markdown output, `$`/`$$` math, 5 % header and
    /// footer margins, page numbers dropped, no long-line cutoff.
    pub fn standard() -> Self {
        Self {
            language: LanguagePolicy::Mirror,
            math: MathPolicy::default(),
            omission: OmissionPolicy::default(),
            escaping: EscapingPolicy::default(),
            emphasis: EmphasisPolicy::default(),
            regions: RegionPolicy::default(),
            framing: FramingPolicy::default(),
        }
    }

    /// Parse a JSON rule-set document. Missing policies are a configuration
    /// error, not a silent fallback to defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Page2MdError> {
        let builder: RuleSetBuilder = serde_json::from_str(json)
            .map_err(|e| Page2MdError::config("rule set", format!("is not valid JSON: {e}")))?;
        builder.build()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Page2MdError> {
        let path = path.as_ref();
        let json =
            std::fs::read_to_string(path).map_err(|e| Page2MdError::RulesFileUnreadable {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::from_json_str(&json)
    }

    /// Check internal consistency of every policy.
    pub fn validate(&self) -> Result<(), Page2MdError> {
        self.math.validate()?;
        self.omission.validate()?;
        self.escaping.validate()?;
        self.emphasis.validate()?;
        self.regions.validate()?;
        self.framing.validate()?;
        Ok(())
    }
}

impl Default for TranscriptionRuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`TranscriptionRuleSet`]; doubles as the JSON loading shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSetBuilder {
    #[serde(default)]
    language: Option<LanguagePolicy>,
    #[serde(default)]
    math: Option<MathPolicy>,
    #[serde(default)]
    omission: Option<OmissionPolicy>,
    #[serde(default)]
    escaping: Option<EscapingPolicy>,
    #[serde(default)]
    emphasis: Option<EmphasisPolicy>,
    #[serde(default)]
    regions: Option<RegionPolicy>,
    #[serde(default)]
    framing: Option<FramingPolicy>,
}

impl RuleSetBuilder {
    pub fn language(mut self, policy: LanguagePolicy) -> Self {
        self.language = Some(policy);
        self
    }

    pub fn math(mut self, policy: MathPolicy) -> Self {
        self.math = Some(policy);
        self
    }

    pub fn omission(mut self, policy: OmissionPolicy) -> Self {
        self.omission = Some(policy);
        self
    }

    pub fn escaping(mut self, policy: EscapingPolicy) -> Self {
        self.escaping = Some(policy);
        self
    }

    pub fn emphasis(mut self, policy: EmphasisPolicy) -> Self {
        self.emphasis = Some(policy);
        self
    }

    pub fn regions(mut self, policy: RegionPolicy) -> Self {
        self.regions = Some(policy);
        self
    }

    pub fn framing(mut self, policy: FramingPolicy) -> Self {
        self.framing = Some(policy);
        self
    }

    /// Build the rule set, failing on the first unset or invalid policy.
    pub fn build(self) -> Result<TranscriptionRuleSet, Page2MdError> {
        fn require<T>(value: Option<T>, field: &str) -> Result<T, Page2MdError> {
            value.ok_or_else(|| Page2MdError::config(field, "is not set"))
        }

        let rules = TranscriptionRuleSet {
            language: require(self.language, "language")?,
            math: require(self.math, "math")?,
            omission: require(self.omission, "omission")?,
            escaping: require(self.escaping, "escaping")?,
            emphasis: require(self.emphasis, "emphasis")?,
            regions: require(self.regions, "regions")?,
            framing: require(self.framing, "framing")?,
        };
        rules.validate()?;
        Ok(rules)
    }
}

// ── Policies ─────────────────────────────────────────────────────────────

/// Output language. Transcription never translates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguagePolicy {
    /// Mirror the dominant language of the recognised content.
    #[default]
    Mirror,
}

/// Delimiters for inline and display mathematics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathPolicy {
    pub inline_open: String,
    pub inline_close: String,
    pub display_open: String,
    pub display_close: String,
}

impl Default for MathPolicy {
    fn default() -> Self {
        Self {
            inline_open: "$".into(),
            inline_close: "$".into(),
            display_open: "$$".into(),
            display_close: "$$".into(),
        }
    }
}

impl MathPolicy {
    fn validate(&self) -> Result<(), Page2MdError> {
        for (field, value) in [
            ("math.inline_open", &self.inline_open),
            ("math.inline_close", &self.inline_close),
            ("math.display_open", &self.display_open),
            ("math.display_close", &self.display_close),
        ] {
            if value.is_empty() {
                return Err(Page2MdError::config(field, "must not be empty"));
            }
        }
        if self.inline_open == self.display_open {
            return Err(Page2MdError::config(
                "math.display_open",
                "must differ from math.inline_open",
            ));
        }
        Ok(())
    }
}

/// Content classes dropped from the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmissionPolicy {
    /// Lines entirely inside this top fraction of the page are headers.
    pub header_margin: f32,
    /// Lines entirely inside this bottom fraction of the page are footers.
    pub footer_margin: f32,
    /// Drop page-number-shaped lines at the start or end of the page.
    pub drop_page_numbers: bool,
    /// Drop lines longer than this many characters; `None` keeps all.
    #[serde(default)]
    pub max_line_chars: Option<usize>,
}

impl Default for OmissionPolicy {
    fn default() -> Self {
        Self {
            header_margin: 0.05,
            footer_margin: 0.05,
            drop_page_numbers: true,
            max_line_chars: None,
        }
    }
}

impl OmissionPolicy {
    fn validate(&self) -> Result<(), Page2MdError> {
        for (field, value) in [
            ("omission.header_margin", self.header_margin),
            ("omission.footer_margin", self.footer_margin),
        ] {
            if !(0.0..0.5).contains(&value) {
                return Err(Page2MdError::config(
                    field,
                    format!("must be in [0, 0.5), got {value}"),
                ));
            }
        }
        if self.max_line_chars == Some(0) {
            return Err(Page2MdError::config(
                "omission.max_line_chars",
                "must be at least 1 (use null to disable)",
            ));
        }
        Ok(())
    }
}

/// Replacements that neutralise Markdown-significant characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscapingPolicy {
    /// Applied anywhere inside literal text, longest match first.
    pub inline: BTreeMap<String, String>,
    /// Applied to the start of each rendered line (after `inline`).
    pub line_start: BTreeMap<String, String>,
    /// Escape the delimiter of `12.` / `12)` at the start of a line.
    pub ordered_lists: bool,
}

impl Default for EscapingPolicy {
    fn default() -> Self {
        let inline = [
            ("\\", "\\\\"),
            ("*", "\\*"),
            ("_", "\\_"),
            ("`", "\\`"),
            ("[", "\\["),
            ("]", "\\]"),
            ("|", "\\|"),
            ("$", "\\$"),
            ("<", "\\<"),
            ("~", "\\~"),
            ("&", "\\&"),
        ];
        let line_start = [
            ("#", "\\#"),
            (">", "\\>"),
            ("+", "\\+"),
            ("-", "\\-"),
            ("=", "\\="),
        ];
        Self {
            inline: inline
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            line_start: line_start
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ordered_lists: true,
        }
    }
}

impl EscapingPolicy {
    fn validate(&self) -> Result<(), Page2MdError> {
        let empty_key = |map: &BTreeMap<String, String>| map.keys().any(|k| k.is_empty());
        if empty_key(&self.inline) {
            return Err(Page2MdError::config("escaping.inline", "has an empty sequence"));
        }
        if empty_key(&self.line_start) {
            return Err(Page2MdError::config(
                "escaping.line_start",
                "has an empty sequence",
            ));
        }
        Ok(())
    }
}

/// How non-math superscripts and subscripts are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptRendering {
    /// As plain adjacent characters (`word1`).
    #[default]
    Plain,
    /// Wrapped in the italic marker.
    Italic,
    /// Wrapped in the bold marker.
    Bold,
}

/// Markers for visual styling. Math notation is never used for styling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmphasisPolicy {
    pub bold: String,
    pub italic: String,
    #[serde(default)]
    pub script: ScriptRendering,
}

impl Default for EmphasisPolicy {
    fn default() -> Self {
        Self {
            bold: "**".into(),
            italic: "*".into(),
            script: ScriptRendering::Plain,
        }
    }
}

impl EmphasisPolicy {
    fn validate(&self) -> Result<(), Page2MdError> {
        for (field, marker) in [("emphasis.bold", &self.bold), ("emphasis.italic", &self.italic)] {
            if marker.is_empty() || !marker.chars().all(|c| c == '*' || c == '_') {
                return Err(Page2MdError::config(
                    field,
                    format!("must be made of '*' or '_', got {marker:?}"),
                ));
            }
        }
        if self.bold == self.italic {
            return Err(Page2MdError::config(
                "emphasis.bold",
                "must differ from emphasis.italic",
            ));
        }
        Ok(())
    }
}

/// Placeholder construction for marked regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPolicy {
    /// Template in which every `{id}` is replaced by the region identifier.
    pub placeholder: String,
}

impl Default for RegionPolicy {
    fn default() -> Self {
        Self {
            placeholder: format!("![{REGION_ID_TOKEN}]({REGION_ID_TOKEN})"),
        }
    }
}

impl RegionPolicy {
    /// Render the placeholder for one region.
    pub fn placeholder_for(&self, identifier: &str) -> String {
        self.placeholder.replace(REGION_ID_TOKEN, identifier)
    }

    fn validate(&self) -> Result<(), Page2MdError> {
        if !self.placeholder.contains(REGION_ID_TOKEN) {
            return Err(Page2MdError::config(
                "regions.placeholder",
                format!("must contain {REGION_ID_TOKEN}"),
            ));
        }
        if self.placeholder.contains('\n') {
            return Err(Page2MdError::config(
                "regions.placeholder",
                "must be a single line",
            ));
        }
        Ok(())
    }
}

/// Instructions handed to a vision model on the prompted path.
///
/// Each text may carry the formatting tokens of
/// [`crate::prompts::render_prompt`], so the model is told the delimiters
/// and markers this rule set actually uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingPolicy {
    /// Top-level framing: who the model is and what a page is.
    pub role: String,
    /// General transcription rules (language, math, omission, output shape).
    pub general: String,
    /// Marked-region rules; `{regions}` is replaced by the identifier list.
    pub regions: String,
}

impl Default for FramingPolicy {
    fn default() -> Self {
        Self {
            role: DEFAULT_ROLE_PROMPT.into(),
            general: DEFAULT_GENERAL_PROMPT.into(),
            regions: DEFAULT_REGION_PROMPT.into(),
        }
    }
}

impl FramingPolicy {
    fn validate(&self) -> Result<(), Page2MdError> {
        if self.role.trim().is_empty() {
            return Err(Page2MdError::config("framing.role", "must not be empty"));
        }
        if self.general.trim().is_empty() {
            return Err(Page2MdError::config("framing.general", "must not be empty"));
        }
        if !self.regions.contains(REGION_LIST_TOKEN) {
            return Err(Page2MdError::config(
                "framing.regions",
                format!("must contain {REGION_LIST_TOKEN}"),
            ));
        }
        Ok(())
    }
}
