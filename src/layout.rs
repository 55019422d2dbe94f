//! Page-level data model: the image, its marked regions, and what the
//! recognition capability saw on it.
//!
//! Coordinates are page pixels with the origin at the top-left corner, the
//! same space the recognition collaborator reports its blocks in. Nothing in
//! here is mutated once a transcription call starts.

use crate::error::Page2MdError;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

// ── Page image ───────────────────────────────────────────────────────────

/// One rendered page, handed to the engine per call and never retained.
///
/// Multi-frame sources (a TIFF with several pages, an animated GIF) can be
/// wrapped with [`PageImage::from_frames`]; the engine rejects them with
/// [`Page2MdError::InvalidInput`] rather than silently reading frame 0.
#[derive(Debug, Clone)]
pub struct PageImage {
    frames: Vec<DynamicImage>,
}

impl PageImage {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            frames: vec![image],
        }
    }

    pub fn from_frames(frames: Vec<DynamicImage>) -> Self {
        Self { frames }
    }

    /// Decode an encoded PNG/JPEG page.
    pub fn decode(bytes: &[u8]) -> Result<Self, Page2MdError> {
        let image = image::load_from_memory(bytes).map_err(|e| Page2MdError::InvalidInput {
            reason: format!("cannot decode page image: {e}"),
        })?;
        Ok(Self::new(image))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The single page frame, or `None` for an empty or multi-page input.
    pub fn frame(&self) -> Option<&DynamicImage> {
        match self.frames.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn width(&self) -> u32 {
        self.frames.first().map(|f| f.width()).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.frames.first().map(|f| f.height()).unwrap_or(0)
    }

    /// Reject anything that is not exactly one non-empty page.
    pub(crate) fn validate(&self) -> Result<&DynamicImage, Page2MdError> {
        let frame = match self.frames.len() {
            0 => {
                return Err(Page2MdError::InvalidInput {
                    reason: "page image has no frames".into(),
                })
            }
            1 => &self.frames[0],
            n => {
                return Err(Page2MdError::InvalidInput {
                    reason: format!("expected a single page, got {n} frames"),
                })
            }
        };
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(Page2MdError::InvalidInput {
                reason: format!("page image is empty ({w}x{h})"),
            });
        }
        Ok(frame)
    }
}

// ── Geometry ─────────────────────────────────────────────────────────────

/// Axis-aligned rectangle in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Length of the shared vertical extent (0 when disjoint).
    pub fn vertical_overlap(&self, other: &BoundingBox) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    /// Length of the shared horizontal extent (0 when disjoint).
    pub fn horizontal_overlap(&self, other: &BoundingBox) -> f32 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    /// True when the two boxes share a non-empty area.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.vertical_overlap(other) > 0.0 && self.horizontal_overlap(other) > 0.0
    }

    pub fn is_within(&self, width: f32, height: f32) -> bool {
        self.x0 >= 0.0 && self.y0 >= 0.0 && self.x1 <= width && self.y1 <= height
    }

    /// Clamp into `[0, width] × [0, height]`.
    pub fn clamped(&self, width: f32, height: f32) -> BoundingBox {
        BoundingBox::new(
            self.x0.clamp(0.0, width),
            self.y0.clamp(0.0, height),
            self.x1.clamp(0.0, width),
            self.y1.clamp(0.0, height),
        )
    }

    /// Two boxes sit on the same visual line when they share at least half
    /// of the shorter box's height.
    pub fn same_line(&self, other: &BoundingBox) -> bool {
        let min_h = self.height().min(other.height());
        min_h > 0.0 && self.vertical_overlap(other) >= min_h / 2.0
    }
}

// ── Marked regions ───────────────────────────────────────────────────────

/// A caller-identified area whose content is replaced by a placeholder.
///
/// `ordinal_position` is the number of recognised content blocks that
/// precede the region in reading order. It is only consulted when the
/// region has no `bounding_area`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkedRegion {
    pub identifier: String,
    #[serde(default)]
    pub bounding_area: Option<BoundingBox>,
    #[serde(default)]
    pub ordinal_position: usize,
}

impl MarkedRegion {
    pub fn new(identifier: impl Into<String>, ordinal_position: usize) -> Self {
        Self {
            identifier: identifier.into(),
            bounding_area: None,
            ordinal_position,
        }
    }

    pub fn with_area(mut self, area: BoundingBox) -> Self {
        self.bounding_area = Some(area);
        self
    }
}

/// Identifiers end up verbatim inside `![id](id)`, so link-breaking
/// characters are rejected up front. Duplicates are rejected too.
pub(crate) fn validate_regions(regions: &[MarkedRegion]) -> Result<(), Page2MdError> {
    let mut seen = std::collections::HashSet::with_capacity(regions.len());
    for region in regions {
        let id = region.identifier.as_str();
        if id.is_empty() {
            return Err(Page2MdError::InvalidInput {
                reason: "marked region with an empty identifier".into(),
            });
        }
        if let Some(bad) = id
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')'))
        {
            return Err(Page2MdError::InvalidInput {
                reason: format!("marked region '{id}' contains {bad:?}"),
            });
        }
        if !seen.insert(id) {
            return Err(Page2MdError::InvalidInput {
                reason: format!("duplicate marked region identifier '{id}'"),
            });
        }
    }
    Ok(())
}

// ── Recognition output ───────────────────────────────────────────────────

/// What the visual-recognition capability reports for one page.
///
/// This is also the on-disk layout JSON read by the CLI's `--layout` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    /// Pages the recogniser detected in the image (two-up scans report 2).
    #[serde(default = "one")]
    pub page_count: usize,
    /// Dominant language of the recognised text, e.g. `"en"`.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
}

fn one() -> usize {
    1
}

impl Recognition {
    pub fn new(blocks: Vec<ContentBlock>) -> Self {
        Self {
            page_count: 1,
            language: None,
            blocks,
        }
    }
}

impl Default for Recognition {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub bbox: BoundingBox,
    #[serde(flatten)]
    pub kind: BlockKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// One printed line of running text.
    Line { spans: Vec<Span> },
    /// A mathematical expression recognised as LaTeX.
    Math { latex: String },
    /// A blank-line gap in the layout.
    Blank,
}

impl ContentBlock {
    pub fn line(bbox: BoundingBox, spans: Vec<Span>) -> Self {
        Self {
            bbox,
            kind: BlockKind::Line { spans },
        }
    }

    /// Convenience for a line of unstyled text.
    pub fn text(bbox: BoundingBox, text: impl Into<String>) -> Self {
        Self::line(bbox, vec![Span::plain(text)])
    }

    pub fn math(bbox: BoundingBox, latex: impl Into<String>) -> Self {
        Self {
            bbox,
            kind: BlockKind::Math {
                latex: latex.into(),
            },
        }
    }

    pub fn blank(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            kind: BlockKind::Blank,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self.kind, BlockKind::Blank)
    }

    /// The block's text with styling and escaping ignored.
    pub fn plain_text(&self) -> String {
        match &self.kind {
            BlockKind::Line { spans } => spans.iter().map(|s| s.text.as_str()).collect(),
            BlockKind::Math { latex } => latex.clone(),
            BlockKind::Blank => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStyle {
    #[default]
    Plain,
    Bold,
    Italic,
    BoldItalic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

/// A run of text sharing one visual style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default)]
    pub style: SpanStyle,
    #[serde(default)]
    pub script: Script,
    /// The run is an inline LaTeX expression rather than literal text.
    #[serde(default)]
    pub math: bool,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: SpanStyle::Plain,
            script: Script::Baseline,
            math: false,
        }
    }

    pub fn styled(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            style,
            ..Self::plain(text)
        }
    }

    pub fn superscript(text: impl Into<String>) -> Self {
        Self {
            script: Script::Superscript,
            ..Self::plain(text)
        }
    }

    pub fn inline_math(latex: impl Into<String>) -> Self {
        Self {
            math: true,
            ..Self::plain(latex)
        }
    }
}
