//! Prompt bundles for the vision-model transcription path.
//!
//! The deterministic engine needs no prompts; these exist for
//! [`crate::transcribe::transcribe_with_vlm`], where the recognition
//! capability is a vision LLM that must be told the same rules the engine
//! enforces. Three bundles map onto three system messages:
//!
//! 1. **Role** — framing: read the whole page, leave marked areas out of the
//!    narrative, never include headers or footers.
//! 2. **General** — language mirroring, math delimiters, omission, escaping,
//!    emphasis, output shape.
//! 3. **Regions** — how marked regions are substituted; only sent when the
//!    page has any.
//!
//! The defaults live here as constants; callers override them through
//! [`crate::rules::FramingPolicy`].

use crate::layout::MarkedRegion;
use crate::rules::{TranscriptionRuleSet, REGION_LIST_TOKEN};

/// Default framing prompt.
pub const DEFAULT_ROLE_PROMPT: &str = r#"You are a document page transcriber. You receive one rendered page image and output its content as Markdown with LaTeX math.
Read the whole page. Reproduce it word for word: do not summarise, do not paraphrase, include everything.
Marked regions are never transcribed as text.
Never include header lines, footer lines or page numbers."#;

/// Default general transcription rules.
pub const DEFAULT_GENERAL_PROMPT: &str = r#"Follow these rules precisely:

1. LANGUAGE
   - Output in the same language as the text on the page. Never translate.

2. OUTPUT ONLY CONTENT
   - Do not explain, do not add a preamble such as "Here is the transcription", do not add closing remarks.
   - Do not wrap the output in ```markdown fences.

3. MATH
   - Standalone equations on their own line use {display_open} ... {display_close}.
   - Math inside a sentence uses {inline_open} ... {inline_close}.
   - Simple superscripts or subscripts on ordinary words (footnote markers) are NOT math: write them as plain characters.

4. STYLE
   - Bold text uses {bold}bold{bold}, italic text uses {italic}italic{italic}. Never use math notation for styling.

5. LITERAL CHARACTERS
   - When these characters appear literally on the page, write them escaped: {escapes}.

6. WHAT TO IGNORE
   - Headers, footers, page numbers, and excessively long lines.

7. PARAGRAPHS
   - A blank gap between blocks on the page becomes exactly one blank line."#;

/// Default marked-region rules. `{regions}` lists the identifiers.
pub const DEFAULT_REGION_PROMPT: &str = r#"This page has marked regions: {regions}. A region given with a pixel box is outlined in red on the image.
For each marked region insert exactly one image reference {placeholder} at its position in reading order, with the region's name in place of "name".
Do not transcribe anything inside a marked region. Every listed name must appear exactly once."#;

/// Fill the formatting tokens of a prompt from the rule set:
///
/// | Token | Value |
/// |-------|-------|
/// | `{inline_open}` / `{inline_close}` | inline math delimiters |
/// | `{display_open}` / `{display_close}` | display math delimiters |
/// | `{bold}` / `{italic}` | emphasis markers |
/// | `{placeholder}` | the placeholder for a region called `name` |
/// | `{escapes}` | every inline escape, comma separated |
pub fn render_prompt(template: &str, rules: &TranscriptionRuleSet) -> String {
    let escapes = rules
        .escaping
        .inline
        .values()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let tokens = [
        ("{inline_open}", rules.math.inline_open.as_str()),
        ("{inline_close}", rules.math.inline_close.as_str()),
        ("{display_open}", rules.math.display_open.as_str()),
        ("{display_close}", rules.math.display_close.as_str()),
        ("{bold}", rules.emphasis.bold.as_str()),
        ("{italic}", rules.emphasis.italic.as_str()),
        ("{escapes}", escapes.as_str()),
    ];
    let placeholder = rules.regions.placeholder_for("name");
    let mut out = template.replace("{placeholder}", &placeholder);
    for (token, value) in tokens {
        out = out.replace(token, value);
    }
    out
}

/// Render the region prompt for the given regions, or `None` if there are
/// none (the message is then omitted entirely).
///
/// Regions with an area are listed with their pixel box, matching the
/// outline drawn on the image.
pub fn region_prompt(rules: &TranscriptionRuleSet, regions: &[MarkedRegion]) -> Option<String> {
    if regions.is_empty() {
        return None;
    }
    let names = regions
        .iter()
        .map(|r| match r.bounding_area {
            Some(b) => format!(
                "{} (box {:.0},{:.0} to {:.0},{:.0})",
                r.identifier, b.x0, b.y0, b.x1, b.y1
            ),
            None => r.identifier.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let template = rules.framing.regions.replace(REGION_LIST_TOKEN, &names);
    Some(render_prompt(&template, rules))
}
