//! Post-processing: deterministic enforcement of the transcription rules on
//! VLM-generated Markdown.
//!
//! A well-prompted model still drifts: it wraps the page in a ```` ```markdown ````
//! fence, opens with "Here is the transcription:", writes `![Figure 1](0_1.png)`
//! instead of `![0_1.png](0_1.png)`, forgets a region, or mentions one twice.
//! The rules below fix those quirks without touching the transcribed text, so
//! the VLM path returns output with the same shape guarantees as the
//! deterministic engine.
//!
//! ## Rule Order
//!
//! Fences go first so commentary detection sees the real first line;
//! region reconciliation runs before blank-line collapse because it splits
//! placeholders onto their own paragraphs.

use crate::error::RegionWarning;
use crate::layout::MarkedRegion;
use crate::rules::RegionPolicy;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

/// Cleaned Markdown plus the regions that had to be inserted by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned {
    pub markdown: String,
    pub warnings: Vec<RegionWarning>,
}

/// Apply all post-processing rules to the raw VLM reply.
///
/// Rules (applied in order):
/// 1. Strip an outer Markdown fence
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Drop commentary preamble and trailer lines (and a fence they hid)
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Repair GFM tables (missing or spurious separator rows)
/// 7. Reconcile image references with the marked regions: exactly one
///    canonical placeholder per region, on its own paragraph
/// 8. Collapse blank-line runs to a single paragraph break and trim
pub fn clean_markdown(input: &str, regions: &[MarkedRegion], policy: &RegionPolicy) -> Cleaned {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = strip_markdown_fences(&drop_commentary(&s));
    let s = remove_invisible_chars(&s);
    let s = repair_tables(&s);
    let (s, warnings) = reconcile_regions(&s, regions, policy);
    Cleaned {
        markdown: collapse_blank_lines(&s),
        warnings,
    }
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Drop commentary ──────────────────────────────────────────────

// A courtesy word alone, or followed by a mention of the output.
static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:sure|certainly|of course|okay|ok)[,!.:]|(?:sure|certainly|of course|okay|ok)[,!.][^\n]*(?:transcri|markdown|here(?:'s| is| are)|below is)[^\n]*|(?:here(?:'s| is| are)|below is|the following is)\b[^\n]*(?:transcri|markdown|content|text|page|conversion|output)[^\n]*)$",
    )
    .unwrap()
});

static RE_TRAILER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:i hope this helps|hope this helps|let me know|feel free to|if you (?:need|have|would like|want)|please note that (?:the|this) (?:transcription|output))\b",
    )
    .unwrap()
});

/// Remove chatty lines the model adds before or after the page content.
/// Only leading and trailing lines are candidates; the same words in the
/// middle of a page are page content.
fn drop_commentary(input: &str) -> String {
    let mut lines: Vec<&str> = input.lines().collect();

    while let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) {
        if RE_PREAMBLE.is_match(lines[first].trim()) {
            lines.drain(..=first);
        } else {
            break;
        }
    }
    while let Some(last) = lines.iter().rposition(|l| !l.trim().is_empty()) {
        if RE_TRAILER.is_match(lines[last].trim()) {
            lines.truncate(last);
        } else {
            break;
        }
    }

    lines.join("\n")
}

// ── Rule 5: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Repair GFM tables ────────────────────────────────────────────
//
// A table needs exactly one separator row, directly after its header. Models
// sometimes omit it (the table then renders as text) or repeat it between
// body rows.

fn repair_tables(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut table_row = 0usize;

    for line in input.lines() {
        if !is_table_row(line) {
            table_row = 0;
            out.push(line.to_string());
            continue;
        }

        table_row += 1;
        match (table_row, is_separator_row(line)) {
            (1, true) => {
                // Separator with no header: not a table.
                table_row = 0;
                out.push(line.to_string());
            }
            (2, false) => {
                let cols = out
                    .last()
                    .map(|h| h.trim().matches('|').count().saturating_sub(1).max(1))
                    .unwrap_or(1);
                out.push(separator(cols));
                out.push(line.to_string());
                table_row = 3;
            }
            (n, true) if n > 2 => table_row -= 1,
            _ => out.push(line.to_string()),
        }
    }

    out.join("\n")
}

fn separator(cols: usize) -> String {
    std::iter::once("|")
        .chain(std::iter::repeat_n(" --- |", cols))
        .collect()
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

// ── Rule 7: Reconcile region placeholders ────────────────────────────────
//
// Every image reference is matched against the marked regions by target,
// then by alt text, then by file name. The first match of a region becomes
// the canonical placeholder on its own paragraph; later matches are
// removed. References to anything else are invented by the model and
// collapse to their alt text. Regions the model never mentioned are
// inserted before the paragraph at their ordinal position.

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([ \t]*)!\[([^\]\n]*)\]\(\s*<?([^)\s>]*)>?(?:\s+"[^"\n]*")?\s*\)([ \t]*)"#).unwrap()
});

fn match_region<'a>(regions: &'a [MarkedRegion], alt: &str, target: &str) -> Option<&'a MarkedRegion> {
    let file_name = |s: &str| s.rsplit('/').next().unwrap_or(s).to_string();
    regions
        .iter()
        .find(|r| r.identifier == target)
        .or_else(|| regions.iter().find(|r| r.identifier == alt.trim()))
        .or_else(|| {
            let name = file_name(target);
            regions.iter().find(|r| !name.is_empty() && r.identifier == name)
        })
}

fn reconcile_regions(
    input: &str,
    regions: &[MarkedRegion],
    policy: &RegionPolicy,
) -> (String, Vec<RegionWarning>) {
    let mut seen: HashSet<&str> = HashSet::with_capacity(regions.len());

    let replaced = RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let (lead, alt, target, trail) = (&caps[1], &caps[2], &caps[3], &caps[4]);
            match match_region(regions, alt, target) {
                Some(region) if seen.insert(region.identifier.as_str()) => {
                    format!("\n\n{}\n\n", policy.placeholder_for(&region.identifier))
                }
                Some(_) if !lead.is_empty() && !trail.is_empty() => " ".to_string(),
                Some(_) => String::new(),
                None => format!("{lead}{}{trail}", alt.trim()),
            }
        })
        .to_string();

    let mut missing: Vec<&MarkedRegion> = regions
        .iter()
        .filter(|r| !seen.contains(r.identifier.as_str()))
        .collect();
    if missing.is_empty() {
        return (tidy_lines(&replaced), Vec::new());
    }
    missing.sort_by_key(|r| r.ordinal_position);

    let tidied = tidy_lines(&replaced);
    let mut paragraphs: Vec<String> = split_paragraphs(&tidied);
    let mut warnings = Vec::with_capacity(missing.len());

    let placeholders: HashSet<String> = regions
        .iter()
        .map(|r| policy.placeholder_for(&r.identifier))
        .collect();

    // The ordinal counts content paragraphs only, not other placeholders;
    // ties and overflow keep the ordinal order.
    for region in &missing {
        let at = paragraphs
            .iter()
            .enumerate()
            .filter(|(_, p)| !placeholders.contains(p.as_str()))
            .nth(region.ordinal_position)
            .map(|(i, _)| i)
            .unwrap_or(paragraphs.len());
        let reason = format!("not referenced by the model; inserted before paragraph {at}");
        warn!("Region '{}': {}", region.identifier, reason);
        warnings.push(RegionWarning::unresolved(&region.identifier, reason));
        paragraphs.insert(at, policy.placeholder_for(&region.identifier));
    }

    (paragraphs.join("\n\n"), warnings)
}

/// Trim the spaces left behind by replaced references at line edges.
fn tidy_lines(input: &str) -> String {
    input
        .lines()
        .map(|l| {
            let l = l.trim_end();
            if l.trim_start().is_empty() {
                ""
            } else {
                l
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_paragraphs(input: &str) -> Vec<String> {
    input
        .split("\n\n")
        .map(|p| p.trim_matches('\n'))
        .filter(|p| !p.trim().is_empty())
        .map(str::to_string)
        .collect()
}

// ── Rule 8: Collapse blank lines ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n)+").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES
        .replace_all(input.trim(), "\n\n")
        .to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(ids: &[&str]) -> Vec<MarkedRegion> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| MarkedRegion::new(*id, i))
            .collect()
    }

    fn clean(input: &str, ids: &[&str]) -> Cleaned {
        clean_markdown(input, &regions(ids), &RegionPolicy::default())
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_markdown_fences("```markdown\n# Hello\nWorld\n```"), "# Hello\nWorld");
        assert_eq!(strip_markdown_fences("```\n# Hello\nWorld\n```"), "# Hello\nWorld");
        assert_eq!(strip_markdown_fences("# Hello\nWorld"), "# Hello\nWorld");
    }

    #[test]
    fn test_inner_code_block_is_kept() {
        let input = "Text\n\n```\ncode\n```\n\nMore";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_preamble_and_trailer_dropped() {
        let input = "Here is the transcription of the page:\n\nBody text.\n\nI hope this helps!";
        assert_eq!(drop_commentary(input).trim(), "Body text.");
    }

    #[test]
    fn test_commentary_words_mid_page_are_content() {
        let input = "Intro.\nHere is the page where we begin.\nLet me know is a phrase.\nEnd.";
        assert_eq!(drop_commentary(input), input);
    }

    #[test]
    fn test_courtesy_word_opening_real_content_is_kept() {
        for input in [
            "Certainly, the committee rejected the motion.\n\nSecond paragraph.",
            "OK. Then the valve closes.",
            "Of course, nobody noticed.",
        ] {
            assert_eq!(drop_commentary(input), input);
        }
        assert_eq!(drop_commentary("Sure!\nBody."), "Body.");
        assert_eq!(
            drop_commentary("Certainly, here is the page as Markdown:\nBody."),
            "Body."
        );
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_missing_table_separator_inserted() {
        let out = repair_tables("| A | B |\n| 1 | 2 |");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, ["| A | B |", "| --- | --- |", "| 1 | 2 |"]);
    }

    #[test]
    fn test_mid_table_separator_removed() {
        let out = repair_tables("| A | B |\n| --- | --- |\n| 1 | 2 |\n| --- | --- |\n| 3 | 4 |");
        assert_eq!(out.matches("---").count(), 2, "one separator row left: {out}");
        assert!(out.ends_with("| 3 | 4 |"));
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n  \n\t\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("\n\na\nb\n\n"), "a\nb");
    }

    #[test]
    fn test_canonical_placeholder_from_alt_text() {
        let c = clean("Intro.\n\n![0_1.png](figure.png)\n\nOutro.", &["0_1.png"]);
        assert_eq!(c.markdown, "Intro.\n\n![0_1.png](0_1.png)\n\nOutro.");
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn test_canonical_placeholder_from_target() {
        let c = clean("![Figure 1](./images/0_1.png)", &["0_1.png"]);
        assert_eq!(c.markdown, "![0_1.png](0_1.png)");
    }

    #[test]
    fn test_inline_reference_moves_to_own_paragraph() {
        let c = clean("See ![x](0_1.png) below.", &["0_1.png"]);
        assert_eq!(c.markdown, "See\n\n![0_1.png](0_1.png)\n\nbelow.");
    }

    #[test]
    fn test_duplicate_reference_removed() {
        let c = clean("![a](0_1.png)\n\nText\n\n![a](0_1.png)", &["0_1.png"]);
        assert_eq!(c.markdown, "![0_1.png](0_1.png)\n\nText");
    }

    #[test]
    fn test_unknown_reference_becomes_alt_text() {
        let c = clean("Before\n\n![Bar chart](chart.png)\n\nAfter", &[]);
        assert_eq!(c.markdown, "Before\n\nBar chart\n\nAfter");
    }

    #[test]
    fn test_missing_region_inserted_with_warning() {
        let c = clean("First.\n\nSecond.", &["0_0.png", "0_1.png"]);
        assert_eq!(
            c.markdown,
            "![0_0.png](0_0.png)\n\nFirst.\n\n![0_1.png](0_1.png)\n\nSecond."
        );
        assert_eq!(c.warnings.len(), 2);
        assert_eq!(c.warnings[0].identifier(), "0_0.png");
    }

    #[test]
    fn test_full_pipeline() {
        let raw = "```markdown\r\nSure! Here is the Markdown:\r\n\r\n![fig](page_0_1.png)\r\nThe  text.   \r\n\r\n\r\n\r\nMore text.\u{200B}\r\n```";
        let c = clean(raw, &["page_0_1.png"]);
        assert_eq!(
            c.markdown,
            "![page_0_1.png](page_0_1.png)\n\nThe  text.\n\nMore text."
        );
    }
}
