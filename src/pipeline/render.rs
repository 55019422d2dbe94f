//! Rendering: turn the merged, filtered sequence into Markdown text.
//!
//! ## Pieces
//!
//! The sequence is first folded into pieces:
//!
//! * consecutive content blocks on the same visual line become one `Line`
//!   (joined by a space); a line made of a single math block becomes a
//!   `Display` equation instead
//! * each marked region becomes a `Placeholder`
//! * each blank block becomes a `Break`; a line with no visible text (or
//!   an empty equation) produces no piece at all
//!
//! ## Joining
//!
//! Lines follow each other with a single `\n`. Any run of breaks, however
//! long, is one paragraph break (`\n\n`). Placeholders and display
//! equations always stand in their own paragraph. Nothing is emitted before
//! the first piece or after the last.

use super::escape::{escape_inline, escape_line_start};
use super::order::Item;
use crate::layout::{BlockKind, ContentBlock, Script, Span, SpanStyle};
use crate::rules::{ScriptRendering, TranscriptionRuleSet};

#[derive(Debug, PartialEq)]
enum Piece {
    Line(String),
    Display(String),
    Placeholder(String),
    Break,
}

/// Rendered Markdown plus the number of placeholders written.
pub(crate) struct Rendered {
    pub markdown: String,
    pub placeholders: usize,
}

pub(crate) fn render(items: &[Item<'_>], rules: &TranscriptionRuleSet) -> Rendered {
    let pieces = to_pieces(items, rules);
    let placeholders = pieces
        .iter()
        .filter(|p| matches!(p, Piece::Placeholder(_)))
        .count();
    Rendered {
        markdown: join(&pieces),
        placeholders,
    }
}

fn to_pieces(items: &[Item<'_>], rules: &TranscriptionRuleSet) -> Vec<Piece> {
    let mut pieces = Vec::with_capacity(items.len());
    let mut i = 0;
    while i < items.len() {
        match items[i] {
            Item::Region(region) => {
                pieces.push(Piece::Placeholder(
                    rules.regions.placeholder_for(&region.identifier),
                ));
                i += 1;
            }
            Item::Content(block) if block.is_blank() => {
                pieces.push(Piece::Break);
                i += 1;
            }
            Item::Content(first) => {
                let mut group: Vec<&ContentBlock> = vec![first];
                i += 1;
                while let Some(Item::Content(next)) = items.get(i) {
                    let prev = group[group.len() - 1];
                    if next.is_blank() || !prev.bbox.same_line(&next.bbox) {
                        break;
                    }
                    group.push(next);
                    i += 1;
                }
                pieces.extend(render_line(&group, rules));
            }
        }
    }
    pieces
}

/// Render one visual line made of one or more blocks.
fn render_line(group: &[&ContentBlock], rules: &TranscriptionRuleSet) -> Option<Piece> {
    if let [single] = group {
        if let BlockKind::Math { latex } = &single.kind {
            return display_math(latex, rules).map(Piece::Display);
        }
    }

    let parts: Vec<String> = group
        .iter()
        .map(|block| match &block.kind {
            BlockKind::Line { spans } => render_spans(spans, rules),
            BlockKind::Math { latex } => inline_math(latex, rules),
            BlockKind::Blank => String::new(),
        })
        .filter(|s| !s.trim().is_empty())
        .collect();

    let line = parts.join(" ");
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(Piece::Line(escape_line_start(line, &rules.escaping)))
}

fn display_math(latex: &str, rules: &TranscriptionRuleSet) -> Option<String> {
    let body = latex
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    Some(format!(
        "{}{}{}",
        rules.math.display_open, body, rules.math.display_close
    ))
}

fn inline_math(latex: &str, rules: &TranscriptionRuleSet) -> String {
    let body = latex.split_whitespace().collect::<Vec<_>>().join(" ");
    if body.is_empty() {
        return String::new();
    }
    format!("{}{}{}", rules.math.inline_open, body, rules.math.inline_close)
}

/// Render the spans of one text line, merging adjacent runs that share a
/// style so emphasis markers are not split mid-phrase.
fn render_spans(spans: &[Span], rules: &TranscriptionRuleSet) -> String {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last)
                if !last.math
                    && !span.math
                    && last.style == span.style
                    && last.script == span.script =>
            {
                last.text.push_str(&span.text);
            }
            _ => merged.push(span.clone()),
        }
    }

    // Rendered out of context, only to learn what each run starts with.
    let bare: Vec<String> = merged
        .iter()
        .map(|s| render_span(s, rules, None, None))
        .collect();

    let mut out = String::new();
    for (i, span) in merged.iter().enumerate() {
        let before = out.chars().next_back();
        let after = bare[i + 1..].iter().find_map(|t| t.chars().next());
        out.push_str(&render_span(span, rules, before, after));
    }
    out
}

/// Render one span. `before` and `after` are the characters written next
/// to it on the line, if any.
fn render_span(
    span: &Span,
    rules: &TranscriptionRuleSet,
    before: Option<char>,
    after: Option<char>,
) -> String {
    if span.math {
        return inline_math(&span.text, rules);
    }

    let text = escape_inline(&span.text, &rules.escaping);
    let emphasis = &rules.emphasis;
    let (mut bold, mut italic) = match span.style {
        SpanStyle::Plain => (false, false),
        SpanStyle::Bold => (true, false),
        SpanStyle::Italic => (false, true),
        SpanStyle::BoldItalic => (true, true),
    };
    if span.script != Script::Baseline {
        match emphasis.script {
            ScriptRendering::Plain => {}
            ScriptRendering::Italic => italic = true,
            ScriptRendering::Bold => bold = true,
        }
    }

    let mut open = String::new();
    if bold {
        open.push_str(&emphasis.bold);
    }
    if italic {
        open.push_str(&emphasis.italic);
    }
    let close: String = open.chars().rev().collect();
    wrap(&text, &open, &close, before, after)
}

fn is_punctuation(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

/// Whitespace, punctuation and the line edge all let a delimiter run flank.
fn is_boundary(c: Option<char>) -> bool {
    c.map_or(true, |c| c.is_whitespace() || is_punctuation(c))
}

/// Wrap the non-whitespace core of `text` in markers, keeping surrounding
/// whitespace outside (`** bold**` does not render as emphasis).
///
/// CommonMark only opens emphasis on a left-flanking run and closes it on a
/// right-flanking one. When the core starts or ends with punctuation that
/// touches a letter or digit outside the span (`see` + `(a)`), that
/// punctuation is moved outside the markers: `see(**a)**`. `_` markers
/// never open or close inside a word; if no placement works the text is
/// written without emphasis.
fn wrap(text: &str, open: &str, close: &str, before: Option<char>, after: Option<char>) -> String {
    let core = text.trim();
    if open.is_empty() || core.is_empty() {
        return text.to_string();
    }
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];
    let before = lead.chars().next_back().or(before);
    let after = trail.chars().next().or(after);

    let mut body = core;
    let mut head = "";
    let mut tail = "";
    if !is_boundary(before) {
        let rest = body.trim_start_matches(is_punctuation);
        head = &body[..body.len() - rest.len()];
        body = rest;
    }
    if !is_boundary(after) {
        let rest = body.trim_end_matches(is_punctuation);
        tail = &body[rest.len()..];
        body = rest;
    }

    let (Some(first), Some(last)) = (body.chars().next(), body.chars().next_back()) else {
        return text.to_string();
    };
    let before = head.chars().next_back().or(before);
    let after = tail.chars().next().or(after);
    let intraword = open.contains('_');
    let opens = !first.is_whitespace()
        && (is_boundary(before) || (!intraword && !is_punctuation(first)));
    let closes = !last.is_whitespace()
        && (is_boundary(after) || (!intraword && !is_punctuation(last)));
    if !(opens && closes) {
        return text.to_string();
    }
    format!("{lead}{head}{open}{body}{close}{tail}{trail}")
}

fn join(pieces: &[Piece]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Piece> = None;
    let mut pending_break = false;

    for piece in pieces {
        let text = match piece {
            Piece::Break => {
                pending_break = true;
                continue;
            }
            Piece::Line(s) | Piece::Display(s) | Piece::Placeholder(s) => s,
        };

        if let Some(prev) = prev {
            let soft = !pending_break
                && matches!(prev, Piece::Line(_))
                && matches!(piece, Piece::Line(_));
            out.push_str(if soft { "\n" } else { "\n\n" });
        }
        out.push_str(text);
        prev = Some(piece);
        pending_break = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{BoundingBox, MarkedRegion};

    fn bb(x0: f32, y0: f32, x1: f32, y1: f32) -> BoundingBox {
        BoundingBox::new(x0, y0, x1, y1)
    }

    fn row(y: f32) -> BoundingBox {
        bb(0.0, y, 500.0, y + 14.0)
    }

    fn rules() -> TranscriptionRuleSet {
        TranscriptionRuleSet::standard()
    }

    fn render_blocks(blocks: &[ContentBlock]) -> String {
        let items: Vec<Item<'_>> = blocks.iter().map(Item::Content).collect();
        render(&items, &rules()).markdown
    }

    #[test]
    fn lines_join_with_single_newline() {
        let blocks = [
            ContentBlock::text(row(0.0), "first line"),
            ContentBlock::text(row(20.0), "second line"),
        ];
        assert_eq!(render_blocks(&blocks), "first line\nsecond line");
    }

    #[test]
    fn blank_runs_collapse_to_one_paragraph_break() {
        let blocks = [
            ContentBlock::text(row(0.0), "one"),
            ContentBlock::blank(row(20.0)),
            ContentBlock::blank(row(40.0)),
            ContentBlock::blank(row(60.0)),
            ContentBlock::text(row(80.0), "two"),
        ];
        assert_eq!(render_blocks(&blocks), "one\n\ntwo");
    }

    #[test]
    fn leading_and_trailing_blanks_vanish() {
        let blocks = [
            ContentBlock::blank(row(0.0)),
            ContentBlock::text(row(20.0), "only"),
            ContentBlock::blank(row(40.0)),
        ];
        assert_eq!(render_blocks(&blocks), "only");
    }

    #[test]
    fn standalone_math_is_display() {
        let blocks = [
            ContentBlock::text(row(0.0), "We have"),
            ContentBlock::math(bb(200.0, 30.0, 300.0, 60.0), r"E = mc^2"),
            ContentBlock::text(row(80.0), "as expected."),
        ];
        assert_eq!(
            render_blocks(&blocks),
            "We have\n\n$$E = mc^2$$\n\nas expected."
        );
    }

    #[test]
    fn math_block_sharing_a_line_is_inline() {
        let blocks = [
            ContentBlock::text(bb(0.0, 100.0, 120.0, 114.0), "the ratio"),
            ContentBlock::math(bb(125.0, 98.0, 160.0, 116.0), r"\frac{a}{b}"),
            ContentBlock::text(bb(165.0, 100.0, 300.0, 114.0), "is constant"),
        ];
        assert_eq!(render_blocks(&blocks), r"the ratio $\frac{a}{b}$ is constant");
    }

    #[test]
    fn math_span_is_inline() {
        let blocks = [ContentBlock::line(
            row(0.0),
            vec![
                Span::plain("so "),
                Span::inline_math(" x^2 "),
                Span::plain(" grows"),
            ],
        )];
        assert_eq!(render_blocks(&blocks), "so $x^2$ grows");
    }

    #[test]
    fn emphasis_markers_hug_the_text() {
        let blocks = [ContentBlock::line(
            row(0.0),
            vec![
                Span::plain("a"),
                Span::styled(" bold ", SpanStyle::Bold),
                Span::plain("and"),
                Span::styled(" both", SpanStyle::BoldItalic),
                Span::plain(" and "),
                Span::styled("slanted", SpanStyle::Italic),
            ],
        )];
        assert_eq!(
            render_blocks(&blocks),
            "a **bold** and ***both*** and *slanted*"
        );
    }

    #[test]
    fn adjacent_runs_with_same_style_merge() {
        let blocks = [ContentBlock::line(
            row(0.0),
            vec![
                Span::styled("two ", SpanStyle::Bold),
                Span::styled("words", SpanStyle::Bold),
            ],
        )];
        assert_eq!(render_blocks(&blocks), "**two words**");
    }

    #[test]
    fn footnote_superscript_is_never_math() {
        let blocks = [ContentBlock::line(
            row(0.0),
            vec![Span::plain("word"), Span::superscript("1")],
        )];
        assert_eq!(render_blocks(&blocks), "word1");

        let mut italic_rules = rules();
        italic_rules.emphasis.script = ScriptRendering::Italic;
        let items: Vec<Item<'_>> = blocks.iter().map(Item::Content).collect();
        assert_eq!(render(&items, &italic_rules).markdown, "word*1*");
    }

    #[test]
    fn literal_markup_is_escaped() {
        let blocks = [
            ContentBlock::text(row(0.0), "- not a list"),
            ContentBlock::text(row(20.0), "a *literal* word"),
        ];
        assert_eq!(
            render_blocks(&blocks),
            "\\- not a list\na \\*literal\\* word"
        );
    }

    #[test]
    fn placeholders_stand_alone() {
        let block = ContentBlock::text(row(100.0), "Body text.");
        let a = MarkedRegion::new("page_0_1.png", 0);
        let b = MarkedRegion::new("page_0_2.png", 1);
        let items = [Item::Region(&a), Item::Content(&block), Item::Region(&b)];
        let rendered = render(&items, &rules());
        assert_eq!(
            rendered.markdown,
            "![page_0_1.png](page_0_1.png)\n\nBody text.\n\n![page_0_2.png](page_0_2.png)"
        );
        assert_eq!(rendered.placeholders, 2);
    }

    #[test]
    fn empty_lines_and_equations_add_no_break() {
        let blocks = [
            ContentBlock::text(row(0.0), "first line"),
            ContentBlock::math(row(20.0), "  "),
            ContentBlock::text(row(40.0), "   "),
            ContentBlock::line(row(60.0), vec![Span::plain(""), Span::inline_math(" ")]),
            ContentBlock::text(row(80.0), "second line"),
        ];
        assert_eq!(render_blocks(&blocks), "first line\nsecond line");
    }

    #[test]
    fn wrap_keeps_whitespace_outside() {
        assert_eq!(wrap("  x ", "**", "**", None, None), "  **x** ");
        assert_eq!(wrap("   ", "**", "**", None, None), "   ");
        assert_eq!(wrap("x", "", "", None, None), "x");
    }

    #[test]
    fn punctuation_next_to_a_word_moves_outside_the_markers() {
        let blocks = [ContentBlock::line(
            row(0.0),
            vec![
                Span::plain("see"),
                Span::styled("(a)", SpanStyle::Bold),
                Span::plain(" here, "),
                Span::styled("\"quoted\"", SpanStyle::Italic),
                Span::plain("s"),
            ],
        )];
        assert_eq!(
            render_blocks(&blocks),
            "see(**a)** here, *\"quoted*\"s"
        );
    }

    #[test]
    fn wrap_checks_both_neighbours() {
        assert_eq!(wrap("(a)", "**", "**", Some('x'), Some('y')), "(**a**)");
        assert_eq!(wrap("(a)", "**", "**", Some(' '), Some(' ')), "**(a)**");
        assert_eq!(wrap("!?", "**", "**", Some('x'), None), "!?");
        // `_` cannot open inside a word at all.
        assert_eq!(wrap("b", "_", "_", Some('a'), None), "b");
        assert_eq!(wrap("b", "_", "_", Some(' '), Some('.')), "_b_");
    }
}
