//! Whole-page transcription scenarios on the deterministic engine.
//!
//! Every test builds a 600x800 page, a hand-written recognition and the
//! standard rule set, then checks the exact Markdown that comes out.

use edgequake_page2md::{
    transcribe, transcribe_recognized, BoundingBox, ContentBlock, MarkedRegion, Page2MdError,
    PageImage, PrecomputedRecognizer, Recognition, Span, SpanStyle, TranscriptionRuleSet,
};
use image::DynamicImage;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn page() -> PageImage {
    PageImage::new(DynamicImage::new_rgb8(600, 800))
}

fn line(y: f32, text: &str) -> ContentBlock {
    ContentBlock::text(BoundingBox::new(40.0, y, 560.0, y + 16.0), text)
}

fn run(blocks: Vec<ContentBlock>, regions: &[MarkedRegion]) -> String {
    let rules = TranscriptionRuleSet::standard();
    transcribe_recognized(&page(), &Recognition::new(blocks), regions, &rules)
        .expect("transcription should succeed")
        .markdown
}

const PARAGRAPH: [&str; 2] = [
    "The quick brown fox jumps over",
    "the lazy dog near the river bank.",
];

// ── Scenario A: regions around a paragraph ───────────────────────────────────

#[test]
fn regions_positioned_around_a_paragraph() {
    let regions = [
        MarkedRegion::new("page_0_1.png", 0)
            .with_area(BoundingBox::new(100.0, 60.0, 500.0, 260.0)),
        MarkedRegion::new("page_0_2.png", 2)
            .with_area(BoundingBox::new(100.0, 380.0, 500.0, 600.0)),
    ];
    let blocks = vec![line(300.0, PARAGRAPH[0]), line(320.0, PARAGRAPH[1])];

    assert_eq!(
        run(blocks, &regions),
        "![page_0_1.png](page_0_1.png)\n\n\
         The quick brown fox jumps over\n\
         the lazy dog near the river bank.\n\n\
         ![page_0_2.png](page_0_2.png)"
    );
}

#[test]
fn regions_placed_by_ordinal_only() {
    let regions = [
        MarkedRegion::new("page_0_1.png", 0),
        MarkedRegion::new("page_0_2.png", 2),
    ];
    let blocks = vec![line(300.0, PARAGRAPH[0]), line(320.0, PARAGRAPH[1])];

    let rules = TranscriptionRuleSet::standard();
    let result =
        transcribe_recognized(&page(), &Recognition::new(blocks), &regions, &rules).unwrap();
    assert_eq!(
        result.markdown,
        "![page_0_1.png](page_0_1.png)\n\n\
         The quick brown fox jumps over\n\
         the lazy dog near the river bank.\n\n\
         ![page_0_2.png](page_0_2.png)"
    );
    assert_eq!(result.placeholders, 2);
    assert!(!result.has_warnings());
}

#[test]
fn region_beside_text_keeps_its_row() {
    // Two columns: a figure on the left, text on the right of the same row.
    let regions = [MarkedRegion::new("fig.png", 0)
        .with_area(BoundingBox::new(40.0, 100.0, 280.0, 300.0))];
    let blocks = vec![
        line(60.0, "Above everything."),
        ContentBlock::text(BoundingBox::new(320.0, 120.0, 560.0, 136.0), "Right column."),
        line(340.0, "Below everything."),
    ];

    assert_eq!(
        run(blocks, &regions),
        "Above everything.\n\n![fig.png](fig.png)\n\nRight column.\nBelow everything."
    );
}

#[test]
fn overlapping_regions_keep_their_list_order() {
    let regions = [
        MarkedRegion::new("a.png", 0).with_area(BoundingBox::new(100.0, 100.0, 500.0, 300.0)),
        MarkedRegion::new("b.png", 1).with_area(BoundingBox::new(100.0, 90.0, 500.0, 250.0)),
    ];
    let rules = TranscriptionRuleSet::standard();
    let result =
        transcribe_recognized(&page(), &Recognition::default(), &regions, &rules).unwrap();
    assert_eq!(result.markdown, "![a.png](a.png)\n\n![b.png](b.png)");
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].identifier(), "b.png");
}

#[test]
fn unplaceable_region_is_kept_with_a_warning() {
    let regions = [MarkedRegion::new("late.png", 9)];
    let rules = TranscriptionRuleSet::standard();
    let result = transcribe_recognized(
        &page(),
        &Recognition::new(vec![line(300.0, "Only line.")]),
        &regions,
        &rules,
    )
    .unwrap();

    assert_eq!(result.markdown, "Only line.\n\n![late.png](late.png)");
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].identifier(), "late.png");
}

// ── Scenario B: header, paragraph, footer page number ────────────────────────

#[test]
fn header_and_footer_are_omitted() {
    let blocks = vec![
        line(10.0, "Journal of Applied Examples, Vol. 3"),
        line(300.0, PARAGRAPH[0]),
        line(320.0, PARAGRAPH[1]),
        line(770.0, "12"),
    ];
    let rules = TranscriptionRuleSet::standard();
    let result =
        transcribe_recognized(&page(), &Recognition::new(blocks), &[], &rules).unwrap();

    assert_eq!(
        result.markdown,
        "The quick brown fox jumps over\nthe lazy dog near the river bank."
    );
    assert_eq!(result.omitted, 2);
}

#[test]
fn page_number_outside_the_margin_is_still_dropped() {
    let blocks = vec![line(300.0, PARAGRAPH[0]), line(700.0, "- 12 -")];
    assert_eq!(run(blocks, &[]), "The quick brown fox jumps over");
}

#[test]
fn last_word_spelling_a_numeral_is_kept() {
    let blocks = vec![line(300.0, "Stir the batter, then"), line(320.0, "mix")];
    assert_eq!(run(blocks, &[]), "Stir the batter, then\nmix");
}

#[test]
fn number_in_running_text_is_kept() {
    let blocks = vec![line(300.0, "Intro"), line(320.0, "42"), line(340.0, "Outro")];
    assert_eq!(run(blocks, &[]), "Intro\n42\nOutro");
}

// ── Scenario C: inline and display math ──────────────────────────────────────

#[test]
fn inline_fraction_and_display_equation() {
    let blocks = vec![
        ContentBlock::line(
            BoundingBox::new(40.0, 100.0, 560.0, 116.0),
            vec![
                Span::plain("The ratio "),
                Span::inline_math(r"\frac{a}{b}"),
                Span::plain(" is constant."),
            ],
        ),
        ContentBlock::math(BoundingBox::new(250.0, 150.0, 350.0, 190.0), "E = mc^2"),
        line(220.0, "as shown above."),
    ];

    assert_eq!(
        run(blocks, &[]),
        "The ratio $\\frac{a}{b}$ is constant.\n\n$$E = mc^2$$\n\nas shown above."
    );
}

// ── Scenario D: literal asterisks ────────────────────────────────────────────

#[test]
fn literal_asterisks_are_escaped() {
    let blocks = vec![line(300.0, "Press *literal* to continue")];
    assert_eq!(run(blocks, &[]), "Press \\*literal\\* to continue");
}

#[test]
fn real_emphasis_still_uses_markers() {
    let blocks = vec![ContentBlock::line(
        BoundingBox::new(40.0, 300.0, 560.0, 316.0),
        vec![
            Span::plain("a "),
            Span::styled("bold", SpanStyle::Bold),
            Span::plain(" and a *star*"),
        ],
    )];
    assert_eq!(run(blocks, &[]), "a **bold** and a \\*star\\*");
}

#[test]
fn entity_lookalikes_stay_literal() {
    let blocks = vec![line(300.0, "Use &copy; and &amp; literally")];
    assert_eq!(run(blocks, &[]), "Use \\&copy; and \\&amp; literally");
}

#[test]
fn bold_parenthesis_after_a_word_still_renders_bold() {
    let blocks = vec![ContentBlock::line(
        BoundingBox::new(40.0, 300.0, 560.0, 316.0),
        vec![
            Span::plain("see"),
            Span::styled("(a)", SpanStyle::Bold),
            Span::plain(" here"),
        ],
    )];
    assert_eq!(run(blocks, &[]), "see(**a)** here");
}

// ── Failure modes ────────────────────────────────────────────────────────────

#[test]
fn two_page_scan_is_rejected() {
    let mut recognition = Recognition::new(vec![line(300.0, "left page")]);
    recognition.page_count = 2;
    let rules = TranscriptionRuleSet::standard();
    let err = transcribe_recognized(&page(), &recognition, &[], &rules).unwrap_err();
    assert!(matches!(err, Page2MdError::InvalidInput { .. }), "got: {err}");
}

#[test]
fn duplicate_region_identifiers_are_rejected() {
    let regions = [MarkedRegion::new("a.png", 0), MarkedRegion::new("a.png", 1)];
    let rules = TranscriptionRuleSet::standard();
    let err = transcribe_recognized(&page(), &Recognition::default(), &regions, &rules)
        .unwrap_err();
    assert!(matches!(err, Page2MdError::InvalidInput { .. }));
}

#[tokio::test]
async fn recogniser_path_matches_direct_path() {
    let blocks = vec![line(300.0, PARAGRAPH[0]), line(320.0, PARAGRAPH[1])];
    let regions = [MarkedRegion::new("page_0_1.png", 0)];
    let rules = TranscriptionRuleSet::standard();
    let recognizer = PrecomputedRecognizer::new(Recognition::new(blocks.clone()));

    let via_recognizer = transcribe(&recognizer, &page(), &regions, &rules)
        .await
        .unwrap();
    let direct =
        transcribe_recognized(&page(), &Recognition::new(blocks), &regions, &rules).unwrap();
    assert_eq!(via_recognizer, direct);
}
