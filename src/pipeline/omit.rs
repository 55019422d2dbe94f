//! Omission: drop headers, footers, page numbers and over-long lines.
//!
//! Every rule here looks at one block in isolation (its position and its
//! own text), never at its neighbours, so a header squeezed between two
//! marked regions is dropped exactly like one at the top of a plain page.
//! Marked regions are never omitted; content a recogniser reported inside a
//! region's area is, since the placeholder stands in for it.

use super::order::Item;
use crate::layout::{BlockKind, BoundingBox, ContentBlock};
use crate::rules::OmissionPolicy;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[Pp]age\s+)?[-–—]?\s*(?:(?P<arabic>\d{1,4})|(?P<roman>[ivxl]{1,8}))\s*[-–—]?(?:\s*(?:/|of)\s*\d{1,4})?$",
    )
    .unwrap()
});

/// Lower-case roman numerals up to `l` (50). Front matter never runs longer,
/// and larger forms collide with words (`mix`, `liv`, `di`).
static RE_ROMAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:l|(?:xl|x{0,3})(?:ix|iv|v?i{0,3}))$").unwrap());

/// Whether a line of text looks like a page number (`12`, `- 12 -`,
/// `Page 3`, `3 of 10`, `3/10`, `xiv`).
pub(crate) fn is_page_number(text: &str) -> bool {
    let Some(caps) = RE_PAGE_NUMBER.captures(text.trim()) else {
        return false;
    };
    match caps.name("roman") {
        Some(roman) => RE_ROMAN.is_match(roman.as_str()),
        None => caps.name("arabic").is_some(),
    }
}

/// Apply the omission policy to a merged sequence.
///
/// Returns the surviving items and the number of content blocks dropped.
pub(crate) fn apply<'a>(
    items: Vec<Item<'a>>,
    policy: &OmissionPolicy,
    page_height: f32,
) -> (Vec<Item<'a>>, usize) {
    let header_limit = page_height * policy.header_margin;
    let footer_limit = page_height * (1.0 - policy.footer_margin);

    let in_margin = |block: &ContentBlock| {
        (policy.header_margin > 0.0 && block.bbox.y1 <= header_limit)
            || (policy.footer_margin > 0.0 && block.bbox.y0 >= footer_limit)
    };

    let too_long = |block: &ContentBlock| match (&block.kind, policy.max_line_chars) {
        (BlockKind::Line { .. }, Some(max)) => block.plain_text().chars().count() > max,
        _ => false,
    };

    let region_areas: Vec<BoundingBox> = items
        .iter()
        .filter_map(|item| match item {
            Item::Region(r) => r.bounding_area,
            Item::Content(_) => None,
        })
        .collect();

    let mut omitted = 0usize;
    let mut kept: Vec<Item<'a>> = Vec::with_capacity(items.len());
    for item in items {
        if let Item::Content(block) = item {
            if region_areas.iter().any(|area| covered_by(&block.bbox, area)) {
                if !block.is_blank() {
                    omitted += 1;
                }
                continue;
            }
            if in_margin(block) {
                if !block.is_blank() {
                    omitted += 1;
                }
                continue;
            }
            if too_long(block) {
                omitted += 1;
                continue;
            }
        }
        kept.push(item);
    }

    if policy.drop_page_numbers {
        omitted += drop_edge_page_numbers(&mut kept);
    }

    debug!("Omission dropped {} blocks", omitted);
    (kept, omitted)
}

/// A block is under a region when at least half of its area is, or, for a
/// degenerate box, when its centre is.
fn covered_by(block: &BoundingBox, area: &BoundingBox) -> bool {
    let own = block.width() * block.height();
    if own <= 0.0 {
        let (cx, cy) = ((block.x0 + block.x1) / 2.0, block.center_y());
        return cx >= area.x0 && cx <= area.x1 && cy >= area.y0 && cy <= area.y1;
    }
    let shared = block.horizontal_overlap(area) * block.vertical_overlap(area);
    shared >= own / 2.0
}

/// Drop the first and last text line of the page when it is nothing but a
/// page number.
fn drop_edge_page_numbers(items: &mut Vec<Item<'_>>) -> usize {
    let is_line = |item: &Item<'_>| {
        matches!(item, Item::Content(b) if matches!(b.kind, BlockKind::Line { .. }))
    };
    let is_number = |item: &Item<'_>| match item {
        Item::Content(b) => is_page_number(&b.plain_text()),
        Item::Region(_) => false,
    };

    let mut doomed = Vec::with_capacity(2);
    if let Some(first) = items.iter().position(is_line) {
        if is_number(&items[first]) {
            doomed.push(first);
        }
    }
    if let Some(last) = items.iter().rposition(is_line) {
        if is_number(&items[last]) && !doomed.contains(&last) {
            doomed.push(last);
        }
    }

    doomed.sort_unstable_by(|a, b| b.cmp(a));
    for &idx in &doomed {
        items.remove(idx);
    }
    doomed.len()
}
