//! Reading-order merge of recognised content and marked regions.
//!
//! Content blocks and regions that carry a bounding area are ordered
//! together, in one pass, by the same geometric rule. Treating them as one
//! list is what keeps a region that shares a row with text in the right
//! place; interleaving two separately ordered lists gets that case wrong.
//!
//! ## Ordering rule
//!
//! 1. Sort by top edge, then left edge.
//! 2. Form row bands: the first unplaced item anchors a band, and every
//!    later item whose vertical centre lies inside the anchor's vertical
//!    extent joins it. A tall figure therefore pulls the lines beside it
//!    into its band.
//! 3. Inside a band, items that overlap horizontally by at least half of
//!    the narrower one form a column. Columns are read left to right,
//!    items in a column top to bottom.
//! 4. A region whose clamped area overlaps an earlier region of the input
//!    list is moved right after that region if geometry put it first.
//!
//! Regions with no bounding area are placed by `ordinal_position`: before
//! the n-th content block of the ordered content sequence.

use crate::error::RegionWarning;
use crate::layout::{BoundingBox, ContentBlock, MarkedRegion};
use tracing::{debug, warn};

/// One entry of the merged page sequence.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Item<'a> {
    Content(&'a ContentBlock),
    Region(&'a MarkedRegion),
}

/// Merged sequence plus any placement warnings.
#[derive(Debug)]
pub(crate) struct Merged<'a> {
    pub items: Vec<Item<'a>>,
    pub warnings: Vec<RegionWarning>,
}

/// Merge content blocks and regions into reading order.
pub(crate) fn merge<'a>(
    blocks: &'a [ContentBlock],
    regions: &'a [MarkedRegion],
    page_width: f32,
    page_height: f32,
) -> Merged<'a> {
    let mut warnings = Vec::new();

    // ── Positioned items: every content block + regions with an area ─────
    let mut boxes: Vec<BoundingBox> = blocks.iter().map(|b| b.bbox).collect();
    let mut entries: Vec<Item<'a>> = blocks.iter().map(Item::Content).collect();
    let mut ordinal_regions: Vec<&'a MarkedRegion> = Vec::new();
    // (entry index, clamped area) of every positioned region so far
    let mut placed: Vec<(usize, BoundingBox)> = Vec::new();
    // (later entry, earlier entry) pairs of overlapping regions
    let mut pinned: Vec<(usize, usize)> = Vec::new();

    for region in regions {
        let Some(area) = region.bounding_area else {
            ordinal_regions.push(region);
            continue;
        };

        let area = if area.is_within(page_width, page_height) {
            area
        } else {
            push_warning(
                &mut warnings,
                region,
                format!("bounding area {area:?} lies outside the {page_width}x{page_height} page"),
            );
            area.clamped(page_width, page_height)
        };

        let entry = entries.len();
        if let Some(&(other_entry, _)) = placed.iter().find(|(_, b)| b.intersects(&area)) {
            if let Item::Region(other) = entries[other_entry] {
                push_warning(
                    &mut warnings,
                    region,
                    format!("overlaps region '{}'; placed after it", other.identifier),
                );
            }
            pinned.push((entry, other_entry));
        }

        placed.push((entry, area));
        boxes.push(area);
        entries.push(Item::Region(region));
    }

    let mut order = reading_order(&boxes);
    place_after_overlapped(&mut order, &pinned);
    let ordered: Vec<Item<'a>> = order.into_iter().map(|i| entries[i]).collect();

    // ── Regions known only by ordinal ────────────────────────────────────
    let content_total = blocks.len();
    let mut items = Vec::with_capacity(ordered.len() + ordinal_regions.len());
    let mut content_seen = 0usize;

    for item in ordered {
        if let Item::Content(_) = item {
            items.extend(
                ordinal_regions
                    .iter()
                    .filter(|r| r.ordinal_position == content_seen)
                    .map(|r| Item::Region(*r)),
            );
            content_seen += 1;
        }
        items.push(item);
    }

    for &region in &ordinal_regions {
        if region.ordinal_position >= content_total {
            if region.ordinal_position > content_total {
                push_warning(
                    &mut warnings,
                    region,
                    format!(
                        "ordinal position {} exceeds the {} recognised blocks; placed at the end",
                        region.ordinal_position, content_total
                    ),
                );
            }
            items.push(Item::Region(region));
        }
    }

    debug!(
        "Merged {} content blocks and {} regions ({} warnings)",
        content_total,
        regions.len(),
        warnings.len()
    );

    Merged { items, warnings }
}

fn push_warning(warnings: &mut Vec<RegionWarning>, region: &MarkedRegion, reason: String) {
    warn!("Region '{}': {}", region.identifier, reason);
    warnings.push(RegionWarning::unresolved(&region.identifier, reason));
}

/// Move each later overlapping region right after the region it overlaps
/// when geometry put it first. Pairs are applied in input order.
fn place_after_overlapped(order: &mut Vec<usize>, pinned: &[(usize, usize)]) {
    for &(later, earlier) in pinned {
        let (Some(l), Some(e)) = (
            order.iter().position(|&i| i == later),
            order.iter().position(|&i| i == earlier),
        ) else {
            continue;
        };
        if l < e {
            order.remove(l);
            // `earlier` shifted one slot left
            order.insert(e, later);
        }
    }
}

/// Return the indices of `boxes` in reading order.
pub(crate) fn reading_order(boxes: &[BoundingBox]) -> Vec<usize> {
    let mut sorted: Vec<usize> = (0..boxes.len()).collect();
    sorted.sort_by(|&a, &b| {
        boxes[a]
            .y0
            .total_cmp(&boxes[b].y0)
            .then(boxes[a].x0.total_cmp(&boxes[b].x0))
            .then(a.cmp(&b))
    });

    let mut taken = vec![false; boxes.len()];
    let mut order = Vec::with_capacity(boxes.len());

    for (pos, &anchor_idx) in sorted.iter().enumerate() {
        if taken[anchor_idx] {
            continue;
        }
        taken[anchor_idx] = true;
        let anchor = boxes[anchor_idx];
        let mut band = vec![anchor_idx];

        for &candidate in &sorted[pos + 1..] {
            if boxes[candidate].y0 > anchor.y1 {
                break;
            }
            let centre = boxes[candidate].center_y();
            if !taken[candidate] && centre >= anchor.y0 && centre <= anchor.y1 {
                taken[candidate] = true;
                band.push(candidate);
            }
        }

        order_band(boxes, &mut band);
        order.extend(band);
    }

    order
}

/// Order one row band: columns left to right, each column top to bottom.
fn order_band(boxes: &[BoundingBox], band: &mut Vec<usize>) {
    if band.len() < 2 {
        return;
    }
    band.sort_by(|&a, &b| {
        boxes[a]
            .x0
            .total_cmp(&boxes[b].x0)
            .then(boxes[a].y0.total_cmp(&boxes[b].y0))
            .then(a.cmp(&b))
    });

    // (extent, members)
    let mut columns: Vec<(BoundingBox, Vec<usize>)> = Vec::new();
    for &idx in band.iter() {
        let b = boxes[idx];
        let column = columns.iter_mut().find(|(extent, _)| {
            let narrower = extent.width().min(b.width());
            narrower > 0.0 && extent.horizontal_overlap(&b) >= narrower / 2.0
        });
        match column {
            Some((extent, members)) => {
                *extent = BoundingBox::new(
                    extent.x0.min(b.x0),
                    extent.y0.min(b.y0),
                    extent.x1.max(b.x1),
                    extent.y1.max(b.y1),
                );
                members.push(idx);
            }
            None => columns.push((b, vec![idx])),
        }
    }

    band.clear();
    for (_, mut members) in columns {
        members.sort_by(|&a, &b| {
            boxes[a]
                .y0
                .total_cmp(&boxes[b].y0)
                .then(boxes[a].x0.total_cmp(&boxes[b].x0))
                .then(a.cmp(&b))
        });
        band.extend(members);
    }
}
