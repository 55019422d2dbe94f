//! Image encoding: page frame → base64 PNG wrapped in `ImageData`.
//!
//! Marked regions that carry a bounding area are outlined in red on a copy
//! of the frame first, so the model can see where each one sits. The region
//! prompt lists the same boxes by name.
//!
//! PNG is lossless, which keeps printed text and thin red region outlines
//! crisp for the model. `detail: "high"` asks GPT-4-class models for the full
//! tile budget so footnotes and inline math stay legible.

use crate::error::Page2MdError;
use crate::layout::{BoundingBox, MarkedRegion, PageImage};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Outline colour for marked regions.
const OUTLINE: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Outline thickness in pixels, drawn inward from the box edge.
const OUTLINE_PX: u32 = 3;

/// Encode a validated page as a base64 PNG ready for the VLM API, with every
/// positioned region outlined.
pub fn encode_page(
    page: &PageImage,
    regions: &[MarkedRegion],
) -> Result<ImageData, Page2MdError> {
    let frame = page.validate()?;
    let areas: Vec<BoundingBox> = regions.iter().filter_map(|r| r.bounding_area).collect();
    if areas.is_empty() {
        return Ok(encode_frame(frame)?);
    }
    let outlined = DynamicImage::ImageRgba8(outline_regions(frame, &areas));
    Ok(encode_frame(&outlined)?)
}

/// Copy `frame` to RGBA and draw a hollow rectangle for each area, clamped
/// to the frame.
pub(crate) fn outline_regions(frame: &DynamicImage, areas: &[BoundingBox]) -> RgbaImage {
    let mut canvas = frame.to_rgba8();
    let (w, h) = canvas.dimensions();

    for area in areas {
        let b = area.clamped(w as f32, h as f32);
        let (x0, y0) = (b.x0.floor() as u32, b.y0.floor() as u32);
        let (x1, y1) = (
            (b.x1.ceil() as u32).min(w),
            (b.y1.ceil() as u32).min(h),
        );
        if x1 <= x0 || y1 <= y0 {
            debug!("Skipping outline of empty area {:?}", area);
            continue;
        }
        let t = OUTLINE_PX.min(x1 - x0).min(y1 - y0);

        for y in y0..y1 {
            for x in x0..x1 {
                let on_edge = x < x0 + t || x >= x1 - t || y < y0 + t || y >= y1 - t;
                if on_edge {
                    canvas.put_pixel(x, y, OUTLINE);
                }
            }
        }
    }
    canvas
}

fn encode_frame(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn page(w: u32, h: u32) -> PageImage {
        PageImage::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, WHITE)))
    }

    #[test]
    fn encode_small_page() {
        let data = encode_page(&page(10, 10), &[]).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(PageImage::decode(&decoded).is_ok(), "round-trips as an image");
    }

    #[test]
    fn multi_frame_page_is_not_encoded() {
        let two = PageImage::from_frames(vec![
            DynamicImage::new_rgba8(4, 4),
            DynamicImage::new_rgba8(4, 4),
        ]);
        assert!(matches!(
            encode_page(&two, &[]),
            Err(Page2MdError::InvalidInput { .. })
        ));
    }

    #[test]
    fn region_outline_is_red_and_inside_is_untouched() {
        let frame = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 80, WHITE));
        let canvas = outline_regions(&frame, &[BoundingBox::new(10.0, 20.0, 60.0, 70.0)]);

        for (x, y) in [(10, 20), (12, 45), (59, 69), (35, 22), (57, 50)] {
            assert_eq!(*canvas.get_pixel(x, y), OUTLINE, "edge pixel {x},{y}");
        }
        for (x, y) in [(35, 45), (13, 23), (9, 20), (60, 70), (0, 0)] {
            assert_eq!(*canvas.get_pixel(x, y), WHITE, "pixel {x},{y}");
        }
    }

    #[test]
    fn outline_is_clamped_to_the_frame() {
        let frame = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, WHITE));
        let canvas = outline_regions(&frame, &[BoundingBox::new(-20.0, 30.0, 20.0, 90.0)]);
        assert_eq!(*canvas.get_pixel(0, 40), OUTLINE);
        assert_eq!(*canvas.get_pixel(19, 49), OUTLINE);
        assert_eq!(*canvas.get_pixel(10, 40), WHITE);
    }

    #[test]
    fn regions_without_area_leave_the_page_as_is() {
        let plain = encode_page(&page(20, 20), &[]).unwrap();
        let ordinal_only = encode_page(&page(20, 20), &[MarkedRegion::new("a.png", 0)]).unwrap();
        assert_eq!(plain.data, ordinal_only.data);

        let outlined = encode_page(
            &page(20, 20),
            &[MarkedRegion::new("a.png", 0).with_area(BoundingBox::new(2.0, 2.0, 18.0, 18.0))],
        )
        .unwrap();
        let decoded = STANDARD.decode(&outlined.data).unwrap();
        let image = image::load_from_memory(&decoded).unwrap().to_rgba8();
        assert_eq!(*image.get_pixel(2, 2), OUTLINE);
        assert_eq!(*image.get_pixel(10, 10), WHITE);
    }
}
