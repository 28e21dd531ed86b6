// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification of a located card.

use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::{Point, Quad};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, instrument};

/// Order four corners as `[top_left, top_right, bottom_right, bottom_left]`.
///
/// Top-left has the smallest `x + y`, bottom-right the largest; top-right
/// has the smallest `y - x`, bottom-left the largest. Ties go to the point
/// seen first.
pub fn order_points(points: &[Point; 4]) -> [Point; 4] {
    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.y - p.x;

    let mut tl = points[0];
    let mut br = points[0];
    let mut tr = points[0];
    let mut bl = points[0];
    for p in &points[1..] {
        if sum(p) < sum(&tl) {
            tl = *p;
        }
        if sum(p) > sum(&br) {
            br = *p;
        }
        if diff(p) < diff(&tr) {
            tr = *p;
        }
        if diff(p) > diff(&bl) {
            bl = *p;
        }
    }
    [tl, tr, br, bl]
}

/// Output size for an ordered quad: the longer of each pair of opposite
/// edges, each truncated to whole pixels.
pub fn target_size(ordered: &[Point; 4]) -> (u32, u32) {
    let [tl, tr, br, bl] = ordered;
    let width = (br.distance(bl) as u32).max(tr.distance(tl) as u32);
    let height = (tr.distance(br) as u32).max(tl.distance(bl) as u32);
    (width, height)
}

/// Warp the region inside `quad` onto an upright rectangle.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn normalize(image: &DynamicImage, quad: &Quad) -> Result<DynamicImage> {
    let ordered = order_points(quad.points());
    let (width, height) = target_size(&ordered);
    if width < 2 || height < 2 {
        return Err(CardwerkError::ImageError(format!(
            "card boundary collapses to {width}x{height}"
        )));
    }

    let from = ordered.map(|p| (p.x, p.y));
    let (max_x, max_y) = ((width - 1) as f32, (height - 1) as f32);
    let to = [(0.0, 0.0), (max_x, 0.0), (max_x, max_y), (0.0, max_y)];
    let projection = Projection::from_control_points(from, to).ok_or_else(|| {
        CardwerkError::ImageError("card boundary is degenerate, no projection exists".into())
    })?;

    let source = image.to_rgb8();
    let mut card = RgbImage::new(width, height);
    warp_into(
        &source,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut card,
    );
    debug!(width, height, "Card rectified");
    Ok(DynamicImage::ImageRgb8(card))
}
