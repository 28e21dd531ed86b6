// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Orientation correction for a rectified card.

use image::DynamicImage;
use imageproc::edges::canny;
use tracing::{debug, instrument};

use crate::image::processor::ImageProcessor;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const TOP_WEIGHT: f64 = 2.0;
const MIDDLE_WEIGHT: f64 = 1.0;

/// Edge density score favouring text in the upper part of the card.
pub fn text_orientation_score(card: &DynamicImage) -> f64 {
    let edges = canny(&card.to_luma8(), CANNY_LOW, CANNY_HIGH);
    let (width, height) = edges.dimensions();
    let third = height / 3;

    let count_rows = |from: u32, to: u32| -> u64 {
        let mut n = 0u64;
        for y in from..to {
            for x in 0..width {
                if edges.get_pixel(x, y).0[0] > 0 {
                    n += 1;
                }
            }
        }
        n
    };

    let top = count_rows(0, third);
    let middle = count_rows(third, (2 * third).min(height));
    top as f64 * TOP_WEIGHT + middle as f64 * MIDDLE_WEIGHT
}

/// Turn a portrait card to landscape, then flip it if the upside-down
/// reading scores strictly higher.
#[instrument(skip_all, fields(width = card.width(), height = card.height()))]
pub fn correct_orientation(card: DynamicImage) -> DynamicImage {
    let mut current = ImageProcessor::from_dynamic(card);
    if current.height() > current.width() {
        debug!("Portrait card, rotating 90 degrees clockwise");
        current = current.rotate90();
    }

    let upright = current.into_dynamic();
    let flipped = upright.rotate180();
    let upright_score = text_orientation_score(&upright);
    let flipped_score = text_orientation_score(&flipped);
    debug!(upright_score, flipped_score, "Orientation scores");

    if flipped_score > upright_score {
        debug!("Card was upside down, rotated 180 degrees");
        flipped
    } else {
        upright
    }
}
