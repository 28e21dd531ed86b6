// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Global (Otsu) binarization shared by the card locator and the field
// segmenter.

use image::GrayImage;
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use tracing::debug;

/// Which side of the threshold becomes foreground (255).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Pixels brighter than the threshold become foreground.
    BrightForeground,
    /// Pixels at or below the threshold become foreground (dark text on a
    /// light card).
    DarkForeground,
}

/// Binarize with a threshold chosen automatically from the histogram.
///
/// Returns the mask and the Otsu level that was used.
pub fn otsu_binarize(gray: &GrayImage, polarity: Polarity) -> (GrayImage, u8) {
    let level = otsu_level(gray);
    debug!(level, ?polarity, "Otsu threshold computed");

    let kind = match polarity {
        Polarity::BrightForeground => ThresholdType::Binary,
        Polarity::DarkForeground => ThresholdType::BinaryInverted,
    };
    (threshold(gray, level, kind), level)
}

/// Whether the image has at least two distinct intensity levels.
///
/// A histogram with a single populated bin has no meaningful Otsu split.
pub fn has_contrast(gray: &GrayImage) -> bool {
    let mut pixels = gray.pixels().map(|p| p.0[0]);
    match pixels.next() {
        Some(first) => pixels.any(|v| v != first),
        None => false,
    }
}
