// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Field segmentation: turns a rectified card into line-level text boxes.
//
// Dark ink becomes foreground through inverse Otsu thresholding, the fixed
// non-text zones of the layout are blanked, and a wide, short dilation
// merges characters into lines while keeping lines apart. Each outermost
// blob gives one candidate box.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cardwerk_core::config::{MAX_KERNEL_SIDE, SegmenterConfig};
use cardwerk_core::error::Result;
use cardwerk_core::FieldCandidate;
use image::{DynamicImage, GrayImage, Luma, Rgb};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::morphology::{Mask, grayscale_dilate};
use imageproc::rect::Rect;
use tracing::{debug, info, instrument};

use crate::image::processor::ImageProcessor;
use crate::observer::DebugObserver;
use crate::scan::binarize::{Polarity, has_contrast, otsu_binarize};

/// Everything the segmenter produced for one card.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Candidates in contour emission order.
    pub candidates: Vec<FieldCandidate>,
    /// `{output}/{identifier}_annotated.jpg`
    pub annotated_path: PathBuf,
    /// `{output}/{identifier}_fields/`
    pub fields_dir: PathBuf,
}

pub struct FieldSegmenter {
    config: SegmenterConfig,
    output_dir: PathBuf,
    debug: Option<Arc<dyn DebugObserver>>,
}

impl FieldSegmenter {
    pub fn new(config: SegmenterConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            output_dir: output_dir.into(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, observer: Arc<dyn DebugObserver>) -> Self {
        self.debug = Some(observer);
        self
    }

    /// Segment `card`, persisting each padded crop and an annotated copy of
    /// the card under the output directory.
    #[instrument(skip(self, card), fields(width = card.width(), height = card.height()))]
    pub fn segment(&self, card: &DynamicImage, identifier: &str) -> Result<Segmentation> {
        let fields_dir = self.output_dir.join(format!("{identifier}_fields"));
        std::fs::create_dir_all(&fields_dir)?;

        let mask = self.text_mask(card);
        let boxes = self.text_boxes(&mask);

        let source = ImageProcessor::from_dynamic(card.clone());
        let mut candidates = Vec::with_capacity(boxes.len());
        for (x, y, width, height) in boxes {
            let crop_path = crop_path(&fields_dir, x, y, &self.config.crop_extension);
            source
                .crop_padded(x, y, width, height, self.config.padding)
                .save(&crop_path)?;
            candidates.push(FieldCandidate {
                x,
                y,
                width,
                height,
                crop_path,
            });
        }

        let annotated_path = self.output_dir.join(format!("{identifier}_annotated.jpg"));
        ImageProcessor::from_dynamic(annotate_boxes(card, &candidates)).save(&annotated_path)?;

        info!(count = candidates.len(), dir = %fields_dir.display(), "Field candidates extracted");
        Ok(Segmentation {
            candidates,
            annotated_path,
            fields_dir,
        })
    }

    /// Ink mask with the configured zones blanked and lines merged.
    pub fn text_mask(&self, card: &DynamicImage) -> GrayImage {
        let gray = card.to_luma8();
        let (width, height) = gray.dimensions();
        if !has_contrast(&gray) {
            return GrayImage::new(width, height);
        }
        let (mut mask, _) = otsu_binarize(&gray, Polarity::DarkForeground);

        for zone in &self.config.mask_zones {
            let (x0, y0, x1, y1) = zone.to_pixels(width, height);
            let rect = Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0 + 1, y1 - y0 + 1);
            draw_filled_rect_mut(&mut mask, rect, Luma([0]));
        }
        self.inspect("zones_masked", &mask);

        let dilated = dilate_rect(&mask, self.config.dilate_width, self.config.dilate_height);
        self.inspect("dilated", &dilated);
        dilated
    }

    /// Bounding boxes `(x, y, width, height)` of the outermost blobs that are
    /// large enough to hold a line of text.
    fn text_boxes(&self, mask: &GrayImage) -> Vec<(u32, u32, u32, u32)> {
        let contours = find_contours::<u32>(mask);
        let total = contours.len();
        let boxes: Vec<_> = contours
            .iter()
            .enumerate()
            .filter(|&(i, _)| is_outermost(&contours, i))
            .filter_map(|(_, c)| {
                let min_x = c.points.iter().map(|p| p.x).min()?;
                let max_x = c.points.iter().map(|p| p.x).max()?;
                let min_y = c.points.iter().map(|p| p.y).min()?;
                let max_y = c.points.iter().map(|p| p.y).max()?;
                Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
            })
            .filter(|&(_, _, w, h)| w > self.config.min_width && h > self.config.min_height)
            .collect();
        debug!(contours = total, kept = boxes.len(), "Text boxes filtered");
        boxes
    }

    fn inspect(&self, label: &str, mask: &GrayImage) {
        if let Some(observer) = &self.debug {
            observer.inspect(label, &DynamicImage::ImageLuma8(mask.clone()));
        }
    }
}

/// An outer border with no outer border above it in the hierarchy.
///
/// Foreground touching the image edge makes `find_contours` report a
/// top-level hole, and blobs beside it become its children, so holes are
/// walked through rather than treated as enclosing regions.
fn is_outermost(contours: &[Contour<u32>], index: usize) -> bool {
    if contours[index].border_type != BorderType::Outer {
        return false;
    }
    let mut parent = contours[index].parent;
    while let Some(p) = parent {
        if contours[p].border_type == BorderType::Outer {
            return false;
        }
        parent = contours[p].parent;
    }
    true
}

/// Dilation with a `kw` x `kh` rectangle anchored at its centre.
///
/// Kernel sides are clamped to `1..=MAX_KERNEL_SIDE`.
pub fn dilate_rect(mask: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    let kw = kw.clamp(1, MAX_KERNEL_SIDE);
    let kh = kh.clamp(1, MAX_KERNEL_SIDE);
    let kernel = GrayImage::from_pixel(kw, kh, Luma([255]));
    // Both halves fit in a u8 once the sides are clamped.
    let element = Mask::from_image(&kernel, (kw / 2) as u8, (kh / 2) as u8);
    grayscale_dilate(mask, &element)
}

/// Card copy with a 2 px green box around every candidate.
fn annotate_boxes(card: &DynamicImage, candidates: &[FieldCandidate]) -> DynamicImage {
    let mut canvas = card.to_rgb8();
    let green = Rgb([0u8, 255, 0]);
    for c in candidates {
        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(c.x as i32, c.y as i32).of_size(c.width, c.height),
            green,
        );
        if c.width > 2 && c.height > 2 {
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(c.x as i32 + 1, c.y as i32 + 1).of_size(c.width - 2, c.height - 2),
                green,
            );
        }
    }
    DynamicImage::ImageRgb8(canvas)
}

/// Path of the crop the segmenter writes for a box at `(x, y)`.
pub fn crop_path(fields_dir: &Path, x: u32, y: u32, extension: &str) -> PathBuf {
    fields_dir.join(format!("{x}_{y}.{extension}"))
}
