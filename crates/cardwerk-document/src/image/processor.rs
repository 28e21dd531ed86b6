// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: load, downscale, quarter-turn rotation, padded crops and
// saving. Operates on in-memory images using the `image` crate.

use std::path::Path;

use cardwerk_core::error::CardwerkError;
use image::DynamicImage;
use image::imageops::FilterType;
use tracing::{debug, info, instrument};

/// Chainable wrapper around a single in-memory image.
///
/// Each transformation consumes `self` and returns a new `ImageProcessor`,
/// so intermediate buffers are never shared between pipeline stages.
///
/// ```ignore
/// let (small, ratio) = ImageProcessor::open("card.jpg")?.resize_to_width(1000);
/// let field = small.crop_padded(220, 80, 140, 18, 5);
/// field.save("out/220_80.jpg")?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CardwerkError> {
        let img = image::open(path.as_ref()).map_err(|err| {
            CardwerkError::ImageError(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        info!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying `DynamicImage`.
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Consume the processor and return the underlying `DynamicImage`.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Scale to exactly `target_width` pixels wide, preserving aspect ratio.
    ///
    /// Returns the scaled processor and the ratio `target_width / width` so
    /// coordinates found on the copy can be mapped back by dividing by it.
    #[instrument(skip(self), fields(target_width))]
    pub fn resize_to_width(self, target_width: u32) -> (Self, f32) {
        let (w, h) = (self.image.width(), self.image.height());
        let ratio = target_width as f32 / w as f32;
        let target_height = ((h as f32 * ratio) as u32).max(1);
        info!(
            from_w = w,
            from_h = h,
            to_w = target_width,
            to_h = target_height,
            "Resizing image"
        );
        let resized = self
            .image
            .resize_exact(target_width, target_height, FilterType::Triangle);
        (Self { image: resized }, ratio)
    }

    /// Rotate 90 degrees clockwise.
    pub fn rotate90(self) -> Self {
        Self {
            image: self.image.rotate90(),
        }
    }

    /// Crop the box `(x, y, width, height)` grown by `padding` on every side.
    ///
    /// The padded box is clipped to the image bounds, so crops touching the
    /// border are simply smaller.
    pub fn crop_padded(&self, x: u32, y: u32, width: u32, height: u32, padding: u32) -> Self {
        let img_w = self.image.width();
        let img_h = self.image.height();

        let x0 = x.saturating_sub(padding).min(img_w.saturating_sub(1));
        let y0 = y.saturating_sub(padding).min(img_h.saturating_sub(1));
        let x1 = (x + width + padding).min(img_w);
        let y1 = (y + height + padding).min(img_h);

        debug!(x0, y0, x1, y1, "Cropping padded region");
        Self {
            image: self
                .image
                .crop_imm(x0, y0, x1.saturating_sub(x0).max(1), y1.saturating_sub(y0).max(1)),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Write the image to a file. The format is inferred from the file
    /// extension; JPEG output is flattened to RGB first.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CardwerkError> {
        let path = path.as_ref();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg"));

        let result = if is_jpeg && !matches!(self.image, DynamicImage::ImageRgb8(_)) {
            DynamicImage::ImageRgb8(self.image.to_rgb8()).save(path)
        } else {
            self.image.save(path)
        };

        result.map_err(|err| {
            CardwerkError::ImageError(format!(
                "failed to save image to {}: {}",
                path.display(),
                err
            ))
        })
    }
}
