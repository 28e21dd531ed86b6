// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.
//
// Every heuristic threshold used by the card pipeline lives here so that a
// different card template or camera setup can be handled without code
// changes. All sections default to the values tuned for the standard
// student ID layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CardwerkError, Result};

/// Top-level settings for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory receiving crops, annotated card and transcript.
    pub output_dir: PathBuf,
    pub locator: LocatorConfig,
    pub segmenter: SegmenterConfig,
    pub selector: SelectorConfig,
    pub recognition: RecognitionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            locator: LocatorConfig::default(),
            segmenter: SegmenterConfig::default(),
            selector: SelectorConfig::default(),
            recognition: RecognitionConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file. Missing keys fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject values that would make a stage meaningless.
    pub fn validate(&self) -> Result<()> {
        self.locator.validate()?;
        self.segmenter.validate()?;
        Ok(())
    }
}

/// Thresholds for the card locator's four strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Minimum contour area (px²) for the edge strategies.
    pub edge_min_area: f64,
    /// Minimum contour area (px²) for the threshold strategy.
    pub threshold_min_area: f64,
    /// Minimum contour area (px²) for the relaxed fallback.
    pub relaxed_min_area: f64,
    /// Only the largest `max_candidates` contours are examined.
    pub max_candidates: usize,
    /// Polygon approximation tolerance as a fraction of the perimeter.
    pub approx_epsilon: f64,
    /// Looser tolerance used by the relaxed fallback.
    pub relaxed_epsilon: f64,
    /// Largest vertex count the relaxed fallback accepts.
    pub relaxed_max_vertices: usize,
    /// Images wider than this get the downscaled retry.
    pub downscale_width: u32,
    /// Median filter radius used as edge-preserving smoothing.
    pub smoothing_radius: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Gaussian sigma applied before Otsu binarization.
    pub threshold_blur_sigma: f32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            edge_min_area: 10_000.0,
            threshold_min_area: 10_000.0,
            relaxed_min_area: 5_000.0,
            max_candidates: 10,
            approx_epsilon: 0.02,
            relaxed_epsilon: 0.03,
            relaxed_max_vertices: 6,
            downscale_width: 1000,
            smoothing_radius: 2,
            canny_low: 30.0,
            canny_high: 200.0,
            threshold_blur_sigma: 1.1,
        }
    }
}

impl LocatorConfig {
    fn validate(&self) -> Result<()> {
        if self.max_candidates == 0 {
            return Err(CardwerkError::Config(
                "locator.max_candidates must be at least 1".into(),
            ));
        }
        if self.relaxed_max_vertices < 4 {
            return Err(CardwerkError::Config(
                "locator.relaxed_max_vertices must be at least 4".into(),
            ));
        }
        if self.approx_epsilon <= 0.0 || self.relaxed_epsilon <= 0.0 {
            return Err(CardwerkError::Config(
                "locator approximation tolerances must be positive".into(),
            ));
        }
        if self.downscale_width == 0 {
            return Err(CardwerkError::Config(
                "locator.downscale_width must be positive".into(),
            ));
        }
        if self.canny_low > self.canny_high {
            return Err(CardwerkError::Config(format!(
                "locator.canny_low ({}) exceeds canny_high ({})",
                self.canny_low, self.canny_high
            )));
        }
        Ok(())
    }
}

/// A rectangular zone expressed as fractions of the card's width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneFraction {
    pub x_start: f32,
    pub y_start: f32,
    pub x_end: f32,
    pub y_end: f32,
}

impl ZoneFraction {
    pub const fn new(x_start: f32, y_start: f32, x_end: f32, y_end: f32) -> Self {
        Self {
            x_start,
            y_start,
            x_end,
            y_end,
        }
    }

    /// Pixel corners `(x0, y0, x1, y1)` on a `width` x `height` card,
    /// truncated toward zero. Both corners are inclusive.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let w = width as f32;
        let h = height as f32;
        (
            (w * self.x_start) as u32,
            (h * self.y_start) as u32,
            (w * self.x_end) as u32,
            (h * self.y_end) as u32,
        )
    }

    /// Whether the card-space point `(x, y)` lies inside the zone.
    pub fn contains(&self, x: f32, y: f32, width: u32, height: u32) -> bool {
        let (x0, y0, x1, y1) = self.to_pixels(width, height);
        x >= x0 as f32 && x <= x1 as f32 && y >= y0 as f32 && y <= y1 as f32
    }
}

/// Largest structuring element side the morphology backend accepts.
pub const MAX_KERNEL_SIDE: u32 = 511;

/// Layout constants for the field segmenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Zones that never carry variable text (photo, header, seal).
    pub mask_zones: Vec<ZoneFraction>,
    /// Structuring element width; wide so characters merge into lines.
    pub dilate_width: u32,
    /// Structuring element height; short so separate lines stay apart.
    pub dilate_height: u32,
    /// Boxes must be strictly wider than this.
    pub min_width: u32,
    /// Boxes must be strictly taller than this.
    pub min_height: u32,
    /// Padding added around each crop, clipped to the card.
    pub padding: u32,
    /// File extension for persisted crops.
    pub crop_extension: String,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            mask_zones: vec![
                // Photo column on the left edge.
                ZoneFraction::new(0.01, 0.01, 0.12, 0.99),
                // Header band, top-left.
                ZoneFraction::new(0.01, 0.000_01, 0.35, 0.2),
                // Seal / stamp, bottom-right.
                ZoneFraction::new(0.65, 0.4, 0.99, 0.99),
            ],
            dilate_width: 20,
            dilate_height: 4,
            min_width: 30,
            min_height: 10,
            padding: 5,
            crop_extension: "jpg".into(),
        }
    }
}

impl SegmenterConfig {
    fn validate(&self) -> Result<()> {
        for (i, zone) in self.mask_zones.iter().enumerate() {
            let in_range = |v: f32| (0.0..=1.0).contains(&v);
            if ![zone.x_start, zone.y_start, zone.x_end, zone.y_end]
                .into_iter()
                .all(in_range)
            {
                return Err(CardwerkError::Config(format!(
                    "segmenter.mask_zones[{i}] has a fraction outside 0..=1"
                )));
            }
            if zone.x_start >= zone.x_end || zone.y_start >= zone.y_end {
                return Err(CardwerkError::Config(format!(
                    "segmenter.mask_zones[{i}] start must be before end"
                )));
            }
        }
        if self.dilate_width == 0 || self.dilate_height == 0 {
            return Err(CardwerkError::Config(
                "segmenter dilation kernel must be at least 1x1".into(),
            ));
        }
        if self.dilate_width > MAX_KERNEL_SIDE || self.dilate_height > MAX_KERNEL_SIDE {
            return Err(CardwerkError::Config(format!(
                "segmenter dilation kernel sides must not exceed {MAX_KERNEL_SIDE}"
            )));
        }
        if self.crop_extension.is_empty() {
            return Err(CardwerkError::Config(
                "segmenter.crop_extension must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Field selection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Candidates at or left of this x coordinate are dropped.
    pub x_threshold: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { x_threshold: 200 }
    }
}

/// Parameters handed to the text recognizer for every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Language hint (ISO 639-2, e.g. `tur`).
    pub language_hint: String,
    /// Treat every crop as a single line of text.
    pub single_line: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language_hint: "tur".into(),
            single_line: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn zone_to_pixels_truncates() {
        let zone = ZoneFraction::new(0.25, 0.5, 0.75, 1.0);
        assert_eq!(zone.to_pixels(601, 351), (150, 175, 450, 351));
    }

    #[test]
    fn zone_contains_edges() {
        let zone = ZoneFraction::new(0.0, 0.0, 0.5, 0.5);
        assert!(zone.contains(50.0, 50.0, 100, 100));
        assert!(!zone.contains(50.5, 10.0, 100, 100));
    }

    #[test]
    fn inverted_zone_rejected() {
        let mut config = PipelineConfig::default();
        config.segmenter.mask_zones = vec![ZoneFraction::new(0.5, 0.1, 0.2, 0.9)];
        assert!(matches!(config.validate(), Err(CardwerkError::Config(_))));
    }

    #[test]
    fn out_of_range_zone_rejected() {
        let mut config = PipelineConfig::default();
        config.segmenter.mask_zones = vec![ZoneFraction::new(0.1, 0.1, 1.2, 0.9)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_kernel_rejected() {
        let mut config = PipelineConfig::default();
        config.segmenter.dilate_width = 600;
        assert!(matches!(config.validate(), Err(CardwerkError::Config(_))));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let json = r#"{ "selector": { "x_threshold": 150 }, "locator": { "edge_min_area": 1000.0 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.selector.x_threshold, 150);
        assert_eq!(config.locator.edge_min_area, 1000.0);
        assert_eq!(config.locator.relaxed_min_area, 5_000.0);
        assert_eq!(config.segmenter.mask_zones.len(), 3);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardwerk.json");
        let mut config = PipelineConfig::default();
        config.recognition.language_hint = "eng".into();
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.recognition.language_hint, "eng");
        assert_eq!(loaded.segmenter.dilate_width, 20);
    }
}
