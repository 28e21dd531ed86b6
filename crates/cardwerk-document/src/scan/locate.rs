// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Card locator: finds the four-corner boundary of a card in a photograph.
//
// Four strategies are tried in a fixed order and the first hit wins:
// Canny edges at full resolution, the same on a copy downscaled to 1000 px,
// Otsu thresholding, and finally a relaxed polygon match on the threshold
// contours that accepts up to six vertices.

use std::fmt;
use std::sync::Arc;

use cardwerk_core::config::LocatorConfig;
use cardwerk_core::{Point, Quad};
use image::{DynamicImage, GrayImage, Rgb};
use imageproc::contours::find_contours;
use imageproc::drawing::draw_line_segment_mut;
use imageproc::edges::canny;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, min_area_rect};
use imageproc::point::Point as PixelPoint;
use tracing::{debug, info, instrument};

use super::binarize::{Polarity, has_contrast, otsu_binarize};
use crate::image::processor::ImageProcessor;
use crate::observer::DebugObserver;

/// Which strategy produced the card boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocateStrategy {
    /// Canny edges on the full-resolution image.
    Edges,
    /// Canny edges on a downscaled copy; `ratio` is `downscaled / original`.
    DownscaledEdges { ratio: f32 },
    /// Contours of an Otsu-binarized mask.
    Threshold,
    /// A 4 to 6 vertex polygon from the threshold contours, collapsed to its
    /// minimum-area rectangle when it had more than four.
    Relaxed { vertices: usize },
}

impl fmt::Display for LocateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edges => f.write_str("edges"),
            Self::DownscaledEdges { ratio } => write!(f, "downscaled_edges({ratio:.3})"),
            Self::Threshold => f.write_str("threshold"),
            Self::Relaxed { vertices } => write!(f, "relaxed({vertices})"),
        }
    }
}

/// A located card boundary in source-image coordinates, corners unordered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Located {
    pub quad: Quad,
    pub strategy: LocateStrategy,
}

type Contour = Vec<PixelPoint<i32>>;

pub struct CardLocator {
    config: LocatorConfig,
    debug: Option<Arc<dyn DebugObserver>>,
}

impl CardLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            config,
            debug: None,
        }
    }

    /// Forward edge maps and threshold masks to `observer`.
    pub fn with_debug(mut self, observer: Arc<dyn DebugObserver>) -> Self {
        self.debug = Some(observer);
        self
    }

    /// Run the strategies in priority order. `None` means no plausible card
    /// boundary exists in the image.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn locate(&self, image: &DynamicImage) -> Option<Located> {
        if let Some(quad) = self.try_edges(image) {
            return Some(self.found(quad, LocateStrategy::Edges));
        }
        if let Some(located) = self.try_downscaled(image) {
            return Some(self.found(located.quad, located.strategy));
        }

        let candidates = self.threshold_candidates(image);
        if let Some(quad) = self.select_quad(&candidates, self.config.threshold_min_area) {
            return Some(self.found(quad, LocateStrategy::Threshold));
        }
        if let Some((quad, vertices)) = self.select_relaxed(&candidates) {
            return Some(self.found(quad, LocateStrategy::Relaxed { vertices }));
        }

        info!("No card boundary found by any strategy");
        None
    }

    /// Strategy 1: smoothed Canny edges at full resolution.
    pub fn try_edges(&self, image: &DynamicImage) -> Option<Quad> {
        let gray = image.to_luma8();
        let radius = self.config.smoothing_radius;
        let smoothed = median_filter(&gray, radius, radius);
        let edges = canny(&smoothed, self.config.canny_low, self.config.canny_high);
        self.inspect("edges", &edges);

        let candidates = largest_contours(&edges, self.config.max_candidates);
        debug!(count = candidates.len(), "Edge contours collected");
        self.select_quad(&candidates, self.config.edge_min_area)
    }

    /// Strategy 2: repeat the edge strategy on a copy scaled to
    /// `downscale_width`. Only applies to images wider than that.
    pub fn try_downscaled(&self, image: &DynamicImage) -> Option<Located> {
        let target = self.config.downscale_width;
        if image.width() <= target {
            return None;
        }
        let (small, ratio) = ImageProcessor::from_dynamic(image.clone()).resize_to_width(target);
        let quad = self.try_edges(small.as_dynamic())?;
        Some(Located {
            quad: quad.unscale(ratio),
            strategy: LocateStrategy::DownscaledEdges { ratio },
        })
    }

    /// Strategy 3: Otsu-binarized mask contours.
    pub fn try_threshold(&self, image: &DynamicImage) -> Option<Quad> {
        let candidates = self.threshold_candidates(image);
        self.select_quad(&candidates, self.config.threshold_min_area)
    }

    /// Strategy 4: relaxed vertex count on the threshold contours. Returns the
    /// quad and the vertex count of the matched polygon.
    pub fn try_relaxed(&self, image: &DynamicImage) -> Option<(Quad, usize)> {
        let candidates = self.threshold_candidates(image);
        self.select_relaxed(&candidates)
    }

    /// Draw `quad` in green (3 px) on an RGB copy of `image`.
    pub fn annotate(image: &DynamicImage, quad: &Quad) -> DynamicImage {
        let mut canvas = image.to_rgb8();
        let green = Rgb([0u8, 255, 0]);
        let corners = quad.points();
        for i in 0..corners.len() {
            let a = corners[i];
            let b = corners[(i + 1) % corners.len()];
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let (ox, oy) = (dx as f32, dy as f32);
                    let (start, end) = ((a.x + ox, a.y + oy), (b.x + ox, b.y + oy));
                    draw_line_segment_mut(&mut canvas, start, end, green);
                }
            }
        }
        DynamicImage::ImageRgb8(canvas)
    }

    fn found(&self, quad: Quad, strategy: LocateStrategy) -> Located {
        info!(%strategy, area = quad.area(), "Card boundary located");
        Located { quad, strategy }
    }

    fn threshold_candidates(&self, image: &DynamicImage) -> Vec<Contour> {
        let gray = image.to_luma8();
        if !has_contrast(&gray) {
            debug!("Image has a single intensity level, skipping threshold strategies");
            return Vec::new();
        }
        let blurred = gaussian_blur_f32(&gray, self.config.threshold_blur_sigma);
        let (mask, _) = otsu_binarize(&blurred, Polarity::BrightForeground);
        self.inspect("threshold", &mask);

        let candidates = largest_contours(&mask, self.config.max_candidates);
        debug!(count = candidates.len(), "Threshold contours collected");
        candidates
    }

    /// First candidate (largest first) that approximates to exactly four
    /// vertices with an area above `min_area`.
    fn select_quad(&self, candidates: &[Contour], min_area: f64) -> Option<Quad> {
        candidates.iter().find_map(|contour| {
            let polygon = approximate(contour, self.config.approx_epsilon)?;
            if polygon.len() != 4 || contour_area(&polygon) <= min_area {
                return None;
            }
            Some(to_quad(&polygon))
        })
    }

    fn select_relaxed(&self, candidates: &[Contour]) -> Option<(Quad, usize)> {
        let max_vertices = self.config.relaxed_max_vertices;
        candidates.iter().find_map(|contour| {
            let polygon = approximate(contour, self.config.relaxed_epsilon)?;
            let vertices = polygon.len();
            if !(4..=max_vertices).contains(&vertices)
                || contour_area(&polygon) <= self.config.relaxed_min_area
            {
                return None;
            }
            let quad = if vertices == 4 {
                to_quad(&polygon)
            } else {
                to_quad(&min_area_rect(&polygon))
            };
            Some((quad, vertices))
        })
    }

    fn inspect(&self, label: &str, mask: &GrayImage) {
        if let Some(observer) = &self.debug {
            observer.inspect(label, &DynamicImage::ImageLuma8(mask.clone()));
        }
    }
}

/// All contours of `mask` (outer borders and holes alike), largest area
/// first, keeping at most `limit`.
fn largest_contours(mask: &GrayImage, limit: usize) -> Vec<Contour> {
    let mut scored: Vec<(f64, Contour)> = find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.points.len() >= 4)
        .map(|c| (contour_area(&c.points), c.points))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(limit);
    scored.into_iter().map(|(_, points)| points).collect()
}

/// Closed Douglas-Peucker with a tolerance of `fraction` times the contour
/// length. `None` when the contour has no length to scale by.
fn approximate(contour: &[PixelPoint<i32>], fraction: f64) -> Option<Contour> {
    let epsilon = fraction * arc_length(contour, true);
    if contour.len() < 3 || epsilon <= 0.0 {
        return None;
    }
    Some(approximate_polygon_dp(contour, epsilon, true))
}

/// First four vertices of `polygon` as a quad.
fn to_quad(polygon: &[PixelPoint<i32>]) -> Quad {
    let corner = |i: usize| Point::new(polygon[i].x as f32, polygon[i].y as f32);
    Quad::new([corner(0), corner(1), corner(2), corner(3)])
}
