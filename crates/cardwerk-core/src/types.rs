// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Cardwerk card reader.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single scan (one source photograph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(pub Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Four corner points of a card boundary.
///
/// The corners are in whatever order the locator produced them until they are
/// passed through corner ordering; after that the order is
/// `[top_left, top_right, bottom_right, bottom_left]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub [Point; 4]);

impl Quad {
    pub fn new(points: [Point; 4]) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }

    /// Area enclosed by the four points taken in their stored order
    /// (shoelace formula).
    pub fn area(&self) -> f32 {
        let corners = &self.0;
        let n = corners.len();
        let mut area = 0.0f32;
        for i in 0..n {
            let j = (i + 1) % n;
            area += corners[i].x * corners[j].y;
            area -= corners[j].x * corners[i].y;
        }
        area.abs() / 2.0
    }

    /// Divide every coordinate by `ratio`. Used to map a polygon found on a
    /// downscaled copy back to source resolution.
    pub fn unscale(&self, ratio: f32) -> Self {
        Self(self.0.map(|p| Point::new(p.x / ratio, p.y / ratio)))
    }
}

/// Coarse lifecycle of a scan, as reported to the outer orchestration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Accepted, not yet started.
    Pending,
    /// Pipeline is running.
    Processing,
    /// Pipeline finished; fields (possibly none) were produced.
    Completed,
    /// The card could not be located or the OCR engine was unavailable.
    Failed,
}

/// Progress milestones emitted by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    DetectingCard,
    ExtractingFields,
    PerformingOcr,
    Completed,
    FailedDetection,
}

impl PipelineStage {
    /// Percentage shown to the user for this milestone.
    pub fn percent(&self) -> u8 {
        match self {
            Self::DetectingCard => 10,
            Self::ExtractingFields => 40,
            Self::PerformingOcr => 70,
            Self::Completed => 100,
            Self::FailedDetection => 0,
        }
    }

    /// Stable keyword used in logs and status payloads.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::DetectingCard => "detecting_card",
            Self::ExtractingFields => "extracting_fields",
            Self::PerformingOcr => "performing_ocr",
            Self::Completed => "completed",
            Self::FailedDetection => "failed_detection",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A text-bearing region found on the rectified card.
///
/// `width > 30` and `height > 10` hold for every candidate the segmenter
/// emits. `crop_path` points at the padded crop persisted for OCR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub crop_path: PathBuf,
}

impl FieldCandidate {
    /// Centre of the bounding box in card coordinates.
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
}

/// One recognised field of the final output.
///
/// `width`/`height` are the dimensions of the persisted crop, i.e. including
/// padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub source_crop: PathBuf,
}

/// Serializable summary of one scan, written next to the artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: ScanId,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub status: ScanStatus,
    pub original_image_path: Option<PathBuf>,
    pub card_image_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub fields: Vec<FieldRecord>,
}

impl ScanRecord {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            id: ScanId::new(),
            file_name: file_name.into(),
            created_at: Utc::now(),
            status: ScanStatus::Pending,
            original_image_path: None,
            card_image_path: None,
            error_message: None,
            fields: Vec::new(),
        }
    }
}

/// Supported input image types for batch processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    Jpeg,
    Png,
    Bmp,
}

impl InputType {
    /// Infer the input type from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }
}
