// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Field extraction: line-level segmentation of the rectified card and
// selection of the fields fed to OCR.

pub mod segment;
pub mod select;

pub use segment::{FieldSegmenter, Segmentation};
pub use select::select_fields;
