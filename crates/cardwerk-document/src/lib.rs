// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardwerk-document: card image processing for the Cardwerk reader.
//
// Locates an identity card in a photograph, rectifies it to an upright
// rectangle, segments it into line-level text fields, selects the fields that
// carry variable data, and hands their crops to a text recognizer.

pub mod fields;
pub mod image;
pub mod observer;
pub mod pipeline;
pub mod scan;

#[cfg(test)]
mod testing;

// Re-export the primary structs so callers can use `cardwerk_document::CardPipeline` etc.
pub use fields::segment::FieldSegmenter;
pub use fields::select::select_fields;
pub use self::image::processor::ImageProcessor;
pub use observer::{DebugDumpObserver, DebugObserver, ProgressObserver};
pub use pipeline::{CardPipeline, DetectionResult, PipelineResult};
pub use scan::locate::{CardLocator, LocateStrategy, Located};
pub use scan::recognize::{RecognitionError, TextRecognizer, UnavailableRecognizer};

#[cfg(feature = "ocr")]
pub use scan::ocr::{OcrConfig, OcrsRecognizer};
