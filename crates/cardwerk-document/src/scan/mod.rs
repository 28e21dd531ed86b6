// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Card scanning: boundary location, perspective rectification, orientation
// correction, and the text recognition seam.

pub mod binarize;
pub mod locate;
pub mod orient;
#[cfg(feature = "ocr")]
pub mod ocr;
pub mod recognize;
pub mod rectify;

pub use locate::{CardLocator, LocateStrategy, Located};
pub use orient::correct_orientation;
pub use recognize::{RecognitionError, TextRecognizer, UnavailableRecognizer};
pub use rectify::{normalize, order_points};

#[cfg(feature = "ocr")]
pub use ocr::{OcrConfig, OcrsRecognizer};
