// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The text recognition seam between the card pipeline and an OCR engine.

use cardwerk_core::error::CardwerkError;
use image::DynamicImage;

/// Failure modes of a recognizer. An empty string is not a failure.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    /// The engine cannot run at all (models missing, not compiled in).
    #[error("text recognition engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but failed on this bitmap.
    #[error("text recognition failed: {0}")]
    Failed(String),
}

impl From<RecognitionError> for CardwerkError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::Unavailable(detail) => CardwerkError::RecognitionUnavailable(detail),
            RecognitionError::Failed(detail) => CardwerkError::Recognition(detail),
        }
    }
}

/// Reads the text on a single field crop.
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in `bitmap`. `language_hint` is an ISO 639-2
    /// code; `single_line` asks the engine to treat the crop as one line.
    fn recognize(
        &self,
        bitmap: &DynamicImage,
        language_hint: &str,
        single_line: bool,
    ) -> Result<String, RecognitionError>;

    /// Whether the engine can run at all. Checked once per scan before any
    /// field is recognized, so a missing engine fails the scan even when no
    /// field was selected.
    fn check_ready(&self) -> Result<(), RecognitionError> {
        Ok(())
    }
}

/// Stand-in used when no OCR engine is available; every call reports
/// [`RecognitionError::Unavailable`] with the stored reason.
#[derive(Debug, Clone)]
pub struct UnavailableRecognizer {
    reason: String,
}

impl UnavailableRecognizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl TextRecognizer for UnavailableRecognizer {
    fn recognize(&self, _: &DynamicImage, _: &str, _: bool) -> Result<String, RecognitionError> {
        Err(RecognitionError::Unavailable(self.reason.clone()))
    }

    fn check_ready(&self) -> Result<(), RecognitionError> {
        Err(RecognitionError::Unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_maps_to_fatal_error() {
        let recognizer = UnavailableRecognizer::new("built without the ocr feature");
        let err = recognizer
            .recognize(&DynamicImage::new_rgb8(4, 4), "tur", true)
            .unwrap_err();
        let err: CardwerkError = err.into();
        assert!(matches!(
            err,
            CardwerkError::RecognitionUnavailable(ref d) if d.contains("ocr feature")
        ));
        assert!(err.is_fatal());
        assert!(recognizer.check_ready().is_err());
    }

    #[test]
    fn failure_maps_to_recoverable_error() {
        let err: CardwerkError = RecognitionError::Failed("bad crop".into()).into();
        assert!(!err.is_fatal());
    }
}
