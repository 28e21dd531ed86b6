// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Field recognition backed by the `ocrs` engine.
//
// # Feature Gate
//
// Only compiled with the `ocr` feature:
//
// ```toml
// cardwerk-document = { path = "crates/cardwerk-document", features = ["ocr"] }
// ```
//
// # Model Setup
//
// Two `.rten` model files are required, `text-detection.rten` and
// `text-recognition.rten`. Running `ocrs-cli` once downloads them to
// `$XDG_CACHE_HOME/ocrs` (typically `~/.cache/ocrs`), which is where
// [`OcrConfig::default`] looks.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use tracing::{debug, info, instrument};

use super::recognize::{RecognitionError, TextRecognizer};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, else `~/.cache/ocrs`, else `./ocrs-models`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where to find the two OCR models.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Both models inside `dir` under their well-known names.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn from_paths(
        detection_model: impl Into<PathBuf>,
        recognition_model: impl Into<PathBuf>,
    ) -> Self {
        Self {
            detection_model_path: detection_model.into(),
            recognition_model_path: recognition_model.into(),
        }
    }

    /// Missing model files make the engine unavailable rather than failing
    /// individual fields.
    pub fn validate(&self) -> Result<(), RecognitionError> {
        for (kind, path) in [
            ("detection", &self.detection_model_path),
            ("recognition", &self.recognition_model_path),
        ] {
            if !path.exists() {
                return Err(RecognitionError::Unavailable(format!(
                    "{kind} model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// [`TextRecognizer`] over a loaded `ocrs` engine.
///
/// Loading the models is the expensive part, so build one recognizer and
/// share it (it is `Send + Sync`) across every field and scan. The `ocrs`
/// and `rten` crates are very slow in debug builds.
pub struct OcrsRecognizer {
    engine: OcrEngine,
}

impl OcrsRecognizer {
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: OcrConfig) -> Result<Self, RecognitionError> {
        config.validate()?;

        info!("Loading OCR detection model");
        let detection_model = Model::load_file(&config.detection_model_path).map_err(|err| {
            RecognitionError::Unavailable(format!(
                "failed to load detection model from {}: {}",
                config.detection_model_path.display(),
                err
            ))
        })?;

        info!("Loading OCR recognition model");
        let recognition_model =
            Model::load_file(&config.recognition_model_path).map_err(|err| {
                RecognitionError::Unavailable(format!(
                    "failed to load recognition model from {}: {}",
                    config.recognition_model_path.display(),
                    err
                ))
            })?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| {
            RecognitionError::Unavailable(format!("failed to initialise OCR engine: {}", err))
        })?;

        info!("OCR engine initialised");
        Ok(Self { engine })
    }

    pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<Self, RecognitionError> {
        Self::new(OcrConfig::from_dir(dir))
    }
}

impl TextRecognizer for OcrsRecognizer {
    #[instrument(skip(self, bitmap), fields(width = bitmap.width(), height = bitmap.height()))]
    fn recognize(
        &self,
        bitmap: &DynamicImage,
        language_hint: &str,
        single_line: bool,
    ) -> Result<String, RecognitionError> {
        // The bundled recognition model has a fixed Latin alphabet, so the
        // hint only shows up in the span.
        let rgb = bitmap.to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            RecognitionError::Failed(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;

        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| RecognitionError::Failed(format!("OCR preprocessing failed: {}", err)))?;

        let words = self
            .engine
            .detect_words(&input)
            .map_err(|err| RecognitionError::Failed(format!("word detection failed: {}", err)))?;
        if words.is_empty() {
            debug!("No words detected in field");
            return Ok(String::new());
        }

        let mut lines = self.engine.find_text_lines(&input, &words);
        if single_line && lines.len() > 1 {
            lines = vec![lines.into_iter().flatten().collect()];
        }
        debug!(words = words.len(), lines = lines.len(), "Text lines grouped");

        let texts = self
            .engine
            .recognize_text(&input, &lines)
            .map_err(|err| RecognitionError::Failed(format!("line recognition failed: {}", err)))?;

        let joined = texts
            .iter()
            .flatten()
            .map(|line| line.to_string())
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(joined.trim().to_string())
    }
}
