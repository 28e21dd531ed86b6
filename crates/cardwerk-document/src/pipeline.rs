// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Card pipeline orchestrator.
//
// Sequences location, rectification, orientation, segmentation, selection and
// recognition for one photograph, reports progress milestones, and writes
// the scan's artifacts:
//
//   {output}/{base}_detected_card.jpg   rectified, upright card
//   {output}/{base}_annotated.jpg       card with field boxes
//   {output}/{base}_fields/{x}_{y}.jpg  one crop per candidate
//   {output}/{base}_ocr_results.txt     one line per recognized field
//   {output}/{base}_scan.json           ScanRecord (process_file only)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::human_errors::humanize_error;
use cardwerk_core::{
    FieldCandidate, FieldRecord, InputType, PipelineConfig, PipelineStage, Quad, ScanId,
    ScanRecord, ScanStatus,
};
use chrono::{DateTime, Utc};
use image::DynamicImage;
use tracing::{debug, info, instrument, warn};

use crate::fields::segment::FieldSegmenter;
use crate::fields::select::select_fields;
use crate::image::processor::ImageProcessor;
use crate::observer::{DebugObserver, ProgressObserver};
use crate::scan::locate::{CardLocator, LocateStrategy};
use crate::scan::orient::correct_orientation;
use crate::scan::recognize::TextRecognizer;
use crate::scan::rectify::{normalize, order_points};

/// Outcome of locating and rectifying the card.
///
/// When `success` is false every other field is `None` and nothing
/// downstream runs.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub success: bool,
    /// Upright, perspective-corrected card.
    pub rectified_card: Option<DynamicImage>,
    /// Source photo with the located boundary drawn on it.
    pub annotated_original: Option<DynamicImage>,
    /// Boundary corners as `[top_left, top_right, bottom_right, bottom_left]`.
    pub polygon: Option<Quad>,
    pub strategy: Option<LocateStrategy>,
}

impl DetectionResult {
    fn failed() -> Self {
        Self {
            success: false,
            rectified_card: None,
            annotated_original: None,
            polygon: None,
            strategy: None,
        }
    }
}

/// Files written for one scan.
#[derive(Debug, Clone)]
pub struct PipelineArtifacts {
    pub detected_card: PathBuf,
    pub annotated_card: PathBuf,
    pub fields_dir: PathBuf,
    pub transcript: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub scan_id: ScanId,
    pub source_base_name: String,
    pub rectified_card: DynamicImage,
    /// Recognized fields in reading order.
    pub field_records: Vec<FieldRecord>,
    pub artifacts: PipelineArtifacts,
    pub completed_at: DateTime<Utc>,
}

/// Internal run state; each transition may carry a progress milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Start,
    Locating,
    Segmenting,
    Selecting,
    Recognizing,
    Done,
    Aborted,
}

impl PipelineState {
    fn milestone(self) -> Option<PipelineStage> {
        match self {
            Self::Locating => Some(PipelineStage::DetectingCard),
            Self::Segmenting => Some(PipelineStage::ExtractingFields),
            Self::Recognizing => Some(PipelineStage::PerformingOcr),
            Self::Done => Some(PipelineStage::Completed),
            Self::Aborted => Some(PipelineStage::FailedDetection),
            Self::Start | Self::Selecting => None,
        }
    }
}

/// One configured pipeline. Cheap to share; holds no per-run state.
pub struct CardPipeline {
    config: PipelineConfig,
    recognizer: Arc<dyn TextRecognizer>,
    progress: Option<Arc<dyn ProgressObserver>>,
    debug: Option<Arc<dyn DebugObserver>>,
}

impl CardPipeline {
    pub fn new(config: PipelineConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            config,
            recognizer,
            progress: None,
            debug: None,
        }
    }

    pub fn with_progress(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.progress = Some(observer);
        self
    }

    pub fn with_debug(mut self, observer: Arc<dyn DebugObserver>) -> Self {
        self.debug = Some(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Locate, rectify and orient the card.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &DynamicImage) -> Result<DetectionResult> {
        let mut locator = CardLocator::new(self.config.locator.clone());
        if let Some(debug) = &self.debug {
            locator = locator.with_debug(Arc::clone(debug));
        }

        let Some(located) = locator.locate(image) else {
            return Ok(DetectionResult::failed());
        };

        let polygon = Quad::new(order_points(located.quad.points()));
        let annotated = CardLocator::annotate(image, &polygon);
        self.inspect("located", &annotated);

        let rectified = normalize(image, &polygon)?;
        let card = correct_orientation(rectified);
        self.inspect("card", &card);

        Ok(DetectionResult {
            success: true,
            rectified_card: Some(card),
            annotated_original: Some(annotated),
            polygon: Some(polygon),
            strategy: Some(located.strategy),
        })
    }

    /// Run the whole pipeline. A photo without a card is
    /// `Err(CardwerkError::DetectionFailure)`.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn run(&self, image: &DynamicImage, identifier: &str) -> Result<PipelineResult> {
        let scan_id = ScanId::new();
        let mut state = PipelineState::Start;
        let output_dir = &self.config.output_dir;
        std::fs::create_dir_all(output_dir)?;

        self.transition(&mut state, PipelineState::Locating);
        let detection = self.detect(image)?;
        let card = match detection.rectified_card {
            Some(card) if detection.success => card,
            _ => {
                self.transition(&mut state, PipelineState::Aborted);
                return Err(CardwerkError::DetectionFailure(identifier.to_string()));
            }
        };

        let detected_card = output_dir.join(format!("{identifier}_detected_card.jpg"));
        ImageProcessor::from_dynamic(card.clone()).save(&detected_card)?;

        self.transition(&mut state, PipelineState::Segmenting);
        let mut segmenter = FieldSegmenter::new(self.config.segmenter.clone(), output_dir);
        if let Some(debug) = &self.debug {
            segmenter = segmenter.with_debug(Arc::clone(debug));
        }
        let segmentation = segmenter.segment(&card, identifier)?;

        self.transition(&mut state, PipelineState::Selecting);
        let selected = select_fields(&segmentation.candidates, self.config.selector.x_threshold);

        self.recognizer.check_ready()?;
        self.transition(&mut state, PipelineState::Recognizing);
        let field_records = self.recognize_fields(&selected)?;

        let transcript = output_dir.join(format!("{identifier}_ocr_results.txt"));
        write_transcript(&transcript, &field_records)?;

        self.transition(&mut state, PipelineState::Done);
        info!(
            %scan_id,
            candidates = segmentation.candidates.len(),
            selected = selected.len(),
            recognized = field_records.len(),
            "Scan complete"
        );

        Ok(PipelineResult {
            scan_id,
            source_base_name: identifier.to_string(),
            rectified_card: card,
            field_records,
            artifacts: PipelineArtifacts {
                detected_card,
                annotated_card: segmentation.annotated_path,
                fields_dir: segmentation.fields_dir,
                transcript,
            },
            completed_at: Utc::now(),
        })
    }

    /// Like [`run`](Self::run), but a photo without a card is `Ok(None)`.
    pub fn process(
        &self,
        image: &DynamicImage,
        identifier: &str,
    ) -> Result<Option<PipelineResult>> {
        match self.run(image, identifier) {
            Ok(result) => Ok(Some(result)),
            Err(CardwerkError::DetectionFailure(source)) => {
                info!(source = %source, "No card detected, scan aborted");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Load a photo from disk, run it, and write `{base}_scan.json` next to
    /// the other artifacts. Detection failure yields a `Failed` record;
    /// other fatal errors are recorded and then returned.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<ScanRecord> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(InputType::from_extension);
        if supported.is_none() {
            return Err(CardwerkError::UnsupportedInput(file_name));
        }
        let base = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());
        std::fs::create_dir_all(&self.config.output_dir)?;

        let mut record = ScanRecord::new(file_name);
        record.original_image_path = Some(path.to_path_buf());
        record.status = ScanStatus::Processing;

        let outcome = ImageProcessor::open(path).and_then(|img| self.run(img.as_dynamic(), &base));
        let result = match outcome {
            Ok(result) => {
                record.id = result.scan_id;
                record.status = ScanStatus::Completed;
                record.card_image_path = Some(result.artifacts.detected_card);
                record.fields = result.field_records;
                Ok(())
            }
            Err(err) => {
                record.status = ScanStatus::Failed;
                record.error_message = Some(humanize_error(&err).to_string());
                match err {
                    CardwerkError::DetectionFailure(_) => Ok(()),
                    other => Err(other),
                }
            }
        };

        let record_path = self.config.output_dir.join(format!("{base}_scan.json"));
        let written = write_record(&record_path, &record);
        match (result, written) {
            (Err(err), Err(write_err)) => {
                warn!(error = %write_err, "Failed to write scan record for failed scan");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(()), Err(write_err)) => Err(write_err),
            (Ok(()), Ok(())) => Ok(record),
        }
    }

    /// Recognize each selected crop in order. Unreadable crops, failed
    /// recognitions and empty text are skipped; an unavailable engine ends
    /// the run.
    pub(crate) fn recognize_fields(
        &self,
        selected: &[FieldCandidate],
    ) -> Result<Vec<FieldRecord>> {
        let hint = self.config.recognition.language_hint.as_str();
        let single_line = self.config.recognition.single_line;
        let mut records = Vec::with_capacity(selected.len());

        for candidate in selected {
            let outcome = ImageProcessor::open(&candidate.crop_path)
                .map_err(|err| CardwerkError::CropRead {
                    path: candidate.crop_path.clone(),
                    reason: err.to_string(),
                })
                .and_then(|crop| {
                    let text = self.recognizer.recognize(crop.as_dynamic(), hint, single_line)?;
                    Ok((crop, text))
                });
            let (crop, text) = match outcome {
                Ok(read) => read,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(x = candidate.x, y = candidate.y, error = %err, "Skipping field");
                    continue;
                }
            };

            let text = text.trim();
            if text.is_empty() {
                debug!(x = candidate.x, y = candidate.y, "No text in field");
                continue;
            }
            records.push(FieldRecord {
                text: text.to_string(),
                x: candidate.x,
                y: candidate.y,
                width: crop.width(),
                height: crop.height(),
                source_crop: candidate.crop_path.clone(),
            });
        }
        Ok(records)
    }

    fn transition(&self, state: &mut PipelineState, next: PipelineState) {
        debug!(from = ?*state, to = ?next, "Pipeline state change");
        *state = next;
        if let Some(stage) = next.milestone() {
            info!(stage = %stage, percent = stage.percent(), "Progress");
            if let Some(progress) = &self.progress {
                progress.on_progress(stage);
            }
        }
    }

    fn inspect(&self, label: &str, image: &DynamicImage) {
        if let Some(debug) = &self.debug {
            debug.inspect(label, image);
        }
    }
}

fn write_transcript(path: &Path, records: &[FieldRecord]) -> Result<()> {
    let mut body = String::new();
    for record in records {
        body.push_str(&record.text);
        body.push('\n');
    }
    std::fs::write(path, body)?;
    Ok(())
}

fn write_record(path: &Path, record: &ScanRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::recognize::{RecognitionError, UnavailableRecognizer};
    use crate::testing::{CANVAS_H, CANVAS_W, CARD_H, CARD_W, card_photo, uniform_photo};
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_polygon_mut;
    use imageproc::point::Point as PixelPoint;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every field with a fixed text.
    struct FixedRecognizer(&'static str);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(
            &self,
            _: &DynamicImage,
            hint: &str,
            single_line: bool,
        ) -> std::result::Result<String, RecognitionError> {
            assert_eq!(hint, "tur");
            assert!(single_line);
            Ok(self.0.to_string())
        }
    }

    /// Fails on the first call only.
    struct FlakyRecognizer(AtomicUsize);

    impl TextRecognizer for FlakyRecognizer {
        fn recognize(
            &self,
            _: &DynamicImage,
            _: &str,
            _: bool,
        ) -> std::result::Result<String, RecognitionError> {
            match self.0.fetch_add(1, Ordering::SeqCst) {
                0 => Err(RecognitionError::Failed("smudged".into())),
                n => Ok(format!("line {n}")),
            }
        }
    }

    fn pipeline(dir: &Path, recognizer: Arc<dyn TextRecognizer>) -> CardPipeline {
        let config = PipelineConfig {
            output_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        };
        CardPipeline::new(config, recognizer)
    }

    #[test]
    fn end_to_end_on_rotated_card() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(dir.path(), Arc::new(FixedRecognizer("AHMET")));

        let detection = pipe.detect(&card_photo()).unwrap();
        assert!(detection.success);
        let polygon = detection.polygon.unwrap();
        assert!(polygon.area() >= 0.95 * CARD_W * CARD_H, "area {}", polygon.area());

        let card = detection.rectified_card.unwrap();
        let (w, h) = (card.width() as f32, card.height() as f32);
        assert!((w - CARD_W).abs() <= 0.02 * CARD_W, "width {w}");
        assert!((h - CARD_H).abs() <= 0.02 * CARD_H, "height {h}");

        let result = pipe.process(&card_photo(), "student").unwrap().unwrap();
        assert_eq!(result.source_base_name, "student");
        assert!(result.artifacts.detected_card.exists());
        assert!(result.artifacts.annotated_card.exists());
        assert!(result.artifacts.fields_dir.is_dir());

        // Both ink lines are recognized, in reading order, right of the photo.
        let rows: Vec<u32> = result.field_records.iter().map(|r| r.y).collect();
        assert!(rows.windows(2).all(|w| w[0] <= w[1]), "{rows:?}");
        for bar_top in [100u32, 160] {
            assert!(
                rows.iter().any(|&y| y.abs_diff(bar_top) <= 8),
                "no field near y={bar_top}: {rows:?}"
            );
        }
        for record in &result.field_records {
            assert_eq!(record.text, "AHMET");
            assert!(record.x > 200);
            assert!(record.source_crop.exists());
        }

        let transcript = std::fs::read_to_string(&result.artifacts.transcript).unwrap();
        assert_eq!(transcript.lines().count(), result.field_records.len());
    }

    #[test]
    fn photo_column_yields_no_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(dir.path(), Arc::new(FixedRecognizer("x")));
        let card = pipe.detect(&card_photo()).unwrap().rectified_card.unwrap();

        let segmenter = FieldSegmenter::new(pipe.config().segmenter.clone(), dir.path());
        let segmentation = segmenter.segment(&card, "column").unwrap();
        let photo_zone = pipe.config().segmenter.mask_zones[0];
        for c in &segmentation.candidates {
            let (cx, cy) = c.center();
            assert!(
                !photo_zone.contains(cx, cy, card.width(), card.height()),
                "candidate {c:?} centred in the photo column"
            );
        }
    }

    #[test]
    fn uniform_photo_aborts_with_detection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stages);
        let pipe = pipeline(dir.path(), Arc::new(FixedRecognizer("x")))
            .with_progress(Arc::new(move |stage: PipelineStage| seen.lock().unwrap().push(stage)));

        let detection = pipe.detect(&uniform_photo()).unwrap();
        assert!(!detection.success);
        assert!(detection.rectified_card.is_none() && detection.polygon.is_none());

        assert!(matches!(
            pipe.run(&uniform_photo(), "blank"),
            Err(CardwerkError::DetectionFailure(_))
        ));
        assert!(pipe.process(&uniform_photo(), "blank").unwrap().is_none());
        assert_eq!(
            stages.lock().unwrap()[..2],
            [PipelineStage::DetectingCard, PipelineStage::FailedDetection]
        );
    }

    #[test]
    fn progress_milestones_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stages);
        let observer = move |stage: PipelineStage| seen.lock().unwrap().push(stage.percent());
        let pipe =
            pipeline(dir.path(), Arc::new(FixedRecognizer("x"))).with_progress(Arc::new(observer));

        pipe.run(&card_photo(), "progress").unwrap();
        assert_eq!(*stages.lock().unwrap(), vec![10, 40, 70, 100]);
    }

    #[test]
    fn unavailable_engine_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(dir.path(), Arc::new(UnavailableRecognizer::new("no models")));
        assert!(matches!(
            pipe.process(&card_photo(), "card"),
            Err(CardwerkError::RecognitionUnavailable(_))
        ));
    }

    #[test]
    fn unavailable_engine_fails_card_without_fields() {
        // A clean card: located and segmented, but nothing to recognize.
        let mut canvas = RgbImage::from_pixel(CANVAS_W, CANVAS_H, Rgb([40, 40, 40]));
        let corners = [
            PixelPoint::new(100, 75),
            PixelPoint::new(700, 75),
            PixelPoint::new(700, 425),
            PixelPoint::new(100, 425),
        ];
        draw_polygon_mut(&mut canvas, &corners, Rgb([250, 250, 250]));
        let blank_card = DynamicImage::ImageRgb8(canvas);

        let dir = tempfile::tempdir().unwrap();
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stages);
        let observer = move |stage: PipelineStage| seen.lock().unwrap().push(stage);
        let pipe = pipeline(dir.path(), Arc::new(UnavailableRecognizer::new("no models")))
            .with_progress(Arc::new(observer));

        assert!(matches!(
            pipe.process(&blank_card, "clean"),
            Err(CardwerkError::RecognitionUnavailable(_))
        ));
        let stages = stages.lock().unwrap();
        assert!(stages.contains(&PipelineStage::ExtractingFields));
        assert!(!stages.contains(&PipelineStage::PerformingOcr));
        assert!(!stages.contains(&PipelineStage::Completed));
    }

    #[test]
    fn empty_text_produces_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(dir.path(), Arc::new(FixedRecognizer("   ")));
        let result = pipe.run(&card_photo(), "empty").unwrap();
        assert!(result.field_records.is_empty());
        let transcript = std::fs::read_to_string(&result.artifacts.transcript).unwrap();
        assert!(transcript.is_empty());
    }

    #[test]
    fn failed_and_missing_crops_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(dir.path(), Arc::new(FlakyRecognizer(AtomicUsize::new(0))));

        let crop = dir.path().join("250_40.jpg");
        ImageProcessor::from_dynamic(DynamicImage::new_rgb8(60, 20)).save(&crop).unwrap();
        let candidate = |y: u32, path: PathBuf| FieldCandidate {
            x: 250,
            y,
            width: 50,
            height: 12,
            crop_path: path,
        };
        let selected = vec![
            candidate(10, crop.clone()),
            candidate(20, dir.path().join("missing.jpg")),
            candidate(40, crop.clone()),
        ];

        let records = pipe.recognize_fields(&selected).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].y, 40);
        assert_eq!(records[0].text, "line 1");
        assert_eq!((records[0].width, records[0].height), (60, 20));
    }

    #[test]
    fn process_file_writes_scan_record() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("id_front.png");
        card_photo().save(&photo).unwrap();
        let out = dir.path().join("out");
        let pipe = pipeline(&out, Arc::new(FixedRecognizer("MEHMET")));

        let record = pipe.process_file(&photo).unwrap();
        assert_eq!(record.status, ScanStatus::Completed);
        assert_eq!(record.file_name, "id_front.png");
        assert_eq!(record.card_image_path, Some(out.join("id_front_detected_card.jpg")));

        let json = std::fs::read_to_string(out.join("id_front_scan.json")).unwrap();
        let reloaded: ScanRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded.id, record.id);
        assert_eq!(reloaded.fields, record.fields);
    }

    #[test]
    fn process_file_records_detection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("blank.jpg");
        uniform_photo().save(&photo).unwrap();
        let pipe = pipeline(dir.path(), Arc::new(FixedRecognizer("x")));

        let record = pipe.process_file(&photo).unwrap();
        assert_eq!(record.status, ScanStatus::Failed);
        assert!(record.error_message.unwrap().contains("find the card"));
        assert!(dir.path().join("blank_scan.json").exists());
    }

    #[test]
    fn process_file_rejects_unsupported_types() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(dir.path(), Arc::new(FixedRecognizer("x")));
        assert!(matches!(
            pipe.process_file(dir.path().join("scan.tiff")),
            Err(CardwerkError::UnsupportedInput(_))
        ));
    }
}
