// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardwerk: command-line entry point.
//
// `cardwerk scan` reads one photograph, `cardwerk batch` every photograph in a
// directory. Scans are CPU-bound and run on the blocking pool; the batch
// command bounds how many run at once with a semaphore.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::human_errors::{HumanError, Severity, humanize_error};
use cardwerk_core::{InputType, PipelineConfig, ScanRecord, ScanStatus};
use cardwerk_document::{CardPipeline, DebugDumpObserver, TextRecognizer, UnavailableRecognizer};
use clap::{Args, Parser, Subcommand};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cardwerk", version)]
#[command(about = "Locate an identity card in a photo and read its fields")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read a single photograph
    Scan {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[command(flatten)]
        common: CommonArgs,

        /// Write intermediate images (edge maps, masks) to this directory
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
    /// Read every JPEG, PNG and BMP photograph in a directory
    Batch {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        #[command(flatten)]
        common: CommonArgs,

        /// Number of photographs processed at once
        #[arg(short, long, default_value_t = 2)]
        jobs: usize,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Output directory for crops, annotated card and results
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// JSON pipeline configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding text-detection.rten and text-recognition.rten
    #[arg(long, value_name = "DIR", env = "CARDWERK_OCR_MODELS")]
    models: Option<PathBuf>,

    /// Text detection model file, overriding --models
    #[arg(long, value_name = "FILE", requires = "recognition_model")]
    detection_model: Option<PathBuf>,

    /// Text recognition model file, overriding --models
    #[arg(long, value_name = "FILE", requires = "detection_model")]
    recognition_model: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Scan {
            image,
            common,
            debug_out,
        } => scan(image, common, debug_out).await,
        Command::Batch { dir, common, jobs } => batch(dir, common, jobs).await,
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "cardwerk failed");
            let human = humanize_error(&err);
            eprintln!("error: {}", human.message);
            eprintln!("       {}", human.suggestion);
            if human.retriable {
                eprintln!("       Running the command again may help.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn scan(image: PathBuf, common: CommonArgs, debug_out: Option<PathBuf>) -> Result<ExitCode> {
    let mut pipeline = build_pipeline(&common)?;
    if let Some(dir) = debug_out {
        pipeline = pipeline.with_debug(Arc::new(DebugDumpObserver::new(dir)?));
    }

    let record = tokio::task::spawn_blocking(move || pipeline.process_file(&image))
        .await
        .map_err(|err| CardwerkError::ImageError(format!("scan task panicked: {err}")))??;

    print_record(&record);
    Ok(match record.status {
        ScanStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn batch(dir: PathBuf, common: CommonArgs, jobs: usize) -> Result<ExitCode> {
    let photos = collect_photos(&dir)?;
    info!(count = photos.len(), dir = %dir.display(), "Batch started");
    if photos.is_empty() {
        println!("No JPEG, PNG or BMP files in {}", dir.display());
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline = Arc::new(build_pipeline(&common)?);
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let mut handles = Vec::with_capacity(photos.len());

    for photo in photos {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = pipeline.process_file(&photo);
            (photo, outcome)
        }));
    }

    let mut summary = BatchSummary::default();
    for handle in handles {
        match handle.await {
            Ok((photo, Ok(record))) => summary.add_record(&photo, &record),
            Ok((photo, Err(err))) => {
                warn!(photo = %photo.display(), error = %err, "Scan failed");
                summary.add_error(&photo, &err);
            }
            Err(err) => {
                warn!(error = %err, "Scan task panicked");
                summary.failed += 1;
                summary.total += 1;
            }
        }
    }

    print!("{summary}");
    Ok(if summary.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn build_pipeline(common: &CommonArgs) -> Result<CardPipeline> {
    let mut config = match &common.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(output) = &common.output {
        config.output_dir = output.clone();
    }
    Ok(CardPipeline::new(config, build_recognizer(common)))
}

#[cfg(feature = "ocr")]
fn build_recognizer(common: &CommonArgs) -> Arc<dyn TextRecognizer> {
    use cardwerk_document::{OcrConfig, OcrsRecognizer};

    let config = match (&common.detection_model, &common.recognition_model) {
        (Some(detection), Some(recognition)) => OcrConfig::from_paths(detection, recognition),
        _ => common
            .models
            .as_deref()
            .map(OcrConfig::from_dir)
            .unwrap_or_default(),
    };
    match OcrsRecognizer::new(config) {
        Ok(recognizer) => Arc::new(recognizer),
        Err(err) => {
            warn!(error = %err, "OCR engine unavailable");
            Arc::new(UnavailableRecognizer::new(err.to_string()))
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn build_recognizer(_common: &CommonArgs) -> Arc<dyn TextRecognizer> {
    Arc::new(UnavailableRecognizer::new(
        "cardwerk was built without the `ocr` feature",
    ))
}

/// Supported photographs directly inside `dir`, sorted by name.
fn collect_photos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut photos = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(InputType::from_extension)
            .is_some();
        if path.is_file() && supported {
            photos.push(path);
        }
    }
    photos.sort();
    Ok(photos)
}

fn print_record(record: &ScanRecord) {
    match record.status {
        ScanStatus::Completed => {
            println!("{}: {} field(s)", record.file_name, record.fields.len());
            for field in &record.fields {
                println!("  ({:>4}, {:>4})  {}", field.x, field.y, field.text);
            }
        }
        _ => {
            let cause = record.error_message.as_deref().unwrap_or("unknown error");
            println!("{}: failed. {}", record.file_name, cause);
        }
    }
}

/// Totals printed at the end of a batch.
#[derive(Debug, Default)]
struct BatchSummary {
    total: usize,
    completed: usize,
    failed: usize,
    /// `(file name, recognized field count)` for completed scans.
    fields_per_card: Vec<(String, usize)>,
    failures: Vec<Failure>,
}

#[derive(Debug)]
struct Failure {
    name: String,
    cause: String,
    /// Known only when the scan ended with an error rather than a record.
    severity: Option<Severity>,
    retriable: bool,
}

impl BatchSummary {
    fn add_record(&mut self, photo: &Path, record: &ScanRecord) {
        self.total += 1;
        let name = display_name(photo);
        if record.status == ScanStatus::Completed {
            self.completed += 1;
            self.fields_per_card.push((name, record.fields.len()));
        } else {
            self.failed += 1;
            self.failures.push(Failure {
                name,
                cause: record.error_message.clone().unwrap_or_default(),
                severity: None,
                retriable: false,
            });
        }
    }

    fn add_error(&mut self, photo: &Path, err: &CardwerkError) {
        self.total += 1;
        self.failed += 1;
        let human: HumanError = humanize_error(err);
        self.failures.push(Failure {
            name: display_name(photo),
            cause: human.to_string(),
            severity: Some(human.severity),
            retriable: human.retriable,
        });
    }

    fn retriable(&self) -> usize {
        self.failures.iter().filter(|f| f.retriable).count()
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Processed {} photo(s): {} completed, {} failed",
            self.total, self.completed, self.failed
        )?;
        for (name, count) in &self.fields_per_card {
            writeln!(f, "  {name}: {count} field(s)")?;
        }
        for failure in &self.failures {
            match failure.severity {
                Some(severity) => {
                    writeln!(f, "  {}: failed ({severity}). {}", failure.name, failure.cause)?
                }
                None => writeln!(f, "  {}: failed. {}", failure.name, failure.cause)?,
            }
        }
        let retriable = self.retriable();
        if retriable > 0 {
            writeln!(f, "{retriable} failure(s) may succeed if run again.")?;
        }
        Ok(())
    }
}

fn display_name(photo: &Path) -> String {
    photo
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| photo.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_only_supported_photos() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "c.bmp", "scan.tiff"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let photos = collect_photos(dir.path()).unwrap();
        let names: Vec<String> = photos.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, ["a.JPG", "b.png", "c.bmp"]);
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = BatchSummary::default();

        let mut done = ScanRecord::new("front.jpg");
        done.status = ScanStatus::Completed;
        summary.add_record(Path::new("in/front.jpg"), &done);

        let mut blank = ScanRecord::new("blank.jpg");
        blank.status = ScanStatus::Failed;
        blank.error_message = Some("We couldn't find the card in this photo.".into());
        summary.add_record(Path::new("in/blank.jpg"), &blank);

        summary.add_error(
            Path::new("in/back.png"),
            &CardwerkError::RecognitionUnavailable("no models".into()),
        );

        assert_eq!((summary.total, summary.completed, summary.failed), (3, 1, 2));
        let text = summary.to_string();
        assert!(text.starts_with("Processed 3 photo(s): 1 completed, 2 failed"));
        assert!(text.contains("front.jpg: 0 field(s)"));
        assert!(text.contains("back.png: failed (permanent)."));
        assert!(text.contains("blank.jpg: failed. We couldn't"));
        assert_eq!(summary.retriable(), 0);
    }

    #[test]
    fn summary_counts_retriable_failures() {
        let mut summary = BatchSummary::default();
        let disk = std::io::Error::other("disk hiccup");
        summary.add_error(Path::new("in/a.jpg"), &CardwerkError::Io(disk));
        assert_eq!(summary.retriable(), 1);
        let text = summary.to_string();
        assert!(text.contains("a.jpg: failed (temporary)."));
        assert!(text.contains("1 failure(s) may succeed if run again."));
    }

    #[test]
    fn model_files_must_come_in_pairs() {
        let args = ["cardwerk", "scan", "id.jpg", "--detection-model", "det.rten"];
        assert!(Cli::try_parse_from(args).is_err());

        let cli = Cli::try_parse_from([
            "cardwerk",
            "scan",
            "id.jpg",
            "--detection-model",
            "det.rten",
            "--recognition-model",
            "rec.rten",
        ])
        .unwrap();
        match cli.command {
            Command::Scan { common, .. } => {
                assert_eq!(common.detection_model, Some(PathBuf::from("det.rten")));
                assert_eq!(common.recognition_model, Some(PathBuf::from("rec.rten")));
            }
            Command::Batch { .. } => panic!("expected scan"),
        }
    }

    #[test]
    fn cli_parses_batch_jobs() {
        let args = ["cardwerk", "batch", "photos", "--jobs", "4", "-o", "out"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Batch { dir, common, jobs } => {
                assert_eq!(dir, PathBuf::from("photos"));
                assert_eq!(jobs, 4);
                assert_eq!(common.output, Some(PathBuf::from("out")));
            }
            Command::Scan { .. } => panic!("expected batch"),
        }
    }
}
