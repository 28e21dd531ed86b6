// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hooks for watching a scan from the outside: coarse progress milestones and
// intermediate images.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use cardwerk_core::PipelineStage;
use image::DynamicImage;
use tracing::warn;

/// Receives progress milestones as the pipeline moves through its stages.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, stage: PipelineStage);
}

impl<F> ProgressObserver for F
where
    F: Fn(PipelineStage) + Send + Sync,
{
    fn on_progress(&self, stage: PipelineStage) {
        self(stage)
    }
}

/// Receives intermediate images (edge maps, masks, annotated frames).
///
/// Implementations must not fail the scan; errors are theirs to swallow.
pub trait DebugObserver: Send + Sync {
    fn inspect(&self, label: &str, image: &DynamicImage);
}

/// Writes every inspected image to `{dir}/{NN}_{label}.png`, numbered in
/// the order they arrive.
pub struct DebugDumpObserver {
    dir: PathBuf,
    counter: AtomicUsize,
}

impl DebugDumpObserver {
    /// Create the observer, creating `dir` if needed.
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            counter: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DebugObserver for DebugDumpObserver {
    fn inspect(&self, label: &str, image: &DynamicImage) {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("{n:02}_{label}.png"));
        if let Err(err) = image.save(&path) {
            warn!(path = %path.display(), error = %err, "Failed to write debug image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::sync::Mutex;

    #[test]
    fn closures_observe_progress() {
        let seen = Mutex::new(Vec::new());
        let observer = |stage: PipelineStage| seen.lock().unwrap().push(stage.percent());
        observer.on_progress(PipelineStage::DetectingCard);
        observer.on_progress(PipelineStage::Completed);
        assert_eq!(*seen.lock().unwrap(), vec![10, 100]);
    }

    #[test]
    fn dump_observer_numbers_files() {
        let dir = tempfile::tempdir().unwrap();
        let observer = DebugDumpObserver::new(dir.path().join("debug")).unwrap();
        let img = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        observer.inspect("edges", &img);
        observer.inspect("mask", &img);
        assert!(observer.dir().join("00_edges.png").exists());
        assert!(observer.dir().join("01_mask.png").exists());
    }
}
