// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Cardwerk.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all Cardwerk operations.
#[derive(Debug, Error)]
pub enum CardwerkError {
    // -- Pipeline-fatal --
    #[error("no card boundary found in {0}")]
    DetectionFailure(String),

    #[error("text recognition engine unavailable: {0}")]
    RecognitionUnavailable(String),

    // -- Per-field (absorbed by the orchestrator) --
    #[error("could not reload field crop {path}: {reason}")]
    CropRead { path: PathBuf, reason: String },

    #[error("text recognition failed: {0}")]
    Recognition(String),

    // -- Image handling --
    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("unsupported input file: {0}")]
    UnsupportedInput(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CardwerkError {
    /// Whether this error ends the whole run rather than a single field.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::CropRead { .. } | Self::Recognition(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CardwerkError>;
