// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable failure causes for scans.
//
// Every technical error is mapped to plain English with a clear suggestion so
// that a failed scan can be reported to the person holding the card.

use crate::error::CardwerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Worth trying again as-is (temporary I/O hiccup).
    Transient,
    /// The user must do something (retake the photo, fix a setting).
    ActionRequired,
    /// Cannot be fixed by retrying: missing engine, corrupt input.
    Permanent,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Transient => "temporary",
            Self::ActionRequired => "action needed",
            Self::Permanent => "permanent",
        })
    }
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether retrying the same input can help.
    pub retriable: bool,
    pub severity: Severity,
}

impl std::fmt::Display for HumanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.message, self.suggestion)
    }
}

/// Convert a `CardwerkError` into a cause string a card holder can act on.
pub fn humanize_error(err: &CardwerkError) -> HumanError {
    match err {
        CardwerkError::DetectionFailure(_) => HumanError {
            message: "We couldn't find the card in this photo.".into(),
            suggestion: "Place the card on a plain, dark surface so all four corners are visible, then take the photo again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        CardwerkError::RecognitionUnavailable(detail) => HumanError {
            message: "Text reading isn't set up on this machine.".into(),
            suggestion: format!(
                "Install the OCR model files and point the configuration at them. ({detail})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        CardwerkError::CropRead { path, .. } => HumanError {
            message: "One of the card's text areas couldn't be read back.".into(),
            suggestion: format!(
                "Check that the output folder is writable and not being cleaned up while scanning ({}).",
                path.display()
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        CardwerkError::Recognition(_) => HumanError {
            message: "Some text on the card couldn't be read.".into(),
            suggestion: "Try a sharper photo with even lighting and no glare on the card.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        CardwerkError::ImageError(detail) => {
            if detail.contains("decode") || detail.contains("open") {
                HumanError {
                    message: "This photo couldn't be opened.".into(),
                    suggestion: "The file may be damaged or not a picture. Try saving it again as JPEG or PNG.".into(),
                    retriable: false,
                    severity: Severity::Permanent,
                }
            } else {
                HumanError {
                    message: "There was a problem processing the photo.".into(),
                    suggestion: format!("Try again. If this keeps happening, please report it. ({detail})"),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        CardwerkError::UnsupportedInput(name) => HumanError {
            message: "This file type isn't supported.".into(),
            suggestion: format!("Use a JPEG, PNG or BMP photo instead of {name}."),
            retriable: false,
            severity: Severity::Permanent,
        },

        CardwerkError::Config(detail) => HumanError {
            message: "The scanner settings are invalid.".into(),
            suggestion: format!("Fix the configuration file and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        CardwerkError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "It may have been moved or deleted. Try choosing the file again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "We don't have permission to use that file or folder.".into(),
                    suggestion: "Check the permissions of the input photo and the output folder.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        CardwerkError::Serialization(_) => HumanError {
            message: "The scan results couldn't be saved.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_failure_asks_for_new_photo() {
        let human = humanize_error(&CardwerkError::DetectionFailure("blank.jpg".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
        assert!(human.message.contains("find the card"));
    }

    #[test]
    fn missing_engine_is_permanent() {
        let err = CardwerkError::RecognitionUnavailable("models not found".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Permanent);
        assert!(human.suggestion.contains("models not found"));
    }

    #[test]
    fn decode_failure_is_permanent() {
        let err = CardwerkError::ImageError("failed to decode photo: bad header".into());
        assert_eq!(humanize_error(&err).severity, Severity::Permanent);
    }

    #[test]
    fn missing_file_is_action_required() {
        let err = CardwerkError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(humanize_error(&err).severity, Severity::ActionRequired);
    }

    #[test]
    fn severity_labels() {
        assert_eq!(Severity::Transient.to_string(), "temporary");
        assert_eq!(Severity::ActionRequired.to_string(), "action needed");
    }

    #[test]
    fn per_field_errors_are_not_fatal() {
        let crop = CardwerkError::CropRead {
            path: "out/a_fields/1_2.jpg".into(),
            reason: "truncated".into(),
        };
        assert!(!crop.is_fatal());
        assert!(!CardwerkError::Recognition("x".into()).is_fatal());
        assert!(CardwerkError::DetectionFailure("x".into()).is_fatal());
        assert!(CardwerkError::RecognitionUnavailable("x".into()).is_fatal());
    }
}
