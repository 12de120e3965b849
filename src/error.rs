//! Error types for the edgequake-tiv library.
//!
//! Two distinct kinds of outcome reflect the two failure modes of the
//! workflow:
//!
//! * [`TivError`] is **stage-fatal**: the stage that raised it produced
//!   nothing and the workflow state is left exactly as it was before the
//!   stage started. The user re-triggers the stage manually; nothing is
//!   retried automatically.
//!
//! * [`Advisory`] is **non-fatal**: the stage completed, but with degraded
//!   output (e.g. the final PDF could not be stamped because the source had
//!   no readable QR code). Advisories travel alongside the stage result.
//!
//! A failed QR decode is neither: it is recorded as
//! [`crate::record::RecognizerStatus::Failed`] and a `None` verification code.

use crate::workflow::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All stage-fatal errors returned by the edgequake-tiv library.
#[derive(Debug, Error)]
pub enum TivError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source or template file has the wrong media type.
    #[error("'{name}' is not a valid {expected} file: {detail}")]
    InvalidFileType {
        name: String,
        expected: &'static str,
        detail: String,
    },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// A record edit named a field the TIV layout does not have.
    #[error("Unknown record field '{name}'")]
    UnknownField { name: String },

    // ── Stage errors ──────────────────────────────────────────────────────
    /// Rasterisation failed, in either direction (PDF → bitmap or
    /// document → bitmap → PDF).
    #[error("Rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// The structured-field recogniser returned nothing usable.
    #[error("Field extraction failed: {detail}")]
    ExtractionFailed { detail: String },

    /// The DOCX template could not be parsed or filled.
    #[error("Template error: {detail}")]
    TemplateFailed { detail: String },

    /// A stage was invoked before the artifact it consumes exists.
    #[error("Cannot run {stage}: {missing} is not available yet.\nComplete the previous step first.")]
    PrecursorMissing { stage: Stage, missing: &'static str },

    /// QR image generation or PDF stamping failed.
    #[error("QR embedding failed: {detail}")]
    EmbedFailed { detail: String },

    // ── Environment errors ────────────────────────────────────────────────
    /// A required external collaborator is not available on this machine.
    #[error("Missing dependency '{dependency}': {detail}\n{hint}")]
    MissingDependency {
        dependency: &'static str,
        detail: String,
        hint: &'static str,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TivError {
    pub(crate) fn render(detail: impl Into<String>) -> Self {
        TivError::RenderFailed {
            detail: detail.into(),
        }
    }

    pub(crate) fn extraction(detail: impl Into<String>) -> Self {
        TivError::ExtractionFailed {
            detail: detail.into(),
        }
    }

    pub(crate) fn template(detail: impl Into<String>) -> Self {
        TivError::TemplateFailed {
            detail: detail.into(),
        }
    }

    pub(crate) fn embed(detail: impl Into<String>) -> Self {
        TivError::EmbedFailed {
            detail: detail.into(),
        }
    }
}

/// A non-fatal notice attached to a completed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum Advisory {
    /// The record carries no QR payload; the final PDF equals the rendered one.
    #[error("No QR data was detected in the source document; the final PDF is not stamped.")]
    NoVerificationCode,
}
