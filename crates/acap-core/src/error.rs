//! Error types for the acappella pipeline
//!
//! Four families matter to the coordinator:
//!
//! - **Fatal**: no window produced output ([`AcappellaError::NoOutput`]), or a
//!   window failed every attempt ([`AcappellaError::Window`]).
//! - **External process**: a required tool exited abnormally or timed out.
//!   Fatal for the enclosing window.
//! - **Recoverable conversion**: pitch-shift failure for one line. Never
//!   propagated; carried inside `ShiftOutcome::Fallback` instead.
//! - **Data integrity**: a pitch or sentinel outside the recognized set.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the acappella pipeline
#[derive(Error, Debug)]
pub enum AcappellaError {
    #[error("No acappella segments produced for {song:?}")]
    NoOutput { song: PathBuf },

    #[error("Command failed (exit code {status:?}): {command}\n{stderr}")]
    ExternalProcess {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out after {seconds:.1}s: {command}")]
    Timeout { command: String, seconds: f64 },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Voice conversion failed: {0}")]
    Conversion(String),

    #[error("Failed to decode audio {path:?}: {reason}")]
    AudioDecode { path: PathBuf, reason: String },

    #[error("Failed to write audio {path:?}: {reason}")]
    AudioEncode { path: PathBuf, reason: String },

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Loudness measurement failed: {0}")]
    Loudness(String),

    #[error("I/O error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed collaborator output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Window {index} failed after {attempts} attempt(s)")]
    Window {
        index: usize,
        attempts: u32,
        #[source]
        source: Box<AcappellaError>,
    },

    #[error("Run cancelled")]
    Cancelled,
}

impl AcappellaError {
    /// Wrap an I/O error together with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was caused by a deadline rather than a failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, AcappellaError>;
