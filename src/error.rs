//! Error types for the edgequake-x2t library.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`X2tError`]: everything a caller of the `convert*` entry points can
//!   see. Returned as `Err(X2tError)`; there is never a partial
//!   [`crate::output::ConversionResult`] alongside it.
//!
//! * [`EngineLoadError`]: the outcome of a failed engine load. It is
//!   `Clone` because a single in-flight load is shared by every concurrent
//!   caller of [`crate::converter::X2tConverter::initialize`]; each of them
//!   receives its own copy and converts it into an [`X2tError`].
//!
//! Failures while purging the working directory are deliberately absent:
//! they are logged and collected in [`crate::pipeline::workspace::PurgeReport`]
//! but never fail the enclosing operation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The materialization strategy that failed.
///
/// Carried by [`X2tError::Materialization`] so the message always names the
/// failing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeStage {
    FileRead,
    BlobRead,
    HttpFetch,
    ObjectUrl,
    FileUrl,
    DataUrl,
    TextEncode,
}

impl fmt::Display for MaterializeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MaterializeStage::FileRead => "file read",
            MaterializeStage::BlobRead => "blob read",
            MaterializeStage::HttpFetch => "URL download",
            MaterializeStage::ObjectUrl => "object URL",
            MaterializeStage::FileUrl => "file URL",
            MaterializeStage::DataUrl => "data URL",
            MaterializeStage::TextEncode => "text encode",
        };
        f.write_str(s)
    }
}

/// All errors returned by the edgequake-x2t library.
#[derive(Debug, Error)]
pub enum X2tError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The materializer has no strategy for this representation.
    #[error("Unsupported input representation: {tag}")]
    ClassificationUnsupported { tag: String },

    /// Reading, fetching or decoding the input failed.
    #[error("{stage} failed: {reason}")]
    Materialization {
        stage: MaterializeStage,
        reason: String,
    },

    // ── Request errors ────────────────────────────────────────────────────
    /// Extension is not in the document category map.
    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    /// File name was empty or nothing survived sanitisation.
    #[error("Invalid file name '{name}': nothing left after sanitisation")]
    InvalidName { name: String },

    /// Extra engine directive has a name that is not a plain XML element name.
    #[error("Invalid engine directive name '{name}'")]
    InvalidDirective { name: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// A conversion was attempted before the engine finished loading and
    /// auto-initialisation is disabled.
    #[error("x2t engine is not initialised.\nCall initialize() first or enable auto_initialize.")]
    EngineNotReady,

    /// The engine did not signal readiness within the configured bound.
    #[error("x2t initialisation timeout after {ms}ms")]
    EngineTimeout { ms: u64 },

    /// The engine loader reported an error.
    #[error("Failed to load x2t engine: {reason}")]
    EngineLoadFailed { reason: String },

    /// The engine ran but returned a non-zero status.
    #[error("Conversion failed with code: {code}")]
    EngineStatus { code: i32 },

    /// The engine call itself failed (could not be started, crashed, …).
    #[error("x2t engine call failed: {source}")]
    EngineCall {
        #[source]
        source: std::io::Error,
    },

    // ── Workspace errors ──────────────────────────────────────────────────
    /// A read or write on the engine filesystem failed.
    #[error("Workspace I/O failed on '{path}': {source}")]
    Workspace {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Wraps any failure after the input bytes were materialised.
    #[error("Document conversion failed: {source}")]
    ConversionFailed {
        #[source]
        source: Box<X2tError>,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not write converted bytes to the local file system.
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

impl X2tError {
    /// Wrap `self` as the cause of a [`X2tError::ConversionFailed`].
    pub(crate) fn into_conversion_failure(self) -> X2tError {
        match self {
            already @ X2tError::ConversionFailed { .. } => already,
            other => X2tError::ConversionFailed {
                source: Box::new(other),
            },
        }
    }

    /// The innermost library error, looking through `ConversionFailed`.
    pub fn root_cause(&self) -> &X2tError {
        match self {
            X2tError::ConversionFailed { source } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn workspace(path: &str, source: std::io::Error) -> X2tError {
        X2tError::Workspace {
            path: path.to_string(),
            source,
        }
    }
}

/// Why an engine load did not produce a ready engine.
#[derive(Debug, Clone, Error)]
pub enum EngineLoadError {
    /// The loader did not resolve within the configured bound.
    #[error("x2t initialisation timeout after {ms}ms")]
    Timeout { ms: u64 },

    /// The loader resolved with an error.
    #[error("{0}")]
    Failed(String),
}

impl From<EngineLoadError> for X2tError {
    fn from(e: EngineLoadError) -> Self {
        match e {
            EngineLoadError::Timeout { ms } => X2tError::EngineTimeout { ms },
            EngineLoadError::Failed(reason) => X2tError::EngineLoadFailed { reason },
        }
    }
}
