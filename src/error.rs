//! Unified error type for the conversion pipeline.
//!
//! All subsystem errors (dispatch, aggregation, container introspection,
//! script resolution, download, filesystem) are consolidated into a single
//! `ConversionError` enum. The embedding process maps fatal errors to a
//! non-zero exit status via [`ConversionError::exit_code`].

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all conversion operations.
#[derive(Debug, Error)]
pub enum ConversionError {
    // --- Dispatch errors ---
    /// No converter is registered for the source file's extension.
    #[error("Unknown source format: '.{extension}' has no registered converter")]
    UnknownFormat {
        /// The lowercased extension that failed to dispatch.
        extension: String,
    },

    // --- Shape errors ---
    /// The kernel produced a null or otherwise unusable shape.
    ///
    /// Recoverable under the tolerant aggregation policy, fatal under the
    /// strict policy.
    #[error("Invalid or null shape: {reason}")]
    InvalidShape {
        /// Kernel-provided description of what is wrong with the shape.
        reason: String,
    },

    /// A whole-file aggregation finished with zero successful shapes.
    #[error("No convertible shapes in '{source_file}'")]
    NoConvertibleShapes {
        /// Human-readable identification of the source file.
        source_file: String,
    },

    // --- Script resolution errors ---
    /// Stage 1 probe: the script exposes no part capability.
    ///
    /// This is the only error that triggers the assembly fallback; it never
    /// escapes the resolver.
    #[error("Script '{script}' exposes no part definition")]
    NoPartDefinition {
        /// Path to the user script.
        script: PathBuf,
    },

    /// Terminal script failure: neither a part nor an assembly resolved.
    #[error("Script '{script}' resolved neither a part nor an assembly")]
    ScriptResolution {
        /// Path to the user script.
        script: PathBuf,
    },

    /// The script subprocess exited with an unexpected status.
    #[error("Script execution failed with code {code}: {stderr}")]
    ScriptFailed {
        /// The exit code.
        code: i32,
        /// Captured stderr output.
        stderr: String,
        /// Captured stdout output.
        stdout: String,
    },

    /// The script subprocess exceeded the configured timeout.
    #[error("Script execution timed out after {timeout_seconds}s")]
    ScriptTimeout {
        /// The timeout that was exceeded.
        timeout_seconds: u64,
    },

    /// Cloning or checking out the external assembly repository failed.
    #[error("Checkout of '{url}' failed with code {code}: {stderr}")]
    CheckoutFailed {
        /// The repository URL.
        url: String,
        /// git exit code.
        code: i32,
        /// Captured stderr output.
        stderr: String,
    },

    // --- Source acquisition errors ---
    /// Downloading the source file failed.
    #[error("Download of '{url}' failed: {message}")]
    Download {
        /// The URL that was fetched.
        url: String,
        /// Description of the failure.
        message: String,
    },

    // --- Container errors ---
    /// A stepzip archive contained no STEP file.
    #[error("Archive '{path}' contains no STEP file")]
    MissingStepInArchive {
        /// Path to the archive.
        path: PathBuf,
    },

    /// Archive contains too many files.
    #[error("Archive contains {count} files, exceeding limit of {limit}")]
    ZipTooManyFiles {
        /// Actual count of files in the archive.
        count: usize,
        /// Maximum allowed files.
        limit: usize,
    },

    /// Archive extraction exceeded the total size limit.
    #[error("Archive extraction exceeded {limit} byte size limit")]
    ZipSizeExceeded {
        /// Maximum allowed bytes.
        limit: u64,
    },

    // --- Collaborator errors ---
    /// The geometry kernel reported a failure unrelated to shape validity.
    #[error("Geometry kernel error: {message}")]
    Kernel {
        /// Kernel-provided description.
        message: String,
    },

    // --- Generic errors ---
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP library error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parse error in a container document.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Artifact serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration load error.
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Path contains invalid UTF-8.
    #[error("Path is not valid UTF-8: {path}")]
    InvalidUtf8Path {
        /// The offending path.
        path: PathBuf,
    },
}

impl ConversionError {
    /// Whether the error is a per-shape failure the tolerant aggregation
    /// policy may skip. Everything else surfaces to the caller.
    pub fn is_recoverable_per_shape(&self) -> bool {
        matches!(
            self,
            ConversionError::InvalidShape { .. } | ConversionError::Kernel { .. }
        )
    }

    /// Process exit status for the embedding entry point.
    ///
    /// Unknown formats are configuration-class and exit 2; all other fatal
    /// errors exit 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConversionError::UnknownFormat { .. } => 2,
            _ => 1,
        }
    }
}
