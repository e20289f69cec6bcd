//! Error types and exit code constants for covgate.
//!
//! This module provides a unified error type (`CovError`) covering every
//! failure the engine and the run orchestrator can report, plus a stable
//! mapping to process exit codes.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad flag value, exclusion rule or config)
//! - `3`: Input errors (malformed profile, mode or statement-count conflicts)
//! - `4`: Source resolution errors (missing source, stale profile)
//! - `5`: Untested code (the enforcement gate failed)
//! - `6`: Test run failures (non-zero exit, timeout, cancellation)
//! - `10`: Internal errors (bugs, unexpected I/O failures)
//!
//! `UntestedCode` is a policy outcome rather than a malfunction. Its message
//! always begins with [`UNTESTED_CODE_PREFIX`] so callers can tell it apart
//! from the other classes without matching on the variant.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::profile::{BlockRange, Mode};

/// Fixed prefix of the enforcement failure message.
pub const UNTESTED_CODE_PREFIX: &str = "Error: untested code";

// ============================================================================
// Output Error Codes
// ============================================================================

/// Stable exit codes for each error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad rule, bad config).
    InvalidArguments = 2,
    /// Raw coverage input is inconsistent or corrupted.
    InputError = 3,
    /// Profile could not be mapped back onto the source tree.
    SourceResolution = 4,
    /// Enforcement found untested code.
    UntestedCode = 5,
    /// The underlying test runner failed.
    TestRunFailed = 6,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for the engine and the orchestrator.
#[derive(Debug, Error)]
pub enum CovError {
    /// A raw profile line (or the header) did not parse.
    #[error("malformed profile {origin} at line {line}: {reason}: {content:?}")]
    MalformedProfile {
        origin: String,
        line: usize,
        content: String,
        reason: String,
    },

    /// Two inputs declared different counting modes.
    #[error("mode conflict: expected mode {expected}, found mode {found} in {origin}")]
    ModeConflict {
        expected: Mode,
        found: Mode,
        origin: String,
    },

    /// The same block was instrumented with different statement counts.
    #[error(
        "statement count conflict for {file}:{range}: {existing} statements vs {incoming} in {origin}"
    )]
    StatementCountConflict {
        file: String,
        range: BlockRange,
        existing: u32,
        incoming: u32,
        origin: String,
    },

    /// A source file named by the profile could not be read.
    #[error("source unavailable for {file} ({}): {error}", .path.display())]
    SourceUnavailable {
        file: String,
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    /// A source file could not be tokenized.
    #[error("cannot scan {file} at line {line}: {message}")]
    SourceSyntax {
        file: String,
        line: u32,
        message: String,
    },

    /// No top-level declaration contains a zero-hit block.
    #[error("no enclosing declaration for {file}:{range} (profile is stale relative to source)")]
    NoEnclosingDeclaration { file: String, range: BlockRange },

    /// Enforcement failed: untested code that is not excluded.
    #[error("Error: untested code ({declarations} untested declaration(s))")]
    UntestedCode { declarations: usize },

    /// A command-line or template argument was unusable.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// An exclusion rule did not parse.
    #[error("invalid exclusion rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    /// The configuration file did not parse.
    #[error("invalid config {}: {message}", .path.display())]
    InvalidConfig { path: PathBuf, message: String },

    /// A test process exited unsuccessfully.
    #[error("tests failed for {target} ({})", describe_exit(.exit_code))]
    TestRunFailed {
        target: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// A test process exceeded its time limit and was killed.
    #[error("tests for {target} timed out after {timeout:?}")]
    TestRunTimedOut { target: String, timeout: Duration },

    /// The run was interrupted before all test processes completed.
    #[error("run cancelled before all test targets completed")]
    Cancelled,

    /// Filesystem failure outside of source resolution.
    #[error("I/O error on {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Result alias used throughout covgate.
pub type CovResult<T> = Result<T, CovError>;

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&CovError> for OutputErrorCode {
    fn from(err: &CovError) -> Self {
        match err {
            CovError::InvalidArgument { .. }
            | CovError::InvalidRule { .. }
            | CovError::InvalidConfig { .. } => OutputErrorCode::InvalidArguments,
            CovError::MalformedProfile { .. }
            | CovError::ModeConflict { .. }
            | CovError::StatementCountConflict { .. } => OutputErrorCode::InputError,
            CovError::SourceUnavailable { .. }
            | CovError::SourceSyntax { .. }
            | CovError::NoEnclosingDeclaration { .. } => OutputErrorCode::SourceResolution,
            CovError::UntestedCode { .. } => OutputErrorCode::UntestedCode,
            CovError::TestRunFailed { .. }
            | CovError::TestRunTimedOut { .. }
            | CovError::Cancelled => OutputErrorCode::TestRunFailed,
            CovError::Io { .. } | CovError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<CovError> for OutputErrorCode {
    fn from(err: CovError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl CovError {
    /// Create a malformed-profile error for one offending line.
    pub fn malformed(
        origin: impl Into<String>,
        line: usize,
        content: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CovError::MalformedProfile {
            origin: origin.into(),
            line,
            content: content.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        CovError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an I/O error tagged with the path involved.
    pub fn io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        CovError::Io {
            path: path.into(),
            error,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        CovError::Internal {
            message: message.into(),
        }
    }

    /// True for the enforcement outcome, false for every tool malfunction.
    pub fn is_untested_code(&self) -> bool {
        matches!(self, CovError::UntestedCode { .. })
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
