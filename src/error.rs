// src/error.rs

//! Error types for the formula interpreter
//!
//! Every stage error carries enough context (stage input, captured output,
//! resolved values) to reproduce the failure without re-running the build.

use thiserror::Error;

/// Errors raised while loading, resolving, building, installing or verifying
/// a formula
#[derive(Error, Debug)]
pub enum Error {
    /// Static formula configuration is invalid
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    /// A placeholder references a key with no bound value
    #[error("Unresolved variable '{key}' in '{template}'")]
    UnresolvedVariable { key: String, template: String },

    /// Release-mode source has a placeholder checksum and unverified
    /// downloads were not allowed
    #[error("Unverified checksum '{checksum}' for {url}")]
    UnverifiedChecksum { url: String, checksum: String },

    /// A declared build-time dependency is not available on PATH
    #[error("Missing build dependency: {0}")]
    MissingBuildDependency(String),

    /// Source transport failed
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Downloaded content does not match the declared checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Toolchain exited non-zero, timed out or produced no artifact
    #[error("Build failed ({}): {}", describe_exit(.exit_code), .reason)]
    BuildFailed {
        reason: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// The artifact does not expose a capability a post-install step needs
    #[error("Unsupported post-install step '{step}': artifact lacks {capability}")]
    UnsupportedPostInstallStep { step: String, capability: String },

    /// The artifact could not be launched for a test assertion
    #[error("Assertion '{id}' could not launch {program}: {message}")]
    AssertionLaunchError {
        id: String,
        program: String,
        message: String,
    },

    /// The artifact ran but its output or status did not match
    #[error("Assertion '{id}' failed: {message}")]
    AssertionMismatch {
        id: String,
        message: String,
        snippet: String,
    },

    /// One or more smoke test assertions failed
    #[error("Verification failed: {failed} of {total} assertion(s) failed")]
    VerificationFailed { failed: usize, total: usize },

    /// The run was interrupted
    #[error("Cancelled during {0}")]
    Cancelled(String),

    /// A pipeline stage was run out of order
    #[error("Invalid transition: cannot run {stage} from {from}")]
    InvalidTransition { from: String, stage: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code".to_string(),
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl Error {
    /// Stable reason code used in the process exit status
    ///
    /// Combined with the stage index as `stage * 10 + reason`.
    pub fn reason_code(&self) -> u8 {
        match self {
            Error::Cancelled(_) => 0,
            Error::MalformedDescriptor(_) | Error::ParseError(_) => 1,
            Error::UnresolvedVariable { .. } => 2,
            Error::UnverifiedChecksum { .. } => 3,
            Error::DownloadError(_) | Error::ChecksumMismatch { .. } => 4,
            Error::MissingBuildDependency(_) => 5,
            Error::BuildFailed { .. } => 6,
            Error::UnsupportedPostInstallStep { .. } => 7,
            Error::AssertionLaunchError { .. }
            | Error::AssertionMismatch { .. }
            | Error::VerificationFailed { .. } => 8,
            Error::IoError(_) | Error::InvalidTransition { .. } => 9,
        }
    }

    /// Captured output attached to the error, if any
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Error::BuildFailed { output, .. } => Some(output),
            Error::AssertionMismatch { snippet, .. } => Some(snippet),
            _ => None,
        }
    }
}

/// Result type for formula operations
pub type Result<T> = std::result::Result<T, Error>;
