//! Error types for `flowgen`
//!
//! Configuration and phase errors are fatal to a suite run and map to
//! process exit codes. Flow and request errors are per-execution: they are
//! caught by the engine and surfaced as outcomes and result
//! classifications, never propagated to the phase loop.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `flowgen` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Phase error (invalid ramp, no eligible flows)
    pub const PHASE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `flowgen` operations.
#[derive(Debug, Error)]
pub enum FlowgenError {
    /// Suite file loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Phase setup error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Run stopped by a signal before the suite finished
    #[error("interrupted")]
    Interrupted,
}

impl FlowgenError {
    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Phase(_) => ExitCode::PHASE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
            Self::Interrupted => ExitCode::INTERRUPTED,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Suite file loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the suite file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Suite validation failed
    #[error("validation failed for {path}: {}", summarize(.errors))]
    ValidationError {
        /// Path to the suite file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced suite file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in the suite file is not set
    #[error("environment variable '{var}' not set ({location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Message supplied with the `${VAR:?message}` reference
        location: String,
    },

    /// A flow entry references a flow type that is not registered
    #[error("unknown flow type '{name}'{}", did_you_mean(.suggestion))]
    UnknownFlow {
        /// The unresolved flow type name
        name: String,
        /// Closest registered name, if any is similar enough
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default()
}

fn summarize(errors: &[ValidationIssue]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during suite validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "phases[2].duration")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the suite from being run
    Error,
    /// Reported but does not prevent the run
    Warning,
}

// ============================================================================
// Phase Errors
// ============================================================================

/// Errors raised while preparing or driving a phase.
///
/// All of these are configuration problems detected at phase start and
/// are fatal to the suite run.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Ramp parameters are unusable
    #[error("invalid ramp for phase '{phase}': {reason}")]
    InvalidRamp {
        /// Phase name
        phase: String,
        /// What is wrong with the parameters
        reason: String,
    },

    /// The phase has a nonzero rate but no flow may run during it
    #[error("phase '{phase}' has a nonzero flow rate but no eligible flows")]
    NoEligibleFlows {
        /// Phase name
        phase: String,
    },

    /// The eligible flows have a total weight of zero
    #[error("eligible flows for phase '{phase}' have a total weight of zero")]
    InvalidWeights {
        /// Phase name
        phase: String,
    },
}

// ============================================================================
// Execution Errors
// ============================================================================

/// Error raised by a user flow's `setup` or `run`.
///
/// Never fatal: the engine records it as the flow's outcome.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The flow gave up with a message
    #[error("flow failed: {0}")]
    Failed(String),

    /// A request the flow depended on did not produce a usable result
    #[error("request '{name}' failed: {result}")]
    Request {
        /// Request name
        name: String,
        /// Result classification of the failed request
        result: String,
    },

    /// `setup` or `run` panicked
    #[error("flow panicked: {0}")]
    Panicked(String),
}

/// Error raised by a request implementation's `run`.
///
/// Converted into a result classification by the request lifecycle so
/// that reporting tallies it next to successful results.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request did not complete within its timeout
    #[error("request timed out")]
    Timeout,

    /// A connection to the target could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be built (bad URL, header, or method)
    #[error("invalid request: {0}")]
    Invalid(String),

    /// The response body could not be read
    #[error("body error: {0}")]
    Body(String),

    /// Any other transport failure
    #[error("request error: {0}")]
    Other(String),
}

impl RequestError {
    /// Short token used as the result classification for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect(_) => "connect",
            Self::Invalid(_) => "invalid_request",
            Self::Body(_) => "body",
            Self::Other(_) => "request",
        }
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `flowgen` operations.
pub type Result<T> = std::result::Result<T, FlowgenError>;

// ============================================================================
// Tests
// ============================================================================
