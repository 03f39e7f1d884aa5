//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout cockroach-doctor.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `InvalidScheme`, `DuplicateParameter`, `ConfigError`: configuration errors,
//!   always detected before any network attempt and never retried
//! - `PromptFailed`: the operator input channel could not be read
//! - `Unreachable`: a failure category the connection tester has no handling for
//! - `OutputFailed`: diagnostic text could not be written
//! - `QueryFailed`: post-connect SQL failed (database listing, user lookup)
//! - `TokenIssueFailed`, `TokenRejected`: bearer token signing or validation
//!
//! Classified connection failures are not errors: they are absorbed into a
//! [`Diagnosis`](crate::diagnose::Diagnosis).

use thiserror::Error;

/// Internal diagnostic code attached to every unreachable-state report
pub const UNREACHABLE_CODE: &str = "2019-05-27-1";

/// Main error type for cockroach-doctor operations
#[derive(Error, Debug)]
pub enum DoctorError {
    /// URL scheme is not one of the accepted aliases
    #[error(
        "Was expecting connection string to start with 'postgres://' but instead found {found}://"
    )]
    InvalidScheme { found: String },

    /// A querystring parameter was given more than once
    #[error(
        "Querystring contains duplicate values: {field}: {values:?}\n\
         Please assign only one value for each querystring parameter."
    )]
    DuplicateParameter { field: String, values: Vec<String> },

    /// Configuration error (malformed URL, config file problems, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operator input could not be read
    #[error("Prompt failed: {0}")]
    PromptFailed(String),

    /// A failure reached a branch that should never be touched
    #[error(
        "Reached a point in the code that should never have been touched. \
         Please email {support}.\n\nError code is {code}.\n \
         Original error text:\n\n----------{detail}"
    )]
    Unreachable { code: &'static str, support: String, detail: String },

    /// Diagnostic output could not be written
    #[error("Output failed: {0}")]
    OutputFailed(String),

    /// Post-connect query failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// A bearer token could not be issued
    #[error("Token issuance failed: {0}")]
    TokenIssueFailed(String),

    /// A bearer token was rejected
    #[error("Invalid token: {0}")]
    TokenRejected(TokenFailure),
}

/// Why a bearer token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFailure {
    /// Not a decodable token
    Malformed,
    /// Past its expiry time
    Expired,
    /// Signed with another key, or altered after signing
    BadSignature,
}

impl std::fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Malformed => "token is malformed",
            Self::Expired => "token has expired",
            Self::BadSignature => "token signature does not verify",
        })
    }
}

impl DoctorError {
    /// Convert error to error code string for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidScheme { .. } => "INVALID_SCHEME",
            Self::DuplicateParameter { .. } => "DUPLICATE_PARAMETER",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::PromptFailed(_) => "PROMPT_FAILED",
            Self::Unreachable { .. } => "UNREACHABLE_STATE",
            Self::OutputFailed(_) => "OUTPUT_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::TokenIssueFailed(_) => "TOKEN_ISSUE_FAILED",
            Self::TokenRejected(_) => "TOKEN_REJECTED",
        }
    }

    /// Whether this error was raised while building the connection descriptor
    ///
    /// Configuration errors are surfaced to the caller and never retried.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidScheme { .. } | Self::DuplicateParameter { .. } | Self::ConfigError(_)
        )
    }

    /// Get human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create an invalid scheme error
    pub fn invalid_scheme(found: impl Into<String>) -> Self {
        Self::InvalidScheme { found: found.into() }
    }

    /// Create a duplicate querystring parameter error
    pub fn duplicate_parameter(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::DuplicateParameter { field: field.into(), values }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a prompt failure
    pub fn prompt_failed(message: impl Into<String>) -> Self {
        Self::PromptFailed(message.into())
    }

    /// Wrap a failure that reached an unhandled category
    pub fn unreachable(support: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unreachable { code: UNREACHABLE_CODE, support: support.into(), detail: detail.into() }
    }

    /// Create an output failure
    pub fn output_failed(message: impl Into<String>) -> Self {
        Self::OutputFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create a token issuance error
    pub fn token_issue_failed(message: impl Into<String>) -> Self {
        Self::TokenIssueFailed(message.into())
    }

    /// Create a token rejection
    pub const fn token_rejected(failure: TokenFailure) -> Self {
        Self::TokenRejected(failure)
    }
}

impl From<std::io::Error> for DoctorError {
    fn from(err: std::io::Error) -> Self {
        Self::output_failed(err.to_string())
    }
}

/// Result type alias for cockroach-doctor operations
pub type Result<T> = std::result::Result<T, DoctorError>;
