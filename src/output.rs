//! JSON Output Envelope Types
//!
//! With `--json`, commands print exactly one envelope to stdout and send the
//! step-by-step commentary to stderr instead.
//!
//! # Output Contract
//! - Success: `{"ok": true, "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! A connection failure that was diagnosed is still a success envelope: the
//! check ran and produced a [`CheckReport`] carrying the diagnosis.

use serde::{Deserialize, Serialize};

use crate::diagnose::Diagnosis;
use crate::error::DoctorError;

/// Success envelope for command results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Command that was executed (check, build, login)
    pub command: String,

    /// Command-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    /// Create a new success envelope
    pub fn new(command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, command: command.into(), data, meta }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Command that was attempted
    pub command: String,

    /// Error information
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, command: command.into(), error }
    }

    /// Create error envelope from DoctorError
    pub fn from_error(command: impl Into<String>, err: &DoctorError) -> Self {
        Self::new(command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "INVALID_SCHEME", "DUPLICATE_PARAMETER")
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error info
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Result of `check`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    /// Connection string with the password masked
    pub connection: String,

    /// Whether a session was opened
    pub connected: bool,

    /// Databases visible to the user, when connected
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<String>,

    /// Diagnosis of the failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Whether the process is told to stop (`check` only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<bool>,
}

impl Metadata {
    /// Create new metadata with just execution time
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, halt: None }
    }

    /// Create new metadata carrying the halt decision
    pub fn with_halt(execution_ms: u64, halt: bool) -> Self {
        Self { execution_ms, halt: Some(halt) }
    }
}
