//! cockroach-doctor - Connection Negotiation and Failure Diagnosis for CockroachDB
//!
//! Turns a loosely specified cluster URL into a canonical connection string,
//! asking the operator for whatever is missing, and explains why a
//! connection attempt failed when the driver only offers free-form text.
//!
//! # Core Principles
//! - Configuration problems are detected before any network attempt
//! - One connection string per input: timeout injected once, placeholders resolved
//! - Diagnosis is an ordered, declarative chain; the first match wins
//! - The library never exits the process; halting is the caller's decision
//!
//! # Module Organization
//! - [`connection`] - Connection string builder and querystring normalizer
//! - [`diagnose`] - Failure classifier and rule tables
//! - [`engine`] - Engine trait, connection tester, CockroachDB engine
//! - [`prompt`] - Operator input (terminal or scripted)
//! - [`config`] - Layered configuration and stored profiles
//! - [`users`] - User lookup and credential verification
//! - [`token`] - Bearer token issuance and validation
//! - [`output`] - JSON output envelope types
//! - [`logging`] - Structured logging setup
//! - [`error`] - Error types and handling

pub mod config;
pub mod connection;
pub mod diagnose;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod prompt;
pub mod token;
pub mod users;

// Re-export commonly used types for convenience
pub use config::{ConfigLocation, DoctorConfig, StoredProfile};
pub use connection::{build_connection_string, ConnectionSpec, Scheme, SpecBuilder};
pub use diagnose::{Cause, Classifier, Diagnosis, FailureKind, Severity};
pub use engine::{test_connection, ConnectFailure, Engine, TestOutcome};
pub use error::{DoctorError, Result, TokenFailure};
pub use output::{CheckReport, ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use prompt::{Prompter, TerminalPrompter};
pub use token::{Hs256Tokens, TokenIssuer, TokenValidator};
pub use users::{authenticate, Argon2Verifier, CredentialVerifier, UserLookup, UserRecord};

#[cfg(feature = "cockroach")]
pub use engine::cockroach::{CockroachEngine, Session};
