//! Failure Diagnosis
//!
//! The driver surfaces two failure categories, each carrying free text with
//! no stable error code. This module runs that text through an ordered chain
//! of checks (see [`rules`]) and returns a [`Diagnosis`] telling the caller
//! what went wrong and whether to stop.
//!
//! # Commentary
//! Every check announces itself and reports "no issue found" when it misses.
//! The trace is meant for a human debugging a live connection problem.
//!
//! # Outcomes
//! - A matching check: explained, halt
//! - Operational failure, nothing matches: generic message, no halt
//! - Programming failure, nothing matches: generic message, halt
//!   (`FatalUnknownCause`)

pub mod rules;

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::config::DoctorConfig;
use crate::error::Result;

pub use rules::{
    Cause, ClassificationRule, Matcher, Severity, Variant, OPERATIONAL_RULES, PROGRAMMING_RULES,
};

/// Category of a failed connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Network, credential, or TLS failure
    Operational,
    /// Protocol or target failure (e.g. missing database)
    Programming,
}

/// Result of running a failure through the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Whether a check recognised the failure
    pub matched: bool,

    /// Advice shown to the operator (without the raw error text)
    pub message: String,

    /// Whether the process should stop
    pub halt: bool,

    /// Recognised cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,

    /// Outcome of the matching rule, or `FatalUnknownCause` for a halting miss
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Ordered classifier over raw failure text
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    config: &'a DoctorConfig,
    operational: &'static [ClassificationRule],
    programming: &'static [ClassificationRule],
}

impl<'a> Classifier<'a> {
    /// Classifier with the built-in rule tables
    #[must_use]
    pub fn new(config: &'a DoctorConfig) -> Self {
        Self::with_rules(config, OPERATIONAL_RULES, PROGRAMMING_RULES)
    }

    /// Classifier with custom rule tables
    #[must_use]
    pub const fn with_rules(
        config: &'a DoctorConfig,
        operational: &'static [ClassificationRule],
        programming: &'static [ClassificationRule],
    ) -> Self {
        Self { config, operational, programming }
    }

    /// Configuration the advice is rendered with
    #[must_use]
    pub const fn config(&self) -> &'a DoctorConfig {
        self.config
    }

    /// Diagnose a failure of the given kind
    pub fn diagnose(
        &self,
        kind: FailureKind,
        error_text: &str,
        out: &mut dyn Write,
    ) -> Result<Diagnosis> {
        match kind {
            FailureKind::Operational => self.diagnose_operational(error_text, out),
            FailureKind::Programming => self.diagnose_programming(error_text, out),
        }
    }

    /// Diagnose an operational failure
    ///
    /// An unrecognised operational failure does not halt.
    pub fn diagnose_operational(&self, error_text: &str, out: &mut dyn Write) -> Result<Diagnosis> {
        match self.run_chain(self.operational, error_text, out)? {
            Some(diagnosis) => Ok(diagnosis),
            None => self.unexpected(error_text, false, out),
        }
    }

    /// Diagnose a programming failure
    ///
    /// An unrecognised programming failure halts with `FatalUnknownCause`.
    pub fn diagnose_programming(&self, error_text: &str, out: &mut dyn Write) -> Result<Diagnosis> {
        match self.run_chain(self.programming, error_text, out)? {
            Some(diagnosis) => Ok(diagnosis),
            None => self.unexpected(error_text, true, out),
        }
    }

    /// Evaluate rules in order; stop at the first match
    fn run_chain(
        &self,
        rules: &[ClassificationRule],
        error_text: &str,
        out: &mut dyn Write,
    ) -> Result<Option<Diagnosis>> {
        for rule in rules {
            writeln!(out, "{}", rule.checking)?;

            let Some(variant) = rule.find(error_text) else {
                writeln!(out, "{}", rule.all_clear)?;
                continue;
            };

            let advice = (variant.advise)(self.config);
            for line in &advice {
                writeln!(out, "{line}")?;
            }
            print_error_text(error_text, out)?;

            tracing::debug!(cause = ?variant.cause, "failure classified");
            return Ok(Some(Diagnosis {
                matched: true,
                message: advice.join("\n"),
                halt: true,
                cause: Some(variant.cause),
                severity: Some(rule.severity),
            }));
        }

        Ok(None)
    }

    fn unexpected(&self, error_text: &str, halt: bool, out: &mut dyn Write) -> Result<Diagnosis> {
        let message = format!(
            "Unexpected error occurred. Please email the text of this error to {}",
            self.config.support_contact
        );
        writeln!(out, "{message}")?;
        print_error_text(error_text, out)?;

        tracing::warn!(halt, "failure not recognised by any check");
        Ok(Diagnosis {
            matched: false,
            message,
            halt,
            cause: None,
            severity: halt.then_some(Severity::FatalUnknownCause),
        })
    }
}

fn print_error_text(error_text: &str, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "  Error text: {error_text}")?;
    Ok(())
}
