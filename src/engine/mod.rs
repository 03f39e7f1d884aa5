//! Database Engine Trait and Connection Tester
//!
//! An [`Engine`] wraps an already-built connection string and knows how to
//! open a session with it. [`test_connection`] opens one and, when that fails,
//! drives the [`Classifier`] to explain why.
//!
//! # Failure Categories
//! Engines report failures in exactly three shapes (see [`ConnectFailure`]).
//! Operational and programming failures are diagnosed and absorbed into a
//! [`TestOutcome`]. Anything else is an invariant violation and is
//! propagated as [`DoctorError::Unreachable`].

use std::future::Future;
use std::io::Write;

use crate::diagnose::{Classifier, Diagnosis, FailureKind};
use crate::error::{DoctorError, Result};

#[cfg(feature = "cockroach")]
pub mod cockroach;

/// Why a connection attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Network, credential, or TLS failure
    Operational(String),
    /// Protocol or target failure (e.g. missing database)
    Programming(String),
    /// Anything the engine cannot categorise
    Other(String),
}

impl ConnectFailure {
    /// Raw failure text
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Operational(text) | Self::Programming(text) | Self::Other(text) => text,
        }
    }

    /// Category for the classifier, or None for uncategorised failures
    #[must_use]
    pub const fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Operational(_) => Some(FailureKind::Operational),
            Self::Programming(_) => Some(FailureKind::Programming),
            Self::Other(_) => None,
        }
    }
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// A connection handle that can be opened
pub trait Engine {
    /// Live session returned on success
    type Session;

    /// Open a session
    ///
    /// Blocks (asynchronously) until the cluster answers or the connect
    /// timeout carried by the connection string elapses.
    fn connect(
        &self,
    ) -> impl Future<Output = std::result::Result<Self::Session, ConnectFailure>> + Send;
}

/// Result of [`test_connection`]
#[derive(Debug)]
pub enum TestOutcome<S> {
    /// Session opened
    Connected(S),
    /// Failure diagnosed and the process should stop
    Halt(Diagnosis),
    /// Failure not recognised; the caller may carry on
    Continue(Diagnosis),
}

impl<S> TestOutcome<S> {
    /// Whether the caller should stop
    #[must_use]
    pub const fn should_halt(&self) -> bool {
        matches!(self, Self::Halt(_))
    }

    /// Diagnosis for a failed attempt
    #[must_use]
    pub const fn diagnosis(&self) -> Option<&Diagnosis> {
        match self {
            Self::Connected(_) => None,
            Self::Halt(diagnosis) | Self::Continue(diagnosis) => Some(diagnosis),
        }
    }
}

/// Try to open a session and diagnose the failure if it does not open
///
/// # Errors
/// - `Unreachable` when the engine reports an uncategorised failure
/// - `OutputFailed` when the diagnostic commentary cannot be written
pub async fn test_connection<E: Engine>(
    engine: &E,
    classifier: &Classifier<'_>,
    out: &mut dyn Write,
) -> Result<TestOutcome<E::Session>> {
    let failure = match engine.connect().await {
        Ok(session) => {
            tracing::info!("connection established");
            return Ok(TestOutcome::Connected(session));
        }
        Err(failure) => failure,
    };

    let Some(kind) = failure.kind() else {
        tracing::error!("connection failed with an uncategorised error");
        return Err(DoctorError::unreachable(
            classifier.config().support_contact.clone(),
            failure.text(),
        ));
    };

    tracing::debug!(?kind, "connection failed");
    if kind == FailureKind::Operational {
        writeln!(out, "Caught an error while checking the connection. Investigating.")?;
    }

    let diagnosis = classifier.diagnose(kind, failure.text(), out)?;
    if diagnosis.halt {
        Ok(TestOutcome::Halt(diagnosis))
    } else {
        Ok(TestOutcome::Continue(diagnosis))
    }
}
