//! User Collaborators
//!
//! Once a session is open, applications built on the cluster check
//! application logins against a `users` table. This module provides that
//! boundary: a single-key user lookup, a credential verifier, and
//! [`authenticate`] combining the two.

use std::future::Future;

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;

use crate::error::Result;

/// A stored user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Login name
    pub username: String,
    /// PHC-format password hash
    /// WARNING: Sensitive data, do not log
    pub password_hash: String,
}

/// Point lookup of a user by name
pub trait UserLookup {
    /// Fetch the user, or None if no such user exists
    fn lookup(&self, username: &str) -> impl Future<Output = Result<Option<UserRecord>>> + Send;
}

/// Checks a supplied password against a stored hash
pub trait CredentialVerifier {
    /// Whether `supplied` matches `stored_hash`
    fn verify(&self, stored_hash: &str, supplied: &str) -> bool;
}

/// Verifier for argon2 PHC strings
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn verify(&self, stored_hash: &str, supplied: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default().verify_password(supplied.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is not a valid PHC string");
                false
            }
        }
    }
}

/// Look up `username` and verify `password`
///
/// Returns the user on success and None when the user is unknown or the
/// password does not match. The two cases are not distinguished.
pub async fn authenticate<L, V>(
    lookup: &L,
    verifier: &V,
    username: &str,
    password: &str,
) -> Result<Option<UserRecord>>
where
    L: UserLookup,
    V: CredentialVerifier,
{
    let Some(user) = lookup.lookup(username).await? else {
        tracing::info!(username, "login rejected: unknown user");
        return Ok(None);
    };

    if verifier.verify(&user.password_hash, password) {
        tracing::info!(username, "login accepted");
        Ok(Some(user))
    } else {
        tracing::info!(username, "login rejected: wrong password");
        Ok(None)
    }
}

#[cfg(feature = "cockroach")]
pub use store::PostgresUserStore;

#[cfg(feature = "cockroach")]
mod store {
    use tokio_postgres::Client;

    use super::{UserLookup, UserRecord};
    use crate::error::{DoctorError, Result};

    /// User lookup against the `users` table of an open session
    pub struct PostgresUserStore<'a> {
        client: &'a Client,
    }

    impl<'a> PostgresUserStore<'a> {
        /// Use an open session's client
        #[must_use]
        pub const fn new(client: &'a Client) -> Self {
            Self { client }
        }
    }

    impl UserLookup for PostgresUserStore<'_> {
        async fn lookup(&self, username: &str) -> Result<Option<UserRecord>> {
            let row = self
                .client
                .query_opt("SELECT username, password FROM users WHERE username = $1 LIMIT 1", &[
                    &username,
                ])
                .await
                .map_err(|e| DoctorError::query_failed(format!("Failed to look up user: {e}")))?;

            row.map(|row| {
                Ok(UserRecord {
                    username: row.try_get(0).map_err(|e| {
                        DoctorError::query_failed(format!("Unexpected users row: {e}"))
                    })?,
                    password_hash: row.try_get(1).map_err(|e| {
                        DoctorError::query_failed(format!("Unexpected users row: {e}"))
                    })?,
                })
            })
            .transpose()
        }
    }
}
