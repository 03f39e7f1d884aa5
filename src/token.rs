//! Bearer Tokens
//!
//! A successful login is answered with a signed, time-limited bearer token
//! naming the user. [`TokenIssuer`] signs one for a subject and
//! [`TokenValidator`] turns one back into its subject, failing with a
//! distinct [`TokenFailure`] for malformed, expired, and forged tokens.
//!
//! [`Hs256Tokens`] implements both with a shared secret taken from
//! [`DoctorConfig`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::DoctorConfig;
use crate::error::{DoctorError, Result, TokenFailure};

/// Shortest accepted signing secret (256 bits)
pub const MIN_SECRET_LENGTH: usize = 32;

/// Token type reported alongside issued tokens
pub const TOKEN_TYPE: &str = "bearer";

/// Signs tokens for a subject
pub trait TokenIssuer {
    /// Issue a token for `subject`
    fn issue(&self, subject: &str) -> Result<String>;
}

/// Recovers the subject from a token
pub trait TokenValidator {
    /// Validate `token` and return its subject
    ///
    /// # Errors
    /// `TokenRejected` with the reason the token was refused.
    fn validate(&self, token: &str) -> Result<String>;
}

/// Claims carried by issued tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (the username)
    pub sub: String,
    /// Issued at, seconds since the Unix epoch
    pub iat: u64,
    /// Expiry, seconds since the Unix epoch
    pub exp: u64,
}

/// HS256 tokens with a shared secret
#[derive(Clone)]
pub struct Hs256Tokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl std::fmt::Debug for Hs256Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hs256Tokens").field("lifetime", &self.lifetime).finish_non_exhaustive()
    }
}

impl Hs256Tokens {
    /// Build from a secret and token lifetime
    ///
    /// # Errors
    /// `ConfigError` if the secret is shorter than [`MIN_SECRET_LENGTH`] bytes.
    pub fn new(secret: &[u8], lifetime: Duration) -> Result<Self> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(DoctorError::config_error(format!(
                "Token secret must be at least {MIN_SECRET_LENGTH} bytes"
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime,
        })
    }

    /// Build from `token_secret` and `token_lifetime_minutes`
    ///
    /// # Errors
    /// `ConfigError` if no secret is configured or it is too short.
    pub fn from_config(config: &DoctorConfig) -> Result<Self> {
        let secret = config
            .token_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DoctorError::config_error("No token_secret configured"))?;

        Self::new(secret.as_bytes(), Duration::from_secs(config.token_lifetime_minutes * 60))
    }

    /// Issue a token as if the current time were `issued_at`
    pub fn issue_at(&self, subject: &str, issued_at: u64) -> Result<String> {
        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at,
            exp: issued_at + self.lifetime.as_secs(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| DoctorError::token_issue_failed(e.to_string()))
    }
}

impl TokenIssuer for Hs256Tokens {
    fn issue(&self, subject: &str) -> Result<String> {
        let token = self.issue_at(subject, now()?)?;
        tracing::debug!(subject, lifetime_secs = self.lifetime.as_secs(), "issued token");
        Ok(token)
    }
}

impl TokenValidator for Hs256Tokens {
    fn validate(&self, token: &str) -> Result<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(err) => {
                let failure = match err.kind() {
                    ErrorKind::ExpiredSignature => TokenFailure::Expired,
                    ErrorKind::InvalidSignature => TokenFailure::BadSignature,
                    _ => TokenFailure::Malformed,
                };
                tracing::debug!(error = %err, "token rejected");
                Err(DoctorError::token_rejected(failure))
            }
        }
    }
}

fn now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| DoctorError::token_issue_failed(format!("System clock before epoch: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef-test";

    fn tokens() -> Hs256Tokens {
        Hs256Tokens::new(SECRET, Duration::from_secs(30 * 60)).unwrap()
    }

    fn rejection(result: Result<String>) -> TokenFailure {
        match result.unwrap_err() {
            DoctorError::TokenRejected(failure) => failure,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_issue_then_validate() {
        let tokens = tokens();
        let token = tokens.issue("maxroach").unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(tokens.validate(&token).unwrap(), "maxroach");
    }

    #[test]
    fn test_expired_token() {
        let tokens = tokens();
        let two_hours_ago = now().unwrap() - 2 * 60 * 60;
        let token = tokens.issue_at("maxroach", two_hours_ago).unwrap();
        assert_eq!(rejection(tokens.validate(&token)), TokenFailure::Expired);
    }

    #[test]
    fn test_token_from_other_key() {
        let other = Hs256Tokens::new(b"ffffffffffffffffffffffffffffffffffff", Duration::from_secs(60))
            .unwrap();
        let token = other.issue("maxroach").unwrap();
        assert_eq!(rejection(tokens().validate(&token)), TokenFailure::BadSignature);
    }

    #[test]
    fn test_tampered_payload() {
        let tokens = tokens();
        let genuine = tokens.issue("maxroach").unwrap();
        let forged_claims = tokens.issue("root").unwrap();

        let mut parts: Vec<&str> = genuine.split('.').collect();
        parts[1] = forged_claims.split('.').nth(1).unwrap();
        let tampered = parts.join(".");

        assert_eq!(rejection(tokens.validate(&tampered)), TokenFailure::BadSignature);
    }

    #[test]
    fn test_malformed_tokens() {
        let tokens = tokens();
        for token in ["", "not-a-token", "a.b", "a.b.c"] {
            assert_eq!(rejection(tokens.validate(token)), TokenFailure::Malformed, "{token:?}");
        }
    }

    #[test]
    fn test_from_config() {
        let mut config = DoctorConfig::default();
        assert_eq!(Hs256Tokens::from_config(&config).unwrap_err().error_code(), "CONFIG_ERROR");

        config.token_secret = Some("short".to_string());
        assert!(Hs256Tokens::from_config(&config).unwrap_err().message().contains("32 bytes"));

        config.token_secret = Some(String::from_utf8(SECRET.to_vec()).unwrap());
        config.token_lifetime_minutes = 5;
        let tokens = Hs256Tokens::from_config(&config).unwrap();
        assert_eq!(tokens.lifetime, Duration::from_secs(300));
    }
}
