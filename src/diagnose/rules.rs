//! Classification rule tables
//!
//! Each table is evaluated top to bottom and the first matching rule wins.
//! The order is a priority: more specific, more actionable causes come
//! first. To recognise a new cause, insert a rule at the right position.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DoctorConfig;

/// Cause a rule attributes a failure to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    /// Connection attempt timed out
    Timeout,
    /// Hostname did not resolve
    HostnameResolution,
    /// Server refused the TCP connection
    ConnectionRefused,
    /// CA certificate file was not found
    MissingCertificate,
    /// CA certificate file is corrupted
    CorruptCertificate,
    /// CA certificate does not verify the server
    InvalidCertificate,
    /// Username/password pair rejected
    LoginFailed,
    /// Target database does not exist
    MissingDatabase,
}

/// Outcome attached to a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Cause explained, stop
    Fatal,
    /// Cause not identified, stop anyway
    FatalUnknownCause,
}

/// Predicate over raw error text
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Any of the phrases appears
    Any(&'static [&'static str]),
    /// Every phrase appears
    All(&'static [&'static str]),
    /// The regular expression finds a match
    Pattern(&'static LazyLock<Regex>),
}

impl Matcher {
    /// Whether `text` satisfies this predicate
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Any(phrases) => phrases.iter().any(|p| text.contains(p)),
            Self::All(phrases) => phrases.iter().all(|p| text.contains(p)),
            Self::Pattern(regex) => regex.is_match(text),
        }
    }
}

/// One way a rule can match, with the advice printed when it does
#[derive(Clone, Copy)]
pub struct Variant {
    /// Cause reported for this variant
    pub cause: Cause,
    /// Predicate over the error text
    pub matcher: Matcher,
    /// Advisory lines, given the active configuration
    pub advise: fn(&DoctorConfig) -> Vec<String>,
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variant").field("cause", &self.cause).field("matcher", &self.matcher).finish()
    }
}

/// A check in the chain
///
/// Most checks have one variant. The certificate validity check has two
/// (corrupted file, untrusted certificate) that share one commentary line.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    /// Printed before the check runs
    pub checking: &'static str,
    /// Printed when no variant matches
    pub all_clear: &'static str,
    /// Tried in order
    pub variants: &'static [Variant],
    /// Outcome on match
    pub severity: Severity,
}

impl ClassificationRule {
    /// First variant matching `text`
    #[must_use]
    pub fn find(&self, text: &str) -> Option<&'static Variant> {
        self.variants.iter().find(|v| v.matcher.matches(text))
    }
}

const NO_ISSUE: &str = "  ... No issue found.";

static DATABASE_MISSING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"database ".*" does not exist"#).expect("valid regex"));

fn lines(text: &[&str]) -> Vec<String> {
    text.iter().map(ToString::to_string).collect()
}

fn advise_timeout(_: &DoctorConfig) -> Vec<String> {
    lines(&[
        "  ... the connection timed out.",
        "  This can happen for a variety of reasons, but it's possible that CockroachCloud \
         hasn't authorized your IP address. Start by logging into your CockroachCloud account \
         and verifying that your IP address is authorized.",
    ])
}

fn advise_hostname(_: &DoctorConfig) -> Vec<String> {
    lines(&[
        "  ... Hostname is not resolving to an ip address.",
        "  The most likely reason is that your hostname is incorrect.",
    ])
}

fn advise_refused(_: &DoctorConfig) -> Vec<String> {
    lines(&[
        "  ... connection refused.",
        "  This often occurs when your IP address is not allowlisted in CockroachCloud.",
    ])
}

fn advise_missing_certificate(_: &DoctorConfig) -> Vec<String> {
    lines(&[
        "  .crt file not found. Please verify that the `--cert-dir` parameter points to the \
         right location, and that the `--ca` parameter is the name of the file.",
    ])
}

fn advise_corrupt_certificate(_: &DoctorConfig) -> Vec<String> {
    lines(&[
        ".crt file found, but file is corrupted.",
        "Please download a new .crt file from your CockroachCloud account.",
    ])
}

fn advise_invalid_certificate(_: &DoctorConfig) -> Vec<String> {
    lines(&[
        "`.crt` file found, but the certificate is not valid.",
        "Please point to the correct CA or download a new .crt file from your CockroachCloud \
         account.",
    ])
}

fn advise_login(_: &DoctorConfig) -> Vec<String> {
    lines(&[
        "  Username/password combination is invalid.",
        "  Try checking your username and password. One or both are likely incorrect.",
    ])
}

fn advise_missing_database(config: &DoctorConfig) -> Vec<String> {
    vec![
        "It looks like the database you're attempting to connect to doesn't exist.".to_string(),
        format!(
            "One suggestion would be to try to log in to the `{db}` database using `/{db}` \
             after the port.",
            db = config.fallback_database
        ),
    ]
}

/// Checks for operational (network, credential, TLS) failures, in priority order
pub static OPERATIONAL_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        checking: "Checking for connection timeout.",
        all_clear: NO_ISSUE,
        variants: &[Variant {
            cause: Cause::Timeout,
            matcher: Matcher::Any(&[
                "Operation timed out",
                "timeout expired",
                "Connection timed out",
                "connection timed out",
            ]),
            advise: advise_timeout,
        }],
        severity: Severity::Fatal,
    },
    ClassificationRule {
        checking: "Checking hostname.",
        all_clear: NO_ISSUE,
        variants: &[Variant {
            cause: Cause::HostnameResolution,
            matcher: Matcher::Any(&[
                "could not translate host name",
                "failed to lookup address information",
            ]),
            advise: advise_hostname,
        }],
        severity: Severity::Fatal,
    },
    ClassificationRule {
        checking: "Checking for a refused connection.",
        all_clear: NO_ISSUE,
        variants: &[Variant {
            cause: Cause::ConnectionRefused,
            matcher: Matcher::Any(&["Connection refused"]),
            advise: advise_refused,
        }],
        severity: Severity::Fatal,
    },
    ClassificationRule {
        checking: "Checking for location of `.crt` file.",
        all_clear: NO_ISSUE,
        variants: &[Variant {
            cause: Cause::MissingCertificate,
            matcher: Matcher::All(&["root certificate file", "does not exist"]),
            advise: advise_missing_certificate,
        }],
        severity: Severity::Fatal,
    },
    ClassificationRule {
        checking: "Checking the `.crt` file's validity.",
        all_clear: "  ... CA cert file appears to be valid.",
        variants: &[
            Variant {
                cause: Cause::CorruptCertificate,
                matcher: Matcher::All(&["could not read", "wrong tag"]),
                advise: advise_corrupt_certificate,
            },
            Variant {
                cause: Cause::InvalidCertificate,
                matcher: Matcher::Any(&["certificate verify failed", "invalid peer certificate"]),
                advise: advise_invalid_certificate,
            },
        ],
        severity: Severity::Fatal,
    },
    ClassificationRule {
        checking: "Checking username and password combination.",
        all_clear: NO_ISSUE,
        variants: &[Variant {
            cause: Cause::LoginFailed,
            matcher: Matcher::Any(&["password authentication failed"]),
            advise: advise_login,
        }],
        severity: Severity::Fatal,
    },
];

/// Checks for programming (protocol, target) failures
pub static PROGRAMMING_RULES: &[ClassificationRule] = &[ClassificationRule {
    checking: "Checking for database existence.",
    all_clear: "  ... database appears to be valid.",
    variants: &[Variant {
        cause: Cause::MissingDatabase,
        matcher: Matcher::Pattern(&DATABASE_MISSING),
        advise: advise_missing_database,
    }],
    severity: Severity::Fatal,
}];
