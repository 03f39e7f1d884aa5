//! Querystring normalization
//!
//! Cluster consoles hand out URLs whose querystring the driver cannot use
//! as-is: the certificate directory is sometimes left as a `<certs_dir>`
//! literal, and `~` is never expanded by the driver. This module rewrites
//! the querystring and appends the connect timeout.

use std::collections::BTreeMap;
use std::io::Write;

use crate::config::DoctorConfig;
use crate::error::{DoctorError, Result};
use crate::prompt::Prompter;

/// Name of the timeout parameter appended to every querystring
pub const CONNECT_TIMEOUT_PARAM: &str = "connect_timeout";

/// Prompt shown when the certificate directory is a placeholder
pub const CERTS_DIR_PROMPT: &str = "  Input directory where the .ca cert is located";

/// Rewrite a raw querystring into one the transport accepts
///
/// Steps, in order:
/// 1. Reject any parameter given more than one value
/// 2. Replace the certificate directory placeholder with the operator's answer
/// 3. Expand `~` to the home directory
/// 4. Append `connect_timeout=<timeout_seconds>`
///
/// A `connect_timeout` already in the querystring is dropped so the result
/// carries exactly one.
///
/// # Errors
/// - `DuplicateParameter` if a parameter repeats
/// - `ConfigError` if `~` is present and no home directory can be found
/// - `PromptFailed` if the certificate directory could not be read
pub fn normalize_querystring(
    query: &str,
    timeout_seconds: u64,
    config: &DoctorConfig,
    prompter: &mut dyn Prompter,
    out: &mut dyn Write,
) -> Result<String> {
    reject_duplicates(query)?;

    let mut query = strip_param(query, CONNECT_TIMEOUT_PARAM);

    let placeholder = config.certs_dir_placeholder.as_str();
    if !placeholder.is_empty() && query.contains(placeholder) {
        writeln!(out, "String literal '{placeholder}' found for .crt directory.")?;
        let certs_dir = prompter.line(CERTS_DIR_PROMPT)?;
        query = query.replace(placeholder, &certs_dir);
    }

    if query.contains('~') {
        let home = dirs::home_dir().ok_or_else(|| {
            DoctorError::config_error("Querystring uses '~' but no home directory is available")
        })?;
        query = query.replace('~', &home.to_string_lossy());
    }

    Ok(append_param(query, CONNECT_TIMEOUT_PARAM, &timeout_seconds.to_string()))
}

/// Fail if any parameter name carries more than one non-empty value
///
/// Parameters are checked in name order so the reported field is stable.
pub fn reject_duplicates(query: &str) -> Result<()> {
    let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (field, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        values.entry(field.into_owned()).or_default().push(value.into_owned());
    }

    match values.into_iter().find(|(_, v)| v.len() > 1) {
        Some((field, values)) => Err(DoctorError::duplicate_parameter(field, values)),
        None => Ok(()),
    }
}

/// Remove every `name=...` pair, leaving the other pairs byte-for-byte intact
fn strip_param(query: &str, name: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
            if key == name {
                tracing::warn!(param = name, "dropping parameter supplied in the URL");
                false
            } else {
                true
            }
        })
        .collect();

    kept.join("&")
}

fn append_param(query: String, name: &str, value: &str) -> String {
    if query.is_empty() || query.ends_with('&') {
        format!("{query}{name}={value}")
    } else {
        format!("{query}&{name}={value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;

    fn normalize(query: &str, answers: &[&str]) -> (Result<String>, ScriptedPrompter, String) {
        let config = DoctorConfig::default();
        let mut prompter = ScriptedPrompter::new(answers.iter().copied());
        let mut out = Vec::new();
        let result = normalize_querystring(query, 10, &config, &mut prompter, &mut out);
        (result, prompter, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_appends_timeout() {
        let (result, prompter, _) = normalize("sslmode=verify-full", &[]);
        assert_eq!(result.unwrap(), "sslmode=verify-full&connect_timeout=10");
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_empty_query_gets_only_timeout() {
        let (result, _, _) = normalize("", &[]);
        assert_eq!(result.unwrap(), "connect_timeout=10");
    }

    #[test]
    fn test_duplicate_rejected_anywhere() {
        for query in [
            "sslmode=a&sslmode=b",
            "sslmode=a&options=x&sslmode=b",
            "options=x&sslrootcert=a&sslrootcert=b",
        ] {
            let (result, _, _) = normalize(query, &[]);
            let err = result.unwrap_err();
            assert!(matches!(err, DoctorError::DuplicateParameter { .. }), "{query}");
            assert!(err.is_configuration_error());
        }
    }

    #[test]
    fn test_duplicate_checked_before_prompting() {
        let (result, prompter, _) = normalize("sslrootcert=<certs_dir>/ca.crt&a=1&a=2", &["x"]);
        assert!(result.is_err());
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_certs_dir_placeholder_substituted() {
        let (result, prompter, out) =
            normalize("sslmode=verify-full&sslrootcert=<certs_dir>/cc-ca.crt", &["/opt/certs"]);
        assert_eq!(
            result.unwrap(),
            "sslmode=verify-full&sslrootcert=/opt/certs/cc-ca.crt&connect_timeout=10"
        );
        assert_eq!(prompter.asked(), [CERTS_DIR_PROMPT]);
        assert!(out.contains("String literal '<certs_dir>' found"));
    }

    #[test]
    fn test_tilde_expanded() {
        let home = dirs::home_dir().expect("tests need a home directory");
        let (result, _, _) = normalize("sslrootcert=~/.postgresql/root.crt", &[]);
        let query = result.unwrap();
        assert!(!query.contains('~'));
        assert!(query.starts_with(&format!("sslrootcert={}", home.to_string_lossy())));
    }

    #[test]
    fn test_tilde_in_certs_answer_expanded() {
        let (result, _, _) = normalize("sslrootcert=<certs_dir>/ca.crt", &["~/certs"]);
        assert!(!result.unwrap().contains('~'));
    }

    #[test]
    fn test_user_timeout_replaced() {
        let (result, _, _) = normalize("connect_timeout=99&sslmode=require", &[]);
        let query = result.unwrap();
        assert_eq!(query, "sslmode=require&connect_timeout=10");
        assert_eq!(query.matches("connect_timeout=").count(), 1);
    }

    #[test]
    fn test_blank_values_not_duplicates() {
        assert!(reject_duplicates("a=&a=1").is_ok());
        assert!(reject_duplicates("a=1&b=1").is_ok());
    }
}
