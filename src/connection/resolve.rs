//! Interactive fallbacks for the password and target database.

use std::io::Write;

use crate::config::DoctorConfig;
use crate::error::Result;
use crate::prompt::Prompter;

/// Prompt shown when the password must be entered
pub const PASSWORD_PROMPT: &str = "  Input Password";

/// Resolve the password for the connection string
///
/// `parsed` is the password as it appears in the URL userinfo, `None` when
/// the userinfo has no `:` at all. It is returned unchanged (an explicitly
/// empty password included) unless it is missing or the placeholder literal,
/// in which case the operator is asked for it. A typed password is
/// percent-encoded so it can sit in the userinfo.
pub fn resolve_password(
    parsed: Option<&str>,
    config: &DoctorConfig,
    prompter: &mut dyn Prompter,
    out: &mut dyn Write,
) -> Result<String> {
    let Some(parsed) = parsed else {
        return prompt_password(prompter);
    };

    let decoded = urlencoding::decode(parsed).map_or_else(|_| parsed.to_string(), |d| d.into_owned());
    if decoded == config.password_placeholder {
        writeln!(out, "String literal '{}' found in connection string.", config.password_placeholder)?;
        return prompt_password(prompter);
    }

    Ok(parsed.to_string())
}

fn prompt_password(prompter: &mut dyn Prompter) -> Result<String> {
    let password = prompter.secret(PASSWORD_PROMPT)?;
    Ok(urlencoding::encode(&password).into_owned())
}

/// Resolve the target database from the URL path
///
/// The reserved default database is usually not what a script wants, so the
/// operator gets one chance to name another. An empty answer keeps the
/// default. Any other database name is returned without prompting.
pub fn resolve_database(
    path: &str,
    config: &DoctorConfig,
    prompter: &mut dyn Prompter,
) -> Result<String> {
    let database = path.strip_prefix('/').unwrap_or(path);
    if database != config.reserved_database {
        return Ok(database.to_string());
    }

    let answer = prompter.line(&database_prompt(&config.reserved_database))?;
    let answer = answer.trim();
    if answer.is_empty() {
        Ok(database.to_string())
    } else {
        tracing::debug!(database = answer, "operator overrode the default database");
        Ok(answer.to_string())
    }
}

/// Prompt shown when the URL targets the reserved default database
#[must_use]
pub fn database_prompt(reserved: &str) -> String {
    format!(
        "WARNING: Your database is listed as {reserved}. Please input another \
         (such as `movr`) if this was a mistake (hit enter to keep it as `{reserved}`)"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;

    #[test]
    fn test_password_passthrough() {
        let config = DoctorConfig::default();
        let mut prompter = ScriptedPrompter::default();
        let mut out = Vec::new();

        let password = resolve_password(Some("hunter2"), &config, &mut prompter, &mut out).unwrap();
        assert_eq!(password, "hunter2");
        assert!(prompter.asked().is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_password_kept() {
        let config = DoctorConfig::default();
        let mut prompter = ScriptedPrompter::default();
        let mut out = Vec::new();

        let password = resolve_password(Some(""), &config, &mut prompter, &mut out).unwrap();
        assert_eq!(password, "");
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_password_missing_prompts() {
        let config = DoctorConfig::default();
        let mut prompter = ScriptedPrompter::new(["typed"]);
        let mut out = Vec::new();

        let password = resolve_password(None, &config, &mut prompter, &mut out).unwrap();
        assert_eq!(password, "typed");
        assert_eq!(prompter.asked(), [PASSWORD_PROMPT]);
    }

    #[test]
    fn test_password_placeholder_prompts_encoded_or_raw() {
        let config = DoctorConfig::default();
        for parsed in ["<password>", "%3Cpassword%3E"] {
            let mut prompter = ScriptedPrompter::new(["typed"]);
            let mut out = Vec::new();

            let password = resolve_password(Some(parsed), &config, &mut prompter, &mut out).unwrap();
            assert_eq!(password, "typed");
            assert!(String::from_utf8(out).unwrap().contains("'<password>' found"));
        }
    }

    #[test]
    fn test_typed_password_is_encoded() {
        let config = DoctorConfig::default();
        let mut prompter = ScriptedPrompter::new(["p@ss:word"]);
        let mut out = Vec::new();

        let password = resolve_password(None, &config, &mut prompter, &mut out).unwrap();
        assert_eq!(password, "p%40ss%3Aword");
    }

    #[test]
    fn test_database_passthrough() {
        let config = DoctorConfig::default();
        let mut prompter = ScriptedPrompter::default();
        assert_eq!(resolve_database("/movr", &config, &mut prompter).unwrap(), "movr");
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_database_default_kept_on_empty_answer() {
        let config = DoctorConfig::default();
        let mut prompter = ScriptedPrompter::new([""]);
        assert_eq!(resolve_database("/defaultdb", &config, &mut prompter).unwrap(), "defaultdb");
        assert_eq!(prompter.asked().len(), 1);
    }

    #[test]
    fn test_database_default_overridden() {
        let config = DoctorConfig::default();
        let mut prompter = ScriptedPrompter::new(["movr"]);
        assert_eq!(resolve_database("/defaultdb", &config, &mut prompter).unwrap(), "movr");
    }
}
