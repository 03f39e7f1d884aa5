//! Connection String Integration Tests
//!
//! Drives the public builder API end to end with scripted operator answers:
//! - Scheme aliases, placeholders, and prompt order
//! - Timeout injection and querystring normalization
//! - Configuration errors raised before any prompt

use cockroach_doctor::connection::resolve::{database_prompt, PASSWORD_PROMPT};
use cockroach_doctor::connection::querystring::CERTS_DIR_PROMPT;
use cockroach_doctor::prompt::ScriptedPrompter;
use cockroach_doctor::{build_connection_string, DoctorConfig, DoctorError, SpecBuilder};
use pretty_assertions::assert_eq;

// ============================================================================
// Test Helpers
// ============================================================================

struct Run {
    result: cockroach_doctor::Result<String>,
    asked: Vec<String>,
    remaining: usize,
    out: String,
}

fn run(url: &str, answers: &[&str]) -> Run {
    run_with(&DoctorConfig::default(), url, answers)
}

fn run_with(config: &DoctorConfig, url: &str, answers: &[&str]) -> Run {
    let mut prompter = ScriptedPrompter::new(answers.iter().copied());
    let mut out = Vec::new();
    let result = build_connection_string(url, 10, config, &mut prompter, &mut out);
    Run {
        result,
        asked: prompter.asked().to_vec(),
        remaining: prompter.remaining(),
        out: String::from_utf8(out).unwrap(),
    }
}

// ============================================================================
// Fully Specified URLs
// ============================================================================

#[test]
fn test_complete_url_needs_no_operator() {
    let run = run("postgresql://maxroach:pw@localhost:26257/bank?sslmode=require", &[]);
    assert_eq!(
        run.result.unwrap(),
        "cockroachdb://maxroach:pw@localhost:26257/bank?sslmode=require&connect_timeout=10"
    );
    assert!(run.asked.is_empty());
    assert!(run.out.is_empty());
}

#[test]
fn test_same_answers_same_string() {
    let url = "postgres://maxroach:<password>@h:26257/defaultdb?sslrootcert=<certs_dir>/ca.crt";
    let answers = ["pw", "", "/certs"];
    assert_eq!(run(url, &answers).result.unwrap(), run(url, &answers).result.unwrap());
}

#[test]
fn test_output_is_a_fixed_point() {
    let first = run("postgres://maxroach:pw@localhost:26257/bank?sslmode=require", &[]);
    let first = first.result.unwrap();

    let second = run(&first, &[]);
    assert_eq!(second.result.unwrap(), first);
    assert!(second.asked.is_empty());
}

#[test]
fn test_exactly_one_timeout() {
    for url in [
        "postgres://u:p@h:26257/bank",
        "postgres://u:p@h:26257/bank?connect_timeout=99",
        "postgres://u:p@h:26257/bank?connect_timeout=99&sslmode=disable",
        "postgres://u:p@h:26257/bank?sslmode=disable&connect_timeout=99",
    ] {
        let built = run(url, &[]).result.unwrap();
        assert_eq!(built.matches("connect_timeout=").count(), 1, "{url}");
        assert!(built.ends_with("connect_timeout=10"), "{url}");
    }
}

#[test]
fn test_configured_timeout_is_used() {
    let config = DoctorConfig::default();
    let mut prompter = ScriptedPrompter::default();
    let mut out = Vec::new();
    let spec = SpecBuilder::new(&config, &mut prompter, &mut out)
        .build("postgres://u:p@h/bank", 3)
        .unwrap();
    assert_eq!(spec.timeout_seconds, 3);
    assert_eq!(spec.query_params()["connect_timeout"], "3");
    assert_eq!(spec.port, 26257);
}

// ============================================================================
// Operator Prompts
// ============================================================================

#[test]
fn test_prompt_order_password_database_certs() {
    let run = run(
        "postgres://maxroach:<password>@h:26257/defaultdb?sslrootcert=<certs_dir>/cc-ca.crt",
        &["s3cret", "movr", "/opt/certs"],
    );
    assert_eq!(
        run.result.unwrap(),
        "cockroachdb://maxroach:s3cret@h:26257/movr?sslrootcert=/opt/certs/cc-ca.crt&connect_timeout=10"
    );
    assert_eq!(
        run.asked,
        vec![PASSWORD_PROMPT.to_string(), database_prompt("defaultdb"), CERTS_DIR_PROMPT.to_string()]
    );
    assert_eq!(
        run.out,
        "String literal '<password>' found in connection string.\n\
         String literal '<certs_dir>' found for .crt directory.\n"
    );
}

#[test]
fn test_missing_password_is_prompted_and_encoded() {
    let run = run("postgres://maxroach@h:26257/bank", &["p@ss word"]);
    assert_eq!(
        run.result.unwrap(),
        "cockroachdb://maxroach:p%40ss%20word@h:26257/bank?connect_timeout=10"
    );
    assert_eq!(run.asked, vec![PASSWORD_PROMPT.to_string()]);
    assert!(run.out.is_empty());
}

#[test]
fn test_default_database_kept_on_empty_answer() {
    let run = run("postgres://u:p@h:26257/defaultdb", &["  "]);
    assert!(run.result.unwrap().contains("@h:26257/defaultdb?"));
    assert_eq!(run.remaining, 0);
}

#[test]
fn test_other_database_is_not_questioned() {
    let run = run("postgres://u:p@h:26257/movr", &["should not be used"]);
    assert!(run.result.is_ok());
    assert_eq!(run.remaining, 1);
}

#[test]
fn test_custom_placeholders() {
    let config = DoctorConfig {
        password_placeholder: "ENTER_PASSWORD".to_string(),
        reserved_database: "system".to_string(),
        ..DoctorConfig::default()
    };
    let run = run_with(&config, "postgres://u:ENTER_PASSWORD@h:26257/defaultdb", &["pw"]);
    assert_eq!(run.result.unwrap(), "cockroachdb://u:pw@h:26257/defaultdb?connect_timeout=10");
    assert_eq!(run.asked, vec![PASSWORD_PROMPT.to_string()]);
}

#[test]
fn test_home_directory_expanded() {
    let home = dirs::home_dir().expect("tests need a home directory");
    let run = run("postgres://u:p@h:26257/bank?sslrootcert=<certs_dir>/ca.crt", &["~/.postgresql"]);
    assert_eq!(
        run.result.unwrap(),
        format!(
            "cockroachdb://u:p@h:26257/bank?sslrootcert={}/.postgresql/ca.crt&connect_timeout=10",
            home.display()
        )
    );
}

#[test]
fn test_empty_password_kept_without_prompt() {
    let first = run("postgres://root:@localhost:26257/bank?sslmode=disable", &[]);
    let built = first.result.unwrap();
    assert_eq!(
        built,
        "cockroachdb://root:@localhost:26257/bank?sslmode=disable&connect_timeout=10"
    );
    assert!(first.asked.is_empty());

    let again = run(&built, &[]);
    assert_eq!(again.result.unwrap(), built);
    assert!(again.asked.is_empty());
}

#[test]
fn test_typed_empty_password_round_trips() {
    let first = run("postgres://root@localhost:26257/bank", &[""]);
    assert_eq!(first.asked, vec![PASSWORD_PROMPT.to_string()]);
    let built = first.result.unwrap();
    assert_eq!(built, "cockroachdb://root:@localhost:26257/bank?connect_timeout=10");

    let second = run(&built, &[]);
    assert_eq!(second.result.unwrap(), built);
    assert!(second.asked.is_empty());
}

#[test]
fn test_home_directory_in_url_querystring() {
    let home = dirs::home_dir().expect("tests need a home directory");
    let run = run("postgres://u:p@h:26257/bank?sslrootcert=~/.postgresql/root.crt", &[]);
    let built = run.result.unwrap();
    assert_eq!(
        built,
        format!(
            "cockroachdb://u:p@h:26257/bank?sslrootcert={}/.postgresql/root.crt&connect_timeout=10",
            home.display()
        )
    );
    assert!(!built.contains('~'));
    assert!(run.asked.is_empty());
}

#[test]
fn test_closed_terminal_fails_the_build() {
    let run = run("postgres://u@h:26257/bank", &[]);
    assert_eq!(run.result.unwrap_err().error_code(), "PROMPT_FAILED");
}

// ============================================================================
// Configuration Errors
// ============================================================================

#[test]
fn test_invalid_scheme_message() {
    let run = run("mysql://u:<password>@h:3306/defaultdb", &["never asked"]);
    let err = run.result.unwrap_err();
    assert!(err.is_configuration_error());
    assert_eq!(
        err.message(),
        "Was expecting connection string to start with 'postgres://' but instead found mysql://"
    );
    assert!(run.asked.is_empty());
}

#[test]
fn test_duplicate_parameter_reported() {
    let run = run("postgres://u:p@h:26257/bank?sslmode=disable&sslmode=require", &[]);
    match run.result.unwrap_err() {
        DoctorError::DuplicateParameter { field, values } => {
            assert_eq!(field, "sslmode");
            assert_eq!(values, vec!["disable".to_string(), "require".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_duplicate_checked_before_certs_prompt() {
    let run = run(
        "postgres://u:p@h:26257/bank?sslrootcert=<certs_dir>/a.crt&sslrootcert=/b.crt",
        &["/never"],
    );
    assert_eq!(run.result.unwrap_err().error_code(), "DUPLICATE_PARAMETER");
    assert_eq!(run.remaining, 1);
}

#[test]
fn test_missing_host_rejected() {
    let run = run("postgres:///bank", &[]);
    let err = run.result.unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
}
