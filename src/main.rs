//! cockroach-doctor CLI Entry Point
//!
//! Subcommands:
//! - `check` - Build the connection string, connect, and diagnose failures
//! - `build` - Build and print the connection string without connecting
//! - `login` - Verify an application login and issue a bearer token
//! - `verify-token` - Validate a bearer token and print its subject
//! - `profile` - Save and list stored cluster profiles
//!
//! Commentary goes to stdout (stderr with `--json`). Logs go to stderr.
//! A diagnosed fatal failure exits with status 2.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use cockroach_doctor::config::{self, ConfigLocation, DoctorConfig, StoredProfile};
use cockroach_doctor::engine::{test_connection, TestOutcome};
use cockroach_doctor::output::{CheckReport, ErrorEnvelope, Metadata, SuccessEnvelope};
use cockroach_doctor::token::TOKEN_TYPE;
use cockroach_doctor::users::{authenticate, Argon2Verifier, PostgresUserStore};
use cockroach_doctor::{
    logging, Classifier, CockroachEngine, DoctorError, Hs256Tokens, Prompter, SpecBuilder,
    TerminalPrompter, TokenIssuer, TokenValidator,
};

/// Exit status when a diagnosed failure says to stop
const HALT_STATUS: u8 = 2;

/// cockroach-doctor - connect to a CockroachDB cluster and explain failures
#[derive(Parser)]
#[command(name = "cockroach-doctor")]
#[command(about = "Connection negotiation and failure diagnosis for CockroachDB")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the cluster and diagnose any failure
    Check {
        #[command(flatten)]
        target: TargetArgs,

        /// Print a JSON report instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Print the connection string without connecting
    Build {
        #[command(flatten)]
        target: TargetArgs,

        /// Print a JSON envelope instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Check an application login against the `users` table and issue a token
    Login {
        #[command(flatten)]
        target: TargetArgs,

        /// Application user to verify
        #[arg(long)]
        username: String,
    },

    /// Validate a bearer token issued by `login`
    VerifyToken {
        /// Token to validate
        token: String,
    },

    /// Manage stored cluster profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Cluster URL (postgres://, postgresql://, or cockroachdb://)
    #[arg(long, conflicts_with = "profile")]
    url: Option<String>,

    /// Stored profile to use (default profile when neither this nor --url is given)
    #[arg(long)]
    profile: Option<String>,

    /// Connect timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Save a cluster URL under a name
    Save {
        /// Profile name
        name: String,

        /// Cluster URL
        #[arg(long)]
        url: String,

        /// Environment variable holding the password
        #[arg(long)]
        password_env: Option<String>,

        /// Save to the per-user config instead of the project config
        #[arg(long)]
        global: bool,
    },

    /// List stored profiles
    List,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Check { .. } => "check",
            Self::Build { .. } => "build",
            Self::Login { .. } => "login",
            Self::VerifyToken { .. } => "verify-token",
            Self::Profile { .. } => "profile",
        }
    }

    fn json(&self) -> bool {
        matches!(self, Self::Check { json: true, .. } | Self::Build { json: true, .. })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose, cli.quiet) {
        eprintln!("{e}");
    }

    let command = cli.command.name();
    let json = cli.command.json();

    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<DoctorError>() {
                Some(doctor_err) if json => {
                    print_json(&ErrorEnvelope::from_error(command, doctor_err));
                }
                Some(doctor_err) => eprintln!("{}", doctor_err.message()),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<ExitCode> {
    let config = config::load_with_precedence().context("Failed to load configuration")?;

    match command {
        Commands::Check { target, json } => check(&config, target, json).await,
        Commands::Build { target, json } => build(&config, target, json),
        Commands::Login { target, username } => login(&config, target, &username).await,
        Commands::VerifyToken { token } => verify_token(&config, &token),
        Commands::Profile { action } => profile(&config, action),
    }
}

/// Where commentary goes: stdout, or stderr when stdout carries JSON
fn commentary(json: bool) -> Box<dyn Write> {
    if json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Resolve the URL and password override, then build the connection spec
fn build_spec(
    config: &DoctorConfig,
    target: &TargetArgs,
    prompter: &mut dyn Prompter,
    out: &mut dyn Write,
) -> anyhow::Result<cockroach_doctor::ConnectionSpec> {
    let (url, password) = match &target.url {
        Some(url) => (url.clone(), None),
        None => config.profile(target.profile.as_deref())?.resolve()?,
    };
    let timeout = target.timeout.unwrap_or(config.timeout_seconds);

    let spec = SpecBuilder::new(config, prompter, out).with_password(password).build(&url, timeout)?;
    tracing::info!(connection = %spec.redacted(), "built connection string");
    Ok(spec)
}

async fn check(config: &DoctorConfig, target: TargetArgs, json: bool) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    let mut out = commentary(json);
    let mut prompter = TerminalPrompter;

    let spec = build_spec(config, &target, &mut prompter, &mut *out)?;
    let engine = CockroachEngine::new(spec.connection_string());
    let classifier = Classifier::new(config);

    let mut report = CheckReport {
        connection: spec.redacted(),
        connected: false,
        databases: Vec::new(),
        diagnosis: None,
    };

    let code = match test_connection(&engine, &classifier, &mut *out).await? {
        TestOutcome::Connected(session) => {
            writeln!(out, "Testing connection by running a `SHOW DATABASES` command.")?;
            let databases = session.show_databases().await?;
            for name in &databases {
                writeln!(out, "   {name}")?;
            }
            report.connected = true;
            report.databases = databases;
            ExitCode::SUCCESS
        }
        TestOutcome::Halt(diagnosis) => {
            report.diagnosis = Some(diagnosis);
            ExitCode::from(HALT_STATUS)
        }
        // No session to carry on with
        TestOutcome::Continue(diagnosis) => {
            report.diagnosis = Some(diagnosis);
            ExitCode::FAILURE
        }
    };
    out.flush()?;

    if json {
        let halt = report.diagnosis.as_ref().is_some_and(|d| d.halt);
        print_json(&SuccessEnvelope::new("check", report, Metadata::with_halt(elapsed_ms(start), halt)));
    }
    Ok(code)
}

fn build(config: &DoctorConfig, target: TargetArgs, json: bool) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    let mut out = commentary(json);
    let mut prompter = TerminalPrompter;

    let spec = build_spec(config, &target, &mut prompter, &mut *out)?;
    out.flush()?;

    if json {
        let data = serde_json::json!({ "connection_string": spec.connection_string() });
        print_json(&SuccessEnvelope::new("build", data, Metadata::new(elapsed_ms(start))));
    } else {
        println!("{spec}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn login(
    config: &DoctorConfig,
    target: TargetArgs,
    username: &str,
) -> anyhow::Result<ExitCode> {
    // Fail on a missing secret before any prompt or network attempt
    let tokens = Hs256Tokens::from_config(config)?;
    let mut out = commentary(false);
    let mut prompter = TerminalPrompter;

    let spec = build_spec(config, &target, &mut prompter, &mut *out)?;
    let engine = CockroachEngine::new(spec.connection_string());
    let classifier = Classifier::new(config);

    let session = match test_connection(&engine, &classifier, &mut *out).await? {
        TestOutcome::Connected(session) => session,
        TestOutcome::Halt(_) => return Ok(ExitCode::from(HALT_STATUS)),
        TestOutcome::Continue(_) => return Ok(ExitCode::FAILURE),
    };

    let password = prompter.secret(&format!("Password for {username}"))?;
    let store = PostgresUserStore::new(session.client());
    match authenticate(&store, &Argon2Verifier, username, &password).await? {
        Some(user) => {
            let token = tokens.issue(&user.username)?;
            writeln!(out, "Login succeeded for {}.", user.username)?;
            writeln!(out, "Access token ({TOKEN_TYPE}), valid for {} minutes:", config.token_lifetime_minutes)?;
            writeln!(out, "{token}")?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            writeln!(out, "Invalid username or password.")?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn verify_token(config: &DoctorConfig, token: &str) -> anyhow::Result<ExitCode> {
    let tokens = Hs256Tokens::from_config(config)?;
    let subject = tokens.validate(token.trim())?;
    println!("{subject}");
    Ok(ExitCode::SUCCESS)
}

fn profile(config: &DoctorConfig, action: ProfileAction) -> anyhow::Result<ExitCode> {
    match action {
        ProfileAction::Save { name, url, password_env, global } => {
            let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
            let path = config::save_profile(&name, StoredProfile { url, password_env }, location)
                .with_context(|| format!("Failed to save profile '{name}'"))?;
            println!("Saved profile '{name}' to {}", path.display());
        }
        ProfileAction::List => {
            let profiles = config::list_profiles(config);
            if profiles.is_empty() {
                println!("No profiles stored.");
            }
            for (name, url) in profiles {
                let marker = if config.default_profile.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {name}\t{url}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
