//! CockroachDB Engine Implementation
//!
//! Opens sessions for connection strings produced by
//! [`crate::connection::SpecBuilder`].
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (CockroachDB speaks the PostgreSQL wire protocol)
//! - TLS through `rustls`; the CA comes from `sslrootcert`, else the
//!   platform trust store
//! - `sslmode=disable` connects without TLS
//! - `allow`, `prefer` and `require` encrypt without checking the server
//!   certificate, as libpq does, unless `sslrootcert` is given with
//!   `require`; `verify-ca` and `verify-full` always check it
//! - Certificate file problems are reported with the same wording libpq
//!   uses, so the classifier chain recognises them
//! - SQLSTATE `3D000` (unknown database) is a programming failure;
//!   every other driver error is operational

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres::config::SslMode;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use url::Url;

use crate::connection::{Scheme, CONNECT_TIMEOUT_PARAM};
use crate::engine::{ConnectFailure, Engine};
use crate::error::{DoctorError, Result};

/// CockroachDB engine bound to one connection string
#[derive(Debug, Clone)]
pub struct CockroachEngine {
    /// WARNING: contains the password, do not log
    connection_string: String,
}

impl CockroachEngine {
    /// Wrap a connection string. Nothing is parsed or opened yet.
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self { connection_string: connection_string.into() }
    }
}

/// Live session
pub struct Session {
    client: Client,
}

impl Session {
    /// Underlying driver client
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Run `SHOW DATABASES` and return the database names
    pub async fn show_databases(&self) -> Result<Vec<String>> {
        let rows = self.client.query("SHOW DATABASES", &[]).await.map_err(|e| {
            DoctorError::query_failed(format!("Failed to list databases: {e}"))
        })?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, String>(0).map_err(|e| {
                    DoctorError::query_failed(format!("Unexpected SHOW DATABASES row: {e}"))
                })
            })
            .collect()
    }
}

impl Engine for CockroachEngine {
    type Session = Session;

    async fn connect(&self) -> std::result::Result<Session, ConnectFailure> {
        let target = Target::parse(&self.connection_string)?;
        let pg_config = target.pg_config();

        tracing::debug!(
            host = %target.host,
            port = target.port,
            database = %target.dbname,
            tls = !target.tls_disabled,
            "opening session"
        );

        let client = if target.tls_disabled {
            let (client, connection) = pg_config.connect(NoTls).await.map_err(categorize)?;
            // Connection errors are not logged to prevent credential leakage
            tokio::spawn(async move {
                let _ = connection.await;
            });
            client
        } else {
            let tls = target.tls_connector().map_err(ConnectFailure::Operational)?;
            let (client, connection) = pg_config.connect(tls).await.map_err(categorize)?;
            tokio::spawn(async move {
                let _ = connection.await;
            });
            client
        };

        Ok(Session { client })
    }
}

/// Connection parameters recovered from a canonical connection string
#[derive(Debug)]
struct Target {
    host: String,
    port: u16,
    user: String,
    password: String,
    dbname: String,
    tls_disabled: bool,
    verify_requested: bool,
    ssl_mode: SslMode,
    root_cert: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    application_name: Option<String>,
    options: Option<String>,
}

impl Target {
    /// Parse a canonical connection string
    ///
    /// The builder only emits strings this accepts, so a parse failure here
    /// is uncategorised. A bad parameter value is the operator's and is
    /// operational.
    fn parse(connection_string: &str) -> std::result::Result<Self, ConnectFailure> {
        let url = Url::parse(connection_string)
            .map_err(|e| ConnectFailure::Other(format!("Malformed connection string: {e}")))?;

        if url.scheme() != Scheme::CANONICAL {
            return Err(ConnectFailure::Other(format!(
                "Expected a {}:// connection string, got {}://",
                Scheme::CANONICAL,
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ConnectFailure::Other("Connection string has no host".to_string()))?
            .to_string();
        let port = url
            .port()
            .ok_or_else(|| ConnectFailure::Other("Connection string has no port".to_string()))?;

        let mut target = Self {
            host,
            port,
            user: decode(url.username()),
            password: decode(url.password().unwrap_or_default()),
            dbname: decode(url.path().trim_start_matches('/')),
            tls_disabled: false,
            verify_requested: false,
            ssl_mode: SslMode::Prefer,
            root_cert: None,
            connect_timeout: None,
            application_name: None,
            options: None,
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "sslmode" => target.set_ssl_mode(&value)?,
                "sslrootcert" => target.root_cert = Some(PathBuf::from(value.as_ref())),
                CONNECT_TIMEOUT_PARAM => {
                    let seconds: u64 = value.parse().map_err(|_| {
                        ConnectFailure::Operational(format!(
                            "invalid integer value \"{value}\" for connection option \"{CONNECT_TIMEOUT_PARAM}\""
                        ))
                    })?;
                    target.connect_timeout = Some(Duration::from_secs(seconds));
                }
                "application_name" => target.application_name = Some(value.into_owned()),
                "options" => target.options = Some(value.into_owned()),
                other => tracing::debug!(param = other, "ignoring connection parameter"),
            }
        }

        Ok(target)
    }

    fn set_ssl_mode(&mut self, mode: &str) -> std::result::Result<(), ConnectFailure> {
        self.tls_disabled = false;
        self.verify_requested = false;
        self.ssl_mode = match mode {
            "disable" => {
                self.tls_disabled = true;
                SslMode::Disable
            }
            "allow" | "prefer" => SslMode::Prefer,
            "require" => SslMode::Require,
            "verify-ca" | "verify-full" => {
                self.verify_requested = true;
                SslMode::Require
            }
            other => {
                return Err(ConnectFailure::Operational(format!(
                    "invalid sslmode value: \"{other}\""
                )))
            }
        };
        Ok(())
    }

    fn pg_config(&self) -> Config {
        let mut pg_config = Config::new();
        pg_config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.dbname)
            .ssl_mode(self.ssl_mode);

        if let Some(timeout) = self.connect_timeout {
            pg_config.connect_timeout(timeout);
        }
        if let Some(name) = &self.application_name {
            pg_config.application_name(name);
        }
        if let Some(options) = &self.options {
            pg_config.options(options);
        }

        pg_config
    }

    /// Whether the server certificate is checked against the CA
    ///
    /// `verify-ca` also checks the host name, the same as `verify-full`.
    fn verifies_server(&self) -> bool {
        self.verify_requested || (self.root_cert.is_some() && self.ssl_mode == SslMode::Require)
    }

    fn tls_connector(&self) -> std::result::Result<MakeRustlsConnect, String> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| format!("could not initialize TLS: {e}"))?;

        let config = if self.verifies_server() {
            let roots = match &self.root_cert {
                Some(path) => load_root_cert(path)?,
                None => load_platform_roots(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            tracing::debug!("server certificate will not be verified");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(EncryptOnly(provider)))
                .with_no_client_auth()
        };

        Ok(MakeRustlsConnect::new(config))
    }
}

/// Accepts any server certificate but still checks handshake signatures
#[derive(Debug)]
struct EncryptOnly(Arc<CryptoProvider>);

impl ServerCertVerifier for EncryptOnly {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Load the CA file named by `sslrootcert`
fn load_root_cert(path: &Path) -> std::result::Result<RootCertStore, String> {
    let shown = path.display();
    let pem = std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => format!(
            "root certificate file \"{shown}\" does not exist\n\
             Either provide the file or change sslmode to disable server certificate verification."
        ),
        _ => format!("could not read root certificate file \"{shown}\": {e}"),
    })?;

    let corrupted = || format!("could not read root certificate file \"{shown}\": wrong tag");

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| corrupted())?;
    if certs.is_empty() {
        return Err(corrupted());
    }

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots.add(cert).map_err(|_| corrupted())?;
    }

    tracing::debug!(path = %shown, count = roots.len(), "loaded root certificates");
    Ok(roots)
}

fn load_platform_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = roots.add_parsable_certificates(certs);
            tracing::debug!(added, ignored, "loaded platform root certificates");
        }
        Err(e) => tracing::warn!(error = %e, "could not load platform root certificates"),
    }
    roots
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned())
}

/// Sort a driver error into a failure category
fn categorize(err: tokio_postgres::Error) -> ConnectFailure {
    let text = describe(&err);
    if err.code() == Some(&SqlState::INVALID_CATALOG_NAME) {
        ConnectFailure::Programming(text)
    } else {
        ConnectFailure::Operational(text)
    }
}

/// Error text including every source in the chain
fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
