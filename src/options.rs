//! Server configuration.
//!
//! All recognized options are enumerated here as typed fields; anything the
//! binary accepts from flags or environment is funneled through this record
//! and validated before the listener starts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// How connecting clients authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    /// Every startup is accepted as-is.
    #[default]
    Trust,

    /// SCRAM-SHA-256 against the configured username/password.
    ScramSha256,
}

impl FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trust" => Ok(AuthMethod::Trust),
            "scram-sha-256" => Ok(AuthMethod::ScramSha256),

            other => Err(Error::config(format!(
                "unknown auth method {other:?}; expected `trust` or `scram-sha-256`"
            ))),
        }
    }
}

/// TLS protocol version bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl FromStr for TlsVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.2" | "tls1.2" | "TLSv1.2" => Ok(TlsVersion::Tls12),
            "1.3" | "tls1.3" | "TLSv1.3" => Ok(TlsVersion::Tls13),

            other => Err(Error::config(format!(
                "unknown TLS version {other:?}; expected `1.2` or `1.3`"
            ))),
        }
    }
}

/// TLS listener configuration. Present means "enabled"; whether the
/// certificate material actually loads is checked when the server starts,
/// and a failure downgrades `SSLRequest` answers to `N`.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,

    /// PEM bundle of client-certificate CAs; set together with
    /// `reject_unauthorized` to demand client certificates.
    pub ca_file: Option<PathBuf>,
    pub reject_unauthorized: bool,

    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
}

impl TlsOptions {
    pub fn new(cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        Self {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            ca_file: None,
            reject_unauthorized: false,
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls13,
        }
    }
}

/// Options and flags configuring a mock server.
///
/// # Example
///
/// ```rust
/// use pgmock::{AuthMethod, PgMockOptions};
///
/// let options = PgMockOptions::new()
///     .port(15432)
///     .auth_method(AuthMethod::ScramSha256)
///     .username("app")
///     .password("secret");
/// ```
#[derive(Clone)]
pub struct PgMockOptions {
    pub(crate) host: String,
    pub(crate) port: u16,

    pub(crate) max_connections: usize,
    pub(crate) connection_timeout: Duration,
    pub(crate) reaper_interval: Duration,
    pub(crate) shutdown_drain_timeout: Duration,

    pub(crate) auth_method: AuthMethod,
    pub(crate) scram_iterations: u32,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) database: String,

    pub(crate) server_version: String,
    pub(crate) timezone: String,

    pub(crate) tls: Option<TlsOptions>,

    pub(crate) debug_errors: bool,
}

impl Default for PgMockOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PgMockOptions {
    /// A default set of options: trust auth on `127.0.0.1:5432`.
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5432,
            max_connections: 100,
            connection_timeout: Duration::from_secs(300),
            reaper_interval: Duration::from_secs(60),
            shutdown_drain_timeout: Duration::from_secs(5),
            auth_method: AuthMethod::Trust,
            scram_iterations: 4096,
            username: "postgres".to_owned(),
            password: "postgres".to_owned(),
            database: "postgres".to_owned(),
            server_version: "16.4".to_owned(),
            timezone: "UTC".to_owned(),
            tls: None,
            debug_errors: false,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The admission limit; connections beyond it are accepted and
    /// immediately closed.
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Idle time after which the reaper closes a connection.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// How often the idle reaper runs.
    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// How long graceful shutdown waits for connections to drain before
    /// force-closing them.
    pub fn shutdown_drain_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_drain_timeout = timeout;
        self
    }

    pub fn auth_method(mut self, auth_method: AuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    /// PBKDF2 iteration count advertised in the SCRAM exchange.
    pub fn scram_iterations(mut self, iterations: u32) -> Self {
        self.scram_iterations = iterations;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// The `server_version` advertised in `ParameterStatus`.
    pub fn server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Include detail/context fields (stack traces, offending statements)
    /// in outgoing errors. Off in production: those fields are stripped.
    pub fn debug_errors(mut self, debug_errors: bool) -> Self {
        self.debug_errors = debug_errors;
        self
    }
}

// password is configuration, but it is still a credential
impl fmt::Debug for PgMockOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgMockOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_connections", &self.max_connections)
            .field("connection_timeout", &self.connection_timeout)
            .field("auth_method", &self.auth_method)
            .field("username", &self.username)
            .field("database", &self.database)
            .field("server_version", &self.server_version)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}
