//! The `pgmock` binary: flags and environment in, a running server out.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use pgmock::{AuthMethod, PgMockOptions, PgMockServer, TlsOptions, TlsVersion};

/// A mock PostgreSQL server: real wire protocol, no database engine.
#[derive(Parser, Debug)]
#[command(name = "pgmock", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PGMOCK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PGMOCK_PORT", default_value_t = 5432)]
    port: u16,

    /// Maximum concurrent connections
    #[arg(long, env = "PGMOCK_MAX_CONNECTIONS", default_value_t = 100)]
    max_connections: usize,

    /// Idle timeout in seconds before a connection is reaped
    #[arg(long, env = "PGMOCK_CONNECTION_TIMEOUT", default_value_t = 300)]
    connection_timeout: u64,

    /// Idle-reaper interval in seconds
    #[arg(long, env = "PGMOCK_REAPER_INTERVAL", default_value_t = 60)]
    reaper_interval: u64,

    /// Graceful-shutdown drain timeout in milliseconds
    #[arg(long, env = "PGMOCK_SHUTDOWN_DRAIN_TIMEOUT_MS", default_value_t = 5000)]
    shutdown_drain_timeout_ms: u64,

    /// Authentication method: trust or scram-sha-256
    #[arg(long, env = "PGMOCK_AUTH", default_value = "trust")]
    auth: String,

    /// SCRAM PBKDF2 iteration count
    #[arg(long, env = "PGMOCK_SCRAM_ITERATIONS", default_value_t = 4096)]
    scram_iterations: u32,

    /// Username clients authenticate as
    #[arg(long, env = "PGMOCK_USER", default_value = "postgres")]
    user: String,

    /// Password for scram-sha-256 authentication
    #[arg(long, env = "PGMOCK_PASSWORD", default_value = "postgres", hide_env_values = true)]
    password: String,

    /// Default database name to advertise
    #[arg(long, env = "PGMOCK_DATABASE", default_value = "postgres")]
    database: String,

    /// server_version to advertise
    #[arg(long, env = "PGMOCK_SERVER_VERSION", default_value = "16.4")]
    server_version: String,

    /// TimeZone to advertise
    #[arg(long, env = "PGMOCK_TIMEZONE", default_value = "UTC")]
    timezone: String,

    /// Enable TLS (requires --ssl-cert and --ssl-key)
    #[arg(long, env = "PGMOCK_SSL")]
    ssl: bool,

    /// PEM certificate chain
    #[arg(long, env = "PGMOCK_SSL_CERT", requires = "ssl")]
    ssl_cert: Option<String>,

    /// PEM private key
    #[arg(long, env = "PGMOCK_SSL_KEY", requires = "ssl")]
    ssl_key: Option<String>,

    /// PEM CA bundle for client certificates
    #[arg(long, env = "PGMOCK_SSL_CA")]
    ssl_ca: Option<String>,

    /// Require verified client certificates
    #[arg(long, env = "PGMOCK_SSL_REJECT_UNAUTHORIZED")]
    ssl_reject_unauthorized: bool,

    /// Minimum TLS version (1.2 or 1.3)
    #[arg(long, env = "PGMOCK_SSL_MIN_VERSION", default_value = "1.2")]
    ssl_min_version: String,

    /// Maximum TLS version (1.2 or 1.3)
    #[arg(long, env = "PGMOCK_SSL_MAX_VERSION", default_value = "1.3")]
    ssl_max_version: String,

    /// Include stack detail in error responses (development only)
    #[arg(long, env = "PGMOCK_DEBUG_ERRORS")]
    debug_errors: bool,
}

impl Args {
    fn into_options(self) -> Result<PgMockOptions, pgmock::Error> {
        let auth_method: AuthMethod = self.auth.parse()?;

        let mut options = PgMockOptions::new()
            .host(self.host)
            .port(self.port)
            .max_connections(self.max_connections)
            .connection_timeout(Duration::from_secs(self.connection_timeout))
            .reaper_interval(Duration::from_secs(self.reaper_interval))
            .shutdown_drain_timeout(Duration::from_millis(self.shutdown_drain_timeout_ms))
            .auth_method(auth_method)
            .scram_iterations(self.scram_iterations)
            .username(self.user)
            .password(self.password)
            .database(self.database)
            .server_version(self.server_version)
            .timezone(self.timezone)
            .debug_errors(self.debug_errors);

        if self.ssl {
            let (Some(cert), Some(key)) = (self.ssl_cert, self.ssl_key) else {
                return Err(pgmock::Error::Configuration(
                    "--ssl requires --ssl-cert and --ssl-key".into(),
                ));
            };

            let mut tls = TlsOptions::new(cert, key);
            tls.ca_file = self.ssl_ca.map(Into::into);
            tls.reject_unauthorized = self.ssl_reject_unauthorized;
            tls.min_version = self.ssl_min_version.parse::<TlsVersion>()?;
            tls.max_version = self.ssl_max_version.parse::<TlsVersion>()?;

            options = options.tls(tls);
        }

        Ok(options)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let options = match args.into_options() {
        Ok(options) => options,

        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let server = match PgMockServer::bind(options).await {
        Ok(server) => server,

        Err(err) => {
            error!("failed to start: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to wait for ctrl-c: {err}");
    }

    info!("received interrupt");

    server.shutdown().await;

    ExitCode::SUCCESS
}
