//! Startup negotiation: SSLRequest, CancelRequest, the startup packet
//! proper, authentication dispatch, and the post-auth parameter batch.

use tracing::{debug, warn};

use crate::error::{err_protocol, Result};
use crate::executor::QueryExecutor;
use crate::message::{
    Authentication, BackendKeyData, ParameterStatus, ReadyForQuery, StartupRequest,
    PROTOCOL_VERSION_3,
};
use crate::options::AuthMethod;
use crate::state::TransactionStatus;

use super::Connection;

/// The parameters reported to every client after authentication, in this
/// order.
const REPORTED_PARAMETERS: &[&str] = &[
    "server_version",
    "server_encoding",
    "client_encoding",
    "application_name",
    "is_superuser",
    "session_authorization",
    "DateStyle",
    "IntervalStyle",
    "TimeZone",
    "integer_datetimes",
    "standard_conforming_strings",
];

impl<E> Connection<E>
where
    E: QueryExecutor,
{
    /// Negotiate the connection up to `ReadyForQuery`. Returns false when
    /// the exchange ended without a session (cancel request).
    pub(super) async fn startup(&mut self) -> Result<bool> {
        loop {
            match self.stream.recv_startup().await? {
                StartupRequest::SslRequest => {
                    if self.stream.is_tls() {
                        return Err(err_protocol!("SSLRequest on an encrypted connection"));
                    }

                    // a single raw byte answers the request; no frame
                    match self.shared.tls.clone() {
                        Some(acceptor) => {
                            self.stream.write_raw(b"S");
                            self.stream.flush().await?;

                            self.stream.upgrade_tls(&acceptor).await?;

                            debug!("connection upgraded to TLS");
                        }

                        None => {
                            self.stream.write_raw(b"N");
                            self.stream.flush().await?;
                        }
                    }

                    // the client now re-sends a startup packet
                }

                StartupRequest::Cancel(cancel) => {
                    // a protocol-compliant sink: nothing to cancel, and no
                    // response is ever sent on a cancel connection
                    debug!(
                        process_id = cancel.process_id,
                        "cancel request received; closing"
                    );

                    return Ok(false);
                }

                StartupRequest::Startup(startup) => {
                    if startup.version != PROTOCOL_VERSION_3 {
                        return Err(err_protocol!(
                            "unsupported protocol version {}.{}",
                            startup.version >> 16,
                            startup.version & 0xFFFF
                        ));
                    }

                    self.state.protocol_version = startup.version;
                    self.apply_startup_params(startup.params);

                    match self.shared.options.auth_method {
                        AuthMethod::Trust => {}
                        AuthMethod::ScramSha256 => self.sasl_exchange().await?,
                    }

                    self.finish_startup().await?;

                    return Ok(true);
                }
            }
        }
    }

    /// Seed the session parameters: server defaults first, then whatever
    /// the client sent in the startup packet on top.
    fn apply_startup_params(&mut self, params: Vec<(String, String)>) {
        let options = &self.shared.options;

        for (name, value) in [
            ("server_version", options.server_version.as_str()),
            ("server_encoding", "UTF8"),
            ("client_encoding", "UTF8"),
            ("application_name", ""),
            ("is_superuser", "on"),
            ("session_authorization", options.username.as_str()),
            ("DateStyle", "ISO, MDY"),
            ("IntervalStyle", "postgres"),
            ("TimeZone", options.timezone.as_str()),
            ("integer_datetimes", "on"),
            ("standard_conforming_strings", "on"),
            ("database", options.database.as_str()),
        ] {
            self.state.set_parameter(name, value);
        }

        for (name, value) in params {
            match name.as_str() {
                "user" => {
                    self.state.set_parameter("session_authorization", &value);
                    self.state.set_parameter("user", value);
                }

                _ => {
                    self.state.set_parameter(name, value);
                }
            }
        }
    }

    /// Authentication has succeeded: `AuthenticationOk`, the parameter
    /// batch, the cancel key, and the first `ReadyForQuery`.
    async fn finish_startup(&mut self) -> Result<()> {
        self.state.mark_authenticated();

        self.stream.write(Authentication::Ok);

        for &name in REPORTED_PARAMETERS {
            match self.state.parameter(name) {
                Some(value) => self.stream.write(ParameterStatus { name, value }),
                None => warn!(name, "reported parameter missing from session"),
            }
        }

        self.stream.write(BackendKeyData {
            process_id: self.state.backend_pid(),
            secret_key: self.state.backend_secret(),
        });

        self.stream.write(ReadyForQuery(TransactionStatus::Idle));

        self.stream.flush().await
    }
}
