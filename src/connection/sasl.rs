//! Driving the SCRAM exchange over the wire: the framing around the
//! mechanism messages implemented in [`crate::scram`].

use tracing::debug;

use crate::error::{err_protocol, Error, Result};
use crate::executor::QueryExecutor;
use crate::message::{
    Authentication, ErrorResponse, FrontendMessageFormat, Message, Notice, SaslInitialResponse,
    SaslResponse,
};
use crate::scram::{ScramServer, SCRAM_SHA_256};
use crate::sqlstate::SqlState;

use super::Connection;

impl<E> Connection<E>
where
    E: QueryExecutor,
{
    /// Run the four-message SCRAM-SHA-256 exchange. On success the
    /// `AuthenticationSASLFinal` frame is buffered (not yet flushed); the
    /// caller follows up with `AuthenticationOk` and the rest of the
    /// post-auth batch. Any failure reports a generic `28000` and ends the
    /// connection.
    pub(super) async fn sasl_exchange(&mut self) -> Result<()> {
        let Some(credentials) = self.shared.credentials.clone() else {
            return Err(Error::config(
                "scram-sha-256 configured without derived credentials",
            ));
        };

        let mut scram = ScramServer::new(credentials);

        self.stream.write(Authentication::Sasl {
            mechanisms: &[SCRAM_SHA_256],
        });
        self.stream.flush().await?;

        let initial: SaslInitialResponse = self.recv_auth_message().await?.decode()?;

        if initial.mechanism != SCRAM_SHA_256 {
            return self
                .auth_failed(format!("unsupported SASL mechanism {:?}", initial.mechanism))
                .await;
        }

        let client_first = std::str::from_utf8(&initial.response)
            .map_err(|_| err_protocol!("SASL payload is not UTF-8"))?;

        let server_first = match scram.handle_client_first(client_first) {
            Ok(server_first) => server_first,
            Err(err) => return self.auth_failed(err).await,
        };

        self.stream.write(Authentication::SaslContinue(&server_first));
        self.stream.flush().await?;

        let response: SaslResponse = self.recv_auth_message().await?.decode()?;

        let client_final = std::str::from_utf8(&response.0)
            .map_err(|_| err_protocol!("SASL payload is not UTF-8"))?;

        let server_final = match scram.handle_client_final(client_final) {
            Ok(server_final) => server_final,
            Err(err) => return self.auth_failed(err).await,
        };

        self.stream.write(Authentication::SaslFinal(&server_final));

        debug!("SCRAM exchange completed");

        Ok(())
    }

    /// Before authentication only `Password`-family messages and
    /// `Terminate` are legal; anything else is a protocol violation that
    /// ends the connection.
    async fn recv_auth_message(&mut self) -> Result<Message> {
        let message = self.stream.recv().await?;

        match message.format {
            FrontendMessageFormat::Password => Ok(message),

            FrontendMessageFormat::Terminate => Err(Error::Disconnected),

            other => Err(err_protocol!(
                "unexpected {:?} message before authentication",
                other
            )),
        }
    }

    /// Report the generic authentication failure. The real reason goes to
    /// the caller (and the log), never to the client.
    async fn auth_failed(&mut self, reason: impl ToString) -> Result<()> {
        let notice = Notice::fatal(
            SqlState::INVALID_AUTHORIZATION_SPECIFICATION,
            "authentication failed",
        );

        self.stream.write(ErrorResponse(&notice));
        self.stream.flush().await?;

        Err(Error::Authentication(
            reason.to_string().into_boxed_str(),
        ))
    }
}
