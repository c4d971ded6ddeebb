//! Error and Result types.

use std::io;

/// A specialized `Result` type for pgmock.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All the ways serving a connection (or standing up the server) can fail.
///
/// These are *internal* failures. Errors that travel to the client as an
/// `ErrorResponse` frame are a separate value type; see
/// [`Notice`](crate::message::Notice).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error communicating on the socket.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Invalid server configuration, rejected at load time.
    #[error("configuration: {0}")]
    Configuration(Box<str>),

    /// Unexpected or invalid bytes from the client. The connection is
    /// terminated after (best-effort) reporting this to the peer.
    #[error("protocol violation: {0}")]
    Protocol(Box<str>),

    /// The SASL exchange failed. The detail is for the server log only;
    /// the client sees a generic `28000` regardless of the cause.
    #[error("authentication failed: {0}")]
    Authentication(Box<str>),

    /// A value could not be decoded (e.g. a malformed array literal).
    #[error("{0}")]
    Decode(Box<str>),

    /// Error configuring or performing the TLS handshake.
    #[error("TLS: {0}")]
    Tls(Box<str>),

    /// The peer closed the socket.
    #[error("connection closed by peer")]
    Disconnected,
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into().into_boxed_str())
    }

    pub(crate) fn tls(message: impl std::fmt::Display) -> Self {
        Error::Tls(message.to_string().into_boxed_str())
    }
}

// Format a protocol violation. Mirrors the call sites' needs: most carry
// interpolated context about the offending bytes.
macro_rules! err_protocol {
    ($expr:expr) => {
        $crate::error::Error::Protocol($expr.into())
    };

    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Protocol(format!($fmt, $($arg)*).into_boxed_str())
    };
}

pub(crate) use err_protocol;
