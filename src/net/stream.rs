use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::error::{Error, Result};

/// A client socket, either plaintext or upgraded to TLS in place after an
/// accepted `SSLRequest`.
pub(crate) enum MaybeTlsStream {
    Raw(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),

    // transient state while the handshake future owns the socket
    Upgrading,
}

impl MaybeTlsStream {
    pub(crate) fn is_tls(&self) -> bool {
        matches!(self, MaybeTlsStream::Tls(_))
    }

    /// Perform the server-side handshake, replacing the raw socket.
    pub(crate) async fn upgrade(&mut self, acceptor: &TlsAcceptor) -> Result<()> {
        let stream = match std::mem::replace(self, MaybeTlsStream::Upgrading) {
            MaybeTlsStream::Raw(stream) => stream,

            MaybeTlsStream::Tls(_) => {
                return Err(Error::tls("connection is already encrypted"));
            }

            MaybeTlsStream::Upgrading => {
                return Err(Error::tls("concurrent TLS upgrade"));
            }
        };

        match acceptor.accept(stream).await {
            Ok(stream) => {
                *self = MaybeTlsStream::Tls(Box::new(stream));
                Ok(())
            }

            Err(err) => Err(Error::tls(err)),
        }
    }

    pub(crate) async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Raw(stream) => stream.read_buf(buf).await,
            MaybeTlsStream::Tls(stream) => stream.read_buf(buf).await,
            MaybeTlsStream::Upgrading => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            MaybeTlsStream::Raw(stream) => stream.write_all(data).await,
            MaybeTlsStream::Tls(stream) => stream.write_all(data).await,
            MaybeTlsStream::Upgrading => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        match self {
            MaybeTlsStream::Raw(stream) => stream.flush().await,
            MaybeTlsStream::Tls(stream) => stream.flush().await,
            MaybeTlsStream::Upgrading => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            MaybeTlsStream::Raw(stream) => stream.shutdown().await,
            MaybeTlsStream::Tls(stream) => stream.shutdown().await,
            MaybeTlsStream::Upgrading => Ok(()),
        }
    }
}
