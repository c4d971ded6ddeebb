//! The buffered stream underneath a connection: reads complete frames out
//! of a growable buffer, writes through a batched output buffer.
//!
//! A partial frame is never an error; the reader waits for the socket to
//! deliver the rest. The declared length is capped at 1 GiB, the last line
//! of defense against a runaway frame.

use bytes::{Buf, BytesMut};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use crate::error::{err_protocol, Error, Result};
use crate::io::Encode;
use crate::message::{FrontendMessageFormat, Message, StartupRequest};
use crate::net::MaybeTlsStream;

// the wire length field includes itself but not the tag byte
const MAX_MESSAGE_LEN: usize = 1 << 30;

pub(crate) struct PgStream {
    socket: MaybeTlsStream,
    rbuf: BytesMut,
    wbuf: Vec<u8>,
}

impl PgStream {
    pub(crate) fn new(socket: TcpStream) -> Self {
        Self {
            socket: MaybeTlsStream::Raw(socket),
            rbuf: BytesMut::with_capacity(8 * 1024),
            wbuf: Vec::with_capacity(8 * 1024),
        }
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.socket.is_tls()
    }

    /// Read one untyped frame (startup, SSLRequest, CancelRequest):
    /// a 4-byte length including itself, then the payload.
    pub(crate) async fn recv_startup(&mut self) -> Result<StartupRequest> {
        while self.rbuf.len() < 4 {
            self.fill().await?;
        }

        let len =
            u32::from_be_bytes([self.rbuf[0], self.rbuf[1], self.rbuf[2], self.rbuf[3]]) as usize;

        if !(4..=MAX_MESSAGE_LEN).contains(&len) {
            return Err(err_protocol!("invalid startup packet length: {}", len));
        }

        while self.rbuf.len() < len {
            self.fill().await?;
        }

        self.rbuf.advance(4);
        let contents = self.rbuf.split_to(len - 4).freeze();

        StartupRequest::decode(contents)
    }

    /// Read one typed frame: tag byte, 4-byte length including itself,
    /// payload.
    pub(crate) async fn recv(&mut self) -> Result<Message> {
        while self.rbuf.len() < 5 {
            self.fill().await?;
        }

        let format = FrontendMessageFormat::try_from_u8(self.rbuf[0])?;
        let len =
            u32::from_be_bytes([self.rbuf[1], self.rbuf[2], self.rbuf[3], self.rbuf[4]]) as usize;

        if !(4..=MAX_MESSAGE_LEN).contains(&len) {
            return Err(err_protocol!(
                "invalid message length {} for type {:?}",
                len,
                format
            ));
        }

        while self.rbuf.len() < len + 1 {
            self.fill().await?;
        }

        self.rbuf.advance(5);
        let contents = self.rbuf.split_to(len - 4).freeze();

        Ok(Message { format, contents })
    }

    async fn fill(&mut self) -> Result<()> {
        let n = self.socket.read_buf(&mut self.rbuf).await?;

        if n == 0 {
            return Err(Error::Disconnected);
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn write<T>(&mut self, message: T)
    where
        T: Encode,
    {
        message.encode(&mut self.wbuf);
    }

    /// Write raw bytes, bypassing framing; only the single-byte `S`/`N`
    /// SSLRequest answer needs this.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) {
        self.wbuf.extend_from_slice(bytes);
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        if !self.wbuf.is_empty() {
            self.socket.write_all(&self.wbuf).await?;
            self.wbuf.clear();
        }

        self.socket.flush().await?;

        Ok(())
    }

    /// Perform the TLS handshake in place. The read buffer must be empty:
    /// no frame may arrive between the `S` answer and the handshake.
    pub(crate) async fn upgrade_tls(&mut self, acceptor: &TlsAcceptor) -> Result<()> {
        if !self.rbuf.is_empty() {
            return Err(err_protocol!("unexpected data before TLS handshake"));
        }

        self.socket.upgrade(acceptor).await
    }

    pub(crate) async fn shutdown(&mut self) {
        // best effort; the peer may already be gone
        let _ = self.socket.shutdown().await;
    }
}
