//! A minimal raw-bytes protocol client for exercising the server over a
//! real socket. Deliberately not a driver: every byte sent and received is
//! spelled out here, so the tests pin the wire format itself.

#![allow(dead_code)]

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use pgmock::{PgMockOptions, PgMockServer};

pub const PROTOCOL_VERSION_3: u32 = 196_608;
pub const SSL_REQUEST_CODE: u32 = 80_877_103;

/// Bind a server on an ephemeral port.
pub async fn spawn_server(options: PgMockOptions) -> PgMockServer {
    PgMockServer::bind(options.host("127.0.0.1").port(0))
        .await
        .expect("failed to bind server")
}

pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("failed to connect");
        stream.set_nodelay(true).ok();

        Self { stream }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write failed");
    }

    /// Read one typed backend frame; returns the tag and the payload.
    pub async fn recv(&mut self) -> (u8, Vec<u8>) {
        let mut header = [0u8; 5];
        self.stream
            .read_exact(&mut header)
            .await
            .expect("read header failed");

        let tag = header[0];
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

        let mut payload = vec![0u8; len - 4];
        self.stream
            .read_exact(&mut payload)
            .await
            .expect("read payload failed");

        (tag, payload)
    }

    /// Read the single-byte answer to an SSLRequest.
    pub async fn recv_byte(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        self.stream
            .read_exact(&mut byte)
            .await
            .expect("read byte failed");

        byte[0]
    }

    /// Collect frames up to and including `ReadyForQuery`.
    pub async fn recv_until_ready(&mut self) -> Vec<(u8, Vec<u8>)> {
        let mut frames = Vec::new();

        loop {
            let frame = self.recv().await;
            let done = frame.0 == b'Z';

            frames.push(frame);

            if done {
                return frames;
            }
        }
    }

    /// The next read returns EOF.
    pub async fn expect_eof(&mut self) {
        let mut byte = [0u8; 1];

        match self.stream.read(&mut byte).await {
            Ok(0) => {}
            Ok(_) => panic!("expected EOF, got more data"),
            Err(_) => {} // reset counts too
        }
    }

    /// Send a v3 startup packet and collect the response through
    /// `ReadyForQuery`.
    pub async fn startup(&mut self, user: &str, database: &str) -> Vec<(u8, Vec<u8>)> {
        self.send(&startup_packet(&[("user", user), ("database", database)]))
            .await;

        self.recv_until_ready().await
    }

    /// Issue a simple query and collect the response through
    /// `ReadyForQuery`.
    pub async fn query(&mut self, sql: &str) -> Vec<(u8, Vec<u8>)> {
        self.send(&query_packet(sql)).await;

        self.recv_until_ready().await
    }

    pub async fn terminate(mut self) {
        self.send(&message(b'X', &[])).await;
    }
}

// -- frame builders ---------------------------------------------------------

pub fn message(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(((body.len() + 4) as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

pub fn startup_packet(params: &[(&str, &str)]) -> Vec<u8> {
    let mut body = PROTOCOL_VERSION_3.to_be_bytes().to_vec();

    for (name, value) in params {
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
    }

    body.push(0);

    untyped(&body)
}

pub fn ssl_request_packet() -> Vec<u8> {
    untyped(&SSL_REQUEST_CODE.to_be_bytes())
}

pub fn cancel_request_packet(process_id: u32, secret_key: u32) -> Vec<u8> {
    let mut body = 80_877_102u32.to_be_bytes().to_vec();
    body.extend(process_id.to_be_bytes());
    body.extend(secret_key.to_be_bytes());

    untyped(&body)
}

fn untyped(body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 4) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

pub fn query_packet(sql: &str) -> Vec<u8> {
    let mut body = sql.as_bytes().to_vec();
    body.push(0);

    message(b'Q', &body)
}

pub fn parse_packet(statement: &str, sql: &str, param_oids: &[u32]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(statement.as_bytes());
    body.push(0);
    body.extend_from_slice(sql.as_bytes());
    body.push(0);
    body.extend((param_oids.len() as i16).to_be_bytes());

    for oid in param_oids {
        body.extend(oid.to_be_bytes());
    }

    message(b'P', &body)
}

pub fn bind_packet(portal: &str, statement: &str, params: &[Option<&str>]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(portal.as_bytes());
    body.push(0);
    body.extend_from_slice(statement.as_bytes());
    body.push(0);

    // all text format
    body.extend(0i16.to_be_bytes());

    body.extend((params.len() as i16).to_be_bytes());

    for param in params {
        match param {
            Some(value) => {
                body.extend((value.len() as i32).to_be_bytes());
                body.extend_from_slice(value.as_bytes());
            }

            None => body.extend((-1i32).to_be_bytes()),
        }
    }

    body.extend(0i16.to_be_bytes());

    message(b'B', &body)
}

pub fn describe_packet(kind: u8, name: &str) -> Vec<u8> {
    let mut body = vec![kind];
    body.extend_from_slice(name.as_bytes());
    body.push(0);

    message(b'D', &body)
}

pub fn execute_packet(portal: &str, limit: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(portal.as_bytes());
    body.push(0);
    body.extend(limit.to_be_bytes());

    message(b'E', &body)
}

pub fn close_packet(kind: u8, name: &str) -> Vec<u8> {
    let mut body = vec![kind];
    body.extend_from_slice(name.as_bytes());
    body.push(0);

    message(b'C', &body)
}

pub fn sync_packet() -> Vec<u8> {
    message(b'S', &[])
}

// -- frame inspectors -------------------------------------------------------

/// The value of one tagged field in an ErrorResponse/NoticeResponse body.
pub fn response_field(body: &[u8], wanted: u8) -> Option<String> {
    let mut at = 0;

    while at < body.len() && body[at] != 0 {
        let tag = body[at];
        at += 1;

        let end = at + body[at..].iter().position(|&b| b == 0)?;
        let value = std::str::from_utf8(&body[at..end]).ok()?;

        if tag == wanted {
            return Some(value.to_owned());
        }

        at = end + 1;
    }

    None
}

pub fn error_code(body: &[u8]) -> String {
    response_field(body, b'C').expect("response without SQLSTATE")
}

/// Decode a DataRow payload into its column values.
pub fn data_row_values(body: &[u8]) -> Vec<Option<String>> {
    let count = i16::from_be_bytes([body[0], body[1]]) as usize;
    let mut values = Vec::with_capacity(count);
    let mut at = 2;

    for _ in 0..count {
        let len = i32::from_be_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]]);
        at += 4;

        if len < 0 {
            values.push(None);
        } else {
            let end = at + len as usize;
            values.push(Some(
                String::from_utf8(body[at..end].to_vec()).expect("non-UTF-8 value"),
            ));
            at = end;
        }
    }

    values
}

/// The tags of a frame sequence, as a compact string for assertions.
pub fn tags(frames: &[(u8, Vec<u8>)]) -> String {
    frames.iter().map(|(tag, _)| *tag as char).collect()
}

/// The frames with a given tag.
pub fn frames_with<'a>(frames: &'a [(u8, Vec<u8>)], tag: u8) -> Vec<&'a [u8]> {
    frames
        .iter()
        .filter(|(t, _)| *t == tag)
        .map(|(_, body)| body.as_slice())
        .collect()
}
