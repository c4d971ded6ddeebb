//! The untyped first frame of a connection: a startup packet proper, an
//! `SSLRequest`, or a `CancelRequest`, distinguished by the 4-byte version
//! code.

use std::fmt;

use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error};
use crate::io::BufExt;

/// Protocol version 3.0, `3 << 16`.
pub const PROTOCOL_VERSION_3: u32 = 196_608;

const SSL_REQUEST_CODE: u32 = 80_877_103;
const CANCEL_REQUEST_CODE: u32 = 80_877_102;

/// A decoded untyped frame.
#[derive(Debug)]
pub enum StartupRequest {
    Startup(Startup),
    SslRequest,
    Cancel(CancelRequest),
}

/// A startup packet: the protocol version and `(name, value)` parameter
/// pairs (at least `user`, usually `database` and more).
#[derive(Debug)]
pub struct Startup {
    pub version: u32,
    pub params: Vec<(String, String)>,
}

/// A cancel-request packet naming the target backend.
pub struct CancelRequest {
    pub process_id: u32,
    pub secret_key: u32,
}

// The claimed secret stays out of logs, same as our own.
impl fmt::Debug for CancelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelRequest")
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

impl StartupRequest {
    pub fn decode(mut buf: Bytes) -> Result<Self, Error> {
        if buf.len() < 4 {
            return Err(err_protocol!("startup packet too short"));
        }

        let version = buf.get_u32();

        match version {
            SSL_REQUEST_CODE => Ok(StartupRequest::SslRequest),

            CANCEL_REQUEST_CODE => {
                if buf.len() < 8 {
                    return Err(err_protocol!("cancel request truncated"));
                }

                Ok(StartupRequest::Cancel(CancelRequest {
                    process_id: buf.get_u32(),
                    secret_key: buf.get_u32(),
                }))
            }

            version => {
                // (name NUL value NUL)* terminated by an empty name
                let mut params = Vec::new();

                while !buf.is_empty() {
                    let name = buf.get_str_nul()?;

                    if name.is_empty() {
                        break;
                    }

                    let value = buf.get_str_nul()?;

                    params.push((name, value));
                }

                Ok(StartupRequest::Startup(Startup { version, params }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_a_v3_startup_packet() {
        const DATA: &[u8] = b"\x00\x03\x00\x00user\0postgres\0database\0postgres\0\0";

        let request = StartupRequest::decode(Bytes::from_static(DATA)).unwrap();

        match request {
            StartupRequest::Startup(startup) => {
                assert_eq!(startup.version, PROTOCOL_VERSION_3);
                assert_eq!(
                    startup.params,
                    vec![
                        ("user".to_owned(), "postgres".to_owned()),
                        ("database".to_owned(), "postgres".to_owned()),
                    ]
                );
            }

            other => panic!("expected Startup, got {other:?}"),
        }
    }

    #[test]
    fn it_decodes_an_ssl_request() {
        const DATA: &[u8] = b"\x04\xd2\x16\x2f";

        assert!(matches!(
            StartupRequest::decode(Bytes::from_static(DATA)).unwrap(),
            StartupRequest::SslRequest
        ));
    }

    #[test]
    fn it_decodes_a_cancel_request() {
        const DATA: &[u8] = b"\x04\xd2\x16\x2e\x00\x00\x04\x00\xde\xad\xbe\xef";

        match StartupRequest::decode(Bytes::from_static(DATA)).unwrap() {
            StartupRequest::Cancel(cancel) => {
                assert_eq!(cancel.process_id, 1024);
                assert_eq!(cancel.secret_key, 0xDEAD_BEEF);
            }

            other => panic!("expected Cancel, got {other:?}"),
        }
    }

    #[test]
    fn it_hides_the_cancel_secret_from_debug() {
        let cancel = CancelRequest {
            process_id: 42,
            secret_key: 0xDEAD_BEEF,
        };

        let formatted = format!("{cancel:?}");

        assert!(formatted.contains("42"));
        assert!(!formatted.contains("3735928559"));
    }
}
