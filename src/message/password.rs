//! The two faces of the frontend `p` message during SASL: the initial
//! response selecting a mechanism and the continuation responses.

use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error};
use crate::io::{BufExt, Decode};

/// `SASLInitialResponse`: the chosen mechanism and the first client message.
#[derive(Debug)]
pub struct SaslInitialResponse {
    pub mechanism: String,
    pub response: Bytes,
}

impl Decode for SaslInitialResponse {
    fn decode(mut buf: Bytes) -> Result<Self, Error> {
        let mechanism = buf.get_str_nul()?;

        if buf.len() < 4 {
            return Err(err_protocol!("SASLInitialResponse truncated"));
        }

        let len = buf.get_i32();

        let response = if len < 0 {
            Bytes::new()
        } else if buf.len() < len as usize {
            return Err(err_protocol!("SASLInitialResponse data truncated"));
        } else {
            buf.split_to(len as usize)
        };

        Ok(Self {
            mechanism,
            response,
        })
    }
}

/// `SASLResponse`: mechanism-specific data, here the SCRAM client-final
/// message. The body is the entire payload.
#[derive(Debug)]
pub struct SaslResponse(pub Bytes);

impl Decode for SaslResponse {
    fn decode(buf: Bytes) -> Result<Self, Error> {
        Ok(Self(buf))
    }
}

#[test]
fn test_decode_sasl_initial_response() {
    const DATA: &[u8] = b"SCRAM-SHA-256\0\x00\x00\x00\x20n,,n=postgres,r=aaaaaaaaaaaaaaaa";

    let m = SaslInitialResponse::decode(Bytes::from_static(DATA)).unwrap();

    assert_eq!(m.mechanism, "SCRAM-SHA-256");
    assert_eq!(&m.response[..], b"n,,n=postgres,r=aaaaaaaaaaaaaaaa");
}

#[test]
fn test_decode_sasl_initial_response_without_data() {
    const DATA: &[u8] = b"SCRAM-SHA-256\0\xff\xff\xff\xff";

    let m = SaslInitialResponse::decode(Bytes::from_static(DATA)).unwrap();

    assert!(m.response.is_empty());
}
