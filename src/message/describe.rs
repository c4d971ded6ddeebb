use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error};
use crate::io::{BufExt, Decode};

/// Request a description of a prepared statement or a portal.
#[derive(Debug)]
pub enum Describe {
    Statement(String),
    Portal(String),
}

impl Decode for Describe {
    fn decode(mut buf: Bytes) -> Result<Self, Error> {
        if buf.is_empty() {
            return Err(err_protocol!("Describe without a target"));
        }

        let kind = buf.get_u8();
        let name = buf.get_str_nul()?;

        match kind {
            b'S' => Ok(Describe::Statement(name)),
            b'P' => Ok(Describe::Portal(name)),

            other => Err(err_protocol!(
                "unknown Describe target: {:?}",
                other as char
            )),
        }
    }
}

#[test]
fn test_decode_describe() {
    let m = Describe::decode(Bytes::from_static(b"Sstmt\0")).unwrap();
    assert!(matches!(m, Describe::Statement(name) if name == "stmt"));

    let m = Describe::decode(Bytes::from_static(b"P\0")).unwrap();
    assert!(matches!(m, Describe::Portal(name) if name.is_empty()));

    assert!(Describe::decode(Bytes::from_static(b"Xoops\0")).is_err());
}
