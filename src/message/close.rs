use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error};
use crate::io::{BufExt, Decode};

/// Drop a prepared statement or a portal. Closing a name that does not
/// exist is not an error.
#[derive(Debug)]
pub enum Close {
    Statement(String),
    Portal(String),
}

impl Decode for Close {
    fn decode(mut buf: Bytes) -> Result<Self, Error> {
        if buf.is_empty() {
            return Err(err_protocol!("Close without a target"));
        }

        let kind = buf.get_u8();
        let name = buf.get_str_nul()?;

        match kind {
            b'S' => Ok(Close::Statement(name)),
            b'P' => Ok(Close::Portal(name)),

            other => Err(err_protocol!("unknown Close target: {:?}", other as char)),
        }
    }
}

#[test]
fn test_decode_close() {
    let m = Close::decode(Bytes::from_static(b"Pcursor_1\0")).unwrap();
    assert!(matches!(m, Close::Portal(name) if name == "cursor_1"));
}
