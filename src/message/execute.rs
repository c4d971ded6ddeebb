use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error};
use crate::io::{BufExt, Decode};

/// Run a bound portal.
#[derive(Debug)]
pub struct Execute {
    pub portal: String,

    /// Maximum number of rows to return before suspending the portal;
    /// zero means no limit.
    pub limit: u32,
}

impl Decode for Execute {
    fn decode(mut buf: Bytes) -> Result<Self, Error> {
        let portal = buf.get_str_nul()?;

        if buf.len() < 4 {
            return Err(err_protocol!("Execute truncated before row limit"));
        }

        let limit = buf.get_u32();

        Ok(Self { portal, limit })
    }
}

#[test]
fn test_decode_execute() {
    const DATA: &[u8] = b"\0\x00\x00\x00\x00";

    let m = Execute::decode(Bytes::from_static(DATA)).unwrap();

    assert!(m.portal.is_empty());
    assert_eq!(m.limit, 0);
}
