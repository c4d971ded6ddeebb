use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error};
use crate::io::{BufExt, Decode};
use crate::types::Oid;

/// Register a prepared statement. The empty name addresses the unnamed
/// statement slot.
#[derive(Debug)]
pub struct Parse {
    /// The name of the destination prepared statement.
    pub statement: String,

    /// The query string to be parsed.
    pub query: String,

    /// The parameter data types pre-declared by the frontend (may be fewer
    /// than the parameters that appear in the query).
    pub param_types: Vec<Oid>,
}

impl Decode for Parse {
    fn decode(mut buf: Bytes) -> Result<Self, Error> {
        let statement = buf.get_str_nul()?;
        let query = buf.get_str_nul()?;

        if buf.len() < 2 {
            return Err(err_protocol!("Parse truncated before parameter count"));
        }

        let count = buf.get_i16();

        if count < 0 || buf.len() < (count as usize) * 4 {
            return Err(err_protocol!("Parse declares {} parameter types", count));
        }

        let param_types = (0..count).map(|_| Oid(buf.get_u32())).collect();

        Ok(Self {
            statement,
            query,
            param_types,
        })
    }
}

#[test]
fn test_decode_parse() {
    const DATA: &[u8] = b"stmt_1\0SELECT $1\0\x00\x01\x00\x00\x00\x19";

    let m = Parse::decode(Bytes::from_static(DATA)).unwrap();

    assert_eq!(m.statement, "stmt_1");
    assert_eq!(m.query, "SELECT $1");
    assert_eq!(m.param_types, vec![Oid::TEXT]);
}
