use bytes::Bytes;

use crate::error::Error;
use crate::io::{BufExt, Decode};

/// Simple query: the body is one SQL string, possibly containing several
/// `;`-separated statements.
#[derive(Debug)]
pub struct Query(pub String);

impl Decode for Query {
    fn decode(mut buf: Bytes) -> Result<Self, Error> {
        Ok(Self(buf.get_str_nul()?))
    }
}

#[test]
fn test_decode_query() {
    const DATA: &[u8] = b"SELECT 1\0";

    let m = Query::decode(Bytes::from_static(DATA)).unwrap();

    assert_eq!(m.0, "SELECT 1");
}
