use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error};
use crate::io::{BufExt, Decode};

/// Create a portal from a prepared statement plus parameter values.
///
/// The parameter values are recorded on the portal as delivered; applying
/// them to the query text is the executor's concern.
#[derive(Debug)]
pub struct Bind {
    pub portal: String,
    pub statement: String,
    pub param_formats: Vec<i16>,
    pub params: Vec<Option<Vec<u8>>>,
    pub result_formats: Vec<i16>,
}

impl Decode for Bind {
    fn decode(mut buf: Bytes) -> Result<Self, Error> {
        let portal = buf.get_str_nul()?;
        let statement = buf.get_str_nul()?;

        let param_formats = get_format_codes(&mut buf)?;

        if buf.len() < 2 {
            return Err(err_protocol!("Bind truncated before parameter count"));
        }

        let count = buf.get_i16();

        if count < 0 {
            return Err(err_protocol!("Bind declares {} parameters", count));
        }

        let mut params = Vec::with_capacity(count as usize);

        for _ in 0..count {
            if buf.len() < 4 {
                return Err(err_protocol!("Bind parameter value truncated"));
            }

            let len = buf.get_i32();

            // -1 is the NULL parameter; no bytes follow
            if len < 0 {
                params.push(None);
            } else if buf.len() < len as usize {
                return Err(err_protocol!("Bind parameter value truncated"));
            } else {
                params.push(Some(buf.split_to(len as usize).to_vec()));
            }
        }

        let result_formats = get_format_codes(&mut buf)?;

        Ok(Self {
            portal,
            statement,
            param_formats,
            params,
            result_formats,
        })
    }
}

fn get_format_codes(buf: &mut Bytes) -> Result<Vec<i16>, Error> {
    if buf.len() < 2 {
        return Err(err_protocol!("Bind truncated before format codes"));
    }

    let count = buf.get_i16();

    if count < 0 || buf.len() < (count as usize) * 2 {
        return Err(err_protocol!("Bind declares {} format codes", count));
    }

    Ok((0..count).map(|_| buf.get_i16()).collect())
}

#[test]
fn test_decode_bind() {
    // portal "p" over statement "s" with params ("42", NULL), text format
    const DATA: &[u8] =
        b"p\0s\0\x00\x01\x00\x00\x00\x02\x00\x00\x00\x0242\xff\xff\xff\xff\x00\x00";

    let m = Bind::decode(Bytes::from_static(DATA)).unwrap();

    assert_eq!(m.portal, "p");
    assert_eq!(m.statement, "s");
    assert_eq!(m.param_formats, vec![0]);
    assert_eq!(m.params, vec![Some(b"42".to_vec()), None]);
    assert!(m.result_formats.is_empty());
}
