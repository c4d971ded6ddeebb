use bytes::{Buf, Bytes};
use memchr::memchr;

use crate::error::{err_protocol, Error};

pub trait BufExt: Buf {
    // Read a NUL-terminated byte sequence, not including the NUL.
    fn get_bytes_nul(&mut self) -> Result<Bytes, Error>;

    // Read a NUL-terminated string, not including the NUL.
    fn get_str_nul(&mut self) -> Result<String, Error>;
}

impl BufExt for Bytes {
    fn get_bytes_nul(&mut self) -> Result<Bytes, Error> {
        let nul =
            memchr(b'\0', self).ok_or_else(|| err_protocol!("expected NUL in byte sequence"))?;

        let v = self.slice(0..nul);

        self.advance(nul + 1);

        Ok(v)
    }

    fn get_str_nul(&mut self) -> Result<String, Error> {
        self.get_bytes_nul().and_then(|bytes| {
            std::str::from_utf8(&bytes)
                .map(ToOwned::to_owned)
                .map_err(|err| err_protocol!("{}", err))
        })
    }
}

#[test]
fn test_get_str_nul() {
    let mut buf = Bytes::from_static(b"postgres\0UTF8\0");

    assert_eq!(buf.get_str_nul().unwrap(), "postgres");
    assert_eq!(buf.get_str_nul().unwrap(), "UTF8");
}

#[test]
fn test_get_str_nul_unterminated() {
    let mut buf = Bytes::from_static(b"no terminator here");

    assert!(buf.get_str_nul().is_err());
}
