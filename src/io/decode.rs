use bytes::Bytes;

use crate::error::Error;

/// Decode the body of a frontend message. The tag byte and length prefix
/// have already been consumed by the frame reader.
pub trait Decode: Sized {
    fn decode(buf: Bytes) -> Result<Self, Error>;
}
