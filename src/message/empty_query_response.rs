use crate::io::Encode;

/// The response (`I`) to an empty query string, in place of
/// `CommandComplete`.
#[derive(Debug)]
pub struct EmptyQueryResponse;

impl Encode for EmptyQueryResponse {
    #[inline]
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'I');
        buf.extend_from_slice(&4_u32.to_be_bytes());
    }
}
