use crate::io::Encode;

/// The description of a statement or portal that returns no rows (`n`).
#[derive(Debug)]
pub struct NoData;

impl Encode for NoData {
    #[inline]
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'n');
        buf.extend_from_slice(&4_u32.to_be_bytes());
    }
}
