use crate::io::Encode;

#[derive(Debug)]
pub struct BindComplete;

impl Encode for BindComplete {
    #[inline]
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'2');
        buf.extend_from_slice(&4_u32.to_be_bytes());
    }
}
