/// Encode a backend message, tag byte and length prefix included, onto the
/// connection's write buffer.
pub trait Encode {
    fn encode(&self, buf: &mut Vec<u8>);
}
