use crate::io::Encode;
use crate::io::BufMutExt;
use crate::types::Oid;

/// The parameter types of a described prepared statement (`t`).
#[derive(Debug)]
pub struct ParameterDescription<'a>(pub &'a [Oid]);

impl Encode for ParameterDescription<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b't');

        buf.put_length_prefixed(|buf| {
            buf.extend_from_slice(&(self.0.len() as i16).to_be_bytes());

            for oid in self.0 {
                buf.extend_from_slice(&oid.0.to_be_bytes());
            }
        });
    }
}

#[test]
fn test_encode_parameter_description() {
    let mut buf = Vec::new();

    ParameterDescription(&[Oid::TEXT, Oid::INT8]).encode(&mut buf);

    assert_eq!(
        buf,
        b"t\x00\x00\x00\x0e\x00\x02\x00\x00\x00\x19\x00\x00\x00\x14"
    );
}
