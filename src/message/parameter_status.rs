use crate::io::{BufMutExt, Encode};

/// Report a run-time parameter (`S`): pushed as a batch after
/// authentication and again whenever `SET` changes a reportable setting.
#[derive(Debug)]
pub struct ParameterStatus<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl Encode for ParameterStatus<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'S');

        buf.put_length_prefixed(|buf| {
            buf.put_str_nul(self.name);
            buf.put_str_nul(self.value);
        });
    }
}

#[test]
fn test_encode_parameter_status() {
    let mut buf = Vec::new();

    ParameterStatus {
        name: "client_encoding",
        value: "UTF8",
    }
    .encode(&mut buf);

    assert_eq!(buf, b"S\x00\x00\x00\x19client_encoding\0UTF8\0");
}
