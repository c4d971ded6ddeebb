use crate::io::{BufMutExt, Encode};

/// Completion of one command (`C`) with its tag, e.g. `SELECT 1`,
/// `INSERT 0 3`, `BEGIN`.
#[derive(Debug)]
pub struct CommandComplete<'a>(pub &'a str);

impl Encode for CommandComplete<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'C');

        buf.put_length_prefixed(|buf| {
            buf.put_str_nul(self.0);
        });
    }
}

#[test]
fn test_encode_command_complete() {
    let mut buf = Vec::new();

    CommandComplete("SELECT 1").encode(&mut buf);

    assert_eq!(buf, b"C\x00\x00\x00\x0dSELECT 1\0");
}
