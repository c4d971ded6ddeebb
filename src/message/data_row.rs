use crate::io::{BufMutExt, Encode};

/// One result row (`D`). A `None` value is SQL NULL, written as length -1
/// with no bytes following.
#[derive(Debug)]
pub struct DataRow<'a>(pub &'a [Option<String>]);

impl Encode for DataRow<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'D');

        buf.put_length_prefixed(|buf| {
            buf.extend_from_slice(&(self.0.len() as i16).to_be_bytes());

            for value in self.0 {
                match value {
                    Some(value) => {
                        buf.extend_from_slice(&(value.len() as i32).to_be_bytes());
                        buf.extend_from_slice(value.as_bytes());
                    }

                    None => {
                        buf.extend_from_slice(&(-1_i32).to_be_bytes());
                    }
                }
            }
        });
    }
}

#[test]
fn test_encode_data_row() {
    let values = [Some("1".to_owned()), None];

    let mut buf = Vec::new();
    DataRow(&values).encode(&mut buf);

    assert_eq!(buf, b"D\x00\x00\x00\x0f\x00\x02\x00\x00\x00\x011\xff\xff\xff\xff");
}
