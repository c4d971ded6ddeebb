use crate::io::{BufMutExt, Encode};

/// Secret-key data (`K`) the frontend must save to issue cancel requests.
/// This message is the only place the secret ever appears.
#[derive(Debug)]
pub struct BackendKeyData {
    pub process_id: u32,
    pub secret_key: u32,
}

impl Encode for BackendKeyData {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'K');

        buf.put_length_prefixed(|buf| {
            buf.extend_from_slice(&self.process_id.to_be_bytes());
            buf.extend_from_slice(&self.secret_key.to_be_bytes());
        });
    }
}

#[test]
fn test_encode_backend_key_data() {
    let mut buf = Vec::new();

    BackendKeyData {
        process_id: 10182,
        secret_key: 2303903019,
    }
    .encode(&mut buf);

    assert_eq!(buf, b"K\x00\x00\x00\x0c\0\0'\xc6\x89R\xc5+");
}
