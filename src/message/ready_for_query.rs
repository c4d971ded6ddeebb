use crate::io::{BufMutExt, Encode};
use crate::state::TransactionStatus;

/// The frame (`Z`) that punctuates every completed command cycle, carrying
/// the transaction status byte.
#[derive(Debug)]
pub struct ReadyForQuery(pub TransactionStatus);

impl Encode for ReadyForQuery {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'Z');

        buf.put_length_prefixed(|buf| {
            buf.push(self.0.to_byte());
        });
    }
}

#[test]
fn test_encode_ready_for_query() {
    let mut buf = Vec::new();

    ReadyForQuery(TransactionStatus::Idle).encode(&mut buf);
    ReadyForQuery(TransactionStatus::Transaction).encode(&mut buf);
    ReadyForQuery(TransactionStatus::Failed).encode(&mut buf);

    assert_eq!(buf, b"Z\x00\x00\x00\x05IZ\x00\x00\x00\x05TZ\x00\x00\x00\x05E");
}
