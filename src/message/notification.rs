use crate::io::{BufMutExt, Encode};

/// An asynchronous `NOTIFY` delivery (`A`). Notifications never cross
/// connections here; the mock delivers them to the session that raised
/// them, when it LISTENs on the channel.
#[derive(Debug)]
pub struct NotificationResponse<'a> {
    pub process_id: u32,
    pub channel: &'a str,
    pub payload: &'a str,
}

impl Encode for NotificationResponse<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'A');

        buf.put_length_prefixed(|buf| {
            buf.extend_from_slice(&self.process_id.to_be_bytes());
            buf.put_str_nul(self.channel);
            buf.put_str_nul(self.payload);
        });
    }
}

#[test]
fn test_encode_notification_response() {
    let mut buf = Vec::new();

    NotificationResponse {
        process_id: 7,
        channel: "jobs",
        payload: "wake",
    }
    .encode(&mut buf);

    assert_eq!(buf, b"A\x00\x00\x00\x12\x00\x00\x00\x07jobs\0wake\0");
}
