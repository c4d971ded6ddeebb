pub trait BufMutExt {
    // Write a NUL-terminated string.
    fn put_str_nul(&mut self, s: &str);

    // Write the 4-byte length (including itself) followed by the frame body
    // produced by the closure. The message tag byte, if any, is written by
    // the caller before this.
    fn put_length_prefixed<F>(&mut self, write: F)
    where
        F: FnOnce(&mut Vec<u8>);
}

impl BufMutExt for Vec<u8> {
    fn put_str_nul(&mut self, s: &str) {
        self.extend_from_slice(s.as_bytes());
        self.push(0);
    }

    fn put_length_prefixed<F>(&mut self, write: F)
    where
        F: FnOnce(&mut Vec<u8>),
    {
        let offset = self.len();
        self.extend_from_slice(&[0; 4]);

        write(self);

        let size = (self.len() - offset) as i32;
        self[offset..(offset + 4)].copy_from_slice(&size.to_be_bytes());
    }
}

#[test]
fn test_put_length_prefixed() {
    let mut buf = Vec::new();

    buf.push(b'Z');
    buf.put_length_prefixed(|buf| {
        buf.push(b'I');
    });

    assert_eq!(buf, b"Z\0\0\0\x05I");
}

#[test]
fn test_put_str_nul() {
    let mut buf = Vec::new();

    buf.put_str_nul("SELECT 1");

    assert_eq!(buf, b"SELECT 1\0");
}
