use crate::io::Encode;

/// `Execute` hit its row limit with rows remaining (`s`); the portal can
/// be executed again to continue.
#[derive(Debug)]
pub struct PortalSuspended;

impl Encode for PortalSuspended {
    #[inline]
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b's');
        buf.extend_from_slice(&4_u32.to_be_bytes());
    }
}
