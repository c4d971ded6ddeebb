mod stream;
pub(crate) mod tls;

pub(crate) use stream::MaybeTlsStream;
