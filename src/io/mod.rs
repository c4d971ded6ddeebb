mod buf;
mod buf_mut;
mod decode;
mod encode;

pub use buf::BufExt;
pub use buf_mut::BufMutExt;
pub use decode::Decode;
pub use encode::Encode;
