pub mod encoder;

pub use encoder::{encode, EncodeError, EncodedImage, InputItem};
