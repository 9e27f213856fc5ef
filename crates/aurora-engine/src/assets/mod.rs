//! Asset fetch and decode.

mod decode;
mod error;
mod source;

pub use decode::{decode_f32_array, decode_image_rgba, decode_u16_array};
pub use error::AssetError;
pub use source::{AssetSource, FsAssetSource, MemoryAssetSource};
