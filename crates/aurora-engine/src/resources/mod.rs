//! Device object ownership and upload helpers.

mod bytes;
mod pool;

pub use bytes::{f32s_to_le_bytes, u16s_to_le_bytes};
pub use pool::{ResourceKey, ResourcePool, ResourceSlot};
