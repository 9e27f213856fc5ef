//! Graphics-device binding.
//!
//! The engine talks to the GPU only through the [`Device`] trait, a
//! bound-object command surface. Two bindings ship with the crate:
//! - [`WgpuDevice`]: renders into a window surface through wgpu
//! - [`RecordingDevice`]: captures the call stream without a GPU

mod binding;
mod error;
mod gpu;
mod handle;
mod init;
mod recording;
mod reflect;
mod wgpu_device;

pub use binding::Device;
pub use error::{DeviceError, SurfaceErrorAction};
pub use gpu::{Gpu, GpuFrame};
pub use handle::{
    AttribLocation, Buffer, BufferTarget, BufferUsage, ClearMask, DataType, DeviceConsts,
    DrawMode, PixelFormat, Program, Shader, ShaderKind, Texture, TextureTarget, UniformLocation,
};
pub use init::GpuInit;
pub use recording::{Call, RecordingDevice};
pub use wgpu_device::WgpuDevice;
