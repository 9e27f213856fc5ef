//! Typed device handles and device-defined enum values.
//!
//! Handles are created only by a [`Device`](super::Device) and are neither
//! `Copy` nor `Clone`: the owner holds the single live value and gives it back
//! through `delete_*`, which consumes it. Binding calls borrow.

use std::num::NonZeroU32;

use super::DeviceError;

macro_rules! device_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            pub(crate) const KIND: &'static str = $kind;

            #[inline]
            pub(crate) fn from_raw(id: NonZeroU32) -> Self {
                Self(id)
            }

            /// Error describing this handle as unknown to the device.
            #[inline]
            pub(crate) fn invalid(&self) -> DeviceError {
                DeviceError::InvalidHandle { kind: Self::KIND, id: self.raw() }
            }

            /// Device-assigned id. Stable for the lifetime of the handle.
            #[inline]
            pub fn raw(&self) -> u32 {
                self.0.get()
            }
        }
    };
}

device_handle!(
    /// GPU buffer object (vertex, index).
    Buffer,
    "buffer"
);
device_handle!(
    /// GPU texture object.
    Texture,
    "texture"
);
device_handle!(
    /// Compiled (or failed) shader stage object.
    Shader,
    "shader"
);
device_handle!(
    /// Linked (or failed) shader program object.
    Program,
    "program"
);

/// Location of a vertex attribute within a linked program.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttribLocation(pub(crate) u32);

impl AttribLocation {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Location of a uniform within one linked program.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub(crate) program: u32,
    pub(crate) slot: u32,
}

/// Monotonic id source shared by all handle kinds of one device.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: u32,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl HandleAllocator {
    pub(crate) fn allocate(&mut self) -> Result<NonZeroU32, DeviceError> {
        let id = NonZeroU32::new(self.next).ok_or(DeviceError::HandlesExhausted)?;
        self.next = self.next.checked_add(1).unwrap_or(0);
        Ok(id)
    }
}

macro_rules! device_enum {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

device_enum!(
    /// Buffer binding point (`ARRAY_BUFFER`, `ELEMENT_ARRAY_BUFFER`).
    BufferTarget
);
device_enum!(
    /// Advisory usage hint passed with buffer uploads.
    BufferUsage
);
device_enum!(
    /// Bitmask selecting which attachments `clear` resets.
    ClearMask
);
device_enum!(
    /// Shader stage kind requested at shader creation.
    ShaderKind
);
device_enum!(
    /// Primitive topology for draw calls.
    DrawMode
);
device_enum!(
    /// Component data type (vertex attributes, indices, pixels).
    DataType
);
device_enum!(
    /// Texture binding point.
    TextureTarget
);
device_enum!(
    /// Pixel layout for texture uploads.
    PixelFormat
);

/// Device-defined values for every enum-like parameter the engine passes.
///
/// Resolved once when the binding is constructed and handed out by
/// [`Device::consts`](super::Device::consts). The engine never assumes
/// particular numeric values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConsts {
    pub array_buffer: BufferTarget,
    pub element_array_buffer: BufferTarget,

    pub static_draw: BufferUsage,
    pub dynamic_copy: BufferUsage,
    pub stream_read: BufferUsage,

    pub color_buffer_bit: ClearMask,

    pub vertex_shader: ShaderKind,
    pub fragment_shader: ShaderKind,

    pub points: DrawMode,
    pub line_strip: DrawMode,
    pub line_loop: DrawMode,
    pub lines: DrawMode,
    pub triangle_strip: DrawMode,
    pub triangle_fan: DrawMode,
    pub triangles: DrawMode,

    pub float: DataType,
    pub unsigned_byte: DataType,
    pub unsigned_short: DataType,
    pub unsigned_int: DataType,

    pub texture_2d: TextureTarget,
    pub rgba: PixelFormat,
}

impl DeviceConsts {
    /// Builds the table by asking `resolve` for each constant by its
    /// conventional name (`"ARRAY_BUFFER"`, `"STATIC_DRAW"`, ...).
    pub fn resolve(mut resolve: impl FnMut(&'static str) -> u32) -> Self {
        Self {
            array_buffer: BufferTarget(resolve("ARRAY_BUFFER")),
            element_array_buffer: BufferTarget(resolve("ELEMENT_ARRAY_BUFFER")),

            static_draw: BufferUsage(resolve("STATIC_DRAW")),
            dynamic_copy: BufferUsage(resolve("DYNAMIC_COPY")),
            stream_read: BufferUsage(resolve("STREAM_READ")),

            color_buffer_bit: ClearMask(resolve("COLOR_BUFFER_BIT")),

            vertex_shader: ShaderKind(resolve("VERTEX_SHADER")),
            fragment_shader: ShaderKind(resolve("FRAGMENT_SHADER")),

            points: DrawMode(resolve("POINTS")),
            line_strip: DrawMode(resolve("LINE_STRIP")),
            line_loop: DrawMode(resolve("LINE_LOOP")),
            lines: DrawMode(resolve("LINES")),
            triangle_strip: DrawMode(resolve("TRIANGLE_STRIP")),
            triangle_fan: DrawMode(resolve("TRIANGLE_FAN")),
            triangles: DrawMode(resolve("TRIANGLES")),

            float: DataType(resolve("FLOAT")),
            unsigned_byte: DataType(resolve("UNSIGNED_BYTE")),
            unsigned_short: DataType(resolve("UNSIGNED_SHORT")),
            unsigned_int: DataType(resolve("UNSIGNED_INT")),

            texture_2d: TextureTarget(resolve("TEXTURE_2D")),
            rgba: PixelFormat(resolve("RGBA")),
        }
    }

    /// Table with sequential values starting at `base`, in declaration order.
    pub fn sequential(base: u32) -> Self {
        let mut next = base;
        Self::resolve(|_| {
            let v = next;
            next += 1;
            v
        })
    }
}
