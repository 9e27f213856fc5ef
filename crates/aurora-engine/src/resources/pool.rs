use std::collections::HashMap;
use std::fmt;

use crate::device::{Buffer, BufferTarget, BufferUsage, Device, DeviceError, Program, Texture};

use super::bytes::{f32s_to_le_bytes, u16s_to_le_bytes};

/// Which of an owner's resources a key refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceSlot {
    Positions,
    Colors,
    TexCoords,
    Normals,
    Indices,
    Texture,
}

/// Identity of a pooled buffer or texture: the owning drawable plus the slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub owner: String,
    pub slot: ResourceSlot,
}

impl ResourceKey {
    pub fn new(owner: impl Into<String>, slot: ResourceSlot) -> Self {
        Self { owner: owner.into(), slot }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.owner, self.slot)
    }
}

/// Owner of every device object the engine creates.
///
/// Handles live here and nowhere else; callers borrow them for binding calls.
/// Nothing is recycled across keys, and nothing is freed implicitly: device
/// memory is returned only by [`release_all`](Self::release_all).
#[derive(Debug, Default)]
pub struct ResourcePool {
    buffers: HashMap<ResourceKey, Buffer>,
    textures: HashMap<ResourceKey, Texture>,
    programs: HashMap<String, Program>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer for `key`, creating it on first use.
    pub fn buffer_or_create<D: Device>(
        &mut self,
        device: &mut D,
        key: &ResourceKey,
    ) -> Result<&Buffer, DeviceError> {
        if !self.buffers.contains_key(key) {
            let buffer = device.create_buffer()?;
            log::debug!("buffer #{} created for {key}", buffer.raw());
            self.buffers.insert(key.clone(), buffer);
        }
        self.buffers
            .get(key)
            .ok_or(DeviceError::NothingBound("buffer"))
    }

    pub fn buffer(&self, key: &ResourceKey) -> Option<&Buffer> {
        self.buffers.get(key)
    }

    /// Binds the buffer for `key` to `target` and replaces its contents.
    pub fn upload_bytes<D: Device>(
        &mut self,
        device: &mut D,
        key: &ResourceKey,
        target: BufferTarget,
        bytes: &[u8],
        usage: BufferUsage,
    ) -> Result<(), DeviceError> {
        let buffer = self.buffer_or_create(device, key)?;
        device.bind_buffer(target, buffer)?;
        device.buffer_data(target, bytes, usage)
    }

    pub fn upload_floats<D: Device>(
        &mut self,
        device: &mut D,
        key: &ResourceKey,
        target: BufferTarget,
        values: &[f32],
        usage: BufferUsage,
    ) -> Result<(), DeviceError> {
        self.upload_bytes(device, key, target, &f32s_to_le_bytes(values), usage)
    }

    pub fn upload_u16<D: Device>(
        &mut self,
        device: &mut D,
        key: &ResourceKey,
        target: BufferTarget,
        values: &[u16],
        usage: BufferUsage,
    ) -> Result<(), DeviceError> {
        self.upload_bytes(device, key, target, &u16s_to_le_bytes(values), usage)
    }

    pub fn texture(&self, key: &ResourceKey) -> Option<&Texture> {
        self.textures.get(key)
    }

    /// Creates (once) the texture for `key`, uploads an RGBA image as level 0
    /// and generates its mip chain.
    pub fn upload_image<D: Device>(
        &mut self,
        device: &mut D,
        key: &ResourceKey,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), DeviceError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(DeviceError::InvalidArgument(format!(
                "{key}: {width}x{height} RGBA needs {expected} bytes, got {}",
                pixels.len()
            )));
        }

        if !self.textures.contains_key(key) {
            let texture = device.create_texture()?;
            log::debug!("texture #{} created for {key}", texture.raw());
            self.textures.insert(key.clone(), texture);
        }
        let Some(texture) = self.textures.get(key) else {
            return Err(DeviceError::NothingBound("texture"));
        };

        let c = device.consts().clone();
        device.bind_texture(c.texture_2d, texture)?;
        device.tex_image_2d(
            c.texture_2d,
            0,
            c.rgba,
            width,
            height,
            0,
            c.rgba,
            c.unsigned_byte,
            pixels,
        )?;
        device.generate_mipmap(c.texture_2d)
    }

    /// Stores the program for a layer, returning the one it replaces.
    pub fn insert_program(&mut self, layer: impl Into<String>, program: Program) -> Option<Program> {
        self.programs.insert(layer.into(), program)
    }

    pub fn program(&self, layer: &str) -> Option<&Program> {
        self.programs.get(layer)
    }

    /// Layer names with a linked program.
    pub fn program_names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty() && self.programs.is_empty()
    }

    /// Deletes every pooled object.
    ///
    /// All handles are given back even if some deletions fail; the first
    /// failure is reported.
    pub fn release_all<D: Device>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        let mut first_err = None;
        let mut note = |r: Result<(), DeviceError>| {
            if let Err(e) = r {
                first_err.get_or_insert(e);
            }
        };

        let (buffers, textures, programs) =
            (self.buffers.len(), self.textures.len(), self.programs.len());

        for (_, buffer) in self.buffers.drain() {
            note(device.delete_buffer(buffer));
        }
        for (_, texture) in self.textures.drain() {
            note(device.delete_texture(texture));
        }
        for (_, program) in self.programs.drain() {
            note(device.delete_program(program));
        }

        log::debug!("released {buffers} buffers, {textures} textures, {programs} programs");
        first_err.map_or(Ok(()), Err)
    }
}
