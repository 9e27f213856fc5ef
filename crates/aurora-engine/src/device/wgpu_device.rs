//! [`Device`] implemented on wgpu.
//!
//! wgpu is a retained pipeline API; the binding emulates the bound-object
//! command model on top of it:
//! - stage sources are WGSL, compiled (and reflected) through naga so that
//!   compile and link diagnostics surface as info logs instead of panics
//! - render pipelines are created lazily per (program, vertex layout,
//!   topology) on first draw and cached
//! - draws are recorded and replayed into one render pass on `flush`; a
//!   pending `clear` becomes that pass's load operation
//! - a buffer that an earlier draw of the current frame still reads is
//!   orphaned on upload (fresh allocation), so each draw sees the contents
//!   that were current when it was issued
//! - uniforms are snapshotted into a small buffer per draw for the same reason

use std::collections::{BTreeMap, HashMap};

use wgpu::util::DeviceExt;

use super::handle::HandleAllocator;
use super::reflect::{self, ResourceKind, StageInterface};
use super::{
    AttribLocation, Buffer, BufferTarget, BufferUsage, ClearMask, DataType, Device, DeviceConsts,
    DeviceError, DrawMode, Gpu, PixelFormat, Program, Shader, ShaderKind, Texture, TextureTarget,
    UniformLocation,
};

/// Base of the enum value range this binding hands out.
const CONST_BASE: u32 = 0x1_0000;

struct BufferSlot {
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
    len: u64,
    /// Referenced by a draw recorded since the last flush.
    in_flight: bool,
}

struct TextureSlot {
    texture: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
    /// Level 0 pixels, kept for mip generation.
    pixels: Vec<u8>,
    size: (u32, u32),
}

struct ShaderSlot {
    stage: naga::ShaderStage,
    source: String,
    compiled: Option<Compiled>,
    log: String,
}

#[derive(Clone)]
struct Compiled {
    interface: StageInterface,
    module: wgpu::ShaderModule,
}

struct ProgramSlot {
    attached: Vec<u32>,
    linked: Option<Linked>,
    log: String,
}

struct Linked {
    vertex: Compiled,
    fragment: Compiled,
    resources: Vec<reflect::Resource>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_values: HashMap<u32, [f32; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AttribPointer {
    buffer: u32,
    format: wgpu::VertexFormat,
    stride: u64,
    offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u32,
    topology: wgpu::PrimitiveTopology,
    strip_index: Option<wgpu::IndexFormat>,
    /// (location, format, stride) per vertex buffer slot.
    layout: Vec<(u32, wgpu::VertexFormat, u64)>,
}

enum DrawKind {
    Arrays { first: u32, count: u32 },
    Elements { buffer: wgpu::Buffer, format: wgpu::IndexFormat, first: u32, count: u32 },
}

struct DrawCommand {
    pipeline: wgpu::RenderPipeline,
    vertex_buffers: Vec<(wgpu::Buffer, u64)>,
    bind_group: Option<wgpu::BindGroup>,
    viewport: [f32; 4],
    kind: DrawKind,
}

/// Device binding backed by a wgpu surface.
pub struct WgpuDevice<'w> {
    gpu: Gpu<'w>,
    consts: DeviceConsts,
    ids: HandleAllocator,
    sampler: wgpu::Sampler,

    buffers: HashMap<u32, BufferSlot>,
    textures: HashMap<u32, TextureSlot>,
    shaders: HashMap<u32, ShaderSlot>,
    programs: HashMap<u32, ProgramSlot>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    bound_array: Option<u32>,
    bound_element: Option<u32>,
    bound_texture: Option<u32>,
    current_program: Option<u32>,
    attribs: BTreeMap<u32, AttribPointer>,
    enabled: BTreeMap<u32, bool>,
    viewport: Option<[f32; 4]>,

    clear_color: wgpu::Color,
    pending_clear: Option<wgpu::Color>,
    commands: Vec<DrawCommand>,
}

impl<'w> WgpuDevice<'w> {
    /// Wraps an initialized GPU context. Enum values are assigned here, once.
    pub fn new(gpu: Gpu<'w>) -> Self {
        let sampler = gpu.device().create_sampler(&wgpu::SamplerDescriptor {
            label: Some("aurora texture sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });

        Self {
            gpu,
            consts: DeviceConsts::sequential(CONST_BASE),
            ids: HandleAllocator::default(),
            sampler,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            bound_array: None,
            bound_element: None,
            bound_texture: None,
            current_program: None,
            attribs: BTreeMap::new(),
            enabled: BTreeMap::new(),
            viewport: None,
            clear_color: wgpu::Color::BLACK,
            pending_clear: None,
            commands: Vec::new(),
        }
    }

    /// Creates the GPU context for `window` and wraps it.
    ///
    /// Any failure to obtain an adapter, device or surface is reported as
    /// [`DeviceError::Unavailable`].
    pub fn connect(window: &'w winit::window::Window, init: super::GpuInit) -> Result<Self, DeviceError> {
        let gpu = pollster::block_on(Gpu::new(window, &init))?;
        Ok(Self::new(gpu))
    }

    pub fn gpu(&self) -> &Gpu<'w> {
        &self.gpu
    }

    fn device(&self) -> &wgpu::Device {
        self.gpu.device()
    }

    fn buffer_slot(&mut self, id: u32) -> Result<&mut BufferSlot, DeviceError> {
        self.buffers
            .get_mut(&id)
            .ok_or(DeviceError::InvalidHandle { kind: Buffer::KIND, id })
    }

    fn bound_buffer_id(&self, target: BufferTarget) -> Result<u32, DeviceError> {
        let bound = if target == self.consts.array_buffer {
            self.bound_array
        } else if target == self.consts.element_array_buffer {
            self.bound_element
        } else {
            return Err(DeviceError::Unsupported { what: "buffer target", value: target.raw() });
        };
        bound.ok_or(DeviceError::NothingBound("buffer"))
    }

    fn check_texture_target(&self, target: TextureTarget) -> Result<(), DeviceError> {
        if target == self.consts.texture_2d {
            Ok(())
        } else {
            Err(DeviceError::Unsupported { what: "texture target", value: target.raw() })
        }
    }

    fn shader_stage(&self, kind: ShaderKind) -> Result<naga::ShaderStage, DeviceError> {
        if kind == self.consts.vertex_shader {
            Ok(naga::ShaderStage::Vertex)
        } else if kind == self.consts.fragment_shader {
            Ok(naga::ShaderStage::Fragment)
        } else {
            Err(DeviceError::Unsupported { what: "shader kind", value: kind.raw() })
        }
    }

    fn topology(&self, mode: DrawMode) -> Result<wgpu::PrimitiveTopology, DeviceError> {
        let c = &self.consts;
        if mode == c.triangles {
            Ok(wgpu::PrimitiveTopology::TriangleList)
        } else if mode == c.triangle_strip {
            Ok(wgpu::PrimitiveTopology::TriangleStrip)
        } else if mode == c.lines {
            Ok(wgpu::PrimitiveTopology::LineList)
        } else if mode == c.line_strip {
            Ok(wgpu::PrimitiveTopology::LineStrip)
        } else if mode == c.points {
            Ok(wgpu::PrimitiveTopology::PointList)
        } else {
            Err(DeviceError::Unsupported { what: "draw mode", value: mode.raw() })
        }
    }

    fn vertex_format(&self, size: u32, ty: DataType, normalized: bool) -> Result<wgpu::VertexFormat, DeviceError> {
        use wgpu::VertexFormat as F;
        let format = if ty == self.consts.float {
            match size {
                1 => Some(F::Float32),
                2 => Some(F::Float32x2),
                3 => Some(F::Float32x3),
                4 => Some(F::Float32x4),
                _ => None,
            }
        } else if ty == self.consts.unsigned_byte {
            match (size, normalized) {
                (2, true) => Some(F::Unorm8x2),
                (4, true) => Some(F::Unorm8x4),
                (2, false) => Some(F::Uint8x2),
                (4, false) => Some(F::Uint8x4),
                _ => None,
            }
        } else if ty == self.consts.unsigned_short {
            match (size, normalized) {
                (2, true) => Some(F::Unorm16x2),
                (4, true) => Some(F::Unorm16x4),
                (2, false) => Some(F::Uint16x2),
                (4, false) => Some(F::Uint16x4),
                _ => None,
            }
        } else {
            None
        };
        format.ok_or(DeviceError::Unsupported { what: "vertex attribute format", value: ty.raw() })
    }

    fn linked_program(&self, id: u32) -> Result<&Linked, DeviceError> {
        self.programs
            .get(&id)
            .ok_or(DeviceError::InvalidHandle { kind: Program::KIND, id })?
            .linked
            .as_ref()
            .ok_or_else(|| DeviceError::InvalidArgument(format!("program #{id} is not linked")))
    }

    fn link(&self, attached: &[u32]) -> Result<Linked, String> {
        let mut vertex = None;
        let mut fragment = None;
        for id in attached {
            let Some(slot) = self.shaders.get(id) else {
                return Err(format!("attached shader #{id} was deleted"));
            };
            let Some(compiled) = &slot.compiled else {
                return Err(format!("attached shader #{id} is not compiled"));
            };
            let dst = match slot.stage {
                naga::ShaderStage::Vertex => &mut vertex,
                _ => &mut fragment,
            };
            if dst.replace(compiled.clone()).is_some() {
                return Err("more than one shader attached for a stage".to_string());
            }
        }
        let vertex = vertex.ok_or("no vertex shader attached")?;
        let fragment = fragment.ok_or("no fragment shader attached")?;

        let resources = reflect::link_stages(&vertex.interface, &fragment.interface)?;

        let entries: Vec<wgpu::BindGroupLayoutEntry> = resources
            .iter()
            .map(|r| wgpu::BindGroupLayoutEntry {
                binding: r.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: match r.kind {
                    ResourceKind::Texture => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    ResourceKind::Sampler => {
                        wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                    }
                    ResourceKind::Uniform => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                },
                count: None,
            })
            .collect();

        let bind_group_layout = (!entries.is_empty()).then(|| {
            self.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("aurora program bgl"),
                    entries: &entries,
                })
        });

        let layouts: Vec<&wgpu::BindGroupLayout> = bind_group_layout.iter().collect();
        let pipeline_layout = self
            .device()
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("aurora program layout"),
                bind_group_layouts: &layouts,
                immediate_size: 0,
            });

        let uniform_values = resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Uniform)
            .map(|r| (r.binding, [0.0; 4]))
            .collect();

        Ok(Linked {
            vertex,
            fragment,
            resources,
            bind_group_layout,
            pipeline_layout,
            uniform_values,
        })
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> Result<wgpu::RenderPipeline, DeviceError> {
        if let Some(p) = self.pipelines.get(key) {
            return Ok(p.clone());
        }

        let linked = self.linked_program(key.program)?;
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
            .layout
            .iter()
            .map(|&(location, format, _)| {
                [wgpu::VertexAttribute { format, offset: 0, shader_location: location }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = key
            .layout
            .iter()
            .zip(&attributes)
            .map(|(&(_, _, stride), attrs)| wgpu::VertexBufferLayout {
                array_stride: stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        // No blending, depth or culling: later draws overwrite earlier ones.
        let pipeline = self.device().create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("aurora program pipeline"),
            layout: Some(&linked.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &linked.vertex.module,
                entry_point: Some(&linked.vertex.interface.entry_point),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &linked.fragment.module,
                entry_point: Some(&linked.fragment.interface.entry_point),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.surface_format(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format: key.strip_index,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!("pipeline created for program #{} ({} vertex buffers)", key.program, key.layout.len());
        self.pipelines.insert(key.clone(), pipeline.clone());
        Ok(pipeline)
    }

    /// Snapshots the current draw state into a replayable command.
    fn record_draw(
        &mut self,
        mode: DrawMode,
        strip_index: Option<wgpu::IndexFormat>,
        kind: impl FnOnce(&mut Self) -> Result<DrawKind, DeviceError>,
    ) -> Result<(), DeviceError> {
        let program = self.current_program.ok_or(DeviceError::NothingBound("program"))?;
        let topology = self.topology(mode)?;
        let strip_index = match topology {
            wgpu::PrimitiveTopology::TriangleStrip | wgpu::PrimitiveTopology::LineStrip => strip_index,
            _ => None,
        };

        let active: Vec<(u32, AttribPointer)> = self
            .attribs
            .iter()
            .filter(|(loc, _)| self.enabled.get(*loc).copied().unwrap_or(false))
            .map(|(loc, ptr)| (*loc, *ptr))
            .collect();

        let key = PipelineKey {
            program,
            topology,
            strip_index,
            layout: active.iter().map(|(loc, p)| (*loc, p.format, p.stride)).collect(),
        };
        let pipeline = self.ensure_pipeline(&key)?;

        let mut vertex_buffers = Vec::with_capacity(active.len());
        for (_, ptr) in &active {
            let slot = self.buffer_slot(ptr.buffer)?;
            slot.in_flight = true;
            let buffer = slot
                .buffer
                .clone()
                .ok_or_else(|| DeviceError::InvalidArgument(format!("buffer #{} has no data", ptr.buffer)))?;
            vertex_buffers.push((buffer, ptr.offset));
        }

        let bind_group = self.bind_group(program)?;
        let kind = kind(self)?;

        let (w, h) = (self.canvas_width() as f32, self.canvas_height() as f32);
        let viewport = self.viewport.unwrap_or([0.0, 0.0, w, h]);

        self.commands.push(DrawCommand { pipeline, vertex_buffers, bind_group, viewport, kind });
        Ok(())
    }

    fn bind_group(&self, program: u32) -> Result<Option<wgpu::BindGroup>, DeviceError> {
        let linked = self.linked_program(program)?;
        let Some(layout) = &linked.bind_group_layout else { return Ok(None) };

        let texture_view = match linked.resources.iter().any(|r| r.kind == ResourceKind::Texture) {
            true => {
                let id = self.bound_texture.ok_or(DeviceError::NothingBound("texture"))?;
                let view = self
                    .textures
                    .get(&id)
                    .and_then(|t| t.view.as_ref())
                    .ok_or_else(|| DeviceError::InvalidArgument(format!("texture #{id} has no image")))?;
                Some(view)
            }
            false => None,
        };

        let uniforms: HashMap<u32, wgpu::Buffer> = linked
            .uniform_values
            .iter()
            .map(|(binding, value)| {
                let buffer = self.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("aurora uniform snapshot"),
                    contents: bytemuck::cast_slice(value),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                (*binding, buffer)
            })
            .collect();

        let mut entries = Vec::with_capacity(linked.resources.len());
        for res in &linked.resources {
            let resource = match res.kind {
                ResourceKind::Texture => match texture_view {
                    Some(view) => wgpu::BindingResource::TextureView(view),
                    None => return Err(DeviceError::NothingBound("texture")),
                },
                ResourceKind::Sampler => wgpu::BindingResource::Sampler(&self.sampler),
                ResourceKind::Uniform => match uniforms.get(&res.binding) {
                    Some(buffer) => buffer.as_entire_binding(),
                    None => return Err(DeviceError::NothingBound("uniform")),
                },
            };
            entries.push(wgpu::BindGroupEntry { binding: res.binding, resource });
        }

        Ok(Some(self.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("aurora draw bind group"),
            layout,
            entries: &entries,
        })))
    }

    fn upload_texture_levels(&mut self, id: u32, levels: &[(u32, u32, Vec<u8>)]) -> Result<(), DeviceError> {
        let Some((w0, h0, _)) = levels.first() else { return Ok(()) };
        let texture = self.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("aurora texture"),
            size: wgpu::Extent3d { width: *w0, height: *h0, depth_or_array_layers: 1 },
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, (w, h, pixels)) in levels.iter().enumerate() {
            self.gpu.queue().write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * w),
                    rows_per_image: Some(*h),
                },
                wgpu::Extent3d { width: *w, height: *h, depth_or_array_layers: 1 },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let slot = self
            .textures
            .get_mut(&id)
            .ok_or(DeviceError::InvalidHandle { kind: Texture::KIND, id })?;
        slot.texture = Some(texture);
        slot.view = Some(view);
        Ok(())
    }
}

/// Builds the full mip chain from a level-0 RGBA image.
fn mip_chain(width: u32, height: u32, pixels: &[u8]) -> Result<Vec<(u32, u32, Vec<u8>)>, DeviceError> {
    let base = image::RgbaImage::from_raw(width, height, pixels.to_vec())
        .ok_or_else(|| DeviceError::InvalidArgument("level 0 image size mismatch".to_string()))?;

    let mut levels = vec![(width, height, pixels.to_vec())];
    let mut current = base;
    let (mut w, mut h) = (width, height);
    while w > 1 || h > 1 {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        current = image::imageops::resize(&current, w, h, image::imageops::FilterType::Triangle);
        levels.push((w, h, current.as_raw().clone()));
    }
    Ok(levels)
}

/// Pads `bytes` to wgpu's copy alignment.
fn aligned(bytes: &[u8]) -> Vec<u8> {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    let len = bytes.len().div_ceil(align).max(1) * align;
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(bytes);
    out.resize(len, 0);
    out
}

impl Device for WgpuDevice<'_> {
    fn consts(&self) -> &DeviceConsts {
        &self.consts
    }

    fn canvas_width(&self) -> u32 {
        self.gpu.size().0
    }

    fn canvas_height(&self) -> u32 {
        self.gpu.size().1
    }

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self) -> Result<Buffer, DeviceError> {
        let id = self.ids.allocate()?;
        self.buffers.insert(
            id.get(),
            BufferSlot { buffer: None, capacity: 0, len: 0, in_flight: false },
        );
        Ok(Buffer::from_raw(id))
    }

    fn delete_buffer(&mut self, buffer: Buffer) -> Result<(), DeviceError> {
        let id = buffer.raw();
        let slot = self.buffers.remove(&id).ok_or_else(|| buffer.invalid())?;
        // Draws already recorded keep their own reference until flush.
        if !slot.in_flight {
            if let Some(b) = slot.buffer {
                b.destroy();
            }
        }
        if self.bound_array == Some(id) {
            self.bound_array = None;
        }
        if self.bound_element == Some(id) {
            self.bound_element = None;
        }
        self.attribs.retain(|_, p| p.buffer != id);
        Ok(())
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: &Buffer) -> Result<(), DeviceError> {
        if !self.buffers.contains_key(&buffer.raw()) {
            return Err(buffer.invalid());
        }
        if target == self.consts.array_buffer {
            self.bound_array = Some(buffer.raw());
        } else if target == self.consts.element_array_buffer {
            self.bound_element = Some(buffer.raw());
        } else {
            return Err(DeviceError::Unsupported { what: "buffer target", value: target.raw() });
        }
        Ok(())
    }

    fn buffer_data(&mut self, target: BufferTarget, bytes: &[u8], usage: BufferUsage) -> Result<(), DeviceError> {
        let id = self.bound_buffer_id(target)?;
        let c = &self.consts;
        if usage != c.static_draw && usage != c.dynamic_copy && usage != c.stream_read {
            return Err(DeviceError::Unsupported { what: "buffer usage", value: usage.raw() });
        }

        let data = aligned(bytes);
        let size = data.len() as u64;
        let slot = self.buffers.get(&id).ok_or(DeviceError::InvalidHandle { kind: Buffer::KIND, id })?;
        let reuse = !slot.in_flight && slot.capacity >= size && slot.buffer.is_some();

        if reuse {
            if let Some(buffer) = &slot.buffer {
                self.gpu.queue().write_buffer(buffer, 0, &data);
            }
        } else {
            let buffer = self.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("aurora buffer"),
                contents: &data,
                usage: wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX
                    | wgpu::BufferUsages::COPY_DST,
            });
            let slot = self.buffer_slot(id)?;
            slot.buffer = Some(buffer);
            slot.capacity = size;
            slot.in_flight = false;
        }

        self.buffer_slot(id)?.len = bytes.len() as u64;
        Ok(())
    }

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self) -> Result<Texture, DeviceError> {
        let id = self.ids.allocate()?;
        self.textures.insert(
            id.get(),
            TextureSlot { texture: None, view: None, pixels: Vec::new(), size: (0, 0) },
        );
        Ok(Texture::from_raw(id))
    }

    fn delete_texture(&mut self, texture: Texture) -> Result<(), DeviceError> {
        let id = texture.raw();
        self.textures.remove(&id).ok_or_else(|| texture.invalid())?;
        if self.bound_texture == Some(id) {
            self.bound_texture = None;
        }
        Ok(())
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: &Texture) -> Result<(), DeviceError> {
        self.check_texture_target(target)?;
        if !self.textures.contains_key(&texture.raw()) {
            return Err(texture.invalid());
        }
        self.bound_texture = Some(texture.raw());
        Ok(())
    }

    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        level: u32,
        internal_format: PixelFormat,
        width: u32,
        height: u32,
        border: u32,
        format: PixelFormat,
        ty: DataType,
        pixels: &[u8],
    ) -> Result<(), DeviceError> {
        self.check_texture_target(target)?;
        let id = self.bound_texture.ok_or(DeviceError::NothingBound("texture"))?;

        if internal_format != self.consts.rgba || format != self.consts.rgba {
            return Err(DeviceError::Unsupported { what: "pixel format", value: format.raw() });
        }
        if ty != self.consts.unsigned_byte {
            return Err(DeviceError::Unsupported { what: "pixel type", value: ty.raw() });
        }
        if level != 0 {
            return Err(DeviceError::Unsupported { what: "explicit mip level", value: level });
        }
        if border != 0 || width == 0 || height == 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "bad texture extent {width}x{height} border {border}"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(DeviceError::InvalidArgument(format!(
                "expected {expected} pixel bytes for {width}x{height}, got {}",
                pixels.len()
            )));
        }

        self.upload_texture_levels(id, &[(width, height, pixels.to_vec())])?;
        if let Some(slot) = self.textures.get_mut(&id) {
            slot.pixels = pixels.to_vec();
            slot.size = (width, height);
        }
        Ok(())
    }

    fn generate_mipmap(&mut self, target: TextureTarget) -> Result<(), DeviceError> {
        self.check_texture_target(target)?;
        let id = self.bound_texture.ok_or(DeviceError::NothingBound("texture"))?;
        let slot = self
            .textures
            .get(&id)
            .ok_or(DeviceError::InvalidHandle { kind: Texture::KIND, id })?;
        if slot.pixels.is_empty() {
            return Err(DeviceError::InvalidArgument(format!("texture #{id} has no level 0 image")));
        }
        let (w, h) = slot.size;
        let levels = mip_chain(w, h, &slot.pixels)?;
        log::debug!("texture #{id}: {} mip levels for {w}x{h}", levels.len());
        self.upload_texture_levels(id, &levels)
    }

    // ── shaders & programs ────────────────────────────────────────────────

    fn create_shader(&mut self, kind: ShaderKind) -> Result<Shader, DeviceError> {
        let stage = self.shader_stage(kind)?;
        let id = self.ids.allocate()?;
        self.shaders.insert(
            id.get(),
            ShaderSlot { stage, source: String::new(), compiled: None, log: String::new() },
        );
        Ok(Shader::from_raw(id))
    }

    fn shader_source(&mut self, shader: &Shader, source: &str) -> Result<(), DeviceError> {
        let slot = self.shaders.get_mut(&shader.raw()).ok_or_else(|| shader.invalid())?;
        slot.source = source.to_string();
        Ok(())
    }

    fn compile_shader(&mut self, shader: &Shader) -> Result<(), DeviceError> {
        let slot = self.shaders.get(&shader.raw()).ok_or_else(|| shader.invalid())?;
        let outcome = reflect::compile_stage(&slot.source, slot.stage).map(|interface| {
            let module = self.device().create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("aurora shader"),
                source: wgpu::ShaderSource::Wgsl(slot.source.as_str().into()),
            });
            Compiled { interface, module }
        });

        let slot = self.shaders.get_mut(&shader.raw()).ok_or_else(|| shader.invalid())?;
        match outcome {
            Ok(compiled) => {
                slot.compiled = Some(compiled);
                slot.log.clear();
            }
            Err(log) => {
                slot.compiled = None;
                slot.log = log;
            }
        }
        Ok(())
    }

    fn shader_compile_status(&self, shader: &Shader) -> Result<bool, DeviceError> {
        let slot = self.shaders.get(&shader.raw()).ok_or_else(|| shader.invalid())?;
        Ok(slot.compiled.is_some())
    }

    fn shader_info_log(&self, shader: &Shader) -> Result<String, DeviceError> {
        let slot = self.shaders.get(&shader.raw()).ok_or_else(|| shader.invalid())?;
        Ok(slot.log.clone())
    }

    fn delete_shader(&mut self, shader: Shader) -> Result<(), DeviceError> {
        self.shaders.remove(&shader.raw()).ok_or_else(|| shader.invalid())?;
        Ok(())
    }

    fn create_program(&mut self) -> Result<Program, DeviceError> {
        let id = self.ids.allocate()?;
        self.programs.insert(
            id.get(),
            ProgramSlot { attached: Vec::new(), linked: None, log: String::new() },
        );
        Ok(Program::from_raw(id))
    }

    fn attach_shader(&mut self, program: &Program, shader: &Shader) -> Result<(), DeviceError> {
        if !self.shaders.contains_key(&shader.raw()) {
            return Err(shader.invalid());
        }
        let slot = self.programs.get_mut(&program.raw()).ok_or_else(|| program.invalid())?;
        slot.attached.push(shader.raw());
        Ok(())
    }

    fn link_program(&mut self, program: &Program) -> Result<(), DeviceError> {
        let attached = self
            .programs
            .get(&program.raw())
            .ok_or_else(|| program.invalid())?
            .attached
            .clone();
        let outcome = self.link(&attached);

        self.pipelines.retain(|k, _| k.program != program.raw());
        let slot = self.programs.get_mut(&program.raw()).ok_or_else(|| program.invalid())?;
        match outcome {
            Ok(linked) => {
                slot.linked = Some(linked);
                slot.log.clear();
            }
            Err(log) => {
                slot.linked = None;
                slot.log = log;
            }
        }
        Ok(())
    }

    fn program_link_status(&self, program: &Program) -> Result<bool, DeviceError> {
        let slot = self.programs.get(&program.raw()).ok_or_else(|| program.invalid())?;
        Ok(slot.linked.is_some())
    }

    fn program_info_log(&self, program: &Program) -> Result<String, DeviceError> {
        let slot = self.programs.get(&program.raw()).ok_or_else(|| program.invalid())?;
        Ok(slot.log.clone())
    }

    fn use_program(&mut self, program: &Program) -> Result<(), DeviceError> {
        if !self.programs.contains_key(&program.raw()) {
            return Err(program.invalid());
        }
        self.current_program = Some(program.raw());
        Ok(())
    }

    fn delete_program(&mut self, program: Program) -> Result<(), DeviceError> {
        let id = program.raw();
        self.programs.remove(&id).ok_or_else(|| program.invalid())?;
        self.pipelines.retain(|k, _| k.program != id);
        if self.current_program == Some(id) {
            self.current_program = None;
        }
        Ok(())
    }

    // ── vertex state & uniforms ───────────────────────────────────────────

    fn get_attrib_location(&self, program: &Program, name: &str) -> Result<Option<AttribLocation>, DeviceError> {
        let slot = self.programs.get(&program.raw()).ok_or_else(|| program.invalid())?;
        Ok(slot
            .linked
            .as_ref()
            .and_then(|l| l.vertex.interface.inputs.get(name))
            .map(|&loc| AttribLocation(loc)))
    }

    fn get_uniform_location(&self, program: &Program, name: &str) -> Result<Option<UniformLocation>, DeviceError> {
        let slot = self.programs.get(&program.raw()).ok_or_else(|| program.invalid())?;
        Ok(slot
            .linked
            .as_ref()
            .and_then(|l| {
                l.resources
                    .iter()
                    .find(|r| r.kind == ResourceKind::Uniform && r.name == name)
            })
            .map(|r| UniformLocation { program: program.raw(), slot: r.binding }))
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: AttribLocation,
        size: u32,
        ty: DataType,
        normalized: bool,
        stride: u32,
        offset: u32,
    ) -> Result<(), DeviceError> {
        let buffer = self.bound_array.ok_or(DeviceError::NothingBound("array buffer"))?;
        let format = self.vertex_format(size, ty, normalized)?;
        let stride = if stride == 0 { format.size() } else { stride as u64 };
        self.attribs.insert(
            location.index(),
            AttribPointer { buffer, format, stride, offset: offset as u64 },
        );
        Ok(())
    }

    fn enable_vertex_attrib_array(&mut self, location: AttribLocation) -> Result<(), DeviceError> {
        self.enabled.insert(location.index(), true);
        Ok(())
    }

    fn uniform_2f(&mut self, location: UniformLocation, x: f32, y: f32) -> Result<(), DeviceError> {
        let current = self.current_program.ok_or(DeviceError::NothingBound("program"))?;
        if location.program != current {
            return Err(DeviceError::InvalidArgument(format!(
                "uniform location belongs to program #{}, program #{current} is in use",
                location.program
            )));
        }
        let slot = self
            .programs
            .get_mut(&current)
            .and_then(|p| p.linked.as_mut())
            .ok_or_else(|| DeviceError::InvalidArgument(format!("program #{current} is not linked")))?;
        let value = slot
            .uniform_values
            .get_mut(&location.slot)
            .ok_or_else(|| DeviceError::InvalidArgument(format!("no uniform at binding {}", location.slot)))?;
        *value = [x, y, 0.0, 0.0];
        Ok(())
    }

    // ── frame ─────────────────────────────────────────────────────────────

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) -> Result<(), DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::InvalidArgument(format!("empty viewport {width}x{height}")));
        }
        self.viewport = Some([x as f32, y as f32, width as f32, height as f32]);
        Ok(())
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> Result<(), DeviceError> {
        self.clear_color = wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: a as f64 };
        Ok(())
    }

    fn clear(&mut self, mask: ClearMask) -> Result<(), DeviceError> {
        if mask != self.consts.color_buffer_bit {
            return Err(DeviceError::Unsupported { what: "clear mask", value: mask.raw() });
        }
        // A clear issued after draws would need a second pass; draws recorded
        // before it are discarded, as they would be overwritten anyway.
        self.commands.clear();
        self.pending_clear = Some(self.clear_color);
        Ok(())
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), DeviceError> {
        self.record_draw(mode, None, |_| Ok(DrawKind::Arrays { first, count }))
    }

    fn draw_elements(&mut self, mode: DrawMode, count: u32, ty: DataType, offset: u32) -> Result<(), DeviceError> {
        let (format, width) = if ty == self.consts.unsigned_short {
            (wgpu::IndexFormat::Uint16, 2)
        } else if ty == self.consts.unsigned_int {
            (wgpu::IndexFormat::Uint32, 4)
        } else {
            return Err(DeviceError::Unsupported { what: "index type", value: ty.raw() });
        };
        if offset % width != 0 {
            return Err(DeviceError::InvalidArgument(format!("index offset {offset} is not aligned")));
        }

        self.record_draw(mode, Some(format), |dev| {
            let id = dev.bound_element.ok_or(DeviceError::NothingBound("element array buffer"))?;
            let slot = dev.buffer_slot(id)?;
            slot.in_flight = true;
            let buffer = slot
                .buffer
                .clone()
                .ok_or_else(|| DeviceError::InvalidArgument(format!("buffer #{id} has no data")))?;
            Ok(DrawKind::Elements { buffer, format, first: offset / width, count })
        })
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        let commands = std::mem::take(&mut self.commands);
        let clear = self.pending_clear.take();
        for slot in self.buffers.values_mut() {
            slot.in_flight = false;
        }

        let Some(mut frame) = self.gpu.acquire()? else {
            log::debug!("frame dropped, {} draws discarded", commands.len());
            return Ok(());
        };

        let (w, h) = (self.canvas_width() as f32, self.canvas_height() as f32);
        {
            let mut rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("aurora frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for cmd in &commands {
                let [x, y, vw, vh] = cmd.viewport;
                let x = x.clamp(0.0, w - 1.0);
                let y = y.clamp(0.0, h - 1.0);
                rpass.set_viewport(x, y, vw.min(w - x), vh.min(h - y), 0.0, 1.0);
                rpass.set_pipeline(&cmd.pipeline);
                if let Some(group) = &cmd.bind_group {
                    rpass.set_bind_group(0, group, &[]);
                }
                for (slot, (buffer, offset)) in cmd.vertex_buffers.iter().enumerate() {
                    rpass.set_vertex_buffer(slot as u32, buffer.slice(*offset..));
                }
                match &cmd.kind {
                    DrawKind::Arrays { first, count } => rpass.draw(*first..first + count, 0..1),
                    DrawKind::Elements { buffer, format, first, count } => {
                        rpass.set_index_buffer(buffer.slice(..), *format);
                        rpass.draw_indexed(*first..first + count, 0, 0..1);
                    }
                }
            }
        }

        self.gpu.present(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_pads_to_copy_alignment() {
        assert_eq!(aligned(&[1, 2, 3]), vec![1, 2, 3, 0]);
        assert_eq!(aligned(&[1, 2, 3, 4]).len(), 4);
        assert_eq!(aligned(&[]).len(), 4);
    }

    #[test]
    fn mip_chain_halves_to_one_pixel() {
        let pixels = vec![255u8; 8 * 2 * 4];
        let levels = mip_chain(8, 2, &pixels).unwrap();
        let dims: Vec<(u32, u32)> = levels.iter().map(|(w, h, _)| (*w, *h)).collect();
        assert_eq!(dims, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
        assert!(levels.iter().all(|(w, h, p)| p.len() == (*w * *h * 4) as usize));
    }

    #[test]
    fn mip_chain_rejects_short_pixels() {
        assert!(mip_chain(2, 2, &[0; 3]).is_err());
    }
}
