//! Capturing device binding.
//!
//! `RecordingDevice` implements [`Device`] without a GPU. Every state-changing
//! call is appended to a call log so tests (and headless tooling) can assert
//! the exact command stream an engine produced. Handle validity is enforced
//! the same way a real binding would enforce it.
//!
//! Shader "compilation" is a structural check of GLSL-style sources:
//! - a source must declare `main` and have balanced braces
//! - attributes are the `attribute`/`in` declarations of the vertex source,
//!   numbered in declaration order
//! - uniforms are the `uniform` declarations of either stage

use std::collections::{HashMap, HashSet};

use super::handle::HandleAllocator;
use super::{
    AttribLocation, Buffer, BufferTarget, BufferUsage, ClearMask, DataType, Device, DeviceConsts,
    DeviceError, DrawMode, PixelFormat, Program, Shader, ShaderKind, Texture, TextureTarget,
    UniformLocation,
};

/// One captured binding call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateBuffer(u32),
    DeleteBuffer(u32),
    BindBuffer { target: BufferTarget, buffer: u32 },
    BufferData { target: BufferTarget, buffer: u32, bytes: Vec<u8>, usage: BufferUsage },

    CreateTexture(u32),
    DeleteTexture(u32),
    BindTexture { target: TextureTarget, texture: u32 },
    TexImage2D { target: TextureTarget, texture: u32, level: u32, width: u32, height: u32, len: usize },
    GenerateMipmap { target: TextureTarget, texture: u32 },

    CreateShader { shader: u32, kind: ShaderKind },
    ShaderSource(u32),
    CompileShader(u32),
    DeleteShader(u32),

    CreateProgram(u32),
    AttachShader { program: u32, shader: u32 },
    LinkProgram(u32),
    UseProgram(u32),
    DeleteProgram(u32),

    VertexAttribPointer { location: u32, size: u32, ty: DataType, normalized: bool, stride: u32, offset: u32 },
    EnableVertexAttribArray(u32),
    Uniform2f { program: u32, slot: u32, x: f32, y: f32 },

    Viewport { x: i32, y: i32, width: u32, height: u32 },
    ClearColor([f32; 4]),
    Clear(ClearMask),
    DrawArrays { mode: DrawMode, first: u32, count: u32 },
    DrawElements { mode: DrawMode, count: u32, ty: DataType, offset: u32 },
    Flush,
}

impl Call {
    /// Name of the binding method that produced this call.
    pub fn name(&self) -> &'static str {
        match self {
            Call::CreateBuffer(_) => "create_buffer",
            Call::DeleteBuffer(_) => "delete_buffer",
            Call::BindBuffer { .. } => "bind_buffer",
            Call::BufferData { .. } => "buffer_data",
            Call::CreateTexture(_) => "create_texture",
            Call::DeleteTexture(_) => "delete_texture",
            Call::BindTexture { .. } => "bind_texture",
            Call::TexImage2D { .. } => "tex_image_2d",
            Call::GenerateMipmap { .. } => "generate_mipmap",
            Call::CreateShader { .. } => "create_shader",
            Call::ShaderSource(_) => "shader_source",
            Call::CompileShader(_) => "compile_shader",
            Call::DeleteShader(_) => "delete_shader",
            Call::CreateProgram(_) => "create_program",
            Call::AttachShader { .. } => "attach_shader",
            Call::LinkProgram(_) => "link_program",
            Call::UseProgram(_) => "use_program",
            Call::DeleteProgram(_) => "delete_program",
            Call::VertexAttribPointer { .. } => "vertex_attrib_pointer",
            Call::EnableVertexAttribArray(_) => "enable_vertex_attrib_array",
            Call::Uniform2f { .. } => "uniform_2f",
            Call::Viewport { .. } => "viewport",
            Call::ClearColor(_) => "clear_color",
            Call::Clear(_) => "clear",
            Call::DrawArrays { .. } => "draw_arrays",
            Call::DrawElements { .. } => "draw_elements",
            Call::Flush => "flush",
        }
    }
}

#[derive(Debug)]
struct ShaderState {
    kind: ShaderKind,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramState {
    shaders: Vec<u32>,
    linked: bool,
    log: String,
    attributes: Vec<String>,
    uniforms: Vec<String>,
}

#[derive(Debug)]
struct TextureState {
    size: Option<(u32, u32)>,
}

/// Device binding that records calls instead of talking to a GPU.
#[derive(Debug)]
pub struct RecordingDevice {
    consts: DeviceConsts,
    width: u32,
    height: u32,
    ids: HandleAllocator,

    buffers: HashSet<u32>,
    textures: HashMap<u32, TextureState>,
    shaders: HashMap<u32, ShaderState>,
    programs: HashMap<u32, ProgramState>,

    bound_buffers: HashMap<BufferTarget, u32>,
    bound_texture: Option<u32>,
    current_program: Option<u32>,

    calls: Vec<Call>,
    link_failure_marker: Option<String>,
    fail_next: HashSet<&'static str>,
}

impl RecordingDevice {
    /// Base of the enum value range this binding hands out.
    const CONST_BASE: u32 = 0x8000;

    /// Creates a binding for a canvas of `width`×`height` physical pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            consts: DeviceConsts::sequential(Self::CONST_BASE),
            width,
            height,
            ids: HandleAllocator::default(),
            buffers: HashSet::new(),
            textures: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            bound_buffers: HashMap::new(),
            bound_texture: None,
            current_program: None,
            calls: Vec::new(),
            link_failure_marker: None,
            fail_next: HashSet::new(),
        }
    }

    /// Makes `link_program` fail for any program with an attached shader
    /// whose source contains `marker`.
    pub fn fail_link_when(mut self, marker: impl Into<String>) -> Self {
        self.link_failure_marker = Some(marker.into());
        self
    }

    /// Makes the next invocation of the named call (see [`Call::name`])
    /// return [`DeviceError::CallFailed`].
    pub fn fail_next(&mut self, call: &'static str) {
        self.fail_next.insert(call);
    }

    /// Every call captured so far, in issue order.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Drains the call log.
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    fn record(&mut self, call: Call) -> Result<(), DeviceError> {
        let name = call.name();
        if self.fail_next.remove(name) {
            return Err(DeviceError::CallFailed {
                call: name,
                message: "injected failure".to_string(),
            });
        }
        self.calls.push(call);
        Ok(())
    }

    fn check_buffer(&self, buffer: &Buffer) -> Result<u32, DeviceError> {
        let id = buffer.raw();
        if self.buffers.contains(&id) { Ok(id) } else { Err(buffer.invalid()) }
    }

    fn check_texture(&self, texture: &Texture) -> Result<u32, DeviceError> {
        let id = texture.raw();
        if self.textures.contains_key(&id) { Ok(id) } else { Err(texture.invalid()) }
    }

    fn shader_state(&self, shader: &Shader) -> Result<&ShaderState, DeviceError> {
        self.shaders.get(&shader.raw()).ok_or_else(|| shader.invalid())
    }

    fn program_state(&self, program: &Program) -> Result<&ProgramState, DeviceError> {
        self.programs.get(&program.raw()).ok_or_else(|| program.invalid())
    }

    fn bound_buffer(&self, target: BufferTarget) -> Result<u32, DeviceError> {
        self.bound_buffers
            .get(&target)
            .copied()
            .ok_or(DeviceError::NothingBound("buffer"))
    }

    fn check_buffer_target(&self, target: BufferTarget) -> Result<(), DeviceError> {
        if target == self.consts.array_buffer || target == self.consts.element_array_buffer {
            Ok(())
        } else {
            Err(DeviceError::Unsupported { what: "buffer target", value: target.raw() })
        }
    }

    fn check_texture_target(&self, target: TextureTarget) -> Result<(), DeviceError> {
        if target == self.consts.texture_2d {
            Ok(())
        } else {
            Err(DeviceError::Unsupported { what: "texture target", value: target.raw() })
        }
    }

    fn linked_current_program(&self) -> Result<u32, DeviceError> {
        let id = self.current_program.ok_or(DeviceError::NothingBound("program"))?;
        match self.programs.get(&id) {
            Some(p) if p.linked => Ok(id),
            _ => Err(DeviceError::InvalidArgument(format!(
                "program #{id} in use is not linked"
            ))),
        }
    }
}

/// Structural validity check standing in for a shader compiler.
fn check_source(source: &str) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err("ERROR: 0:0: empty shader source".to_string());
    }

    let mut depth: i64 = 0;
    for (line_no, line) in source.lines().enumerate() {
        for ch in line.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return Err(format!("ERROR: 0:{}: unexpected '}}'", line_no + 1));
            }
        }
    }
    if depth != 0 {
        return Err("ERROR: 0:0: unexpected end of source, unbalanced '{'".to_string());
    }

    if !source.contains("main") {
        return Err("ERROR: 0:0: missing entry point 'main'".to_string());
    }

    Ok(())
}

/// Names declared by lines starting with one of `qualifiers`, in order.
fn declared_names(source: &str, qualifiers: &[&str]) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| {
            qualifiers
                .iter()
                .any(|q| line.split_whitespace().next() == Some(*q))
        })
        .filter_map(|line| {
            let decl = line.split(';').next()?;
            decl.split_whitespace().last().map(str::to_string)
        })
        .collect()
}

impl Device for RecordingDevice {
    fn consts(&self) -> &DeviceConsts {
        &self.consts
    }

    fn canvas_width(&self) -> u32 {
        self.width
    }

    fn canvas_height(&self) -> u32 {
        self.height
    }

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self) -> Result<Buffer, DeviceError> {
        let id = self.ids.allocate()?;
        self.record(Call::CreateBuffer(id.get()))?;
        self.buffers.insert(id.get());
        Ok(Buffer::from_raw(id))
    }

    fn delete_buffer(&mut self, buffer: Buffer) -> Result<(), DeviceError> {
        let id = self.check_buffer(&buffer)?;
        self.record(Call::DeleteBuffer(id))?;
        self.buffers.remove(&id);
        self.bound_buffers.retain(|_, bound| *bound != id);
        Ok(())
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: &Buffer) -> Result<(), DeviceError> {
        self.check_buffer_target(target)?;
        let id = self.check_buffer(buffer)?;
        self.record(Call::BindBuffer { target, buffer: id })?;
        self.bound_buffers.insert(target, id);
        Ok(())
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        bytes: &[u8],
        usage: BufferUsage,
    ) -> Result<(), DeviceError> {
        self.check_buffer_target(target)?;
        let buffer = self.bound_buffer(target)?;
        self.record(Call::BufferData { target, buffer, bytes: bytes.to_vec(), usage })
    }

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self) -> Result<Texture, DeviceError> {
        let id = self.ids.allocate()?;
        self.record(Call::CreateTexture(id.get()))?;
        self.textures.insert(id.get(), TextureState { size: None });
        Ok(Texture::from_raw(id))
    }

    fn delete_texture(&mut self, texture: Texture) -> Result<(), DeviceError> {
        let id = self.check_texture(&texture)?;
        self.record(Call::DeleteTexture(id))?;
        self.textures.remove(&id);
        if self.bound_texture == Some(id) {
            self.bound_texture = None;
        }
        Ok(())
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: &Texture) -> Result<(), DeviceError> {
        self.check_texture_target(target)?;
        let id = self.check_texture(texture)?;
        self.record(Call::BindTexture { target, texture: id })?;
        self.bound_texture = Some(id);
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
        let texture = self.bound_texture.ok_or(DeviceError::NothingBound("texture"))?;

        if internal_format != self.consts.rgba || format != self.consts.rgba {
            return Err(DeviceError::Unsupported { what: "pixel format", value: format.raw() });
        }
        if ty != self.consts.unsigned_byte {
            return Err(DeviceError::Unsupported { what: "pixel type", value: ty.raw() });
        }
        if border != 0 {
            return Err(DeviceError::InvalidArgument(format!("border must be 0, got {border}")));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(DeviceError::InvalidArgument(format!(
                "expected {expected} pixel bytes for {width}x{height}, got {}",
                pixels.len()
            )));
        }

        self.record(Call::TexImage2D { target, texture, level, width, height, len: pixels.len() })?;
        if level == 0 {
            if let Some(state) = self.textures.get_mut(&texture) {
                state.size = Some((width, height));
            }
        }
        Ok(())
    }

    fn generate_mipmap(&mut self, target: TextureTarget) -> Result<(), DeviceError> {
        self.check_texture_target(target)?;
        let texture = self.bound_texture.ok_or(DeviceError::NothingBound("texture"))?;
        let defined = self
            .textures
            .get(&texture)
            .is_some_and(|t| t.size.is_some());
        if !defined {
            return Err(DeviceError::InvalidArgument(format!(
                "texture #{texture} has no level 0 image"
            )));
        }
        self.record(Call::GenerateMipmap { target, texture })
    }

    // ── shaders & programs ────────────────────────────────────────────────

    fn create_shader(&mut self, kind: ShaderKind) -> Result<Shader, DeviceError> {
        if kind != self.consts.vertex_shader && kind != self.consts.fragment_shader {
            return Err(DeviceError::Unsupported { what: "shader kind", value: kind.raw() });
        }
        let id = self.ids.allocate()?;
        self.record(Call::CreateShader { shader: id.get(), kind })?;
        self.shaders.insert(
            id.get(),
            ShaderState { kind, source: String::new(), compiled: false, log: String::new() },
        );
        Ok(Shader::from_raw(id))
    }

    fn shader_source(&mut self, shader: &Shader, source: &str) -> Result<(), DeviceError> {
        self.shader_state(shader)?;
        self.record(Call::ShaderSource(shader.raw()))?;
        if let Some(state) = self.shaders.get_mut(&shader.raw()) {
            state.source = source.to_string();
        }
        Ok(())
    }

    fn compile_shader(&mut self, shader: &Shader) -> Result<(), DeviceError> {
        self.shader_state(shader)?;
        self.record(Call::CompileShader(shader.raw()))?;
        if let Some(state) = self.shaders.get_mut(&shader.raw()) {
            match check_source(&state.source) {
                Ok(()) => {
                    state.compiled = true;
                    state.log.clear();
                }
                Err(log) => {
                    state.compiled = false;
                    state.log = log;
                }
            }
        }
        Ok(())
    }

    fn shader_compile_status(&self, shader: &Shader) -> Result<bool, DeviceError> {
        Ok(self.shader_state(shader)?.compiled)
    }

    fn shader_info_log(&self, shader: &Shader) -> Result<String, DeviceError> {
        Ok(self.shader_state(shader)?.log.clone())
    }

    fn delete_shader(&mut self, shader: Shader) -> Result<(), DeviceError> {
        self.shader_state(&shader)?;
        self.record(Call::DeleteShader(shader.raw()))?;
        self.shaders.remove(&shader.raw());
        Ok(())
    }

    fn create_program(&mut self) -> Result<Program, DeviceError> {
        let id = self.ids.allocate()?;
        self.record(Call::CreateProgram(id.get()))?;
        self.programs.insert(id.get(), ProgramState::default());
        Ok(Program::from_raw(id))
    }

    fn attach_shader(&mut self, program: &Program, shader: &Shader) -> Result<(), DeviceError> {
        self.program_state(program)?;
        self.shader_state(shader)?;
        self.record(Call::AttachShader { program: program.raw(), shader: shader.raw() })?;
        if let Some(state) = self.programs.get_mut(&program.raw()) {
            state.shaders.push(shader.raw());
        }
        Ok(())
    }

    fn link_program(&mut self, program: &Program) -> Result<(), DeviceError> {
        self.program_state(program)?;
        self.record(Call::LinkProgram(program.raw()))?;

        let attached: Vec<&ShaderState> = self
            .programs
            .get(&program.raw())
            .map(|p| p.shaders.iter().filter_map(|id| self.shaders.get(id)).collect())
            .unwrap_or_default();

        let vertex: Vec<&ShaderState> = attached
            .iter()
            .copied()
            .filter(|s| s.kind == self.consts.vertex_shader)
            .collect();
        let fragment: Vec<&ShaderState> = attached
            .iter()
            .copied()
            .filter(|s| s.kind == self.consts.fragment_shader)
            .collect();

        let outcome = if vertex.len() != 1 || fragment.len() != 1 {
            Err("ERROR: program needs exactly one vertex and one fragment shader".to_string())
        } else if !vertex[0].compiled || !fragment[0].compiled {
            Err("ERROR: attached shader is not compiled".to_string())
        } else if let Some(marker) = self
            .link_failure_marker
            .as_deref()
            .filter(|m| attached.iter().any(|s| s.source.contains(m)))
        {
            Err(format!("ERROR: link failed on '{marker}'"))
        } else {
            let attributes = declared_names(&vertex[0].source, &["attribute", "in"]);
            let mut uniforms = declared_names(&vertex[0].source, &["uniform"]);
            for name in declared_names(&fragment[0].source, &["uniform"]) {
                if !uniforms.contains(&name) {
                    uniforms.push(name);
                }
            }
            Ok((attributes, uniforms))
        };

        if let Some(state) = self.programs.get_mut(&program.raw()) {
            match outcome {
                Ok((attributes, uniforms)) => {
                    state.linked = true;
                    state.log.clear();
                    state.attributes = attributes;
                    state.uniforms = uniforms;
                }
                Err(log) => {
                    state.linked = false;
                    state.log = log;
                    state.attributes.clear();
                    state.uniforms.clear();
                }
            }
        }
        Ok(())
    }

    fn program_link_status(&self, program: &Program) -> Result<bool, DeviceError> {
        Ok(self.program_state(program)?.linked)
    }

    fn program_info_log(&self, program: &Program) -> Result<String, DeviceError> {
        Ok(self.program_state(program)?.log.clone())
    }

    fn use_program(&mut self, program: &Program) -> Result<(), DeviceError> {
        self.program_state(program)?;
        self.record(Call::UseProgram(program.raw()))?;
        self.current_program = Some(program.raw());
        Ok(())
    }

    fn delete_program(&mut self, program: Program) -> Result<(), DeviceError> {
        self.program_state(&program)?;
        self.record(Call::DeleteProgram(program.raw()))?;
        self.programs.remove(&program.raw());
        if self.current_program == Some(program.raw()) {
            self.current_program = None;
        }
        Ok(())
    }

    // ── vertex state & uniforms ───────────────────────────────────────────

    fn get_attrib_location(
        &self,
        program: &Program,
        name: &str,
    ) -> Result<Option<AttribLocation>, DeviceError> {
        let state = self.program_state(program)?;
        Ok(state
            .attributes
            .iter()
            .position(|a| a == name)
            .map(|i| AttribLocation(i as u32)))
    }

    fn get_uniform_location(
        &self,
        program: &Program,
        name: &str,
    ) -> Result<Option<UniformLocation>, DeviceError> {
        let state = self.program_state(program)?;
        Ok(state
            .uniforms
            .iter()
            .position(|u| u == name)
            .map(|i| UniformLocation { program: program.raw(), slot: i as u32 }))
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
        self.bound_buffer(self.consts.array_buffer)?;
        if !(1..=4).contains(&size) {
            return Err(DeviceError::InvalidArgument(format!(
                "attribute size must be 1..=4, got {size}"
            )));
        }
        self.record(Call::VertexAttribPointer {
            location: location.index(),
            size,
            ty,
            normalized,
            stride,
            offset,
        })
    }

    fn enable_vertex_attrib_array(&mut self, location: AttribLocation) -> Result<(), DeviceError> {
        self.record(Call::EnableVertexAttribArray(location.index()))
    }

    fn uniform_2f(&mut self, location: UniformLocation, x: f32, y: f32) -> Result<(), DeviceError> {
        let current = self.linked_current_program()?;
        if location.program != current {
            return Err(DeviceError::InvalidArgument(format!(
                "uniform location belongs to program #{}, program #{current} is in use",
                location.program
            )));
        }
        self.record(Call::Uniform2f { program: current, slot: location.slot, x, y })
    }

    // ── frame ─────────────────────────────────────────────────────────────

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) -> Result<(), DeviceError> {
        self.record(Call::Viewport { x, y, width, height })
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> Result<(), DeviceError> {
        self.record(Call::ClearColor([r, g, b, a]))
    }

    fn clear(&mut self, mask: ClearMask) -> Result<(), DeviceError> {
        self.record(Call::Clear(mask))
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), DeviceError> {
        self.linked_current_program()?;
        self.record(Call::DrawArrays { mode, first, count })
    }

    fn draw_elements(
        &mut self,
        mode: DrawMode,
        count: u32,
        ty: DataType,
        offset: u32,
    ) -> Result<(), DeviceError> {
        self.linked_current_program()?;
        self.bound_buffer(self.consts.element_array_buffer)?;
        if ty != self.consts.unsigned_short && ty != self.consts.unsigned_int {
            return Err(DeviceError::Unsupported { what: "index type", value: ty.raw() });
        }
        self.record(Call::DrawElements { mode, count, ty, offset })
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.record(Call::Flush)
    }
}
