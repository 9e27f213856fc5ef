use super::{
    AttribLocation, Buffer, BufferTarget, BufferUsage, ClearMask, DataType, DeviceConsts,
    DeviceError, DrawMode, PixelFormat, Program, Shader, ShaderKind, Texture, TextureTarget,
    UniformLocation,
};

/// Procedural graphics-device binding consumed by the engine.
///
/// The surface follows the classic bound-object model: buffers and textures
/// are bound to a target, then uploads and attribute descriptions act on
/// whatever is bound. Calls are issued from a single thread in program order;
/// implementations are free to record and replay them, but must preserve that
/// order.
///
/// Every call that reaches the GPU returns a `Result`. Using a handle that
/// this device did not create, or one whose owner already released it, is an
/// error rather than undefined behavior.
pub trait Device {
    /// Enum values resolved when the binding was constructed.
    fn consts(&self) -> &DeviceConsts;

    /// Drawable width in physical pixels.
    fn canvas_width(&self) -> u32;

    /// Drawable height in physical pixels.
    fn canvas_height(&self) -> u32;

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self) -> Result<Buffer, DeviceError>;
    fn delete_buffer(&mut self, buffer: Buffer) -> Result<(), DeviceError>;
    fn bind_buffer(&mut self, target: BufferTarget, buffer: &Buffer) -> Result<(), DeviceError>;

    /// Replaces the entire contents of the buffer bound to `target`.
    fn buffer_data(
        &mut self,
        target: BufferTarget,
        bytes: &[u8],
        usage: BufferUsage,
    ) -> Result<(), DeviceError>;

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self) -> Result<Texture, DeviceError>;
    fn delete_texture(&mut self, texture: Texture) -> Result<(), DeviceError>;
    fn bind_texture(&mut self, target: TextureTarget, texture: &Texture)
        -> Result<(), DeviceError>;

    /// Uploads one mip level of the texture bound to `target`.
    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<(), DeviceError>;

    fn generate_mipmap(&mut self, target: TextureTarget) -> Result<(), DeviceError>;

    // ── shaders & programs ────────────────────────────────────────────────

    fn create_shader(&mut self, kind: ShaderKind) -> Result<Shader, DeviceError>;
    fn shader_source(&mut self, shader: &Shader, source: &str) -> Result<(), DeviceError>;
    fn compile_shader(&mut self, shader: &Shader) -> Result<(), DeviceError>;
    fn shader_compile_status(&self, shader: &Shader) -> Result<bool, DeviceError>;
    fn shader_info_log(&self, shader: &Shader) -> Result<String, DeviceError>;
    fn delete_shader(&mut self, shader: Shader) -> Result<(), DeviceError>;

    fn create_program(&mut self) -> Result<Program, DeviceError>;
    fn attach_shader(&mut self, program: &Program, shader: &Shader) -> Result<(), DeviceError>;
    fn link_program(&mut self, program: &Program) -> Result<(), DeviceError>;
    fn program_link_status(&self, program: &Program) -> Result<bool, DeviceError>;
    fn program_info_log(&self, program: &Program) -> Result<String, DeviceError>;
    fn use_program(&mut self, program: &Program) -> Result<(), DeviceError>;
    fn delete_program(&mut self, program: Program) -> Result<(), DeviceError>;

    // ── vertex state & uniforms ───────────────────────────────────────────

    /// Returns `None` when the linked program has no active attribute `name`.
    fn get_attrib_location(
        &self,
        program: &Program,
        name: &str,
    ) -> Result<Option<AttribLocation>, DeviceError>;

    /// Returns `None` when the linked program has no active uniform `name`.
    fn get_uniform_location(
        &self,
        program: &Program,
        name: &str,
    ) -> Result<Option<UniformLocation>, DeviceError>;

    /// Describes the attribute at `location` as read from the buffer
    /// currently bound to the array-buffer target.
    fn vertex_attrib_pointer(
        &mut self,
        location: AttribLocation,
        size: u32,
        ty: DataType,
        normalized: bool,
        stride: u32,
        offset: u32,
    ) -> Result<(), DeviceError>;

    fn enable_vertex_attrib_array(&mut self, location: AttribLocation) -> Result<(), DeviceError>;

    /// Sets a two-component float uniform of the program in use.
    fn uniform_2f(&mut self, location: UniformLocation, x: f32, y: f32)
        -> Result<(), DeviceError>;

    // ── frame ─────────────────────────────────────────────────────────────

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) -> Result<(), DeviceError>;
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> Result<(), DeviceError>;
    fn clear(&mut self, mask: ClearMask) -> Result<(), DeviceError>;
    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), DeviceError>;

    /// Indexed draw from the buffer bound to the element-array target.
    /// `offset` is in bytes.
    fn draw_elements(
        &mut self,
        mode: DrawMode,
        count: u32,
        ty: DataType,
        offset: u32,
    ) -> Result<(), DeviceError>;

    /// Pushes all commands issued so far to the GPU.
    fn flush(&mut self) -> Result<(), DeviceError>;
}
