use std::collections::BTreeSet;

use crate::device::{AttribLocation, Device, DeviceError, UniformLocation};
use crate::error::EngineError;
use crate::resources::{ResourceKey, ResourcePool, ResourceSlot};
use crate::scene::{
    BackgroundLayer, DrawableError, Layer, Scene, FLOATS_PER_VERTEX, TILE_QUAD,
    TILE_TEX_COORDS, TILE_VERTEX_COUNT,
};
use crate::shader::{CompileError, ShaderCompiler, ShaderStage};

/// Lifecycle of a [`RenderEngine`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Rendering,
    /// A frame failed or the engine was shut down.
    Terminated,
}

/// What init resolved for one layer.
#[derive(Debug)]
struct LayerBinding {
    name: String,
    position: AttribLocation,
    color: AttribLocation,
    /// Positions as last uploaded, per drawable.
    uploaded: Vec<Vec<f32>>,
}

#[derive(Debug)]
struct BackgroundBinding {
    name: String,
    position: AttribLocation,
    texcoord: AttribLocation,
    offset: Option<UniformLocation>,
    tiles: usize,
}

/// Draws a [`Scene`] through a [`Device`].
///
/// `init` compiles every layer's program and uploads static geometry once;
/// `render` then replays the scene every frame: clear, background tiles,
/// then each layer's drawables in declaration order.
pub struct RenderEngine<D: Device> {
    device: D,
    width: u32,
    height: u32,

    pool: ResourcePool,
    state: EngineState,
    layers: Vec<LayerBinding>,
    background: Option<BackgroundBinding>,
}

fn drawable_owner(layer: &str, index: usize) -> String {
    format!("{layer}/{index}")
}

fn missing_input(layer: &str, what: &str, name: &str) -> EngineError {
    EngineError::Compile {
        layer: layer.to_string(),
        source: CompileError {
            stage: ShaderStage::Link,
            log: format!("program has no active {what} '{name}'"),
        },
    }
}

impl<D: Device> RenderEngine<D> {
    /// Wraps `device`. The canvas size is read once here and used for every frame.
    pub fn new(device: D) -> Self {
        let (width, height) = (device.canvas_width(), device.canvas_height());
        log::debug!("render engine created for {width}x{height} canvas");
        Self {
            device,
            width,
            height,
            pool: ResourcePool::new(),
            state: EngineState::Uninitialized,
            layers: Vec::new(),
            background: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Layer names that resolved to a linked program.
    pub fn program_names(&self) -> BTreeSet<&str> {
        self.pool.program_names().collect()
    }

    /// Compiles programs and creates resources for `scene`.
    ///
    /// Resources from an earlier init are released first. On failure the
    /// engine is left `Uninitialized` with nothing allocated.
    pub fn init(&mut self, scene: &Scene) -> Result<(), EngineError> {
        if !self.pool.is_empty() {
            log::debug!("re-initializing, releasing previous resources");
            self.pool.release_all(&mut self.device).map_err(EngineError::Setup)?;
        }
        self.layers.clear();
        self.background = None;
        self.state = EngineState::Uninitialized;

        check_scene(scene)?;

        match self.init_resources(scene) {
            Ok(()) => {
                self.state = EngineState::Initialized;
                log::info!(
                    "engine initialized: {} layers, background: {}",
                    self.layers.len(),
                    self.background.as_ref().map_or("none", |b| b.name.as_str())
                );
                Ok(())
            }
            Err(e) => {
                if let Err(release) = self.pool.release_all(&mut self.device) {
                    log::warn!("cleanup after failed init: {release}");
                }
                self.layers.clear();
                self.background = None;
                Err(e)
            }
        }
    }

    fn init_resources(&mut self, scene: &Scene) -> Result<(), EngineError> {
        if let Some(bg) = &scene.background {
            self.background = Some(self.init_background(bg)?);
        }
        for layer in &scene.layers {
            let binding = self.init_layer(layer)?;
            self.layers.push(binding);
        }
        Ok(())
    }

    fn compile(&mut self, layer: &str, vs: &str, fs: &str) -> Result<(), EngineError> {
        let program = ShaderCompiler::compile(&mut self.device, vs, fs).map_err(|source| {
            EngineError::Compile { layer: layer.to_string(), source }
        })?;
        log::info!("layer '{layer}': program #{} linked", program.raw());
        if let Some(old) = self.pool.insert_program(layer, program) {
            self.device.delete_program(old).map_err(EngineError::Setup)?;
        }
        Ok(())
    }

    fn attrib(&self, layer: &str, name: &str) -> Result<AttribLocation, EngineError> {
        let program = self.pool.program(layer).ok_or(EngineError::NotInitialized)?;
        self.device
            .get_attrib_location(program, name)
            .map_err(EngineError::Setup)?
            .ok_or_else(|| missing_input(layer, "attribute", name))
    }

    fn init_layer(&mut self, layer: &Layer) -> Result<LayerBinding, EngineError> {
        self.compile(&layer.name, &layer.vertex_shader, &layer.fragment_shader)?;
        let position = self.attrib(&layer.name, "position")?;
        let color = self.attrib(&layer.name, "color")?;

        let c = self.device.consts().clone();
        let mut uploaded = Vec::with_capacity(layer.drawables.len());
        for (index, drawable) in layer.drawables.iter().enumerate() {
            let owner = drawable_owner(&layer.name, index);
            self.pool
                .upload_floats(
                    &mut self.device,
                    &ResourceKey::new(owner.as_str(), ResourceSlot::Positions),
                    c.array_buffer,
                    drawable.positions(),
                    c.static_draw,
                )
                .map_err(EngineError::Setup)?;
            // Contents arrive every frame.
            self.pool
                .buffer_or_create(&mut self.device, &ResourceKey::new(owner, ResourceSlot::Colors))
                .map_err(EngineError::Setup)?;
            uploaded.push(drawable.positions().to_vec());
        }

        Ok(LayerBinding { name: layer.name.clone(), position, color, uploaded })
    }

    fn init_background(&mut self, bg: &BackgroundLayer) -> Result<BackgroundBinding, EngineError> {
        self.compile(&bg.name, &bg.vertex_shader, &bg.fragment_shader)?;
        let position = self.attrib(&bg.name, "position")?;
        let texcoord = self.attrib(&bg.name, "texcoord")?;
        let offset = match self.pool.program(&bg.name) {
            Some(program) => self
                .device
                .get_uniform_location(program, "offset")
                .map_err(EngineError::Setup)?,
            None => None,
        };

        let c = self.device.consts().clone();
        for (index, tile) in bg.tiles.iter().enumerate() {
            let owner = drawable_owner(&bg.name, index);
            let key = |slot| ResourceKey::new(owner.as_str(), slot);
            let pool = &mut self.pool;
            let dev = &mut self.device;

            pool.upload_floats(dev, &key(ResourceSlot::Positions), c.array_buffer, &TILE_QUAD, c.static_draw)
                .and_then(|()| {
                    pool.upload_floats(
                        dev,
                        &key(ResourceSlot::TexCoords),
                        c.array_buffer,
                        &TILE_TEX_COORDS,
                        c.static_draw,
                    )
                })
                .and_then(|()| {
                    pool.upload_image(dev, &key(ResourceSlot::Texture), tile.width(), tile.height(), tile.pixels())
                })
                .and_then(|()| {
                    pool.upload_floats(
                        dev,
                        &key(ResourceSlot::Normals),
                        c.array_buffer,
                        tile.normals(),
                        c.static_draw,
                    )
                })
                .map_err(EngineError::Setup)?;
            log::debug!("background tile '{}' uploaded ({}x{})", tile.name(), tile.width(), tile.height());
        }

        Ok(BackgroundBinding {
            name: bg.name.clone(),
            position,
            texcoord,
            offset,
            tiles: bg.tiles.len(),
        })
    }

    /// Draws one frame of `scene` and flushes it.
    ///
    /// Any failure terminates the engine; later calls return
    /// [`EngineError::NotInitialized`].
    pub fn render(&mut self, scene: &Scene) -> Result<(), EngineError> {
        if !matches!(self.state, EngineState::Initialized | EngineState::Rendering) {
            return Err(EngineError::NotInitialized);
        }

        let result = self
            .check_unchanged(scene)
            .and_then(|()| self.issue_frame(scene).map_err(EngineError::FrameRender));

        match &result {
            Ok(()) => self.state = EngineState::Rendering,
            Err(e) => {
                log::error!("render failed, engine terminated: {e}");
                self.state = EngineState::Terminated;
            }
        }
        result
    }

    /// Verifies that `scene` still matches what init uploaded, before any
    /// device call of the frame.
    fn check_unchanged(&self, scene: &Scene) -> Result<(), EngineError> {
        check_clear_color(scene)?;
        if scene.layers.len() != self.layers.len() {
            return Err(EngineError::SceneChanged(format!(
                "{} layers at init, {} now",
                self.layers.len(),
                scene.layers.len()
            )));
        }
        match (&self.background, &scene.background) {
            (Some(b), Some(s)) if b.name == s.name && b.tiles == s.tiles.len() => {}
            (None, None) => {}
            _ => return Err(EngineError::SceneChanged("background differs from init".into())),
        }

        for (binding, layer) in self.layers.iter().zip(&scene.layers) {
            if binding.name != layer.name || binding.uploaded.len() != layer.drawables.len() {
                return Err(EngineError::SceneChanged(format!(
                    "layer '{}' does not match init",
                    layer.name
                )));
            }
            for (index, (drawable, uploaded)) in
                layer.drawables.iter().zip(&binding.uploaded).enumerate()
            {
                let invalid = |source| EngineError::InvalidDrawable {
                    layer: layer.name.clone(),
                    index,
                    source,
                };
                drawable.validate().map_err(invalid)?;
                let expected = uploaded.len() / FLOATS_PER_VERTEX;
                let actual = drawable.vertex_count();
                if actual != expected {
                    return Err(invalid(DrawableError::VertexCountChanged { expected, actual }));
                }
            }
        }
        Ok(())
    }

    fn issue_frame(&mut self, scene: &Scene) -> Result<(), DeviceError> {
        let c = self.device.consts().clone();
        let cc = scene.clear_color;
        self.device.clear_color(cc.r, cc.g, cc.b, cc.a)?;
        self.device.clear(c.color_buffer_bit)?;

        if let (Some(binding), Some(bg)) = (&self.background, &scene.background) {
            let program = self
                .pool
                .program(&binding.name)
                .ok_or(DeviceError::NothingBound("program"))?;
            self.device.use_program(program)?;

            for (index, tile) in bg.tiles.iter().enumerate() {
                let owner = drawable_owner(&binding.name, index);
                let buffer = |slot| {
                    self.pool
                        .buffer(&ResourceKey::new(owner.as_str(), slot))
                        .ok_or(DeviceError::NothingBound("buffer"))
                };

                if let Some(offset) = binding.offset {
                    self.device.uniform_2f(offset, tile.x, tile.y)?;
                }

                self.device.bind_buffer(c.array_buffer, buffer(ResourceSlot::Positions)?)?;
                self.device.vertex_attrib_pointer(binding.position, 2, c.float, false, 0, 0)?;
                self.device.enable_vertex_attrib_array(binding.position)?;

                self.device.bind_buffer(c.array_buffer, buffer(ResourceSlot::TexCoords)?)?;
                self.device.vertex_attrib_pointer(binding.texcoord, 2, c.float, false, 0, 0)?;
                self.device.enable_vertex_attrib_array(binding.texcoord)?;

                let texture = self
                    .pool
                    .texture(&ResourceKey::new(owner.as_str(), ResourceSlot::Texture))
                    .ok_or(DeviceError::NothingBound("texture"))?;
                self.device.bind_texture(c.texture_2d, texture)?;

                self.device.viewport(0, 0, self.width, self.height)?;
                self.device.draw_arrays(c.triangles, 0, TILE_VERTEX_COUNT)?;
            }
        }

        for (binding, layer) in self.layers.iter_mut().zip(&scene.layers) {
            let program = self
                .pool
                .program(&binding.name)
                .ok_or(DeviceError::NothingBound("program"))?;
            self.device.use_program(program)?;

            for (index, drawable) in layer.drawables.iter().enumerate() {
                let owner = drawable_owner(&binding.name, index);
                let buffer = |slot| {
                    self.pool
                        .buffer(&ResourceKey::new(owner.as_str(), slot))
                        .ok_or(DeviceError::NothingBound("buffer"))
                };

                self.device.bind_buffer(c.array_buffer, buffer(ResourceSlot::Positions)?)?;
                // Moved geometry replaces the static buffer; unchanged geometry is not resent.
                let positions = drawable.positions();
                if binding.uploaded[index].as_slice() != positions {
                    self.device.buffer_data(
                        c.array_buffer,
                        &crate::resources::f32s_to_le_bytes(positions),
                        c.static_draw,
                    )?;
                    binding.uploaded[index] = positions.to_vec();
                }
                self.device.vertex_attrib_pointer(binding.position, 3, c.float, false, 0, 0)?;
                self.device.enable_vertex_attrib_array(binding.position)?;

                self.device.bind_buffer(c.array_buffer, buffer(ResourceSlot::Colors)?)?;
                self.device.buffer_data(
                    c.array_buffer,
                    &crate::resources::f32s_to_le_bytes(drawable.colors()),
                    c.dynamic_copy,
                )?;
                self.device.vertex_attrib_pointer(binding.color, 3, c.float, false, 0, 0)?;
                self.device.enable_vertex_attrib_array(binding.color)?;

                self.device.viewport(0, 0, self.width, self.height)?;
                self.device.draw_arrays(c.triangles, 0, draw_count(positions.len())?)?;
            }
        }

        self.device.flush()
    }

    /// Releases every device object. The engine must be re-initialized
    /// before it can render again.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        self.layers.clear();
        self.background = None;
        self.state = EngineState::Terminated;
        self.pool.release_all(&mut self.device).map_err(EngineError::Setup)?;
        log::info!("engine shut down");
        Ok(())
    }
}

/// Rejects duplicate names and malformed drawables before anything reaches
/// the device.
fn check_clear_color(scene: &Scene) -> Result<(), EngineError> {
    if scene.clear_color.is_normalized() {
        Ok(())
    } else {
        Err(EngineError::InvalidClearColor(scene.clear_color))
    }
}

/// Vertex count for `draw_arrays`, from a position array's length.
fn draw_count(floats: usize) -> Result<u32, DeviceError> {
    u32::try_from(floats / FLOATS_PER_VERTEX).map_err(|_| {
        DeviceError::InvalidArgument(format!("{floats} position floats exceed the draw count range"))
    })
}

fn check_scene(scene: &Scene) -> Result<(), EngineError> {
    check_clear_color(scene)?;
    let mut names = BTreeSet::new();
    let background = scene.background.as_ref().map(|b| b.name.as_str());
    for name in background.into_iter().chain(scene.layers.iter().map(|l| l.name.as_str())) {
        if !names.insert(name) {
            return Err(EngineError::DuplicateLayer(name.to_string()));
        }
    }

    for layer in &scene.layers {
        for (index, drawable) in layer.drawables.iter().enumerate() {
            drawable.validate().map_err(|source| EngineError::InvalidDrawable {
                layer: layer.name.clone(),
                index,
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Call, RecordingDevice};
    use crate::paint::Color;
    use crate::scene::Mesh;

    const VS: &str = "attribute vec3 position;\nattribute vec3 color;\nvoid main(void) {}";
    const FS: &str = "void main(void) {}";

    fn scene() -> Scene {
        Scene::new(Color::WHITE).with_layer(
            Layer::new("a", VS, FS).with_drawable(Mesh::triangle([0.0; 9], [1.0; 9])),
        )
    }

    #[test]
    fn new_captures_canvas_size() {
        let engine = RenderEngine::new(RecordingDevice::new(640, 480));
        assert_eq!(engine.canvas_size(), (640, 480));
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn render_before_init_is_rejected() {
        let mut engine = RenderEngine::new(RecordingDevice::new(4, 4));
        assert!(matches!(engine.render(&scene()), Err(EngineError::NotInitialized)));
        assert!(engine.device().calls().is_empty());
    }

    #[test]
    fn duplicate_layer_names_are_rejected() {
        let scene = scene().with_layer(Layer::new("a", VS, FS));
        let mut engine = RenderEngine::new(RecordingDevice::new(4, 4));
        assert!(matches!(engine.init(&scene), Err(EngineError::DuplicateLayer(n)) if n == "a"));
        assert!(engine.device().calls().is_empty());
    }

    #[test]
    fn out_of_range_clear_color_is_rejected_before_any_device_call() {
        let mut scene = scene();
        scene.clear_color = Color::rgba(1.2, 0.0, 0.0, 1.0);
        let mut engine = RenderEngine::new(RecordingDevice::new(4, 4));
        assert!(matches!(engine.init(&scene), Err(EngineError::InvalidClearColor(_))));
        assert!(engine.device().calls().is_empty());
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn clear_color_turned_nan_terminates_render() {
        let mut engine = RenderEngine::new(RecordingDevice::new(4, 4));
        let mut scene = scene();
        engine.init(&scene).unwrap();
        engine.device_mut().take_calls();

        scene.clear_color.g = f32::NAN;
        assert!(matches!(engine.render(&scene), Err(EngineError::InvalidClearColor(_))));
        assert_eq!(engine.state(), EngineState::Terminated);
        assert!(engine.device().calls().is_empty());
    }

    #[test]
    fn draw_count_is_whole_vertices_within_u32() {
        assert_eq!(draw_count(9).unwrap(), 3);
        assert_eq!(draw_count(0).unwrap(), 0);
        let too_many = (u32::MAX as usize).saturating_add(1).saturating_mul(FLOATS_PER_VERTEX);
        if too_many / FLOATS_PER_VERTEX > u32::MAX as usize {
            assert!(matches!(draw_count(too_many), Err(DeviceError::InvalidArgument(_))));
        }
    }

    #[test]
    fn missing_color_attribute_is_a_link_error() {
        let scene = Scene::new(Color::WHITE)
            .with_layer(Layer::new("a", "attribute vec3 position;\nvoid main(void) {}", FS));
        let mut engine = RenderEngine::new(RecordingDevice::new(4, 4));

        let err = engine.init(&scene).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Compile { ref layer, ref source } if layer == "a" && source.stage == ShaderStage::Link
        ));
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.device().live_programs(), 0);
    }

    #[test]
    fn first_render_moves_to_rendering() {
        let mut engine = RenderEngine::new(RecordingDevice::new(4, 4));
        let scene = scene();
        engine.init(&scene).unwrap();
        assert_eq!(engine.state(), EngineState::Initialized);
        engine.render(&scene).unwrap();
        assert_eq!(engine.state(), EngineState::Rendering);
        assert_eq!(engine.device().calls().last(), Some(&Call::Flush));
    }

    #[test]
    fn changed_layer_membership_terminates() {
        let mut engine = RenderEngine::new(RecordingDevice::new(4, 4));
        let mut scene = scene();
        engine.init(&scene).unwrap();
        engine.device_mut().take_calls();

        scene.layers[0].drawables.push(Box::new(Mesh::default()));
        assert!(matches!(engine.render(&scene), Err(EngineError::SceneChanged(_))));
        assert_eq!(engine.state(), EngineState::Terminated);
        assert!(engine.device().calls().is_empty());
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut engine = RenderEngine::new(RecordingDevice::new(4, 4));
        engine.init(&scene()).unwrap();
        engine.shutdown().unwrap();

        let dev = engine.device();
        assert_eq!((dev.live_buffers(), dev.live_programs()), (0, 0));
        assert!(engine.program_names().is_empty());
        assert!(matches!(engine.render(&scene()), Err(EngineError::NotInitialized)));
    }
}
