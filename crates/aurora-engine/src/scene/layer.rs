use std::any::Any;

use crate::paint::Color;

use super::{BackgroundLayer, Drawable};

/// Named group of drawables rendered with one shader program.
///
/// The name keys the layer's program and must be unique within a scene.
pub struct Layer {
    pub name: String,
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub drawables: Vec<Box<dyn Drawable>>,
}

impl Layer {
    pub fn new(
        name: impl Into<String>,
        vertex_shader: impl Into<String>,
        fragment_shader: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
            drawables: Vec::new(),
        }
    }

    pub fn with_drawable(mut self, drawable: impl Drawable + 'static) -> Self {
        self.drawables.push(Box::new(drawable));
        self
    }

    /// Concrete drawable at `index`, if it is a `T`.
    pub fn drawable_mut<T: Drawable>(&mut self, index: usize) -> Option<&mut T> {
        let drawable: &mut dyn Any = self.drawables.get_mut(index)?.as_mut();
        drawable.downcast_mut::<T>()
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("drawables", &self.drawables.len())
            .finish_non_exhaustive()
    }
}

/// Everything drawn in one frame.
///
/// Layers render in sequence order; later layers paint over earlier ones.
/// Membership is fixed after engine init, contents may change between frames.
#[derive(Debug)]
pub struct Scene {
    pub clear_color: Color,
    pub layers: Vec<Layer>,
    pub background: Option<BackgroundLayer>,
}

impl Scene {
    pub fn new(clear_color: Color) -> Self {
        Self { clear_color, layers: Vec::new(), background: None }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_background(mut self, background: BackgroundLayer) -> Self {
        self.background = Some(background);
        self
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }
}
