//! Aurora engine crate.
//!
//! A minimal layered 2D renderer: a [`scene::Scene`] of shaded layers is
//! compiled and uploaded once by [`render::RenderEngine::init`], then redrawn
//! every frame through a [`device::Device`] binding, paced by
//! [`time::FrameScheduler`].

pub mod assets;
pub mod device;
pub mod error;
pub mod logging;
pub mod normals;
pub mod paint;
pub mod render;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod time;
pub mod window;

pub use error::EngineError;
