//! Scene rendering.

mod engine;

pub use engine::{EngineState, RenderEngine};
