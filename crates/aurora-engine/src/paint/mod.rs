//! Color model shared between the scene and the device binding.

pub mod color;

pub use color::Color;
