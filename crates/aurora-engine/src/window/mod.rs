//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window, and wires them to the engine and
//! the frame scheduler.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
