//! Shader program compilation.

mod compiler;
mod error;

pub use compiler::ShaderCompiler;
pub use error::{CompileError, ShaderStage};
