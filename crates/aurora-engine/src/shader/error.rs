use std::fmt;

use thiserror::Error;

use crate::device::DeviceError;

/// Pipeline step a compile failure originated in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "VERTEX",
            ShaderStage::Fragment => "FRAGMENT",
            ShaderStage::Link => "LINK",
        })
    }
}

/// Compile or link failure, with the device's diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} failed: {log}")]
pub struct CompileError {
    pub stage: ShaderStage,
    pub log: String,
}

impl CompileError {
    /// Device call failure while processing `stage`.
    pub(crate) fn device(stage: ShaderStage, err: DeviceError) -> Self {
        Self { stage, log: err.to_string() }
    }
}
