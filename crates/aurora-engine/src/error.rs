use thiserror::Error;

use crate::assets::AssetError;
use crate::device::DeviceError;
use crate::paint::Color;
use crate::scene::DrawableError;
use crate::shader::CompileError;

/// Failure surfaced by the render engine.
///
/// Nothing is retried: every variant is fatal to the operation that produced
/// it, and a `FrameRender` error is fatal to the frame loop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No graphics context could be obtained.
    #[error("graphics device unavailable")]
    DeviceUnavailable(#[source] DeviceError),

    #[error("layer '{layer}': {source}")]
    Compile {
        layer: String,
        #[source]
        source: CompileError,
    },

    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Creating or uploading resources during init failed.
    #[error("resource setup failed")]
    Setup(#[source] DeviceError),

    /// A device call failed mid-frame; the frame is abandoned.
    #[error("frame render failed")]
    FrameRender(#[source] DeviceError),

    #[error("layer '{layer}', drawable {index}: {source}")]
    InvalidDrawable {
        layer: String,
        index: usize,
        #[source]
        source: DrawableError,
    },

    /// Layer or drawable membership differs from what init saw.
    #[error("scene changed after init: {0}")]
    SceneChanged(String),

    #[error("engine is not initialized")]
    NotInitialized,

    #[error("duplicate layer name '{0}'")]
    DuplicateLayer(String),

    /// A clear color component is NaN or outside `[0, 1]`.
    #[error("clear color {0:?} has components outside [0, 1]")]
    InvalidClearColor(Color),
}
