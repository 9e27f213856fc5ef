/// Parameters for creating the wgpu context behind [`WgpuDevice`](super::WgpuDevice).
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Pick an sRGB surface format when the surface offers one.
    pub prefer_srgb: bool,

    /// Block `present` on vertical sync. Off by default: frame pacing is the
    /// scheduler's job, and vsync would stack a second wait on top of it.
    pub vsync: bool,

    pub power_preference: wgpu::PowerPreference,
    pub backends: wgpu::Backends,

    /// Falls back to a supported mode when the surface does not offer it.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Frames the presentation engine may queue ahead (a hint).
    pub max_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            vsync: false,
            power_preference: wgpu::PowerPreference::default(),
            backends: wgpu::Backends::all(),
            alpha_mode: None,
            max_frame_latency: 1,
        }
    }
}

impl GpuInit {
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        }
    }

    /// Device limits requested from the adapter. The engine needs nothing
    /// beyond what WebGL2-class hardware provides.
    pub fn limits(&self) -> wgpu::Limits {
        wgpu::Limits::downlevel_webgl2_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_selects_present_mode() {
        assert_eq!(GpuInit::default().present_mode(), wgpu::PresentMode::AutoNoVsync);
        assert_eq!(GpuInit::default().with_vsync(true).present_mode(), wgpu::PresentMode::AutoVsync);
    }
}
