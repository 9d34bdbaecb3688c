/// Adapter, device and canvas settings for [`WgpuDevice`](super::WgpuDevice).
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub power_preference: wgpu::PowerPreference,
    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,

    /// Pick an sRGB swapchain format when the surface offers one.
    pub prefer_srgb: bool,
    pub present_mode: wgpu::PresentMode,
    /// `None` takes the surface's first supported mode.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,
    /// Hint only; backends may ignore it.
    pub desired_maximum_frame_latency: u32,

    /// Color format of an offscreen canvas. Pipelines drawing to it must
    /// use the same `RasterState::color_format`.
    pub offscreen_format: wgpu::TextureFormat,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            desired_maximum_frame_latency: 2,
            offscreen_format: wgpu::TextureFormat::Rgba8UnormSrgb,
        }
    }
}
