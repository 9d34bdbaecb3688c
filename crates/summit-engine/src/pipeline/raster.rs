/// How fragment output is combined with the target.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    /// No blending; output replaces the target.
    Opaque,
    /// Straight alpha.
    Alpha,
    /// Linear premultiplied alpha, the convention used by [`Color`](crate::paint::Color).
    #[default]
    PremultipliedAlpha,
    Additive,
}

impl BlendMode {
    pub fn to_wgpu(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Opaque => None,
            BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::PremultipliedAlpha => Some(premul_alpha_blend()),
            BlendMode::Additive => {
                let add = wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                };
                Some(wgpu::BlendState { color: add, alpha: add })
            }
        }
    }
}

fn premul_alpha_blend() -> wgpu::BlendState {
    let over = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: over, alpha: over }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DepthState {
    pub format: wgpu::TextureFormat,
    pub compare: wgpu::CompareFunction,
    pub write: bool,
}

impl DepthState {
    pub fn to_wgpu(self) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format: self.format,
            depth_write_enabled: self.write,
            depth_compare: self.compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// Fixed-function state that, together with the two graphs, identifies a pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RasterState {
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub blend: BlendMode,
    pub color_format: wgpu::TextureFormat,
    pub depth: Option<DepthState>,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            blend: BlendMode::default(),
            color_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth: None,
        }
    }
}

impl RasterState {
    pub fn with_color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn primitive(&self) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology: self.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: self.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        }
    }
}
