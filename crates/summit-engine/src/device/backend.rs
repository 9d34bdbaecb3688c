use core::fmt;

use crate::cache::SamplerOptions;
use crate::error::Result;
use crate::paint::Color;
use crate::pipeline::PipelineDescriptor;

use super::error::FrameOutcome;

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// Sub-rectangle upload. `data` starts at the first texel of the rectangle.
#[derive(Debug, Clone, Copy)]
pub struct TextureWrite<'a> {
    pub origin: (u32, u32),
    pub size: (u32, u32),
    pub bytes_per_row: u32,
    pub data: &'a [u8],
}

/// Device handle bound at one slot of a bind group.
pub enum ResourceRef<'a, D: GpuDevice> {
    Buffer(&'a D::Buffer),
    Texture(&'a D::Texture),
    Sampler(&'a D::Sampler),
}

pub struct BoundResource<'a, D: GpuDevice> {
    pub slot: u32,
    pub resource: ResourceRef<'a, D>,
}

/// One draw of one render object.
pub struct DrawCall<'a, D: GpuDevice> {
    pub label: &'a str,
    pub pipeline: &'a D::Pipeline,
    pub descriptor: &'a PipelineDescriptor,
    /// Bind group 0 entries, restricted to what this pipeline declares.
    pub target_bindings: Vec<BoundResource<'a, D>>,
    /// Bind group 1 entries.
    pub object_bindings: Vec<BoundResource<'a, D>>,
    /// In the pipeline's vertex-buffer order.
    pub vertex_buffers: Vec<&'a D::Buffer>,
    pub index: Option<(&'a D::Buffer, wgpu::IndexFormat)>,
    /// Index count when indexed, vertex count otherwise.
    pub element_count: u32,
    pub instance_count: u32,
}

/// Draws of one render target, in membership order.
pub struct TargetPass<'a, D: GpuDevice> {
    pub label: &'a str,
    pub draws: Vec<DrawCall<'a, D>>,
}

/// Everything the device needs to render one frame.
pub struct FramePlan<'a, D: GpuDevice> {
    pub clear: Color,
    pub passes: Vec<TargetPass<'a, D>>,
}

/// Backend the render side drives.
///
/// Handles are cheap clones. Destroy calls consume the last handle the
/// cache holds; backends free the GPU object there.
pub trait GpuDevice: Sized {
    type Buffer: Clone + fmt::Debug;
    type Texture: Clone + fmt::Debug;
    type Sampler: Clone + fmt::Debug;
    type Pipeline: Clone + fmt::Debug;
    /// What the canvas is built from (a window surface, an offscreen size, ...).
    type Canvas;

    fn init_canvas(&mut self, canvas: Self::Canvas) -> Result<()>;
    fn resize_canvas(&mut self, width: u32, height: u32);
    fn canvas_size(&self) -> Option<(u32, u32)>;
    fn canvas_format(&self) -> Option<wgpu::TextureFormat>;

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Self::Buffer>;
    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<()>;
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<Self::Texture>;
    fn write_texture(&mut self, texture: &Self::Texture, write: &TextureWrite<'_>) -> Result<()>;
    fn destroy_texture(&mut self, texture: Self::Texture);

    fn create_sampler(&mut self, options: &SamplerOptions) -> Result<Self::Sampler>;
    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> Result<Self::Pipeline>;

    fn draw_frame(&mut self, plan: &FramePlan<'_, Self>) -> Result<FrameOutcome>;
}
