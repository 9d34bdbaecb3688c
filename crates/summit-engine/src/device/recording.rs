use rustc_hash::FxHashMap;

use crate::cache::SamplerOptions;
use crate::error::{Result, SyncError};
use crate::paint::Color;
use crate::pipeline::PipelineDescriptor;
use crate::shared::bytes_per_texel;

use super::backend::{
    BoundResource, BufferDesc, FramePlan, GpuDevice, TextureDesc, TextureWrite,
};
use super::error::FrameOutcome;

/// Opaque id handed out by [`RecordingDevice`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

/// Running totals of device calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub buffer_writes: u64,
    pub buffer_bytes_written: u64,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub texture_writes: u64,
    pub texture_bytes_written: u64,
    pub samplers_created: u64,
    pub pipelines_created: u64,
    pub frames: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub pass: String,
    pub label: String,
    pub pipeline: Handle,
    pub indexed: bool,
    pub element_count: u32,
    pub instance_count: u32,
    pub target_slots: Vec<u32>,
    pub object_slots: Vec<u32>,
    pub vertex_buffers: Vec<Handle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub clear: Color,
    pub passes: usize,
    pub draws: Vec<RecordedDraw>,
}

#[derive(Debug)]
struct TextureData {
    width: u32,
    height: u32,
    bytes_per_texel: u32,
    bytes: Vec<u8>,
}

/// Headless [`GpuDevice`] that keeps every buffer and texture in memory and
/// records each frame instead of rendering it.
///
/// Used for tests and for running the render side without a GPU.
#[derive(Debug)]
pub struct RecordingDevice {
    next: u64,
    canvas: Option<(u32, u32)>,
    format: wgpu::TextureFormat,
    buffers: FxHashMap<Handle, Vec<u8>>,
    textures: FxHashMap<Handle, TextureData>,
    pipelines: FxHashMap<Handle, String>,
    counters: DeviceCounters,
    last_frame: Option<RecordedFrame>,
    refuse_buffers: u32,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            next: 1,
            canvas: None,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            counters: DeviceCounters::default(),
            last_frame: None,
            refuse_buffers: 0,
        }
    }

    fn handle(&mut self) -> Handle {
        let h = Handle(self.next);
        self.next += 1;
        h
    }

    #[inline]
    pub fn counters(&self) -> &DeviceCounters {
        &self.counters
    }

    pub fn buffer_contents(&self, buffer: Handle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn texture_contents(&self, texture: Handle) -> Option<&[u8]> {
        self.textures.get(&texture).map(|t| t.bytes.as_slice())
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn pipeline_label(&self, pipeline: Handle) -> Option<&str> {
        self.pipelines.get(&pipeline).map(String::as_str)
    }

    pub fn last_frame(&self) -> Option<&RecordedFrame> {
        self.last_frame.as_ref()
    }

    /// Makes the next `count` buffer creations fail with [`SyncError::Device`].
    pub fn refuse_buffers(&mut self, count: u32) {
        self.refuse_buffers = count;
    }
}

fn slots(bound: &[BoundResource<'_, RecordingDevice>]) -> Vec<u32> {
    bound.iter().map(|b| b.slot).collect()
}

impl GpuDevice for RecordingDevice {
    type Buffer = Handle;
    type Texture = Handle;
    type Sampler = Handle;
    type Pipeline = Handle;
    /// Canvas size in pixels.
    type Canvas = (u32, u32);

    fn init_canvas(&mut self, canvas: (u32, u32)) -> Result<()> {
        self.canvas = Some(canvas);
        Ok(())
    }

    fn resize_canvas(&mut self, width: u32, height: u32) {
        if let Some(canvas) = self.canvas.as_mut() {
            *canvas = (width, height);
        }
    }

    fn canvas_size(&self) -> Option<(u32, u32)> {
        self.canvas
    }

    fn canvas_format(&self) -> Option<wgpu::TextureFormat> {
        self.canvas.map(|_| self.format)
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Handle> {
        if self.refuse_buffers > 0 {
            self.refuse_buffers -= 1;
            return Err(SyncError::Device(format!("buffer `{}` refused", desc.label)));
        }
        let h = self.handle();
        self.buffers.insert(h, vec![0; desc.size as usize]);
        self.counters.buffers_created += 1;
        Ok(h)
    }

    fn write_buffer(&mut self, buffer: &Handle, offset: u64, data: &[u8]) -> Result<()> {
        let bytes = self
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| SyncError::Device(format!("write to destroyed buffer {buffer:?}")))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(SyncError::Device(format!(
                "write of {} bytes at {offset} overruns {}-byte buffer",
                data.len(),
                bytes.len()
            )));
        }
        bytes[start..end].copy_from_slice(data);
        self.counters.buffer_writes += 1;
        self.counters.buffer_bytes_written += data.len() as u64;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: Handle) {
        if self.buffers.remove(&buffer).is_some() {
            self.counters.buffers_destroyed += 1;
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<Handle> {
        let bpt = bytes_per_texel(desc.format)?;
        let h = self.handle();
        self.textures.insert(
            h,
            TextureData {
                width: desc.width,
                height: desc.height,
                bytes_per_texel: bpt,
                bytes: vec![0; (desc.width * desc.height * bpt) as usize],
            },
        );
        self.counters.textures_created += 1;
        Ok(h)
    }

    fn write_texture(&mut self, texture: &Handle, write: &TextureWrite<'_>) -> Result<()> {
        let tex = self
            .textures
            .get_mut(texture)
            .ok_or_else(|| SyncError::Device(format!("write to destroyed texture {texture:?}")))?;
        let (ox, oy) = write.origin;
        let (sx, sy) = write.size;
        if ox + sx > tex.width || oy + sy > tex.height {
            return Err(SyncError::Device(format!(
                "{sx}x{sy} upload at ({ox},{oy}) exceeds {}x{} texture",
                tex.width, tex.height
            )));
        }

        let row_bytes = (sx * tex.bytes_per_texel) as usize;
        for row in 0..sy as usize {
            let src = row * write.bytes_per_row as usize;
            let src_row = write
                .data
                .get(src..src + row_bytes)
                .ok_or_else(|| SyncError::Device("texture upload data too short".into()))?;
            let dst = (((oy as usize + row) * tex.width as usize) + ox as usize) * tex.bytes_per_texel as usize;
            tex.bytes[dst..dst + row_bytes].copy_from_slice(src_row);
        }
        self.counters.texture_writes += 1;
        self.counters.texture_bytes_written += (row_bytes * sy as usize) as u64;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: Handle) {
        if self.textures.remove(&texture).is_some() {
            self.counters.textures_destroyed += 1;
        }
    }

    fn create_sampler(&mut self, _options: &SamplerOptions) -> Result<Handle> {
        self.counters.samplers_created += 1;
        Ok(self.handle())
    }

    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> Result<Handle> {
        let h = self.handle();
        self.pipelines.insert(h, descriptor.label.clone());
        self.counters.pipelines_created += 1;
        Ok(h)
    }

    fn draw_frame(&mut self, plan: &FramePlan<'_, Self>) -> Result<FrameOutcome> {
        if self.canvas.is_none() {
            return Err(SyncError::CanvasNotReady);
        }

        let draws = plan
            .passes
            .iter()
            .flat_map(|pass| {
                pass.draws.iter().map(move |draw| RecordedDraw {
                    pass: pass.label.to_owned(),
                    label: draw.label.to_owned(),
                    pipeline: *draw.pipeline,
                    indexed: draw.index.is_some(),
                    element_count: draw.element_count,
                    instance_count: draw.instance_count,
                    target_slots: slots(&draw.target_bindings),
                    object_slots: slots(&draw.object_bindings),
                    vertex_buffers: draw.vertex_buffers.iter().map(|b| **b).collect(),
                })
            })
            .collect();

        self.counters.frames += 1;
        self.last_frame = Some(RecordedFrame {
            clear: plan.clear,
            passes: plan.passes.len(),
            draws,
        });
        Ok(FrameOutcome::Presented)
    }
}
