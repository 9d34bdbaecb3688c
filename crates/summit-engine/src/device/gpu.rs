use anyhow::{Context, Result as AnyResult};
use rustc_hash::FxHashMap;

use crate::cache::SamplerOptions;
use crate::error::{Result, SyncError};
use crate::pipeline::{FRAGMENT_ENTRY, PipelineDescriptor, VERTEX_ENTRY};
use crate::slots::BindingScope;

use super::backend::{
    BoundResource, BufferDesc, DrawCall, FramePlan, GpuDevice, ResourceRef, TextureDesc,
    TextureWrite,
};
use super::error::FrameOutcome;
use super::{GpuInit, SurfaceErrorAction, surface};

/// What the canvas of a [`WgpuDevice`] renders into.
pub enum WgpuCanvas {
    /// A window (or any other surface target) with its drawable size in physical pixels.
    Surface {
        target: wgpu::SurfaceTarget<'static>,
        width: u32,
        height: u32,
    },
    /// A render texture; nothing is presented.
    Offscreen { width: u32, height: u32 },
}

enum Canvas {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        width: u32,
        height: u32,
    },
}

impl Canvas {
    fn size(&self) -> (u32, u32) {
        match self {
            Canvas::Surface { config, .. } => (config.width, config.height),
            Canvas::Offscreen { width, height, .. } => (*width, *height),
        }
    }

    fn format(&self) -> wgpu::TextureFormat {
        match self {
            Canvas::Surface { config, .. } => config.format,
            Canvas::Offscreen { texture, .. } => texture.format(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WgpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

#[derive(Debug, Clone)]
pub struct WgpuPipeline {
    pub pipeline: wgpu::RenderPipeline,
    /// Layouts of bind groups 0 (target) and 1 (object).
    pub layouts: [wgpu::BindGroupLayout; 2],
}

/// [`GpuDevice`] over wgpu.
///
/// Owns Instance/Adapter/Device/Queue and, once initialized, the canvas.
pub struct WgpuDevice {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    init: GpuInit,
    canvas: Option<Canvas>,
    depth: FxHashMap<wgpu::TextureFormat, wgpu::TextureView>,
}

impl WgpuDevice {
    /// Acquires an adapter and device. No canvas exists yet.
    pub async fn new(init: GpuInit) -> AnyResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("summit device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        log::info!("wgpu adapter: {:?}", adapter.get_info().name);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            init,
            canvas: None,
            depth: FxHashMap::default(),
        })
    }

    /// Blocking variant of [`new`](Self::new).
    pub fn new_blocking(init: GpuInit) -> AnyResult<Self> {
        pollster::block_on(Self::new(init))
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn configure_surface(&self, surface: &wgpu::Surface<'static>, width: u32, height: u32) -> Result<wgpu::SurfaceConfiguration> {
        let caps = surface.get_capabilities(&self.adapter);
        let config = surface::surface_config(&caps, &self.init, width, height)
            .ok_or_else(|| SyncError::Device("surface reports no supported formats".into()))?;
        surface.configure(&self.device, &config);
        Ok(config)
    }

    fn offscreen_texture(&self, width: u32, height: u32) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("summit offscreen canvas"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.init.offscreen_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    fn depth_view(&mut self, format: wgpu::TextureFormat, size: (u32, u32)) -> wgpu::TextureView {
        self.depth
            .entry(format)
            .or_insert_with(|| {
                self.device
                    .create_texture(&wgpu::TextureDescriptor {
                        label: Some("summit depth"),
                        size: wgpu::Extent3d {
                            width: size.0.max(1),
                            height: size.1.max(1),
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format,
                        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                        view_formats: &[],
                    })
                    .create_view(&wgpu::TextureViewDescriptor::default())
            })
            .clone()
    }

    fn bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        resources: &[BoundResource<'_, Self>],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = resources
            .iter()
            .map(|bound| wgpu::BindGroupEntry {
                binding: bound.slot,
                resource: match &bound.resource {
                    ResourceRef::Buffer(buffer) => buffer.as_entire_binding(),
                    ResourceRef::Texture(texture) => wgpu::BindingResource::TextureView(&texture.view),
                    ResourceRef::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    fn encode_draws(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        plan: &FramePlan<'_, Self>,
        size: (u32, u32),
    ) {
        let clear = plan.clear.to_wgpu();
        let mut cleared = false;
        let mut depth_cleared: Vec<wgpu::TextureFormat> = Vec::new();

        for pass in &plan.passes {
            // Draws are split into runs sharing a depth format; each run is one render pass.
            let mut runs: Vec<&[DrawCall<'_, Self>]> = Vec::new();
            let mut start = 0;
            for i in 1..=pass.draws.len() {
                let boundary = i == pass.draws.len()
                    || pass.draws[i].descriptor.raster.depth.map(|d| d.format)
                        != pass.draws[start].descriptor.raster.depth.map(|d| d.format);
                if boundary {
                    runs.push(&pass.draws[start..i]);
                    start = i;
                }
            }

            for run in runs {
                let groups: Vec<[wgpu::BindGroup; 2]> = run
                    .iter()
                    .map(|draw| {
                        [
                            self.bind_group(&draw.pipeline.layouts[0], draw.label, &draw.target_bindings),
                            self.bind_group(&draw.pipeline.layouts[1], draw.label, &draw.object_bindings),
                        ]
                    })
                    .collect();

                let depth_format = run.first().and_then(|d| d.descriptor.raster.depth).map(|d| d.format);
                let depth_view = depth_format.map(|f| self.depth_view(f, size));
                let depth_load = match depth_format {
                    Some(f) if depth_cleared.contains(&f) => wgpu::LoadOp::Load,
                    Some(f) => {
                        depth_cleared.push(f);
                        wgpu::LoadOp::Clear(1.0)
                    }
                    None => wgpu::LoadOp::Load,
                };

                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(pass.label),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: if cleared { wgpu::LoadOp::Load } else { wgpu::LoadOp::Clear(clear) },
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: depth_view.as_ref().map(|view| {
                        wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: depth_load,
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                });
                cleared = true;

                for (draw, groups) in run.iter().zip(&groups) {
                    rpass.set_pipeline(&draw.pipeline.pipeline);
                    rpass.set_bind_group(BindingScope::Target.group(), &groups[0], &[]);
                    rpass.set_bind_group(BindingScope::Object.group(), &groups[1], &[]);
                    for (slot, buffer) in draw.vertex_buffers.iter().enumerate() {
                        rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
                    }
                    match draw.index {
                        Some((buffer, format)) => {
                            rpass.set_index_buffer(buffer.slice(..), format);
                            rpass.draw_indexed(0..draw.element_count, 0, 0..draw.instance_count);
                        }
                        None => rpass.draw(0..draw.element_count, 0..draw.instance_count),
                    }
                }
            }
        }

        if !cleared {
            // Nothing was drawn; the canvas still gets cleared.
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("summit clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
    }
}

impl GpuDevice for WgpuDevice {
    type Buffer = wgpu::Buffer;
    type Texture = WgpuTexture;
    type Sampler = wgpu::Sampler;
    type Pipeline = WgpuPipeline;
    type Canvas = WgpuCanvas;

    fn init_canvas(&mut self, canvas: WgpuCanvas) -> Result<()> {
        let canvas = match canvas {
            WgpuCanvas::Surface { target, width, height } => {
                let surface = self
                    .instance
                    .create_surface(target)
                    .map_err(|e| SyncError::Device(format!("failed to create wgpu surface: {e}")))?;
                let config = self.configure_surface(&surface, width, height)?;
                Canvas::Surface { surface, config }
            }
            WgpuCanvas::Offscreen { width, height } => Canvas::Offscreen {
                texture: self.offscreen_texture(width, height),
                width: width.max(1),
                height: height.max(1),
            },
        };
        log::info!("canvas ready: {:?} {:?}", canvas.size(), canvas.format());
        self.canvas = Some(canvas);
        self.depth.clear();
        Ok(())
    }

    fn resize_canvas(&mut self, width: u32, height: u32) {
        let replacement = match self.canvas.as_mut() {
            Some(Canvas::Surface { surface, config }) => {
                surface::resize(surface, &self.device, config, width, height);
                None
            }
            Some(Canvas::Offscreen { .. }) if width > 0 && height > 0 => Some(Canvas::Offscreen {
                texture: self.offscreen_texture(width, height),
                width,
                height,
            }),
            _ => None,
        };
        if let Some(canvas) = replacement {
            self.canvas = Some(canvas);
        }
        self.depth.clear();
    }

    fn canvas_size(&self) -> Option<(u32, u32)> {
        self.canvas.as_ref().map(Canvas::size)
    }

    fn canvas_format(&self) -> Option<wgpu::TextureFormat> {
        self.canvas.as_ref().map(Canvas::format)
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<wgpu::Buffer> {
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size.max(1).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: desc.usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn write_buffer(&mut self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset + data.len() as u64;
        if end > buffer.size() || offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(SyncError::Device(format!(
                "write of {} bytes at {offset} does not fit a {}-byte buffer",
                data.len(),
                buffer.size()
            )));
        }
        // Queue writes must be a multiple of four bytes long.
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize((data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize, 0);
            self.queue.write_buffer(buffer, offset, &padded);
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: wgpu::Buffer) {
        buffer.destroy();
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<WgpuTexture> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTexture { texture, view })
    }

    fn write_texture(&mut self, texture: &WgpuTexture, write: &TextureWrite<'_>) -> Result<()> {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: write.origin.0,
                    y: write.origin.1,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            write.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(write.bytes_per_row),
                rows_per_image: Some(write.size.1),
            },
            wgpu::Extent3d {
                width: write.size.0,
                height: write.size.1,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: WgpuTexture) {
        texture.texture.destroy();
    }

    fn create_sampler(&mut self, options: &SamplerOptions) -> Result<wgpu::Sampler> {
        Ok(self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("summit sampler"),
            address_mode_u: options.address_mode,
            address_mode_v: options.address_mode,
            address_mode_w: options.address_mode,
            mag_filter: options.mag_filter,
            min_filter: options.min_filter,
            mipmap_filter: options.mipmap_filter,
            compare: options.compare,
            anisotropy_clamp: options.anisotropy_clamp,
            ..Default::default()
        }))
    }

    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> Result<WgpuPipeline> {
        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(descriptor.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(descriptor.vertex_source.as_str().into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(descriptor.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(descriptor.fragment_source.as_str().into()),
        });

        let layouts = BindingScope::ALL.map(|scope| {
            let entries: Vec<_> = descriptor.group(scope).map(|b| b.layout_entry()).collect();
            self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(descriptor.label.as_str()),
                entries: &entries,
            })
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(descriptor.label.as_str()),
            bind_group_layouts: &[&layouts[0], &layouts[1]],
            immediate_size: 0,
        });

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers
            .iter()
            .map(|b| b.wgpu_attributes())
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = descriptor
            .vertex_buffers
            .iter()
            .zip(&attributes)
            .map(|(b, attrs)| wgpu::VertexBufferLayout {
                array_stride: b.array_stride,
                step_mode: b.step_mode,
                attributes: attrs,
            })
            .collect();

        let raster = descriptor.raster;
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(descriptor.label.as_str()),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: raster.color_format,
                    blend: raster.blend.to_wgpu(),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: raster.primitive(),
            depth_stencil: raster.depth.map(|d| d.to_wgpu()),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Ok(WgpuPipeline { pipeline, layouts })
    }

    fn draw_frame(&mut self, plan: &FramePlan<'_, Self>) -> Result<FrameOutcome> {
        let canvas = self.canvas.as_ref().ok_or(SyncError::CanvasNotReady)?;
        let size = canvas.size();

        let (view, surface_texture) = match canvas {
            Canvas::Surface { surface, config } => match surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                    (view, Some(frame))
                }
                Err(err) => {
                    let action = surface::recover(surface, &self.device, config, err);
                    if action == SurfaceErrorAction::Fatal {
                        return Err(SyncError::Device("surface out of memory".into()));
                    }
                    log::debug!("frame skipped: {action:?}");
                    return Ok(FrameOutcome::Skipped(action));
                }
            },
            Canvas::Offscreen { texture, .. } => {
                (texture.create_view(&wgpu::TextureViewDescriptor::default()), None)
            }
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("summit frame encoder"),
            });
        self.encode_draws(&mut encoder, &view, plan, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        drop(view);
        if let Some(frame) = surface_texture {
            frame.present();
        }
        Ok(FrameOutcome::Presented)
    }
}
