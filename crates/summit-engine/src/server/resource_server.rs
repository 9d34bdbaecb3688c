use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::cache::{CacheStats, ResourceCache, ResourceKey, SamplerOptions, SyncReport};
use crate::device::{
    BoundResource, DrawCall, FrameOutcome, FramePlan, GpuDevice, ResourceRef, TargetPass,
};
use crate::error::{Result, SyncError};
use crate::paint::Color;
use crate::pipeline::{BindingEntry, BindingKind, PipelineCache, PipelineDescriptor};
use crate::shared::{ResourceId, TextureId, VersionedBuffer};
use crate::slots::BindingScope;

use super::config::ServerConfig;
use super::ids::{ObjectId, TargetId};
use super::message::{Message, PumpStatus, Reply, ServerInbox};
use super::registration::{
    Binding, IndexBinding, ObjectRegistration, RenderTargetDesc, TextureBinding, VIEWPORT_BINDING,
};

/// One cache reference held on behalf of an object or target.
#[derive(Debug, Clone)]
enum Acquired {
    Buffer(ResourceId),
    Texture(TextureId),
    MutableTexture(ResourceId),
    Sampler(SamplerOptions),
}

struct LiveObject {
    registration: ObjectRegistration,
    descriptor: Arc<PipelineDescriptor>,
    acquired: Vec<Acquired>,
}

struct LiveTarget {
    id: TargetId,
    /// Viewport first, then the caller's bindings.
    bindings: Vec<(String, Binding)>,
    textures: Vec<(String, TextureBinding)>,
    /// Draw order.
    members: Vec<ObjectId>,
    acquired: Vec<Acquired>,
}

/// What one [`ResourceServer::render_frame`] did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// 1 for the first rendered frame.
    pub frame: u64,
    pub sync: SyncReport,
    pub draws: u32,
    /// Memberships naming objects that no longer exist.
    pub stale_members: u32,
    pub outcome: FrameOutcome,
}

/// Render-side owner of the device, the resource and pipeline caches, and
/// every registered object and target.
///
/// Mutated only by the render thread, through [`pump`](Self::pump) or the
/// direct methods. Each object and target records the cache references it
/// took, and removal releases exactly those.
pub struct ResourceServer<D: GpuDevice> {
    device: D,
    config: ServerConfig,
    cache: ResourceCache<D>,
    pipelines: PipelineCache,
    /// Keyed by [`PipelineDescriptor::id`].
    gpu_pipelines: FxHashMap<u64, D::Pipeline>,
    objects: FxHashMap<ObjectId, LiveObject>,
    targets: Vec<LiveTarget>,
    clear_color: Color,
    canvas_ready: bool,
    frame_index: u64,
}

impl<D: GpuDevice> ResourceServer<D> {
    pub fn new(device: D, config: ServerConfig) -> Self {
        Self {
            device,
            config,
            cache: ResourceCache::new(),
            pipelines: PipelineCache::new(),
            gpu_pipelines: FxHashMap::default(),
            objects: FxHashMap::default(),
            targets: Vec::new(),
            clear_color: config.clear_color,
            canvas_ready: false,
            frame_index: 0,
        }
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    pub fn cache(&self) -> &ResourceCache<D> {
        &self.cache
    }

    #[inline]
    pub fn stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    #[inline]
    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    #[inline]
    pub fn is_canvas_ready(&self) -> bool {
        self.canvas_ready
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn has_object(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Members of `target` in draw order, including stale ones.
    pub fn target_members(&self, id: &TargetId) -> Option<&[ObjectId]> {
        self.targets
            .iter()
            .find(|t| &t.id == id)
            .map(|t| t.members.as_slice())
    }

    /// Frames rendered so far.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    // ── canvas ───────────────────────────────────────────────────────────

    pub fn init_canvas(&mut self, canvas: D::Canvas, background: Color) -> Result<()> {
        self.device.init_canvas(canvas)?;
        self.clear_color = background;
        self.canvas_ready = true;
        log::info!("canvas ready: {:?} {:?}", self.device.canvas_size(), self.device.canvas_format());
        Ok(())
    }

    pub fn resize_canvas(&mut self, width: u32, height: u32) {
        if !self.canvas_ready {
            log::debug!("resize to {width}x{height} before canvas init ignored");
            return;
        }
        self.device.resize_canvas(width, height);
    }

    // ── objects ──────────────────────────────────────────────────────────

    /// Compiles (or reuses) the object's pipeline, checks that every
    /// object-scope binding it declares is supplied, then takes one cache
    /// reference per supplied resource.
    ///
    /// On failure no references are left behind.
    pub fn create_object(&mut self, registration: ObjectRegistration) -> Result<()> {
        let id = registration.id.clone();
        if self.objects.contains_key(&id) {
            return Err(SyncError::DuplicateObject(id));
        }

        let descriptor = self.pipelines.get_material(&registration.material)?;
        let owner = format!("object {id}");
        check_bindings(
            &owner,
            descriptor.group(BindingScope::Object),
            &registration.bindings,
            &registration.textures,
        )?;
        check_vertex_input(&owner, &descriptor, &registration)?;
        self.ensure_gpu_pipeline(&descriptor)?;

        let mut acquired = Vec::new();
        let taken = self
            .acquire_bindings(&registration.bindings, &registration.textures, &mut acquired)
            .and_then(|()| self.acquire_geometry(&registration, &mut acquired));
        if let Err(err) = taken {
            self.release_all(&acquired);
            return Err(err);
        }

        log::debug!(
            "registered object `{id}` ({}, {} cache references)",
            descriptor.label,
            acquired.len()
        );
        self.objects.insert(
            id,
            LiveObject {
                registration,
                descriptor,
                acquired,
            },
        );
        Ok(())
    }

    /// Releases the object's cache references. Target memberships naming it
    /// are left in place and skipped at draw time.
    pub fn remove_object(&mut self, id: &ObjectId) -> Result<()> {
        let object = self
            .objects
            .remove(id)
            .ok_or_else(|| SyncError::UnknownObject(id.clone()))?;
        self.release_all(&object.acquired);
        log::debug!("removed object `{id}`");
        Ok(())
    }

    // ── targets ──────────────────────────────────────────────────────────

    /// Registers a target. Its viewport buffer is bound under
    /// [`VIEWPORT_BINDING`] ahead of the caller's bindings.
    pub fn create_render_target(&mut self, desc: RenderTargetDesc) -> Result<()> {
        if self.targets.iter().any(|t| t.id == desc.id) {
            return Err(SyncError::DuplicateTarget(desc.id));
        }

        let mut bindings = Vec::with_capacity(desc.bindings.len() + 1);
        bindings.push((VIEWPORT_BINDING.to_owned(), Binding::Uniform(desc.viewport)));
        bindings.extend(desc.bindings);

        let mut acquired = Vec::new();
        if let Err(err) = self.acquire_bindings(&bindings, &desc.textures, &mut acquired) {
            self.release_all(&acquired);
            return Err(err);
        }

        log::debug!("created render target `{}`", desc.id);
        self.targets.push(LiveTarget {
            id: desc.id,
            bindings,
            textures: desc.textures,
            members: Vec::new(),
            acquired,
        });
        Ok(())
    }

    pub fn remove_render_target(&mut self, id: &TargetId) -> Result<()> {
        let index = self
            .targets
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| SyncError::UnknownTarget(id.clone()))?;
        let target = self.targets.remove(index);
        self.release_all(&target.acquired);
        log::debug!("removed render target `{id}` ({} members)", target.members.len());
        Ok(())
    }

    /// Appends `object` to the target's draw list after checking that the
    /// target supplies every target-scope binding the object's pipeline
    /// declares. Adding a member twice is a no-op.
    pub fn add_object_to_target(&mut self, target: &TargetId, object: &ObjectId) -> Result<()> {
        let live = self
            .objects
            .get(object)
            .ok_or_else(|| SyncError::UnknownObject(object.clone()))?;
        let entry = self
            .targets
            .iter_mut()
            .find(|t| &t.id == target)
            .ok_or_else(|| SyncError::UnknownTarget(target.clone()))?;

        check_bindings(
            &format!("target {target}"),
            live.descriptor.group(BindingScope::Target),
            &entry.bindings,
            &entry.textures,
        )?;
        if !entry.members.contains(object) {
            entry.members.push(object.clone());
        }
        Ok(())
    }

    /// Returns whether `object` was a member.
    pub fn remove_object_from_target(&mut self, target: &TargetId, object: &ObjectId) -> Result<bool> {
        let entry = self
            .targets
            .iter_mut()
            .find(|t| &t.id == target)
            .ok_or_else(|| SyncError::UnknownTarget(target.clone()))?;
        let before = entry.members.len();
        entry.members.retain(|m| m != object);
        Ok(entry.members.len() != before)
    }

    // ── messages ─────────────────────────────────────────────────────────

    /// Applies every queued message in order.
    ///
    /// Stops at the first failing message and returns its error; later
    /// messages stay queued for the next call.
    pub fn pump(&mut self, inbox: &ServerInbox<D::Canvas>) -> Result<PumpStatus> {
        let mut status = PumpStatus::default();
        loop {
            match inbox.try_next() {
                Ok(Some(message)) => {
                    self.apply(message)?;
                    status.applied += 1;
                }
                Ok(None) => break,
                Err(SyncError::Disconnected) => {
                    status.disconnected = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(status)
    }

    pub fn apply(&mut self, message: Message<D::Canvas>) -> Result<()> {
        match message {
            Message::InitCanvas {
                canvas,
                background,
                reply,
            } => {
                let result = self.init_canvas(canvas, background);
                let answer = match &result {
                    Ok(()) => Reply::Ready,
                    Err(err) => Reply::Failed(err.to_string()),
                };
                if reply.send(answer).is_err() {
                    log::debug!("canvas reply dropped: nobody is waiting");
                }
                result
            }
            Message::ResizeCanvas { width, height } => {
                self.resize_canvas(width, height);
                Ok(())
            }
            Message::CreateObject(registration) => self.create_object(*registration),
            Message::RemoveObject(id) => self.remove_object(&id),
            Message::CreateRenderTarget(desc) => self.create_render_target(desc),
            Message::RemoveRenderTarget(id) => self.remove_render_target(&id),
            Message::AddObjectToTarget { target, object } => {
                self.add_object_to_target(&target, &object)
            }
            Message::RemoveObjectFromTarget { target, object } => {
                self.remove_object_from_target(&target, &object).map(|_| ())
            }
        }
    }

    // ── frame ────────────────────────────────────────────────────────────

    /// Syncs every dirty resource once, then draws each target's live
    /// members in membership order.
    pub fn render_frame(&mut self) -> Result<FrameReport> {
        if !self.canvas_ready {
            return Err(SyncError::CanvasNotReady);
        }

        let sync = self.cache.sync_all(&mut self.device)?;

        let mut stale_members = 0;
        let mut draws = 0;
        let mut passes = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let mut pass = TargetPass {
                label: target.id.as_str(),
                draws: Vec::with_capacity(target.members.len()),
            };
            for member in &target.members {
                let Some(object) = self.objects.get(member) else {
                    stale_members += 1;
                    continue;
                };
                match build_draw(&self.cache, &self.gpu_pipelines, target, object) {
                    Ok(draw) => pass.draws.push(draw),
                    Err(err) => log::warn!("skipping `{member}` in target `{}`: {err}", target.id),
                }
            }
            draws += pass.draws.len() as u32;
            passes.push(pass);
        }

        let plan = FramePlan {
            clear: self.clear_color,
            passes,
        };
        let outcome = self.device.draw_frame(&plan)?;
        self.frame_index += 1;

        if stale_members > 0 {
            log::trace!("frame {}: skipped {stale_members} stale members", self.frame_index);
        }
        Ok(FrameReport {
            frame: self.frame_index,
            sync,
            draws,
            stale_members,
            outcome,
        })
    }

    /// Destroys every cached GPU object and hands back the device.
    pub fn into_device(mut self) -> D {
        self.objects.clear();
        self.targets.clear();
        self.cache.clear(&mut self.device);
        self.device
    }

    // ── internals ────────────────────────────────────────────────────────

    fn ensure_gpu_pipeline(&mut self, descriptor: &PipelineDescriptor) -> Result<()> {
        if !self.gpu_pipelines.contains_key(&descriptor.id) {
            let pipeline = self.device.create_pipeline(descriptor)?;
            self.gpu_pipelines.insert(descriptor.id, pipeline);
        }
        Ok(())
    }

    fn acquire_bindings(
        &mut self,
        bindings: &[(String, Binding)],
        textures: &[(String, TextureBinding)],
        acquired: &mut Vec<Acquired>,
    ) -> Result<()> {
        for (_, binding) in bindings {
            match binding {
                Binding::Uniform(buffer) => {
                    self.acquire_buffer(buffer, self.config.uniform_usage, acquired)?;
                }
                Binding::Sampler(options) => {
                    self.cache.add_sampler(&mut self.device, *options)?;
                    acquired.push(Acquired::Sampler(*options));
                }
            }
        }
        for (_, texture) in textures {
            match texture {
                TextureBinding::Immutable(texture) => {
                    self.cache.add_immutable_texture(&mut self.device, texture)?;
                    acquired.push(Acquired::Texture(texture.id.clone()));
                }
                TextureBinding::Mutable(texture) => {
                    self.cache.add_mutable_texture(&mut self.device, texture)?;
                    acquired.push(Acquired::MutableTexture(texture.identity()));
                }
            }
        }
        Ok(())
    }

    fn acquire_geometry(&mut self, registration: &ObjectRegistration, acquired: &mut Vec<Acquired>) -> Result<()> {
        for buffer in &registration.vertex_buffers {
            self.acquire_buffer(buffer, self.config.vertex_usage, acquired)?;
        }
        if let Some(index) = &registration.index {
            self.acquire_buffer(&index.buffer, self.config.index_usage, acquired)?;
        }
        Ok(())
    }

    fn acquire_buffer(
        &mut self,
        buffer: &VersionedBuffer,
        usage: wgpu::BufferUsages,
        acquired: &mut Vec<Acquired>,
    ) -> Result<()> {
        self.cache.add_buffer(&mut self.device, buffer, usage)?;
        acquired.push(Acquired::Buffer(buffer.identity()));
        Ok(())
    }

    fn release_all(&mut self, acquired: &[Acquired]) {
        for reference in acquired.iter().rev() {
            let released = match reference {
                Acquired::Buffer(id) => self.cache.remove_buffer(&mut self.device, *id),
                Acquired::Texture(id) => self.cache.remove_immutable_texture(&mut self.device, id),
                Acquired::MutableTexture(id) => self.cache.remove_mutable_texture(&mut self.device, *id),
                Acquired::Sampler(options) => self.cache.release_sampler(*options),
            };
            if let Err(err) = released {
                log::error!("cache reference lost: {err}");
            }
        }
    }
}

/// A resource supplied under some binding name.
#[derive(Clone, Copy)]
enum Supplied<'a> {
    Binding(&'a Binding),
    Texture(&'a TextureBinding),
}

impl Supplied<'_> {
    fn describe(self) -> &'static str {
        match self {
            Supplied::Binding(Binding::Uniform(_)) => "uniform buffer",
            Supplied::Binding(Binding::Sampler(_)) => "sampler",
            Supplied::Texture(_) => "texture",
        }
    }
}

fn lookup<'a>(
    name: &str,
    bindings: &'a [(String, Binding)],
    textures: &'a [(String, TextureBinding)],
) -> Option<Supplied<'a>> {
    bindings
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, b)| Supplied::Binding(b))
        .or_else(|| {
            textures
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| Supplied::Texture(t))
        })
}

fn check_bindings<'e>(
    owner: &str,
    entries: impl Iterator<Item = &'e BindingEntry>,
    bindings: &[(String, Binding)],
    textures: &[(String, TextureBinding)],
) -> Result<()> {
    for entry in entries {
        let supplied = lookup(&entry.name, bindings, textures).ok_or_else(|| SyncError::MissingBinding {
            owner: owner.to_owned(),
            name: entry.name.clone(),
        })?;

        let actual = match (entry.kind, supplied) {
            (BindingKind::Uniform(ty), Supplied::Binding(Binding::Uniform(buffer))) => {
                if buffer.payload_len() as u64 >= ty.uniform_size() {
                    continue;
                }
                format!("{}-byte buffer", buffer.payload_len())
            }
            (BindingKind::Texture, Supplied::Texture(_))
            | (BindingKind::Sampler, Supplied::Binding(Binding::Sampler(_))) => continue,
            (_, other) => other.describe().to_owned(),
        };
        return Err(SyncError::BindingKindMismatch {
            name: entry.name.clone(),
            expected: entry.kind.to_string(),
            actual,
        });
    }
    Ok(())
}

fn check_vertex_input(owner: &str, descriptor: &PipelineDescriptor, registration: &ObjectRegistration) -> Result<()> {
    let expected = descriptor.vertex_buffers.len();
    let supplied = registration.vertex_buffers.len();
    if supplied != expected {
        return Err(SyncError::InvalidLayout(format!(
            "{owner} supplies {supplied} vertex buffers, pipeline `{}` reads {expected}",
            descriptor.label
        )));
    }
    if expected == 0 && registration.index.is_none() && registration.element_count.is_none() {
        return Err(SyncError::InvalidLayout(format!(
            "{owner} has no vertex buffers, no index buffer and no element count"
        )));
    }
    Ok(())
}

fn buffer_handle<'a, D: GpuDevice>(cache: &'a ResourceCache<D>, buffer: &VersionedBuffer) -> Result<&'a D::Buffer> {
    let id = buffer.identity();
    cache
        .buffer(id)
        .map(|record| &record.handle)
        .ok_or(SyncError::UnknownResource(ResourceKey::Buffer(id)))
}

fn bind_group<'a, 'e, D: GpuDevice>(
    cache: &'a ResourceCache<D>,
    entries: impl Iterator<Item = &'e BindingEntry>,
    bindings: &[(String, Binding)],
    textures: &[(String, TextureBinding)],
) -> Result<Vec<BoundResource<'a, D>>> {
    entries
        .map(|entry| {
            let supplied = lookup(&entry.name, bindings, textures).ok_or_else(|| SyncError::MissingBinding {
                owner: "draw".to_owned(),
                name: entry.name.clone(),
            })?;
            let resource = match supplied {
                Supplied::Binding(Binding::Uniform(buffer)) => ResourceRef::Buffer(buffer_handle(cache, buffer)?),
                Supplied::Binding(Binding::Sampler(options)) => ResourceRef::Sampler(
                    &cache
                        .sampler(*options)
                        .ok_or(SyncError::UnknownResource(ResourceKey::Sampler(*options)))?
                        .handle,
                ),
                Supplied::Texture(TextureBinding::Immutable(texture)) => ResourceRef::Texture(
                    &cache
                        .immutable_texture(&texture.id)
                        .ok_or_else(|| SyncError::UnknownResource(ResourceKey::Texture(texture.id.clone())))?
                        .handle,
                ),
                Supplied::Texture(TextureBinding::Mutable(texture)) => ResourceRef::Texture(
                    &cache
                        .mutable_texture(texture.identity())
                        .ok_or(SyncError::UnknownResource(ResourceKey::MutableTexture(texture.identity())))?
                        .handle,
                ),
            };
            Ok(BoundResource {
                slot: entry.slot,
                resource,
            })
        })
        .collect()
}

/// Element count (indices when indexed, vertices otherwise) and instance count.
fn draw_counts(registration: &ObjectRegistration, descriptor: &PipelineDescriptor) -> (u32, u32) {
    let per_step = |mode: wgpu::VertexStepMode| {
        descriptor
            .vertex_buffers
            .iter()
            .zip(&registration.vertex_buffers)
            .find(|(layout, _)| layout.step_mode == mode && layout.array_stride > 0)
            .map(|(layout, buffer)| (buffer.payload_len() as u64 / layout.array_stride) as u32)
    };

    let elements = registration
        .element_count
        .or_else(|| registration.index.as_ref().map(IndexBinding::index_count))
        .or_else(|| per_step(wgpu::VertexStepMode::Vertex))
        .unwrap_or(0);
    let instances = per_step(wgpu::VertexStepMode::Instance).unwrap_or(1);
    (elements, instances)
}

fn build_draw<'a, D: GpuDevice>(
    cache: &'a ResourceCache<D>,
    gpu_pipelines: &'a FxHashMap<u64, D::Pipeline>,
    target: &'a LiveTarget,
    object: &'a LiveObject,
) -> Result<DrawCall<'a, D>> {
    let descriptor = &*object.descriptor;
    let registration = &object.registration;
    let pipeline = gpu_pipelines
        .get(&descriptor.id)
        .ok_or_else(|| SyncError::Device(format!("pipeline `{}` was never created", descriptor.label)))?;

    let target_bindings = bind_group(
        cache,
        descriptor.group(BindingScope::Target),
        &target.bindings,
        &target.textures,
    )?;
    let object_bindings = bind_group(
        cache,
        descriptor.group(BindingScope::Object),
        &registration.bindings,
        &registration.textures,
    )?;
    let vertex_buffers = registration
        .vertex_buffers
        .iter()
        .map(|buffer| buffer_handle(cache, buffer))
        .collect::<Result<Vec<_>>>()?;
    let index = match &registration.index {
        Some(index) => Some((buffer_handle(cache, &index.buffer)?, index.format)),
        None => None,
    };
    let (element_count, instance_count) = draw_counts(registration, descriptor);

    Ok(DrawCall {
        label: registration.id.as_str(),
        pipeline,
        descriptor,
        target_bindings,
        object_bindings,
        vertex_buffers,
        index,
        element_count,
        instance_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Handle, RecordingDevice};
    use crate::pipeline::{Expr, Material, RasterState, ShaderGraph, ValueType};
    use crate::server::{ViewportUniform, channel};
    use crate::shared::ImmutableTexture;
    use wgpu::VertexFormat;

    fn sprite_material() -> Material {
        let viewport = Expr::uniform("viewport", ValueType::Vec4, BindingScope::Target);
        let pos = Expr::attribute("pos", 0, VertexFormat::Float32x2)
            .sub(viewport.clone().swizzle("zw"))
            .div(viewport.swizzle("xy"));
        let vertex = ShaderGraph::vertex(Expr::construct(ValueType::Vec4, vec![pos, Expr::constant(&[0.0, 1.0])]))
            .varying("uv", Expr::attribute("uv", 0, VertexFormat::Float32x2));
        let fragment = ShaderGraph::fragment(
            Expr::sample("atlas", "atlas_sampler", BindingScope::Object, Expr::varying("uv"))
                .mul(Expr::uniform("tint", ValueType::Vec4, BindingScope::Object)),
        );
        Material::new(Arc::new(vertex), Arc::new(fragment), RasterState::default())
    }

    fn atlas() -> ImmutableTexture {
        ImmutableTexture::new(TextureId::new("atlas"), 2, 2, wgpu::TextureFormat::Rgba8Unorm, vec![255u8; 16]).unwrap()
    }

    /// Quad: 4 vertices of (pos, uv) and 6 u16 indices.
    fn sprite(id: &str, tint: &VersionedBuffer) -> ObjectRegistration {
        ObjectRegistration::new(id, sprite_material())
            .uniform("tint", tint.clone())
            .sampler("atlas_sampler", SamplerOptions::nearest())
            .texture("atlas", TextureBinding::Immutable(atlas()))
            .vertex_buffer(VersionedBuffer::create(4 * 16))
            .index_buffer(VersionedBuffer::create(6 * 2), wgpu::IndexFormat::Uint16)
    }

    fn viewport() -> VersionedBuffer {
        let buffer = VersionedBuffer::create(std::mem::size_of::<ViewportUniform>());
        buffer
            .write_pod(
                &ViewportUniform {
                    size: [320.0, 180.0],
                    camera: [0.0, 0.0],
                },
                0,
            )
            .unwrap();
        buffer
    }

    fn ready_server() -> ResourceServer<RecordingDevice> {
        let mut server = ResourceServer::new(RecordingDevice::new(), ServerConfig::default());
        server.init_canvas((320, 180), Color::transparent()).unwrap();
        server
    }

    #[test]
    fn registered_member_is_drawn() {
        let mut server = ready_server();
        server.create_render_target(RenderTargetDesc::new("world", viewport())).unwrap();
        server.create_object(sprite("player", &VersionedBuffer::create(16))).unwrap();
        server.add_object_to_target(&"world".into(), &"player".into()).unwrap();

        let report = server.render_frame().unwrap();
        assert_eq!((report.frame, report.draws, report.stale_members), (1, 1, 0));
        assert_eq!(report.outcome, FrameOutcome::Presented);

        let frame = server.device().last_frame().unwrap();
        let draw = &frame.draws[0];
        assert_eq!(draw.pass, "world");
        assert!(draw.indexed);
        assert_eq!((draw.element_count, draw.instance_count), (6, 1));
        assert_eq!(draw.target_slots, [0]);
        assert_eq!(draw.object_slots, [0, 1, 2]);
    }

    #[test]
    fn render_requires_canvas() {
        let mut server = ResourceServer::new(RecordingDevice::new(), ServerConfig::default());
        assert!(matches!(server.render_frame(), Err(SyncError::CanvasNotReady)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut server = ready_server();
        let tint = VersionedBuffer::create(16);
        server.create_object(sprite("a", &tint)).unwrap();
        assert!(matches!(
            server.create_object(sprite("a", &tint)),
            Err(SyncError::DuplicateObject(id)) if id.as_str() == "a"
        ));

        server.create_render_target(RenderTargetDesc::new("t", viewport())).unwrap();
        assert!(matches!(
            server.create_render_target(RenderTargetDesc::new("t", viewport())),
            Err(SyncError::DuplicateTarget(_))
        ));
    }

    #[test]
    fn missing_binding_takes_no_references() {
        let mut server = ready_server();
        let mut registration = sprite("a", &VersionedBuffer::create(16));
        registration.bindings.retain(|(name, _)| name != "tint");

        let err = server.create_object(registration).unwrap_err();
        assert!(matches!(err, SyncError::MissingBinding { ref name, .. } if name == "tint"));
        assert!(server.cache().is_empty());
        assert_eq!(server.object_count(), 0);
    }

    #[test]
    fn wrong_kind_or_undersized_uniform_is_a_mismatch() {
        let mut server = ready_server();

        let undersized = sprite("a", &VersionedBuffer::create(4));
        assert!(matches!(
            server.create_object(undersized),
            Err(SyncError::BindingKindMismatch { ref actual, .. }) if actual == "4-byte buffer"
        ));

        let mut swapped = sprite("b", &VersionedBuffer::create(16));
        swapped.bindings[0] = ("tint".into(), Binding::Sampler(SamplerOptions::linear()));
        assert!(matches!(
            server.create_object(swapped),
            Err(SyncError::BindingKindMismatch { ref actual, .. }) if actual == "sampler"
        ));
        assert!(server.cache().is_empty());
    }

    #[test]
    fn target_must_supply_target_scope_bindings() {
        let mut server = ready_server();
        let vertex = ShaderGraph::vertex(Expr::uniform("camera", ValueType::Vec4, BindingScope::Target));
        let fragment = ShaderGraph::fragment(Expr::constant(&[1.0, 1.0, 1.0, 1.0]));
        let material = Material::new(Arc::new(vertex), Arc::new(fragment), RasterState::default());
        server
            .create_object(ObjectRegistration::new("fx", material).element_count(3))
            .unwrap();
        server.create_render_target(RenderTargetDesc::new("bare", viewport())).unwrap();

        let err = server.add_object_to_target(&"bare".into(), &"fx".into()).unwrap_err();
        assert!(matches!(err, SyncError::MissingBinding { ref owner, .. } if owner == "target bare"));

        assert!(matches!(
            server.add_object_to_target(&"nope".into(), &"fx".into()),
            Err(SyncError::UnknownTarget(_))
        ));
        assert!(matches!(
            server.add_object_to_target(&"bare".into(), &"ghost".into()),
            Err(SyncError::UnknownObject(_))
        ));
    }

    #[test]
    fn removed_objects_become_stale_members() {
        let mut server = ready_server();
        server.create_render_target(RenderTargetDesc::new("world", viewport())).unwrap();
        server.create_object(sprite("coin", &VersionedBuffer::create(16))).unwrap();
        server.add_object_to_target(&"world".into(), &"coin".into()).unwrap();
        server.remove_object(&"coin".into()).unwrap();

        let report = server.render_frame().unwrap();
        assert_eq!((report.draws, report.stale_members), (0, 1));
        assert_eq!(server.target_members(&"world".into()).unwrap().len(), 1);
        assert!(server.remove_object_from_target(&"world".into(), &"coin".into()).unwrap());
        assert_eq!(server.render_frame().unwrap().stale_members, 0);
    }

    #[test]
    fn shared_resources_live_until_last_owner_goes() {
        let mut server = ready_server();
        let tint = VersionedBuffer::create(16);
        server.create_object(sprite("a", &tint)).unwrap();
        server.create_object(sprite("b", &tint)).unwrap();

        assert_eq!(server.cache().buffer(tint.identity()).unwrap().reference_count, 2);
        assert_eq!(server.device().counters().pipelines_created, 1);
        assert_eq!(server.device().counters().textures_created, 1);

        server.remove_object(&"a".into()).unwrap();
        assert_eq!(server.cache().buffer(tint.identity()).unwrap().reference_count, 1);
        server.remove_object(&"b".into()).unwrap();
        assert!(server.cache().buffer(tint.identity()).is_none());
        assert!(server.cache().immutable_texture(&TextureId::new("atlas")).is_none());
        assert_eq!(server.device().live_buffers(), 0);
        assert!(matches!(server.remove_object(&"b".into()), Err(SyncError::UnknownObject(_))));
    }

    #[test]
    fn failed_widening_rolls_back_the_whole_object() {
        let mut server = ready_server();
        let shared = VersionedBuffer::create(16);
        server.create_object(sprite("a", &shared)).unwrap();

        // `b` reads `shared` as both its tint and its vertex buffer.
        let mut b = sprite("b", &shared);
        b.vertex_buffers[0] = shared.clone();
        server.device_mut().refuse_buffers(1);
        assert!(matches!(server.create_object(b), Err(SyncError::Device(_))));
        assert_eq!(server.cache().buffer(shared.identity()).unwrap().reference_count, 1);

        server.remove_object(&"a".into()).unwrap();
        assert!(server.cache().buffer(shared.identity()).is_none());
        assert_eq!(server.device().live_buffers(), 0);
    }

    #[test]
    fn instance_buffer_sets_instance_count() {
        let mut server = ready_server();
        let offset = Expr::instance_attribute("offset", 1, VertexFormat::Float32x4);
        let vertex = ShaderGraph::vertex(
            Expr::construct(ValueType::Vec4, vec![Expr::attribute("pos", 0, VertexFormat::Float32x2), Expr::constant(&[0.0, 1.0])])
                .add(offset),
        );
        let fragment = ShaderGraph::fragment(Expr::constant(&[1.0, 0.0, 0.0, 1.0]));
        let material = Material::new(Arc::new(vertex), Arc::new(fragment), RasterState::default());

        server.create_render_target(RenderTargetDesc::new("world", viewport())).unwrap();
        server
            .create_object(
                ObjectRegistration::new("particles", material)
                    .vertex_buffer(VersionedBuffer::create(3 * 8))
                    .vertex_buffer(VersionedBuffer::create(5 * 16)),
            )
            .unwrap();
        server.add_object_to_target(&"world".into(), &"particles".into()).unwrap();
        server.render_frame().unwrap();

        let draw = &server.device().last_frame().unwrap().draws[0];
        assert!(!draw.indexed);
        assert_eq!((draw.element_count, draw.instance_count), (3, 5));
        assert_eq!(draw.target_slots, Vec::<u32>::new());
        assert_eq!(draw.vertex_buffers.len(), 2);
    }

    #[test]
    fn wrong_vertex_buffer_count_is_rejected() {
        let mut server = ready_server();
        let mut registration = sprite("a", &VersionedBuffer::create(16));
        registration.vertex_buffers.clear();
        assert!(matches!(server.create_object(registration), Err(SyncError::InvalidLayout(_))));
        assert!(server.cache().is_empty());
    }

    #[test]
    fn pump_applies_messages_in_order() {
        let (handle, inbox) = channel();
        let mut server = ResourceServer::new(RecordingDevice::new(), ServerConfig::default());
        let background = Color::from_premul(0.1, 0.2, 0.3, 1.0);

        let ready = handle.init_canvas((64, 64), background).unwrap();
        handle.create_render_target(RenderTargetDesc::new("world", viewport())).unwrap();
        handle.create_object(sprite("hero", &VersionedBuffer::create(16))).unwrap();
        handle.add_object_to_target("world", "hero").unwrap();
        handle.resize_canvas(128, 96).unwrap();

        let status = server.pump(&inbox).unwrap();
        assert_eq!(status, PumpStatus { applied: 5, disconnected: false });
        assert_eq!(ready.recv().unwrap(), Reply::Ready);
        assert_eq!(server.device().canvas_size(), Some((128, 96)));

        server.render_frame().unwrap();
        let frame = server.device().last_frame().unwrap();
        assert_eq!(frame.clear, background);
        assert_eq!(frame.draws.len(), 1);

        drop(handle);
        assert!(server.pump(&inbox).unwrap().disconnected);
    }

    #[test]
    fn pump_stops_at_the_first_failure() {
        let (handle, inbox) = channel();
        let mut server = ready_server();
        handle.remove_object("ghost").unwrap();
        handle.create_render_target(RenderTargetDesc::new("world", viewport())).unwrap();

        assert!(matches!(server.pump(&inbox), Err(SyncError::UnknownObject(_))));
        assert_eq!(server.pump(&inbox).unwrap().applied, 1);
        assert!(server.target_members(&"world".into()).is_some());
    }

    #[test]
    fn dirty_uniform_is_uploaded_once_per_frame() {
        let mut server = ready_server();
        let tint = VersionedBuffer::create(16);
        server.create_object(sprite("a", &tint)).unwrap();

        assert_eq!(server.render_frame().unwrap().sync.buffers, 0);
        tint.write(&[1, 2, 3, 4], 0).unwrap();
        tint.write(&[5, 6, 7, 8], 4).unwrap();
        assert_eq!(server.render_frame().unwrap().sync.buffers, 1);
        assert_eq!(server.render_frame().unwrap().sync.buffers, 0);

        let handle: Handle = server.cache().buffer(tint.identity()).unwrap().handle;
        assert_eq!(&server.device().buffer_contents(handle).unwrap()[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn into_device_destroys_everything() {
        let mut server = ready_server();
        server.create_render_target(RenderTargetDesc::new("world", viewport())).unwrap();
        server.create_object(sprite("a", &VersionedBuffer::create(16))).unwrap();
        let device = server.into_device();
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_textures(), 0);
    }
}
