use bytemuck::{Pod, Zeroable};

use crate::cache::SamplerOptions;
use crate::pipeline::Material;
use crate::shared::{ImmutableTexture, MutableTexture, VersionedBuffer};

use super::ids::{ObjectId, TargetId};

/// Target-scope binding name the viewport buffer is bound under.
pub const VIEWPORT_BINDING: &str = "viewport";

/// Contents of a render target's viewport buffer, read as `vec4<f32>`:
/// `xy` = size in pixels, `zw` = camera offset.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct ViewportUniform {
    pub size: [f32; 2],
    pub camera: [f32; 2],
}

/// Non-texture resource supplied under a binding name.
#[derive(Debug, Clone)]
pub enum Binding {
    Uniform(VersionedBuffer),
    Sampler(SamplerOptions),
}

#[derive(Debug, Clone)]
pub enum TextureBinding {
    Immutable(ImmutableTexture),
    Mutable(MutableTexture),
}

#[derive(Debug, Clone)]
pub struct IndexBinding {
    pub buffer: VersionedBuffer,
    pub format: wgpu::IndexFormat,
}

impl IndexBinding {
    /// Number of whole indices in the payload.
    pub fn index_count(&self) -> u32 {
        let width = match self.format {
            wgpu::IndexFormat::Uint16 => 2,
            wgpu::IndexFormat::Uint32 => 4,
        };
        (self.buffer.payload_len() / width) as u32
    }
}

/// Everything the render side needs to draw one object.
///
/// Built on the logic side and moved through the channel. Vertex buffers
/// are given in the order of the material's vertex-buffer layout.
#[derive(Debug, Clone)]
pub struct ObjectRegistration {
    pub id: ObjectId,
    pub material: Material,
    pub bindings: Vec<(String, Binding)>,
    pub textures: Vec<(String, TextureBinding)>,
    pub vertex_buffers: Vec<VersionedBuffer>,
    pub index: Option<IndexBinding>,
    /// Overrides the vertex (or index) count derived from buffer sizes.
    pub element_count: Option<u32>,
}

impl ObjectRegistration {
    pub fn new(id: impl Into<ObjectId>, material: Material) -> Self {
        Self {
            id: id.into(),
            material,
            bindings: Vec::new(),
            textures: Vec::new(),
            vertex_buffers: Vec::new(),
            index: None,
            element_count: None,
        }
    }

    pub fn uniform(mut self, name: &str, buffer: VersionedBuffer) -> Self {
        self.bindings.push((name.to_owned(), Binding::Uniform(buffer)));
        self
    }

    pub fn sampler(mut self, name: &str, options: SamplerOptions) -> Self {
        self.bindings.push((name.to_owned(), Binding::Sampler(options)));
        self
    }

    pub fn texture(mut self, name: &str, texture: TextureBinding) -> Self {
        self.textures.push((name.to_owned(), texture));
        self
    }

    pub fn vertex_buffer(mut self, buffer: VersionedBuffer) -> Self {
        self.vertex_buffers.push(buffer);
        self
    }

    pub fn index_buffer(mut self, buffer: VersionedBuffer, format: wgpu::IndexFormat) -> Self {
        self.index = Some(IndexBinding { buffer, format });
        self
    }

    pub fn element_count(mut self, count: u32) -> Self {
        self.element_count = Some(count);
        self
    }
}

/// A render target: viewport buffer plus target-scope bindings.
#[derive(Debug, Clone)]
pub struct RenderTargetDesc {
    pub id: TargetId,
    /// Bound as [`VIEWPORT_BINDING`]; holds a [`ViewportUniform`].
    pub viewport: VersionedBuffer,
    pub bindings: Vec<(String, Binding)>,
    pub textures: Vec<(String, TextureBinding)>,
}

impl RenderTargetDesc {
    pub fn new(id: impl Into<TargetId>, viewport: VersionedBuffer) -> Self {
        Self {
            id: id.into(),
            viewport,
            bindings: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn uniform(mut self, name: &str, buffer: VersionedBuffer) -> Self {
        self.bindings.push((name.to_owned(), Binding::Uniform(buffer)));
        self
    }

    pub fn sampler(mut self, name: &str, options: SamplerOptions) -> Self {
        self.bindings.push((name.to_owned(), Binding::Sampler(options)));
        self
    }

    pub fn texture(mut self, name: &str, texture: TextureBinding) -> Self {
        self.textures.push((name.to_owned(), texture));
        self
    }
}
