use core::fmt;
use std::sync::Arc;

use crate::slots::BindingScope;

use super::graph::{GraphId, ShaderGraph, ValueType};
use super::raster::RasterState;

/// Cache key of a compiled pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PipelineKey {
    pub vertex: GraphId,
    pub fragment: GraphId,
    pub raster: RasterState,
}

/// A vertex/fragment graph pair plus raster state, as sent by the logic side.
///
/// Compiling happens on the render side; the key is computed once here so
/// lookups do not rehash the graphs.
#[derive(Debug, Clone)]
pub struct Material {
    vertex: Arc<ShaderGraph>,
    fragment: Arc<ShaderGraph>,
    raster: RasterState,
    key: PipelineKey,
}

impl Material {
    pub fn new(vertex: Arc<ShaderGraph>, fragment: Arc<ShaderGraph>, raster: RasterState) -> Self {
        let key = PipelineKey {
            vertex: vertex.id(),
            fragment: fragment.id(),
            raster,
        };
        Self {
            vertex,
            fragment,
            raster,
            key,
        }
    }

    #[inline]
    pub fn key(&self) -> PipelineKey {
        self.key
    }

    #[inline]
    pub fn vertex(&self) -> &ShaderGraph {
        &self.vertex
    }

    pub(crate) fn shared_vertex(&self) -> Arc<ShaderGraph> {
        Arc::clone(&self.vertex)
    }

    pub(crate) fn shared_fragment(&self) -> Arc<ShaderGraph> {
        Arc::clone(&self.fragment)
    }

    #[inline]
    pub fn fragment(&self) -> &ShaderGraph {
        &self.fragment
    }

    #[inline]
    pub fn raster(&self) -> RasterState {
        self.raster
    }
}

/// What a named binding holds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BindingKind {
    Uniform(ValueType),
    Texture,
    Sampler,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Uniform(ty) => write!(f, "uniform {}", ty.wgsl()),
            BindingKind::Texture => f.write_str("texture"),
            BindingKind::Sampler => f.write_str("sampler"),
        }
    }
}

/// One resolved entry of the binding manifest.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BindingEntry {
    pub scope: BindingScope,
    pub name: String,
    pub slot: u32,
    pub kind: BindingKind,
    pub visibility: wgpu::ShaderStages,
}

impl BindingEntry {
    pub fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        let ty = match self.kind {
            BindingKind::Uniform(ty) => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: core::num::NonZeroU64::new(ty.uniform_size()),
            },
            BindingKind::Texture => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            BindingKind::Sampler => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
        };
        wgpu::BindGroupLayoutEntry {
            binding: self.slot,
            visibility: self.visibility,
            ty,
            count: None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VertexAttributeEntry {
    pub name: String,
    pub format: wgpu::VertexFormat,
    pub offset: u64,
    pub location: u32,
}

/// Layout of one vertex buffer slot, in the pipeline's buffer order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VertexBufferManifest {
    pub step_mode: wgpu::VertexStepMode,
    pub array_stride: u64,
    pub attributes: Vec<VertexAttributeEntry>,
}

impl VertexBufferManifest {
    pub fn wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: a.format,
                offset: a.offset,
                shader_location: a.location,
            })
            .collect()
    }
}

/// A compiled pipeline: WGSL sources plus everything needed to bind resources to it.
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    /// Unique within the [`PipelineCache`](super::PipelineCache) that compiled it; 0 otherwise.
    pub id: u64,
    pub key: PipelineKey,
    pub label: String,
    pub vertex_source: String,
    pub fragment_source: String,
    /// Sorted by (group, slot).
    pub bindings: Vec<BindingEntry>,
    pub vertex_buffers: Vec<VertexBufferManifest>,
    pub raster: RasterState,
}

impl PipelineDescriptor {
    /// Entries of one bind group, in slot order.
    pub fn group(&self, scope: BindingScope) -> impl Iterator<Item = &BindingEntry> {
        self.bindings.iter().filter(move |b| b.scope == scope)
    }

    pub fn binding(&self, scope: BindingScope, name: &str) -> Option<&BindingEntry> {
        self.group(scope).find(|b| b.name == name)
    }

    pub fn uses_instancing(&self) -> bool {
        self.vertex_buffers
            .iter()
            .any(|b| b.step_mode == wgpu::VertexStepMode::Instance)
    }
}
