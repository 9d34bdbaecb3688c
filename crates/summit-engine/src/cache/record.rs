use core::fmt;

use crate::shared::{ResourceId, TextureId};

use super::sampler::SamplerOptions;

/// Key a physical GPU object is deduplicated by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// Identity of the [`VersionedBuffer`](crate::shared::VersionedBuffer).
    Buffer(ResourceId),
    Texture(TextureId),
    /// Identity of the texture's backing buffer.
    MutableTexture(ResourceId),
    Sampler(SamplerOptions),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Buffer(id) => write!(f, "buffer `{id}`"),
            ResourceKey::Texture(id) => write!(f, "texture `{id}`"),
            ResourceKey::MutableTexture(id) => write!(f, "mutable texture `{id}`"),
            ResourceKey::Sampler(options) => write!(f, "sampler {options:?}"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Buffer,
    ImmutableTexture,
    MutableTexture,
    Sampler,
}

/// Bookkeeping for one physical GPU object.
#[derive(Debug, Clone)]
pub struct ResourceRecord<H> {
    pub key: ResourceKey,
    pub kind: ResourceKind,
    pub reference_count: u32,
    /// Version of the source buffer the GPU copy reflects. Always 0 for
    /// immutable textures and samplers.
    pub last_synced_version: u32,
    pub handle: H,
}

impl<H> ResourceRecord<H> {
    pub(crate) fn new(key: ResourceKey, kind: ResourceKind, handle: H, version: u32) -> Self {
        Self {
            key,
            kind,
            reference_count: 1,
            last_synced_version: version,
            handle,
        }
    }
}

/// Lifetime counters of a [`ResourceCache`](super::ResourceCache).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub samplers_created: u64,
    /// Full-payload buffer writes, initial contents included.
    pub buffer_uploads: u64,
    /// Texture writes, initial contents included.
    pub texture_uploads: u64,
    pub bytes_uploaded: u64,
}

/// What one [`sync_all`](super::ResourceCache::sync_all) pass uploaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub buffers: u32,
    pub textures: u32,
    pub bytes: u64,
}
