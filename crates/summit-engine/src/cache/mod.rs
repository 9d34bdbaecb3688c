//! Render-side cache of physical GPU objects.

mod record;
mod resources;
mod sampler;

pub use record::{CacheStats, ResourceKey, ResourceKind, ResourceRecord, SyncReport};
pub use resources::ResourceCache;
pub use sampler::SamplerOptions;
