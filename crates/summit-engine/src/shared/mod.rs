//! Memory shared between the logic thread (writer) and the render thread (reader).
//!
//! Bulk per-frame data never travels through the message channel. It lives in
//! [`VersionedBuffer`] blocks that the render side polls by version.

mod identity;
mod texture;
mod versioned;

pub use identity::{IDENTITY_LEN, ResourceId};
pub use texture::{
    ImmutableTexture, MutableTexture, TEXTURE_REGION_LEN, TextureId, TextureRegion,
    bytes_per_texel, read_region,
};
pub use versioned::{HEADER_LEN, VERSION_OFFSET, VersionedBuffer, has_advanced};
