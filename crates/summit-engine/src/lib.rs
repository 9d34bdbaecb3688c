//! Summit engine: keeps GPU objects in step with memory the game logic writes.
//!
//! The logic thread edits [`shared::VersionedBuffer`]s and registers render
//! objects through a [`server::ServerHandle`]. The render thread owns a
//! [`server::ResourceServer`], which deduplicates GPU resources in a
//! [`cache::ResourceCache`], compiles shader graphs through a
//! [`pipeline::PipelineCache`] and uploads only what changed each frame.

pub mod cache;
pub mod device;
pub mod error;
pub mod logging;
pub mod paint;
pub mod pipeline;
pub mod server;
pub mod shared;
pub mod slots;

pub use error::{Result, SyncError};
