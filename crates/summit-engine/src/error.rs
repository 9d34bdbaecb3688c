//! Error taxonomy for the synchronization layer.
//!
//! Every variant describes a programming error in call ordering or resource
//! sizing. Nothing here is retried; callers surface the error where the
//! offending call was made.

use thiserror::Error;

use crate::cache::ResourceKey;
use crate::slots::BindingScope;
use crate::server::{ObjectId, TargetId};
use crate::shared::ResourceId;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("slot namespace {scope:?} exhausted: `{name}` would need slot {requested} (max {max})")]
    SlotExhausted {
        scope: BindingScope,
        name: String,
        requested: u32,
        max: u32,
    },

    #[error("no cache record for {0}")]
    UnknownResource(ResourceKey),

    #[error("{owner} does not supply binding `{name}` required by its pipeline")]
    MissingBinding { owner: String, name: String },

    #[error("binding `{name}` declared twice with incompatible kinds ({first} vs {second})")]
    DuplicateBinding {
        name: String,
        first: String,
        second: String,
    },

    #[error("binding `{name}` expects {expected}, got {actual}")]
    BindingKindMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("write of {len} bytes at offset {offset} exceeds payload of {capacity} bytes in {id}")]
    OutOfBounds {
        id: ResourceId,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("dirty region of {id} outside texture bounds: {reason}")]
    InvalidRegion { id: ResourceId, reason: String },

    #[error("invalid shader graph: {0}")]
    InvalidGraph(String),

    #[error("object {0} is already registered")]
    DuplicateObject(ObjectId),

    #[error("object {0} is not registered")]
    UnknownObject(ObjectId),

    #[error("render target {0} already exists")]
    DuplicateTarget(TargetId),

    #[error("render target {0} does not exist")]
    UnknownTarget(TargetId),

    #[error("canvas has not been initialized")]
    CanvasNotReady,

    #[error("resource server channel is closed")]
    Disconnected,

    #[error("device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
