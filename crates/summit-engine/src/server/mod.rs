//! Render-side resource server and the control channel that feeds it.
//!
//! The logic thread owns a [`ServerHandle`] and sends registrations; the
//! render thread owns the [`ResourceServer`], drains its [`ServerInbox`]
//! once per frame and renders.

mod config;
mod ids;
mod message;
mod registration;
mod resource_server;

pub use config::ServerConfig;
pub use ids::{ObjectId, TargetId};
pub use message::{Message, PumpStatus, Reply, ServerHandle, ServerInbox, channel};
pub use registration::{
    Binding, IndexBinding, ObjectRegistration, RenderTargetDesc, TextureBinding, VIEWPORT_BINDING,
    ViewportUniform,
};
pub use resource_server::{FrameReport, ResourceServer};
