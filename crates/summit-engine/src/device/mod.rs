//! GPU backends.
//!
//! The render side talks to a [`GpuDevice`]. Two implementations ship:
//! - [`WgpuDevice`]: wgpu Instance/Adapter/Device/Queue plus a surface or
//!   offscreen canvas
//! - [`RecordingDevice`]: in-memory, used headless and in tests

mod backend;
mod error;
mod gpu;
mod init;
mod recording;
mod surface;

pub use backend::{
    BoundResource, BufferDesc, DrawCall, FramePlan, GpuDevice, ResourceRef, TargetPass,
    TextureDesc, TextureWrite,
};
pub use error::{FrameOutcome, SurfaceErrorAction};
pub use gpu::{WgpuCanvas, WgpuDevice, WgpuPipeline, WgpuTexture};
pub use init::GpuInit;
pub use recording::{DeviceCounters, Handle, RecordedDraw, RecordedFrame, RecordingDevice};
