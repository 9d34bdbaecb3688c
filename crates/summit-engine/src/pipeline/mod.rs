//! Shader graphs, their compilation to WGSL, and the compiled-pipeline cache.

mod cache;
mod compile;
mod descriptor;
mod graph;
mod raster;

pub use cache::PipelineCache;
pub use compile::{FRAGMENT_ENTRY, VERTEX_ENTRY};
pub use descriptor::{
    BindingEntry, BindingKind, Material, PipelineDescriptor, PipelineKey, VertexAttributeEntry,
    VertexBufferManifest,
};
pub use graph::{BinaryOp, COLOR_OUTPUT, Expr, GraphId, POSITION_OUTPUT, ShaderGraph, Stage, ValueType};
pub use raster::{BlendMode, DepthState, RasterState};
