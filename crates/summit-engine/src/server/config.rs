use crate::paint::Color;

/// Render-side tuning for [`ResourceServer`](super::ResourceServer).
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Usage requested for uniform and viewport buffers.
    pub uniform_usage: wgpu::BufferUsages,
    pub vertex_usage: wgpu::BufferUsages,
    pub index_usage: wgpu::BufferUsages,
    /// Clear color until `InitCanvas` supplies a background.
    pub clear_color: Color,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            uniform_usage: wgpu::BufferUsages::UNIFORM,
            vertex_usage: wgpu::BufferUsages::VERTEX,
            index_usage: wgpu::BufferUsages::INDEX,
            clear_color: Color::from_premul(0.0, 0.0, 0.0, 1.0),
        }
    }
}
