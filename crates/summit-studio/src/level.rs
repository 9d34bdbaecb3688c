//! Logic-thread side of the demo: a tiny platformer level.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use summit_engine::cache::SamplerOptions;
use summit_engine::pipeline::{BlendMode, Expr, Material, RasterState, ShaderGraph, ValueType};
use summit_engine::server::{
    ObjectRegistration, RenderTargetDesc, ServerHandle, TextureBinding, ViewportUniform,
};
use summit_engine::shared::{MutableTexture, ResourceId, VersionedBuffer};
use summit_engine::slots::BindingScope;
use wgpu::VertexFormat;

const COLS: u32 = 20;
const ROWS: u32 = 12;
/// Pixels per tile.
const TILE: f32 = 16.0;
const PLAYER: f32 = 12.0;

const SKY: [u8; 4] = [92, 148, 252, 255];
const GROUND: [u8; 4] = [136, 84, 40, 255];
const COIN: [u8; 4] = [252, 216, 60, 255];

const WORLD: &str = "world";
const TILEMAP: &str = "tilemap";
const HERO: &str = "hero";

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct TexturedVertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

/// Maps a pixel-space vec2 to clip space through the target's viewport
/// (`xy` = size, `zw` = camera).
fn to_clip(pixels: Expr) -> Expr {
    let viewport = Expr::uniform("viewport", ValueType::Vec4, BindingScope::Target);
    let ndc = pixels
        .sub(viewport.clone().swizzle("zw"))
        .div(viewport.swizzle("xy"))
        .mul(Expr::constant(&[2.0, -2.0]))
        .add(Expr::constant(&[-1.0, 1.0]));
    Expr::construct(ValueType::Vec4, vec![ndc, Expr::constant(&[0.0, 1.0])])
}

fn tilemap_material(raster: RasterState) -> Material {
    let vertex = ShaderGraph::vertex(to_clip(Expr::attribute("pos", 0, VertexFormat::Float32x2)))
        .varying("uv", Expr::attribute("uv", 0, VertexFormat::Float32x2));
    let fragment = ShaderGraph::fragment(Expr::sample(
        "tiles",
        "pixel_sampler",
        BindingScope::Object,
        Expr::varying("uv"),
    ));
    Material::new(Arc::new(vertex), Arc::new(fragment), raster.with_blend(BlendMode::Opaque))
}

fn sprite_material(raster: RasterState) -> Material {
    let local = Expr::construct(
        ValueType::Vec4,
        vec![Expr::attribute("pos", 0, VertexFormat::Float32x2), Expr::constant(&[0.0, 1.0])],
    );
    let world = Expr::uniform("transform", ValueType::Mat4, BindingScope::Object).mul(local);
    let vertex = ShaderGraph::vertex(to_clip(world.swizzle("xy")));
    let fragment = ShaderGraph::fragment(Expr::uniform("tint", ValueType::Vec4, BindingScope::Object));
    Material::new(Arc::new(vertex), Arc::new(fragment), raster)
}

fn quad_indices() -> VersionedBuffer {
    let indices: [u16; 6] = [0, 1, 2, 2, 1, 3];
    VersionedBuffer::from_payload(ResourceId::random(), bytemuck::cast_slice(&indices))
}

fn translation(x: f32, y: f32) -> [[f32; 4]; 4] {
    [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [x, y, 0.0, 1.0],
    ]
}

/// Shared buffers the logic thread keeps writing after registration.
pub struct Level {
    tiles: MutableTexture,
    hero_transform: VersionedBuffer,
    viewport: VersionedBuffer,
    view_size: (f32, f32),
}

impl Level {
    /// Registers the target and both objects. Everything after this only
    /// writes shared memory.
    pub fn build<C>(handle: &ServerHandle<C>, view_size: (u32, u32), color_format: wgpu::TextureFormat) -> Result<Self> {
        let raster = RasterState::default().with_color_format(color_format);
        let tiles = MutableTexture::create(COLS, ROWS, wgpu::TextureFormat::Rgba8Unorm)
            .context("allocating tilemap texture")?;
        paint_terrain(&tiles)?;

        let viewport = VersionedBuffer::create(std::mem::size_of::<ViewportUniform>());
        let hero_transform = VersionedBuffer::create(std::mem::size_of::<[[f32; 4]; 4]>());
        let tint = VersionedBuffer::from_payload(
            ResourceId::random(),
            bytemuck::cast_slice(&[0.9f32, 0.2, 0.2, 1.0]),
        );
        let indices = quad_indices();

        let (w, h) = (COLS as f32 * TILE, ROWS as f32 * TILE);
        let map_quad = [
            TexturedVertex { pos: [0.0, 0.0], uv: [0.0, 0.0] },
            TexturedVertex { pos: [w, 0.0], uv: [1.0, 0.0] },
            TexturedVertex { pos: [0.0, h], uv: [0.0, 1.0] },
            TexturedVertex { pos: [w, h], uv: [1.0, 1.0] },
        ];
        let hero_quad: [[f32; 2]; 4] = [[0.0, 0.0], [PLAYER, 0.0], [0.0, PLAYER], [PLAYER, PLAYER]];

        let level = Self {
            tiles,
            hero_transform,
            viewport,
            view_size: (view_size.0 as f32, view_size.1 as f32),
        };
        level.step(0)?;

        handle.create_render_target(RenderTargetDesc::new(WORLD, level.viewport.clone()))?;
        handle.create_object(
            ObjectRegistration::new(TILEMAP, tilemap_material(raster))
                .texture("tiles", TextureBinding::Mutable(level.tiles.clone()))
                .sampler("pixel_sampler", SamplerOptions::nearest())
                .vertex_buffer(VersionedBuffer::from_payload(
                    ResourceId::random(),
                    bytemuck::cast_slice(&map_quad),
                ))
                .index_buffer(indices.clone(), wgpu::IndexFormat::Uint16),
        )?;
        handle.create_object(
            ObjectRegistration::new(HERO, sprite_material(raster))
                .uniform("transform", level.hero_transform.clone())
                .uniform("tint", tint)
                .vertex_buffer(VersionedBuffer::from_payload(
                    ResourceId::random(),
                    bytemuck::cast_slice(&hero_quad),
                ))
                .index_buffer(indices, wgpu::IndexFormat::Uint16),
        )?;
        handle.add_object_to_target(WORLD, TILEMAP)?;
        handle.add_object_to_target(WORLD, HERO)?;
        Ok(level)
    }

    /// Advances the simulation one frame: the hero runs right, the camera
    /// follows, and every 30th frame a coin appears on the ground row.
    pub fn step(&self, frame: u32) -> Result<()> {
        let span = COLS as f32 * TILE - PLAYER;
        let x = (frame as f32 * 1.5) % span;
        let hop = ((frame as f32) * 0.15).sin().abs() * TILE;
        let y = (ROWS - 2) as f32 * TILE - PLAYER - hop;
        self.hero_transform.write_pod(&translation(x, y), 0)?;

        let camera_x = (x - self.view_size.0 / 2.0).clamp(0.0, (COLS as f32 * TILE - self.view_size.0).max(0.0));
        self.viewport.write_pod(
            &ViewportUniform {
                size: [self.view_size.0, self.view_size.1],
                camera: [camera_x, 0.0],
            },
            0,
        )?;

        if frame > 0 && frame % 30 == 0 {
            let column = (frame / 30) % COLS;
            self.tiles
                .write_region((column as u16, (ROWS - 3) as u16), (1, 1), &COIN, 4)
                .with_context(|| format!("placing coin in column {column}"))?;
        }
        Ok(())
    }

    /// Unregisters everything `build` registered.
    pub fn teardown<C>(self, handle: &ServerHandle<C>) -> Result<()> {
        handle.remove_object_from_target(WORLD, HERO)?;
        handle.remove_object_from_target(WORLD, TILEMAP)?;
        handle.remove_object(HERO)?;
        handle.remove_object(TILEMAP)?;
        handle.remove_render_target(WORLD)?;
        Ok(())
    }
}

fn paint_terrain(tiles: &MutableTexture) -> Result<()> {
    let mut texels = Vec::with_capacity((COLS * ROWS * 4) as usize);
    for row in 0..ROWS {
        let color = if row >= ROWS - 2 { GROUND } else { SKY };
        for _ in 0..COLS {
            texels.extend_from_slice(&color);
        }
    }
    tiles.write_region((0, 0), (COLS as u16, ROWS as u16), &texels, COLS * 4)?;
    Ok(())
}
