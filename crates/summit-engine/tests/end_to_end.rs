use std::sync::Arc;
use std::thread;

use summit_engine::cache::SamplerOptions;
use summit_engine::device::RecordingDevice;
use summit_engine::paint::Color;
use summit_engine::pipeline::{Expr, Material, RasterState, ShaderGraph, ValueType};
use summit_engine::server::{
    ObjectRegistration, RenderTargetDesc, Reply, ResourceServer, ServerConfig, TextureBinding,
    ViewportUniform, channel,
};
use summit_engine::shared::{MutableTexture, ResourceId, VersionedBuffer};
use summit_engine::slots::BindingScope;

fn flat_material() -> Material {
    let vertex = ShaderGraph::vertex(Expr::attribute("pos", 0, wgpu::VertexFormat::Float32x4));
    let fragment = ShaderGraph::fragment(Expr::constant(&[1.0, 1.0, 1.0, 1.0]));
    Material::new(Arc::new(vertex), Arc::new(fragment), RasterState::default())
}

fn ready_server() -> ResourceServer<RecordingDevice> {
    let mut server = ResourceServer::new(RecordingDevice::new(), ServerConfig::default());
    server.init_canvas((320, 180), Color::transparent()).unwrap();
    server
}

#[test]
fn shared_vertex_buffer_is_uploaded_once_and_outlives_first_owner() {
    let mut server = ready_server();
    let id = ResourceId::new("buf-1").unwrap();
    let buffer = VersionedBuffer::with_identity(id, 3 * 16);

    server
        .create_object(ObjectRegistration::new("o1", flat_material()).vertex_buffer(buffer.clone()))
        .unwrap();
    server.render_frame().unwrap();
    assert_eq!(server.device().counters().buffer_writes, 1);

    buffer.write(&[1.0f32.to_le_bytes(), 2.0f32.to_le_bytes()].concat(), 0).unwrap();
    server.render_frame().unwrap();
    assert_eq!(server.device().counters().buffer_writes, 2);

    server
        .create_object(ObjectRegistration::new("o2", flat_material()).vertex_buffer(buffer.clone()))
        .unwrap();
    server.render_frame().unwrap();
    assert_eq!(server.device().counters().buffer_writes, 2);
    assert_eq!(server.cache().buffer(id).unwrap().reference_count, 2);
    assert_eq!(server.device().counters().buffers_created, 1);

    server.remove_object(&"o1".into()).unwrap();
    server.render_frame().unwrap();
    assert!(server.cache().buffer(id).is_some());
    assert_eq!(server.device().live_buffers(), 1);

    server.remove_object(&"o2".into()).unwrap();
    assert!(server.cache().buffer(id).is_none());
    assert_eq!(server.device().live_buffers(), 0);
    assert_eq!(server.device().counters().buffers_destroyed, 1);
}

#[test]
fn tilemap_edits_upload_only_the_dirty_rectangle() {
    let mut server = ready_server();
    let tiles = MutableTexture::create(16, 16, wgpu::TextureFormat::Rgba8Unorm).unwrap();

    let vertex = ShaderGraph::vertex(Expr::attribute("pos", 0, wgpu::VertexFormat::Float32x4))
        .varying("uv", Expr::attribute("uv", 0, wgpu::VertexFormat::Float32x2));
    let fragment = ShaderGraph::fragment(Expr::sample(
        "tiles",
        "tiles_sampler",
        BindingScope::Object,
        Expr::varying("uv"),
    ));
    let material = Material::new(Arc::new(vertex), Arc::new(fragment), RasterState::default());

    server
        .create_object(
            ObjectRegistration::new("level", material)
                .texture("tiles", TextureBinding::Mutable(tiles.clone()))
                .sampler("tiles_sampler", SamplerOptions::nearest())
                .vertex_buffer(VersionedBuffer::create(6 * 24)),
        )
        .unwrap();
    let created = server.device().counters().texture_bytes_written;
    assert_eq!(created, 16 * 16 * 4);

    assert_eq!(server.render_frame().unwrap().sync.textures, 0);

    let red = [255u8, 0, 0, 255].repeat(4);
    tiles.write_region((3, 5), (2, 2), &red, 8).unwrap();
    let report = server.render_frame().unwrap();
    assert_eq!(report.sync.textures, 1);
    assert_eq!(server.device().counters().texture_bytes_written - created, 16);

    let handle = server.cache().mutable_texture(tiles.identity()).unwrap().handle;
    let texels = server.device().texture_contents(handle).unwrap();
    let at = |x: usize, y: usize| &texels[(y * 16 + x) * 4..(y * 16 + x) * 4 + 4];
    assert_eq!(at(3, 5), &[255, 0, 0, 255]);
    assert_eq!(at(4, 6), &[255, 0, 0, 255]);
    assert_eq!(at(5, 5), &[0, 0, 0, 0]);
}

#[test]
fn targets_draw_members_in_membership_order() {
    let mut server = ready_server();
    let viewport = VersionedBuffer::create(std::mem::size_of::<ViewportUniform>());
    server.create_render_target(RenderTargetDesc::new("world", viewport.clone())).unwrap();
    server.create_render_target(RenderTargetDesc::new("hud", viewport)).unwrap();

    for id in ["back", "front", "score"] {
        server
            .create_object(
                ObjectRegistration::new(id, flat_material()).vertex_buffer(VersionedBuffer::create(6 * 16)),
            )
            .unwrap();
    }
    server.add_object_to_target(&"world".into(), &"front".into()).unwrap();
    server.add_object_to_target(&"world".into(), &"back".into()).unwrap();
    server.add_object_to_target(&"hud".into(), &"score".into()).unwrap();
    server.add_object_to_target(&"world".into(), &"front".into()).unwrap();

    let report = server.render_frame().unwrap();
    assert_eq!(report.draws, 3);

    let frame = server.device().last_frame().unwrap();
    let order: Vec<(&str, &str)> = frame
        .draws
        .iter()
        .map(|d| (d.pass.as_str(), d.label.as_str()))
        .collect();
    assert_eq!(order, [("world", "front"), ("world", "back"), ("hud", "score")]);
    assert!(frame.draws.iter().all(|d| d.element_count == 6));
    assert_eq!(server.device().counters().pipelines_created, 1);
}

#[test]
fn logic_and_render_threads_meet_over_the_channel() {
    let (handle, inbox) = channel();
    let transform = VersionedBuffer::create(64);

    let logic = {
        let transform = transform.clone();
        thread::spawn(move || {
            let ready = handle.init_canvas((64, 64), Color::transparent()).unwrap();
            assert_eq!(ready.recv().unwrap(), Reply::Ready);

            let vertex = ShaderGraph::vertex(
                Expr::uniform("transform", ValueType::Mat4, BindingScope::Object)
                    .mul(Expr::attribute("pos", 0, wgpu::VertexFormat::Float32x4)),
            );
            let fragment = ShaderGraph::fragment(Expr::constant(&[0.0, 1.0, 0.0, 1.0]));
            let material = Material::new(Arc::new(vertex), Arc::new(fragment), RasterState::default());
            handle
                .create_render_target(RenderTargetDesc::new("world", VersionedBuffer::create(16)))
                .unwrap();
            handle
                .create_object(
                    ObjectRegistration::new("player", material)
                        .uniform("transform", transform.clone())
                        .vertex_buffer(VersionedBuffer::create(4 * 16)),
                )
                .unwrap();
            handle.add_object_to_target("world", "player").unwrap();
            for step in 0..10u8 {
                transform.write(&[step; 4], 0).unwrap();
            }
        })
    };

    let mut server = ResourceServer::new(RecordingDevice::new(), ServerConfig::default());
    let mut drawn = 0;
    loop {
        let status = server.pump(&inbox).unwrap();
        if server.is_canvas_ready() {
            drawn += server.render_frame().unwrap().draws;
        }
        if status.disconnected {
            break;
        }
        thread::yield_now();
    }
    logic.join().unwrap();

    server.render_frame().unwrap();
    assert!(drawn >= 1);
    let handle = server.cache().buffer(transform.identity()).unwrap().handle;
    assert_eq!(&server.device().buffer_contents(handle).unwrap()[..4], &[9; 4]);
}
