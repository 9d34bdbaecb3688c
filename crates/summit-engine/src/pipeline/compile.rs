//! Graph pair -> WGSL + binding manifest.
//!
//! Bindings are gathered from both graphs, merged by `(scope, name)`, and
//! assigned slots in sorted name order so the same pair always compiles to
//! the same layout regardless of traversal details.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::error::{Result, SyncError};
use crate::slots::{BindingScope, SlotAllocator};

use super::descriptor::{
    BindingEntry, BindingKind, PipelineDescriptor, PipelineKey, VertexAttributeEntry,
    VertexBufferManifest,
};
use super::graph::{
    COLOR_OUTPUT, Expr, POSITION_OUTPUT, ShaderGraph, Stage, ValueType, invalid,
};
use super::raster::RasterState;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

struct Attribute<'g> {
    name: &'g str,
    buffer: u32,
    format: wgpu::VertexFormat,
    step: wgpu::VertexStepMode,
    location: u32,
}

pub(crate) fn compile(
    vertex: &ShaderGraph,
    fragment: &ShaderGraph,
    raster: RasterState,
    slots: &mut SlotAllocator,
) -> Result<PipelineDescriptor> {
    if vertex.stage() != Stage::Vertex || fragment.stage() != Stage::Fragment {
        return Err(invalid("graphs must be a vertex graph followed by a fragment graph".into()));
    }

    let varyings = check_vertex(vertex)?;
    check_fragment(fragment, &varyings)?;

    let manifest = collect_bindings(vertex, fragment)?;
    let mut bindings = Vec::with_capacity(manifest.len());
    for ((scope, name), (kind, visibility)) in manifest {
        let slot = slots.get_or_create_slot(scope, &name)?;
        bindings.push(BindingEntry {
            scope,
            name,
            slot,
            kind,
            visibility,
        });
    }
    bindings.sort_by_key(|b| (b.scope.group(), b.slot));

    let attributes = collect_attributes(vertex)?;
    let vertex_buffers = vertex_layout(&attributes)?;

    let key = PipelineKey {
        vertex: vertex.id(),
        fragment: fragment.id(),
        raster,
    };

    let vertex_source = emit_vertex(vertex, &varyings, &attributes, &bindings);
    let fragment_source = emit_fragment(fragment, &varyings, &bindings);

    Ok(PipelineDescriptor {
        id: 0,
        label: format!("pipeline {:016x}/{:016x}", key.vertex.0, key.fragment.0),
        key,
        vertex_source,
        fragment_source,
        bindings,
        vertex_buffers,
        raster,
    })
}

fn check_vertex(graph: &ShaderGraph) -> Result<Vec<(&str, ValueType)>> {
    let none = |_: &str| None;
    let mut varyings = Vec::new();
    for (name, expr) in graph.outputs() {
        check_ident(name)?;
        let ty = expr.value_type(&none)?;
        if name == POSITION_OUTPUT {
            if ty != ValueType::Vec4 {
                return Err(invalid(format!("vertex position must be vec4, got {ty:?}")));
            }
        } else if ty == ValueType::Mat4 {
            return Err(invalid(format!("varying `{name}` cannot be a matrix")));
        } else {
            varyings.push((name.as_str(), ty));
        }
    }

    let mut error = None;
    graph.visit(&mut |node| {
        if error.is_some() {
            return;
        }
        error = match node {
            Expr::Sample { texture, .. } => Some(format!("texture `{texture}` sampled in vertex stage")),
            Expr::Varying(name) => Some(format!("vertex graph reads varying `{name}`")),
            _ => None,
        };
    });
    error.map_or(Ok(varyings), |reason| Err(invalid(reason)))
}

fn check_fragment(graph: &ShaderGraph, varyings: &[(&str, ValueType)]) -> Result<()> {
    let lookup = |name: &str| varyings.iter().find(|(n, _)| *n == name).map(|(_, t)| *t);
    for (name, expr) in graph.outputs() {
        if name != COLOR_OUTPUT {
            return Err(invalid(format!("fragment graph writes unknown output `{name}`")));
        }
        let ty = expr.value_type(&lookup)?;
        if ty != ValueType::Vec4 {
            return Err(invalid(format!("fragment color must be vec4, got {ty:?}")));
        }
    }

    let mut error = None;
    graph.visit(&mut |node| {
        if error.is_none()
            && let Expr::Attribute { name, .. } = node
        {
            error = Some(format!("attribute `{name}` read in fragment stage"));
        }
    });
    error.map_or(Ok(()), |reason| Err(invalid(reason)))
}

type Manifest = BTreeMap<(BindingScope, String), (BindingKind, wgpu::ShaderStages)>;

fn collect_bindings(vertex: &ShaderGraph, fragment: &ShaderGraph) -> Result<Manifest> {
    let mut manifest = Manifest::new();
    let mut error = None;

    for graph in [vertex, fragment] {
        let stage = graph.stage().shader_stages();
        graph.visit(&mut |node| {
            if error.is_some() {
                return;
            }
            let found: &[(BindingScope, &str, BindingKind)] = &match node {
                Expr::Uniform { name, ty, scope } => vec![(*scope, name.as_str(), BindingKind::Uniform(*ty))],
                Expr::Sample {
                    texture,
                    sampler,
                    scope,
                    ..
                } => vec![
                    (*scope, texture.as_str(), BindingKind::Texture),
                    (*scope, sampler.as_str(), BindingKind::Sampler),
                ],
                _ => Vec::new(),
            };
            for &(scope, name, kind) in found {
                if let Err(e) = check_ident(name) {
                    error = Some(e);
                    return;
                }
                match manifest.get_mut(&(scope, name.to_owned())) {
                    Some((existing, stages)) if *existing == kind => *stages |= stage,
                    Some((existing, _)) => {
                        error = Some(SyncError::DuplicateBinding {
                            name: name.to_owned(),
                            first: existing.to_string(),
                            second: kind.to_string(),
                        });
                        return;
                    }
                    None => {
                        manifest.insert((scope, name.to_owned()), (kind, stage));
                    }
                }
            }
        });
    }

    error.map_or(Ok(manifest), Err)
}

fn collect_attributes(graph: &ShaderGraph) -> Result<Vec<Attribute<'_>>> {
    let mut seen: Vec<Attribute<'_>> = Vec::new();
    let mut error = None;
    graph.visit(&mut |node| {
        let Expr::Attribute {
            name,
            buffer,
            format,
            step,
        } = node
        else {
            return;
        };
        if error.is_some() {
            return;
        }
        match seen.iter().find(|a| a.name == name.as_str()) {
            Some(a) if a.buffer == *buffer && a.format == *format && a.step == *step => {}
            Some(_) => error = Some(invalid(format!("attribute `{name}` declared with conflicting layouts"))),
            None => {
                if let Err(e) = check_ident(name) {
                    error = Some(e);
                    return;
                }
                seen.push(Attribute {
                    name,
                    buffer: *buffer,
                    format: *format,
                    step: *step,
                    location: 0,
                });
            }
        }
    });
    if let Some(e) = error {
        return Err(e);
    }

    // Locations run buffer by buffer, first appearance first within a buffer.
    seen.sort_by_key(|a| a.buffer);
    for (location, attr) in seen.iter_mut().enumerate() {
        attr.location = location as u32;
    }
    Ok(seen)
}

fn vertex_layout(attributes: &[Attribute<'_>]) -> Result<Vec<VertexBufferManifest>> {
    let mut buffers: Vec<VertexBufferManifest> = Vec::new();
    let mut index: FxHashMap<u32, usize> = FxHashMap::default();

    for attr in attributes {
        let slot = match index.get(&attr.buffer) {
            Some(&slot) => slot,
            None => {
                if attr.buffer as usize != buffers.len() {
                    return Err(invalid(format!(
                        "vertex buffer indices must be contiguous from 0, found {}",
                        attr.buffer
                    )));
                }
                buffers.push(VertexBufferManifest {
                    step_mode: attr.step,
                    array_stride: 0,
                    attributes: Vec::new(),
                });
                index.insert(attr.buffer, buffers.len() - 1);
                buffers.len() - 1
            }
        };

        let buffer = &mut buffers[slot];
        if buffer.step_mode != attr.step {
            return Err(invalid(format!(
                "vertex buffer {} mixes per-vertex and per-instance attributes",
                attr.buffer
            )));
        }
        buffer.attributes.push(VertexAttributeEntry {
            name: attr.name.to_owned(),
            format: attr.format,
            offset: buffer.array_stride,
            location: attr.location,
        });
        buffer.array_stride += attr.format.size();
    }
    Ok(buffers)
}

fn check_ident(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !name.starts_with("__") {
        Ok(())
    } else {
        Err(invalid(format!("`{name}` is not a valid binding identifier")))
    }
}

// ── WGSL emission ─────────────────────────────────────────────────────────

fn binding_ident(kind: BindingKind, scope: BindingScope, name: &str) -> String {
    let prefix = match kind {
        BindingKind::Uniform(_) => 'u',
        BindingKind::Texture => 't',
        BindingKind::Sampler => 's',
    };
    format!("{prefix}{}_{name}", scope.group())
}

fn emit_io_struct(out: &mut String, varyings: &[(&str, ValueType)]) {
    out.push_str("struct VertexOutput {\n    @builtin(position) clip_position: vec4<f32>,\n");
    for (location, (name, ty)) in varyings.iter().enumerate() {
        let _ = writeln!(out, "    @location({location}) v_{name}: {},", ty.wgsl());
    }
    out.push_str("};\n\n");
}

fn emit_bindings(out: &mut String, bindings: &[BindingEntry], stage: wgpu::ShaderStages) {
    for b in bindings.iter().filter(|b| b.visibility.contains(stage)) {
        let ident = binding_ident(b.kind, b.scope, &b.name);
        let decl = match b.kind {
            BindingKind::Uniform(ty) => format!("var<uniform> {ident}: {}", ty.wgsl()),
            BindingKind::Texture => format!("var {ident}: texture_2d<f32>"),
            BindingKind::Sampler => format!("var {ident}: sampler"),
        };
        let _ = writeln!(out, "@group({}) @binding({}) {decl};", b.scope.group(), b.slot);
    }
    out.push('\n');
}

fn emit_vertex(
    graph: &ShaderGraph,
    varyings: &[(&str, ValueType)],
    attributes: &[Attribute<'_>],
    bindings: &[BindingEntry],
) -> String {
    let mut out = String::new();
    emit_io_struct(&mut out, varyings);
    emit_bindings(&mut out, bindings, wgpu::ShaderStages::VERTEX);

    let params = attributes
        .iter()
        .map(|a| {
            let ty = ValueType::from_vertex_format(a.format).unwrap_or(ValueType::Vec4);
            format!("@location({}) a_{}: {}", a.location, a.name, ty.wgsl())
        })
        .collect::<Vec<_>>()
        .join(", ");

    let _ = writeln!(out, "@vertex\nfn {VERTEX_ENTRY}({params}) -> VertexOutput {{");
    out.push_str("    var out: VertexOutput;\n");
    for (name, expr) in graph.outputs() {
        let value = emit_expr(expr);
        if name == POSITION_OUTPUT {
            let _ = writeln!(out, "    out.clip_position = {value};");
        } else {
            let _ = writeln!(out, "    out.v_{name} = {value};");
        }
    }
    out.push_str("    return out;\n}\n");
    out
}

fn emit_fragment(
    graph: &ShaderGraph,
    varyings: &[(&str, ValueType)],
    bindings: &[BindingEntry],
) -> String {
    let mut out = String::new();
    emit_io_struct(&mut out, varyings);
    emit_bindings(&mut out, bindings, wgpu::ShaderStages::FRAGMENT);

    let _ = writeln!(out, "@fragment\nfn {FRAGMENT_ENTRY}(frag: VertexOutput) -> @location(0) vec4<f32> {{");
    for (_, expr) in graph.outputs() {
        let _ = writeln!(out, "    return {};", emit_expr(expr));
    }
    out.push_str("}\n");
    out
}

fn emit_expr(expr: &Expr) -> String {
    match expr {
        Expr::Attribute { name, .. } => format!("a_{name}"),
        Expr::Varying(name) => format!("frag.v_{name}"),
        Expr::Uniform { name, ty, scope } => binding_ident(BindingKind::Uniform(*ty), *scope, name),
        Expr::Sample {
            texture,
            sampler,
            scope,
            uv,
        } => format!(
            "textureSample({}, {}, {})",
            binding_ident(BindingKind::Texture, *scope, texture),
            binding_ident(BindingKind::Sampler, *scope, sampler),
            emit_expr(uv)
        ),
        Expr::Constant(lanes) => {
            let values = lanes
                .iter()
                .map(|bits| float_literal(f32::from_bits(*bits)))
                .collect::<Vec<_>>()
                .join(", ");
            match lanes.len() {
                1 => format!("f32({values})"),
                n => format!("vec{n}<f32>({values})"),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            format!("({} {} {})", emit_expr(lhs), op.symbol(), emit_expr(rhs))
        }
        Expr::Construct { ty, args } => {
            let args = args.iter().map(emit_expr).collect::<Vec<_>>().join(", ");
            format!("{}({args})", ty.wgsl())
        }
        Expr::Swizzle { value, lanes } => format!("({}).{lanes}", emit_expr(value)),
    }
}

fn float_literal(value: f32) -> String {
    if value.is_finite() {
        format!("{value:?}")
    } else {
        // Non-finite constants have no WGSL literal.
        "0.0".to_owned()
    }
}
