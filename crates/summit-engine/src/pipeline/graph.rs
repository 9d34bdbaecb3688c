use core::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::error::{Result, SyncError};
use crate::slots::BindingScope;

/// Value identity of a shader graph. Structurally equal graphs share an id.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub u64);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub(crate) fn shader_stages(self) -> wgpu::ShaderStages {
        match self {
            Stage::Vertex => wgpu::ShaderStages::VERTEX,
            Stage::Fragment => wgpu::ShaderStages::FRAGMENT,
        }
    }
}

/// Value types a graph expression can produce.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ValueType {
    F32,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl ValueType {
    pub fn wgsl(self) -> &'static str {
        match self {
            ValueType::F32 => "f32",
            ValueType::Vec2 => "vec2<f32>",
            ValueType::Vec3 => "vec3<f32>",
            ValueType::Vec4 => "vec4<f32>",
            ValueType::Mat4 => "mat4x4<f32>",
        }
    }

    /// Minimum uniform-buffer binding size.
    pub fn uniform_size(self) -> u64 {
        match self {
            ValueType::F32 => 4,
            ValueType::Vec2 => 8,
            ValueType::Vec3 | ValueType::Vec4 => 16,
            ValueType::Mat4 => 64,
        }
    }

    fn from_lanes(lanes: usize) -> Option<Self> {
        match lanes {
            1 => Some(ValueType::F32),
            2 => Some(ValueType::Vec2),
            3 => Some(ValueType::Vec3),
            4 => Some(ValueType::Vec4),
            _ => None,
        }
    }

    fn lanes(self) -> usize {
        match self {
            ValueType::F32 => 1,
            ValueType::Vec2 => 2,
            ValueType::Vec3 => 3,
            ValueType::Vec4 | ValueType::Mat4 => 4,
        }
    }

    pub(crate) fn from_vertex_format(format: wgpu::VertexFormat) -> Option<Self> {
        use wgpu::VertexFormat as F;
        match format {
            F::Float32 => Some(ValueType::F32),
            F::Float32x2 | F::Unorm16x2 | F::Snorm16x2 => Some(ValueType::Vec2),
            F::Float32x3 => Some(ValueType::Vec3),
            F::Float32x4 | F::Unorm8x4 | F::Snorm8x4 | F::Unorm16x4 => Some(ValueType::Vec4),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Expression node of a shader graph.
///
/// Leaves are vertex attributes, varyings, constants and bindings
/// (uniforms, textures, samplers). Bindings are what the compiled pipeline's
/// manifest is built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Per-vertex (or per-instance) input read from vertex buffer `buffer`.
    Attribute {
        name: String,
        buffer: u32,
        format: wgpu::VertexFormat,
        step: wgpu::VertexStepMode,
    },
    /// Value written by the vertex graph under this name.
    Varying(String),
    Uniform {
        name: String,
        ty: ValueType,
        scope: BindingScope,
    },
    /// `textureSample(texture, sampler, uv)`; fragment stage only.
    Sample {
        texture: String,
        sampler: String,
        scope: BindingScope,
        uv: Box<Expr>,
    },
    /// f32 lanes stored as bit patterns so the graph stays hashable.
    Constant(Vec<u32>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Construct {
        ty: ValueType,
        args: Vec<Expr>,
    },
    Swizzle {
        value: Box<Expr>,
        lanes: String,
    },
}

impl Expr {
    pub fn attribute(name: &str, buffer: u32, format: wgpu::VertexFormat) -> Self {
        Expr::Attribute {
            name: name.to_owned(),
            buffer,
            format,
            step: wgpu::VertexStepMode::Vertex,
        }
    }

    pub fn instance_attribute(name: &str, buffer: u32, format: wgpu::VertexFormat) -> Self {
        Expr::Attribute {
            name: name.to_owned(),
            buffer,
            format,
            step: wgpu::VertexStepMode::Instance,
        }
    }

    pub fn varying(name: &str) -> Self {
        Expr::Varying(name.to_owned())
    }

    pub fn uniform(name: &str, ty: ValueType, scope: BindingScope) -> Self {
        Expr::Uniform {
            name: name.to_owned(),
            ty,
            scope,
        }
    }

    pub fn sample(texture: &str, sampler: &str, scope: BindingScope, uv: Expr) -> Self {
        Expr::Sample {
            texture: texture.to_owned(),
            sampler: sampler.to_owned(),
            scope,
            uv: Box::new(uv),
        }
    }

    pub fn constant(lanes: &[f32]) -> Self {
        Expr::Constant(lanes.iter().map(|v| v.to_bits()).collect())
    }

    pub fn construct(ty: ValueType, args: Vec<Expr>) -> Self {
        Expr::Construct { ty, args }
    }

    pub fn swizzle(self, lanes: &str) -> Self {
        Expr::Swizzle {
            value: Box::new(self),
            lanes: lanes.to_owned(),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Add, self, rhs)
    }

    pub fn sub(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Sub, self, rhs)
    }

    pub fn mul(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Mul, self, rhs)
    }

    pub fn div(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Div, self, rhs)
    }

    /// Pre-order walk (node, then operands left to right).
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Sample { uv, .. } => uv.visit(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Construct { args, .. } => args.iter().for_each(|a| a.visit(f)),
            Expr::Swizzle { value, .. } => value.visit(f),
            Expr::Attribute { .. }
            | Expr::Varying(_)
            | Expr::Uniform { .. }
            | Expr::Constant(_) => {}
        }
    }

    /// Infers the value type; `varying` resolves names written by the vertex graph.
    pub(crate) fn value_type(
        &self,
        varying: &impl Fn(&str) -> Option<ValueType>,
    ) -> Result<ValueType> {
        match self {
            Expr::Attribute { name, format, .. } => ValueType::from_vertex_format(*format)
                .ok_or_else(|| invalid(format!("attribute `{name}` has unsupported format {format:?}"))),
            Expr::Varying(name) => {
                varying(name).ok_or_else(|| invalid(format!("varying `{name}` is not written by the vertex graph")))
            }
            Expr::Uniform { ty, .. } => Ok(*ty),
            Expr::Sample { uv, texture, .. } => match uv.value_type(varying)? {
                ValueType::Vec2 => Ok(ValueType::Vec4),
                other => Err(invalid(format!("texture `{texture}` sampled with {other:?} coordinates"))),
            },
            Expr::Constant(lanes) => ValueType::from_lanes(lanes.len())
                .ok_or_else(|| invalid(format!("constant with {} lanes", lanes.len()))),
            Expr::Binary { op, lhs, rhs } => {
                let (l, r) = (lhs.value_type(varying)?, rhs.value_type(varying)?);
                match (l, r) {
                    (ValueType::Mat4, ValueType::Vec4) if *op == BinaryOp::Mul => Ok(ValueType::Vec4),
                    (a, b) if a == b => Ok(a),
                    (a, ValueType::F32) if a != ValueType::Mat4 => Ok(a),
                    (ValueType::F32, b) if b != ValueType::Mat4 => Ok(b),
                    (a, b) => Err(invalid(format!("cannot apply `{}` to {a:?} and {b:?}", op.symbol()))),
                }
            }
            Expr::Construct { ty, args } => {
                if *ty == ValueType::Mat4 {
                    return Err(invalid("matrices cannot be constructed in a graph".into()));
                }
                let mut lanes = 0;
                for arg in args {
                    lanes += arg.value_type(varying)?.lanes();
                }
                if lanes == ty.lanes() || (args.len() == 1 && lanes == 1) {
                    Ok(*ty)
                } else {
                    Err(invalid(format!("{ty:?} built from {lanes} lanes")))
                }
            }
            Expr::Swizzle { value, lanes } => {
                let source = value.value_type(varying)?;
                let valid = ["xyzw", "rgba"].iter().any(|set| {
                    lanes
                        .chars()
                        .all(|c| set[..source.lanes()].contains(c))
                });
                if source == ValueType::Mat4 || !valid {
                    return Err(invalid(format!("swizzle `.{lanes}` on {source:?}")));
                }
                ValueType::from_lanes(lanes.len())
                    .ok_or_else(|| invalid(format!("swizzle `.{lanes}` has too many lanes")))
            }
        }
    }
}

/// A vertex or fragment program expressed as named output expressions.
///
/// A vertex graph must write `position` (vec4); every other output becomes a
/// varying the fragment graph can read. A fragment graph writes `color`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderGraph {
    stage: Stage,
    outputs: Vec<(String, Expr)>,
}

pub const POSITION_OUTPUT: &str = "position";
pub const COLOR_OUTPUT: &str = "color";

impl ShaderGraph {
    pub fn vertex(position: Expr) -> Self {
        Self {
            stage: Stage::Vertex,
            outputs: vec![(POSITION_OUTPUT.to_owned(), position)],
        }
    }

    pub fn fragment(color: Expr) -> Self {
        Self {
            stage: Stage::Fragment,
            outputs: vec![(COLOR_OUTPUT.to_owned(), color)],
        }
    }

    /// Adds (or replaces) a varying written by a vertex graph.
    pub fn varying(mut self, name: &str, value: Expr) -> Self {
        match self.outputs.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.outputs.push((name.to_owned(), value)),
        }
        self
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[inline]
    pub fn outputs(&self) -> &[(String, Expr)] {
        &self.outputs
    }

    /// Structural identity of the graph.
    pub fn id(&self) -> GraphId {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        GraphId(hasher.finish())
    }

    /// Walks every expression of every output in order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        for (_, expr) in &self.outputs {
            expr.visit(f);
        }
    }
}

pub(crate) fn invalid(reason: String) -> SyncError {
    SyncError::InvalidGraph(reason)
}
