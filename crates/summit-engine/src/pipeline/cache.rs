use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::slots::SlotAllocator;

use super::compile::compile;
use super::descriptor::{Material, PipelineDescriptor, PipelineKey};
use super::graph::ShaderGraph;
use super::raster::RasterState;

/// A compiled pipeline together with the graphs it was compiled from.
#[derive(Debug)]
struct Compiled {
    vertex: Arc<ShaderGraph>,
    fragment: Arc<ShaderGraph>,
    descriptor: Arc<PipelineDescriptor>,
}

impl Compiled {
    fn matches(&self, vertex: &ShaderGraph, fragment: &ShaderGraph) -> bool {
        same_graph(&self.vertex, vertex) && same_graph(&self.fragment, fragment)
    }
}

fn same_graph(cached: &Arc<ShaderGraph>, graph: &ShaderGraph) -> bool {
    std::ptr::eq(Arc::as_ptr(cached), graph) || **cached == *graph
}

/// Compiles each (vertex graph, fragment graph, raster state) triple at most once.
///
/// Entries are bucketed by [`PipelineKey`], whose graph ids are only hashes;
/// a hit still compares the graphs themselves.
///
/// Owns the slot allocator every compile draws from, so all pipelines agree
/// on where a given binding name lives.
#[derive(Debug, Default)]
pub struct PipelineCache {
    slots: SlotAllocator,
    compiled: FxHashMap<PipelineKey, Vec<Compiled>>,
    compiles: u64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached descriptor for the triple, compiling it on first request.
    ///
    /// A failed compile caches nothing.
    pub fn get_or_compile(
        &mut self,
        vertex: &ShaderGraph,
        fragment: &ShaderGraph,
        raster: RasterState,
    ) -> Result<Arc<PipelineDescriptor>> {
        let key = PipelineKey {
            vertex: vertex.id(),
            fragment: fragment.id(),
            raster,
        };
        self.lookup_or_compile(key, vertex, fragment, || {
            (Arc::new(vertex.clone()), Arc::new(fragment.clone()))
        })
    }

    pub fn get_material(&mut self, material: &Material) -> Result<Arc<PipelineDescriptor>> {
        self.lookup_or_compile(material.key(), material.vertex(), material.fragment(), || {
            (material.shared_vertex(), material.shared_fragment())
        })
    }

    fn lookup_or_compile(
        &mut self,
        key: PipelineKey,
        vertex: &ShaderGraph,
        fragment: &ShaderGraph,
        share: impl FnOnce() -> (Arc<ShaderGraph>, Arc<ShaderGraph>),
    ) -> Result<Arc<PipelineDescriptor>> {
        if let Some(found) = self.find(&key, vertex, fragment) {
            return Ok(Arc::clone(found));
        }

        let mut descriptor = compile(vertex, fragment, key.raster, &mut self.slots)?;
        self.compiles += 1;
        descriptor.id = self.compiles;
        let descriptor = Arc::new(descriptor);
        log::debug!(
            "compiled {} ({} bindings, {} vertex buffers)",
            descriptor.label,
            descriptor.bindings.len(),
            descriptor.vertex_buffers.len()
        );

        let bucket = self.compiled.entry(key).or_default();
        if !bucket.is_empty() {
            log::warn!("pipeline key {key:?} shared by {} distinct graph pairs", bucket.len() + 1);
        }
        let (vertex, fragment) = share();
        bucket.push(Compiled {
            vertex,
            fragment,
            descriptor: Arc::clone(&descriptor),
        });
        Ok(descriptor)
    }

    fn find(&self, key: &PipelineKey, vertex: &ShaderGraph, fragment: &ShaderGraph) -> Option<&Arc<PipelineDescriptor>> {
        self.compiled
            .get(key)?
            .iter()
            .find(|c| c.matches(vertex, fragment))
            .map(|c| &c.descriptor)
    }

    /// The descriptor compiled for `material`, if any.
    #[inline]
    pub fn get(&self, material: &Material) -> Option<&Arc<PipelineDescriptor>> {
        self.find(&material.key(), material.vertex(), material.fragment())
    }

    #[inline]
    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.compiled.values().map(Vec::len).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Number of compiles performed (cache misses that succeeded).
    #[inline]
    pub fn compile_count(&self) -> u64 {
        self.compiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::pipeline::{BlendMode, Expr, ValueType};
    use crate::slots::BindingScope;

    fn graphs() -> (ShaderGraph, ShaderGraph) {
        let vertex = ShaderGraph::vertex(
            Expr::uniform("transform", ValueType::Mat4, BindingScope::Object)
                .mul(Expr::constant(&[0.0, 0.0, 0.0, 1.0])),
        );
        let fragment = ShaderGraph::fragment(Expr::uniform("tint", ValueType::Vec4, BindingScope::Object));
        (vertex, fragment)
    }

    #[test]
    fn second_request_returns_the_same_descriptor() {
        let mut cache = PipelineCache::new();
        let (v, f) = graphs();

        let a = cache.get_or_compile(&v, &f, RasterState::default()).unwrap();
        let b = cache.get_or_compile(&v.clone(), &f.clone(), RasterState::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.compile_count(), 1);
    }

    #[test]
    fn raster_state_is_part_of_the_key() {
        let mut cache = PipelineCache::new();
        let (v, f) = graphs();

        let a = cache.get_or_compile(&v, &f, RasterState::default()).unwrap();
        let additive = RasterState::default().with_blend(BlendMode::Additive);
        let b = cache.get_or_compile(&v, &f, additive).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
        // Same names, same slots.
        assert_eq!(a.bindings, b.bindings);
    }

    #[test]
    fn material_lookup_hits_the_same_entry() {
        let mut cache = PipelineCache::new();
        let (v, f) = graphs();
        let direct = cache.get_or_compile(&v, &f, RasterState::default()).unwrap();

        let material = Material::new(Arc::new(v), Arc::new(f), RasterState::default());
        let via_material = cache.get_material(&material).unwrap();
        assert!(Arc::ptr_eq(&direct, &via_material));
        assert!(cache.get(&material).is_some());
    }

    #[test]
    fn equal_keys_with_different_graphs_compile_separately() {
        let mut cache = PipelineCache::new();
        let (v, f) = graphs();
        let first = cache.get_or_compile(&v, &f, RasterState::default()).unwrap();

        // A different fragment graph filed under the first pair's key.
        let red = ShaderGraph::fragment(Expr::constant(&[1.0, 0.0, 0.0, 1.0]));
        let second = cache
            .lookup_or_compile(first.key, &v, &red, || (Arc::new(v.clone()), Arc::new(red.clone())))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.fragment_source, second.fragment_source);
        assert_ne!(first.id, second.id);
        assert_eq!(cache.len(), 2);

        let again = cache.get_or_compile(&v, &f, RasterState::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.compile_count(), 2);
    }

    #[test]
    fn failed_compile_is_not_cached() {
        let mut cache = PipelineCache::new();
        let v = ShaderGraph::vertex(Expr::constant(&[0.0, 0.0, 0.0, 1.0]));
        let f = ShaderGraph::fragment(Expr::varying("nope"));
        let err = cache.get_or_compile(&v, &f, RasterState::default()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidGraph(_)));
        assert!(cache.is_empty());
        assert_eq!(cache.compile_count(), 0);
    }
}
