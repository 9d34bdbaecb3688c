use rustc_hash::FxHashMap;

use crate::device::{BufferDesc, GpuDevice, TextureDesc, TextureWrite};
use crate::error::{Result, SyncError};
use crate::shared::{
    ImmutableTexture, MutableTexture, ResourceId, TEXTURE_REGION_LEN, TextureId, VersionedBuffer,
    has_advanced, read_region,
};

use super::record::{CacheStats, ResourceKey, ResourceKind, ResourceRecord, SyncReport};
use super::sampler::SamplerOptions;

struct BufferEntry<D: GpuDevice> {
    record: ResourceRecord<D::Buffer>,
    source: VersionedBuffer,
    usage: wgpu::BufferUsages,
}

struct MutableEntry<D: GpuDevice> {
    record: ResourceRecord<D::Texture>,
    source: MutableTexture,
}

/// Deduplicated, reference-counted physical GPU objects.
///
/// One record per key. Adding an existing key bumps its count and returns
/// the cached handle; the release that brings the count to zero destroys
/// the physical object and erases the record in the same call. Samplers
/// are counted but never evicted.
///
/// The cache does not own the device; every call that may touch the GPU
/// takes it explicitly.
pub struct ResourceCache<D: GpuDevice> {
    buffers: FxHashMap<ResourceId, BufferEntry<D>>,
    textures: FxHashMap<TextureId, ResourceRecord<D::Texture>>,
    mutable_textures: FxHashMap<ResourceId, MutableEntry<D>>,
    samplers: FxHashMap<SamplerOptions, ResourceRecord<D::Sampler>>,
    stats: CacheStats,
}

impl<D: GpuDevice> Default for ResourceCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: GpuDevice> ResourceCache<D> {
    pub fn new() -> Self {
        Self {
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            mutable_textures: FxHashMap::default(),
            samplers: FxHashMap::default(),
            stats: CacheStats::default(),
        }
    }

    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of live records of every kind.
    pub fn len(&self) -> usize {
        self.buffers.len() + self.textures.len() + self.mutable_textures.len() + self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── buffers ──────────────────────────────────────────────────────────

    /// Resolves `buffer` to its physical GPU buffer, creating it with the
    /// current payload on first reference.
    ///
    /// Re-adding with usage bits the cached buffer lacks recreates it with
    /// the union of both sets; the key still maps to exactly one buffer.
    pub fn add_buffer(
        &mut self,
        device: &mut D,
        buffer: &VersionedBuffer,
        usage: wgpu::BufferUsages,
    ) -> Result<D::Buffer> {
        let id = buffer.identity();

        if let Some(entry) = self.buffers.get_mut(&id) {
            // The count moves only once the add can no longer fail.
            if !entry.usage.contains(usage) {
                let widened = entry.usage | usage;
                log::warn!("buffer `{id}` re-added with {usage:?}; widening to {widened:?}");
                let (handle, version, bytes) = create_buffer(device, &entry.source, widened)?;
                let stale = std::mem::replace(&mut entry.record.handle, handle);
                device.destroy_buffer(stale);
                entry.record.last_synced_version = version;
                entry.usage = widened;
                self.stats.buffers_created += 1;
                self.stats.buffers_destroyed += 1;
                self.stats.buffer_uploads += 1;
                self.stats.bytes_uploaded += bytes;
            }
            entry.record.reference_count += 1;
            return Ok(entry.record.handle.clone());
        }

        let (handle, version, bytes) = create_buffer(device, buffer, usage)?;
        log::debug!("created buffer `{id}` ({} bytes, {usage:?})", buffer.payload_len());
        self.stats.buffers_created += 1;
        self.stats.buffer_uploads += 1;
        self.stats.bytes_uploaded += bytes;

        self.buffers.insert(
            id,
            BufferEntry {
                record: ResourceRecord::new(ResourceKey::Buffer(id), ResourceKind::Buffer, handle.clone(), version),
                source: buffer.clone(),
                usage,
            },
        );
        Ok(handle)
    }

    /// Drops one reference; the last one destroys the GPU buffer.
    pub fn remove_buffer(&mut self, device: &mut D, id: ResourceId) -> Result<()> {
        let entry = self
            .buffers
            .get_mut(&id)
            .ok_or(SyncError::UnknownResource(ResourceKey::Buffer(id)))?;

        entry.record.reference_count -= 1;
        if entry.record.reference_count == 0
            && let Some(entry) = self.buffers.remove(&id)
        {
            device.destroy_buffer(entry.record.handle);
            self.stats.buffers_destroyed += 1;
            log::debug!("destroyed buffer `{id}`");
        }
        Ok(())
    }

    /// Uploads the full payload if its version moved since the last upload.
    ///
    /// Returns whether a GPU write was issued.
    pub fn sync_buffer(&mut self, device: &mut D, id: ResourceId) -> Result<bool> {
        let entry = self
            .buffers
            .get_mut(&id)
            .ok_or(SyncError::UnknownResource(ResourceKey::Buffer(id)))?;

        let record = &mut entry.record;
        let uploaded = entry.source.read(|version, payload| -> Result<Option<u64>> {
            if !has_advanced(record.last_synced_version, version) {
                return Ok(None);
            }
            device.write_buffer(&record.handle, 0, payload)?;
            record.last_synced_version = version;
            Ok(Some(payload.len() as u64))
        })?;

        match uploaded {
            Some(bytes) => {
                log::trace!("synced buffer `{id}` @v{}", entry.record.last_synced_version);
                self.stats.buffer_uploads += 1;
                self.stats.bytes_uploaded += bytes;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn buffer(&self, id: ResourceId) -> Option<&ResourceRecord<D::Buffer>> {
        self.buffers.get(&id).map(|e| &e.record)
    }

    // ── immutable textures ───────────────────────────────────────────────

    /// Creates and uploads the texture once; later adds only count references.
    pub fn add_immutable_texture(&mut self, device: &mut D, texture: &ImmutableTexture) -> Result<D::Texture> {
        if let Some(record) = self.textures.get_mut(&texture.id) {
            record.reference_count += 1;
            return Ok(record.handle.clone());
        }

        let label = texture.id.to_string();
        let handle = device.create_texture(&TextureDesc {
            label: &label,
            width: texture.width,
            height: texture.height,
            format: texture.format,
        })?;
        device.write_texture(
            &handle,
            &TextureWrite {
                origin: (0, 0),
                size: (texture.width, texture.height),
                bytes_per_row: texture.bytes_per_row(),
                data: &texture.pixels,
            },
        )?;
        log::debug!("created texture `{}` ({}x{})", texture.id, texture.width, texture.height);
        self.stats.textures_created += 1;
        self.stats.texture_uploads += 1;
        self.stats.bytes_uploaded += texture.pixels.len() as u64;

        self.textures.insert(
            texture.id.clone(),
            ResourceRecord::new(
                ResourceKey::Texture(texture.id.clone()),
                ResourceKind::ImmutableTexture,
                handle.clone(),
                0,
            ),
        );
        Ok(handle)
    }

    pub fn remove_immutable_texture(&mut self, device: &mut D, id: &TextureId) -> Result<()> {
        let record = self
            .textures
            .get_mut(id)
            .ok_or_else(|| SyncError::UnknownResource(ResourceKey::Texture(id.clone())))?;

        record.reference_count -= 1;
        if record.reference_count == 0
            && let Some(record) = self.textures.remove(id)
        {
            device.destroy_texture(record.handle);
            self.stats.textures_destroyed += 1;
            log::debug!("destroyed texture `{id}`");
        }
        Ok(())
    }

    pub fn immutable_texture(&self, id: &TextureId) -> Option<&ResourceRecord<D::Texture>> {
        self.textures.get(id)
    }

    // ── mutable textures ─────────────────────────────────────────────────

    /// Creates the texture with the full current texel area; later adds only
    /// count references.
    pub fn add_mutable_texture(&mut self, device: &mut D, texture: &MutableTexture) -> Result<D::Texture> {
        let id = texture.identity();
        if let Some(entry) = self.mutable_textures.get_mut(&id) {
            entry.record.reference_count += 1;
            return Ok(entry.record.handle.clone());
        }

        let (width, height) = texture.size();
        let label = id.to_string();
        let handle = device.create_texture(&TextureDesc {
            label: &label,
            width,
            height,
            format: texture.format(),
        })?;

        let row_pitch = texture.row_pitch();
        let (version, bytes) = texture.buffer().read(|version, payload| -> Result<(u32, u64)> {
            let texels = &payload[TEXTURE_REGION_LEN..];
            device.write_texture(
                &handle,
                &TextureWrite {
                    origin: (0, 0),
                    size: (width, height),
                    bytes_per_row: row_pitch,
                    data: texels,
                },
            )?;
            Ok((version, texels.len() as u64))
        })?;
        log::debug!("created mutable texture `{id}` ({width}x{height})");
        self.stats.textures_created += 1;
        self.stats.texture_uploads += 1;
        self.stats.bytes_uploaded += bytes;

        self.mutable_textures.insert(
            id,
            MutableEntry {
                record: ResourceRecord::new(
                    ResourceKey::MutableTexture(id),
                    ResourceKind::MutableTexture,
                    handle.clone(),
                    version,
                ),
                source: texture.clone(),
            },
        );
        Ok(handle)
    }

    /// Uploads only the dirty rectangle named by the payload header, if the
    /// version moved. An empty rectangle acknowledges the version without a write.
    ///
    /// The header only describes the latest commit. When more than one commit
    /// landed since the last sync, the whole texel area is written instead.
    pub fn sync_mutable_texture(&mut self, device: &mut D, id: ResourceId) -> Result<bool> {
        let entry = self
            .mutable_textures
            .get_mut(&id)
            .ok_or(SyncError::UnknownResource(ResourceKey::MutableTexture(id)))?;

        let record = &mut entry.record;
        let texture = &entry.source;
        let uploaded = texture.buffer().read(|version, payload| -> Result<Option<u64>> {
            if !has_advanced(record.last_synced_version, version) {
                return Ok(None);
            }
            let region = if version.wrapping_sub(record.last_synced_version) == 1 {
                read_region(payload).ok_or_else(|| SyncError::InvalidRegion {
                    id,
                    reason: "payload shorter than the region header".into(),
                })?
            } else {
                log::trace!("mutable texture `{id}` merged several edits; uploading all texels");
                texture.full_region()
            };
            if region.is_empty() {
                record.last_synced_version = version;
                return Ok(None);
            }

            let (width, height) = texture.size();
            let (ox, oy) = (u32::from(region.origin_x), u32::from(region.origin_y));
            let (sx, sy) = (u32::from(region.size_x), u32::from(region.size_y));
            let texels = &payload[TEXTURE_REGION_LEN..];
            let start = region.byte_offset as usize;
            let end = start as u64 + region.span(texture.bytes_per_texel());
            if ox + sx > width || oy + sy > height || end > texels.len() as u64 {
                return Err(SyncError::InvalidRegion {
                    id,
                    reason: format!("{sx}x{sy} at ({ox},{oy}), bytes {start}..{end} of {}", texels.len()),
                });
            }

            let data = &texels[start..end as usize];
            device.write_texture(
                &record.handle,
                &TextureWrite {
                    origin: (ox, oy),
                    size: (sx, sy),
                    bytes_per_row: region.bytes_per_row,
                    data,
                },
            )?;
            record.last_synced_version = version;
            Ok(Some(data.len() as u64))
        })?;

        match uploaded {
            Some(bytes) => {
                log::trace!("synced mutable texture `{id}` @v{}", entry.record.last_synced_version);
                self.stats.texture_uploads += 1;
                self.stats.bytes_uploaded += bytes;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_mutable_texture(&mut self, device: &mut D, id: ResourceId) -> Result<()> {
        let entry = self
            .mutable_textures
            .get_mut(&id)
            .ok_or(SyncError::UnknownResource(ResourceKey::MutableTexture(id)))?;

        entry.record.reference_count -= 1;
        if entry.record.reference_count == 0
            && let Some(entry) = self.mutable_textures.remove(&id)
        {
            device.destroy_texture(entry.record.handle);
            self.stats.textures_destroyed += 1;
            log::debug!("destroyed mutable texture `{id}`");
        }
        Ok(())
    }

    pub fn mutable_texture(&self, id: ResourceId) -> Option<&ResourceRecord<D::Texture>> {
        self.mutable_textures.get(&id).map(|e| &e.record)
    }

    // ── samplers ─────────────────────────────────────────────────────────

    /// Returns the sampler for the canonicalized options, creating it once.
    pub fn add_sampler(&mut self, device: &mut D, options: SamplerOptions) -> Result<D::Sampler> {
        let options = options.canonical();
        if let Some(record) = self.samplers.get_mut(&options) {
            record.reference_count += 1;
            return Ok(record.handle.clone());
        }

        let handle = device.create_sampler(&options)?;
        log::debug!("created sampler {options:?}");
        self.stats.samplers_created += 1;
        self.samplers.insert(
            options,
            ResourceRecord::new(ResourceKey::Sampler(options), ResourceKind::Sampler, handle.clone(), 0),
        );
        Ok(handle)
    }

    /// Drops one reference. The sampler itself stays cached for the life of the cache.
    pub fn release_sampler(&mut self, options: SamplerOptions) -> Result<()> {
        let options = options.canonical();
        let record = self
            .samplers
            .get_mut(&options)
            .ok_or(SyncError::UnknownResource(ResourceKey::Sampler(options)))?;
        record.reference_count = record.reference_count.saturating_sub(1);
        Ok(())
    }

    pub fn sampler(&self, options: SamplerOptions) -> Option<&ResourceRecord<D::Sampler>> {
        self.samplers.get(&options.canonical())
    }

    // ── whole cache ──────────────────────────────────────────────────────

    /// Syncs every live buffer and mutable texture once.
    pub fn sync_all(&mut self, device: &mut D) -> Result<SyncReport> {
        let before = self.stats.bytes_uploaded;
        let mut report = SyncReport::default();

        let buffers: Vec<ResourceId> = self.buffers.keys().copied().collect();
        for id in buffers {
            if self.sync_buffer(device, id)? {
                report.buffers += 1;
            }
        }
        let textures: Vec<ResourceId> = self.mutable_textures.keys().copied().collect();
        for id in textures {
            if self.sync_mutable_texture(device, id)? {
                report.textures += 1;
            }
        }

        report.bytes = self.stats.bytes_uploaded - before;
        Ok(report)
    }

    /// Destroys every physical object regardless of reference counts.
    pub fn clear(&mut self, device: &mut D) {
        for (_, entry) in self.buffers.drain() {
            device.destroy_buffer(entry.record.handle);
            self.stats.buffers_destroyed += 1;
        }
        for (_, record) in self.textures.drain() {
            device.destroy_texture(record.handle);
            self.stats.textures_destroyed += 1;
        }
        for (_, entry) in self.mutable_textures.drain() {
            device.destroy_texture(entry.record.handle);
            self.stats.textures_destroyed += 1;
        }
        self.samplers.clear();
    }
}

fn create_buffer<D: GpuDevice>(
    device: &mut D,
    source: &VersionedBuffer,
    usage: wgpu::BufferUsages,
) -> Result<(D::Buffer, u32, u64)> {
    let label = source.identity().to_string();
    source.read(|version, payload| -> Result<(D::Buffer, u32, u64)> {
        let handle = device.create_buffer(&BufferDesc {
            label: &label,
            size: payload.len() as u64,
            usage,
        })?;
        if !payload.is_empty() {
            device.write_buffer(&handle, 0, payload)?;
        }
        Ok((handle, version, payload.len() as u64))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Handle, RecordingDevice};

    const VERTEX: wgpu::BufferUsages = wgpu::BufferUsages::VERTEX;

    fn setup() -> (RecordingDevice, ResourceCache<RecordingDevice>) {
        (RecordingDevice::new(), ResourceCache::new())
    }

    fn named(name: &str, size: usize) -> VersionedBuffer {
        VersionedBuffer::with_identity(ResourceId::new(name).unwrap(), size)
    }

    #[test]
    fn same_identity_shares_one_buffer() {
        let (mut dev, mut cache) = setup();
        let buf = named("buf-1", 16);

        let a = cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();
        let b = cache.add_buffer(&mut dev, &buf.clone(), VERTEX).unwrap();
        assert_eq!(a, b);
        assert_eq!(dev.counters().buffers_created, 1);
        assert_eq!(cache.buffer(buf.identity()).unwrap().reference_count, 2);
    }

    #[test]
    fn last_release_destroys_and_next_add_recreates() {
        let (mut dev, mut cache) = setup();
        let buf = named("buf-1", 4);
        let first = cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();
        cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();

        cache.remove_buffer(&mut dev, buf.identity()).unwrap();
        assert!(cache.buffer(buf.identity()).is_some());
        cache.remove_buffer(&mut dev, buf.identity()).unwrap();
        assert!(cache.buffer(buf.identity()).is_none());
        assert_eq!(dev.live_buffers(), 0);

        let second = cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();
        assert_ne!(first, second);
        assert_eq!(dev.counters().buffers_created, 2);
    }

    #[test]
    fn sync_uploads_once_per_version() {
        let (mut dev, mut cache) = setup();
        let buf = named("buf-1", 4);
        cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();
        assert_eq!(dev.counters().buffer_writes, 1);

        assert!(!cache.sync_buffer(&mut dev, buf.identity()).unwrap());
        buf.write(&[1, 2, 3, 4], 0).unwrap();
        assert!(cache.sync_buffer(&mut dev, buf.identity()).unwrap());
        assert!(!cache.sync_buffer(&mut dev, buf.identity()).unwrap());
        assert_eq!(dev.counters().buffer_writes, 2);
    }

    #[test]
    fn sync_sees_only_the_final_state() {
        let (mut dev, mut cache) = setup();
        let buf = named("buf-1", 2);
        let handle = cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();

        for i in 0..5u8 {
            buf.write(&[i, i], 0).unwrap();
        }
        cache.sync_buffer(&mut dev, buf.identity()).unwrap();
        assert_eq!(dev.buffer_contents(handle).unwrap(), &[4, 4]);
        assert_eq!(dev.counters().buffer_writes, 2);
        assert_eq!(cache.buffer(buf.identity()).unwrap().last_synced_version, 5);
    }

    #[test]
    fn unknown_identities_are_errors() {
        let (mut dev, mut cache) = setup();
        let id = ResourceId::new("ghost").unwrap();
        assert!(matches!(
            cache.sync_buffer(&mut dev, id),
            Err(SyncError::UnknownResource(ResourceKey::Buffer(_)))
        ));
        assert!(cache.remove_buffer(&mut dev, id).is_err());
        assert!(cache.sync_mutable_texture(&mut dev, id).is_err());
        assert!(cache.remove_immutable_texture(&mut dev, &TextureId::new("ghost")).is_err());
    }

    #[test]
    fn missing_usage_widens_in_place() {
        let (mut dev, mut cache) = setup();
        let buf = named("shared", 8);
        let a = cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();
        let b = cache
            .add_buffer(&mut dev, &buf, wgpu::BufferUsages::UNIFORM)
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(dev.live_buffers(), 1);
        assert_eq!(cache.buffer(buf.identity()).unwrap().handle, b);
        assert_eq!(cache.buffer(buf.identity()).unwrap().reference_count, 2);

        // A subset of the widened usage reuses the buffer.
        let c = cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();
        assert_eq!(b, c);
    }

    #[test]
    fn immutable_textures_upload_exactly_once() {
        let (mut dev, mut cache) = setup();
        let tex = ImmutableTexture::new(
            TextureId::new("atlas"),
            2,
            1,
            wgpu::TextureFormat::Rgba8Unorm,
            vec![9u8; 8],
        )
        .unwrap();

        let a = cache.add_immutable_texture(&mut dev, &tex).unwrap();
        let b = cache.add_immutable_texture(&mut dev, &tex).unwrap();
        assert_eq!(a, b);
        assert_eq!(dev.counters().texture_writes, 1);
        assert_eq!(dev.texture_contents(a).unwrap(), &[9u8; 8]);

        cache.remove_immutable_texture(&mut dev, &tex.id).unwrap();
        cache.remove_immutable_texture(&mut dev, &tex.id).unwrap();
        assert_eq!(dev.live_textures(), 0);
    }

    #[test]
    fn mutable_texture_sync_writes_only_the_dirty_rect() {
        let (mut dev, mut cache) = setup();
        let tex = MutableTexture::create(4, 4, wgpu::TextureFormat::R8Unorm).unwrap();
        let handle: Handle = cache.add_mutable_texture(&mut dev, &tex).unwrap();
        assert!(!cache.sync_mutable_texture(&mut dev, tex.identity()).unwrap());

        tex.write_region((1, 1), (2, 2), &[1, 2, 3, 4], 2).unwrap();
        assert!(cache.sync_mutable_texture(&mut dev, tex.identity()).unwrap());
        assert_eq!(dev.counters().texture_writes, 2);
        assert_eq!(dev.counters().texture_bytes_written, 16 + 4);
        assert_eq!(
            dev.texture_contents(handle).unwrap(),
            &[0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn edits_merged_between_syncs_all_reach_the_gpu() {
        let (mut dev, mut cache) = setup();
        let tex = MutableTexture::create(4, 4, wgpu::TextureFormat::R8Unorm).unwrap();
        let handle: Handle = cache.add_mutable_texture(&mut dev, &tex).unwrap();

        tex.write_region((0, 0), (1, 1), &[7], 1).unwrap();
        tex.write_region((3, 3), (1, 1), &[9], 1).unwrap();
        assert!(cache.sync_mutable_texture(&mut dev, tex.identity()).unwrap());

        let texels = tex.buffer().read(|_, payload| payload[TEXTURE_REGION_LEN..].to_vec());
        assert_eq!((texels[0], texels[15]), (7, 9));
        assert_eq!(dev.texture_contents(handle).unwrap(), texels.as_slice());
        assert_eq!(dev.counters().texture_bytes_written, 16 + 16);
        assert!(!cache.sync_mutable_texture(&mut dev, tex.identity()).unwrap());
    }

    #[test]
    fn failed_widening_takes_no_reference() {
        let (mut dev, mut cache) = setup();
        let buf = named("buf-1", 16);
        let handle = cache.add_buffer(&mut dev, &buf, VERTEX).unwrap();

        dev.refuse_buffers(1);
        let err = cache.add_buffer(&mut dev, &buf, wgpu::BufferUsages::UNIFORM).unwrap_err();
        assert!(matches!(err, SyncError::Device(_)));
        let record = cache.buffer(buf.identity()).unwrap();
        assert_eq!(record.reference_count, 1);
        assert_eq!(record.handle, handle);

        cache.remove_buffer(&mut dev, buf.identity()).unwrap();
        assert!(cache.buffer(buf.identity()).is_none());
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn corrupt_region_header_is_rejected() {
        let (mut dev, mut cache) = setup();
        let tex = MutableTexture::create(2, 2, wgpu::TextureFormat::R8Unorm).unwrap();
        cache.add_mutable_texture(&mut dev, &tex).unwrap();

        let bad = crate::shared::TextureRegion {
            origin_x: 1,
            origin_y: 0,
            byte_offset: 1,
            bytes_per_row: 2,
            size_x: 2,
            size_y: 1,
        };
        tex.buffer().write_pod(&bad, 0).unwrap();
        let err = cache.sync_mutable_texture(&mut dev, tex.identity()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRegion { .. }));
    }

    #[test]
    fn samplers_dedup_and_stay_cached() {
        let (mut dev, mut cache) = setup();
        let mut fancy = SamplerOptions::nearest();
        fancy.anisotropy_clamp = 4;

        let a = cache.add_sampler(&mut dev, SamplerOptions::nearest()).unwrap();
        let b = cache.add_sampler(&mut dev, fancy).unwrap();
        assert_eq!(a, b);
        assert_eq!(dev.counters().samplers_created, 1);

        cache.release_sampler(fancy).unwrap();
        cache.release_sampler(SamplerOptions::nearest()).unwrap();
        let record = cache.sampler(SamplerOptions::nearest()).unwrap();
        assert_eq!(record.reference_count, 0);
        assert!(cache.release_sampler(SamplerOptions::linear()).is_err());
    }

    #[test]
    fn sync_all_reports_what_moved() {
        let (mut dev, mut cache) = setup();
        let a = named("a", 4);
        let b = named("b", 4);
        cache.add_buffer(&mut dev, &a, VERTEX).unwrap();
        cache.add_buffer(&mut dev, &b, VERTEX).unwrap();

        a.write(&[1], 0).unwrap();
        let report = cache.sync_all(&mut dev).unwrap();
        assert_eq!((report.buffers, report.textures, report.bytes), (1, 0, 4));
        assert_eq!(cache.sync_all(&mut dev).unwrap(), SyncReport::default());

        cache.clear(&mut dev);
        assert!(cache.is_empty());
        assert_eq!(dev.live_buffers(), 0);
    }
}
