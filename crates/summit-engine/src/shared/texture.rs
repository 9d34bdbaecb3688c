use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::error::{Result, SyncError};

use super::identity::ResourceId;
use super::versioned::VersionedBuffer;

/// Bytes reserved at the head of a mutable texture payload for the dirty region.
pub const TEXTURE_REGION_LEN: usize = std::mem::size_of::<TextureRegion>();

/// Dirty sub-rectangle header of a mutable texture payload (16 bytes).
///
///  offset  0  origin_x       u16
///  offset  2  origin_y       u16
///  offset  4  byte_offset    u32   relative to the first texel byte
///  offset  8  bytes_per_row  u32
///  offset 12  size_x         u16
///  offset 14  size_y         u16
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TextureRegion {
    pub origin_x: u16,
    pub origin_y: u16,
    pub byte_offset: u32,
    pub bytes_per_row: u32,
    pub size_x: u16,
    pub size_y: u16,
}

impl TextureRegion {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size_x == 0 || self.size_y == 0
    }

    /// Number of texel bytes the region spans, starting at `byte_offset`.
    pub fn span(&self, bytes_per_texel: u32) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let rows = u64::from(self.size_y);
        u64::from(self.bytes_per_row) * (rows - 1) + u64::from(self.size_x) * u64::from(bytes_per_texel)
    }
}

/// External identifier of an immutable texture (asset path, atlas name, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(Arc<str>);

impl TextureId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TextureId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Texture uploaded once at creation and never written again.
#[derive(Debug, Clone)]
pub struct ImmutableTexture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    /// Tightly packed rows.
    pub pixels: Arc<[u8]>,
}

impl ImmutableTexture {
    pub fn new(
        id: TextureId,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        pixels: impl Into<Arc<[u8]>>,
    ) -> Result<Self> {
        let pixels = pixels.into();
        let expected = u64::from(width) * u64::from(height) * u64::from(bytes_per_texel(format)?);
        if pixels.len() as u64 != expected {
            return Err(SyncError::InvalidLayout(format!(
                "texture `{id}` is {width}x{height} {format:?} ({expected} bytes), got {} bytes",
                pixels.len()
            )));
        }
        Ok(Self {
            id,
            width,
            height,
            format,
            pixels,
        })
    }

    #[inline]
    pub fn bytes_per_row(&self) -> u32 {
        self.pixels.len() as u32 / self.height.max(1)
    }
}

/// Texture backed by a [`VersionedBuffer`] whose payload is
/// `[TextureRegion][tightly packed texels]`.
///
/// The logic thread edits texels through [`write_region`](Self::write_region);
/// the render thread uploads only the rectangle named by the header.
#[derive(Debug, Clone)]
pub struct MutableTexture {
    buffer: VersionedBuffer,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl MutableTexture {
    /// Allocates a zeroed texture with a random identity.
    pub fn create(width: u32, height: u32, format: wgpu::TextureFormat) -> Result<Self> {
        Self::with_identity(ResourceId::random(), width, height, format)
    }

    pub fn with_identity(
        id: ResourceId,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 || width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
            return Err(SyncError::InvalidLayout(format!(
                "mutable texture size {width}x{height} must be within 1..=65535"
            )));
        }
        let bpt = bytes_per_texel(format)?;
        let texels = width as usize * height as usize * bpt as usize;
        let buffer = VersionedBuffer::with_identity(id, TEXTURE_REGION_LEN + texels);

        let texture = Self {
            buffer,
            width,
            height,
            format,
        };
        // Marks the whole surface dirty so the first sync after creation is a full write.
        texture.buffer.update(|payload| {
            payload[..TEXTURE_REGION_LEN].copy_from_slice(bytemuck::bytes_of(&texture.full_region()));
        });
        Ok(texture)
    }

    /// Wraps an existing buffer, validating that its payload fits the texture.
    pub fn from_buffer(
        buffer: VersionedBuffer,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let bpt = bytes_per_texel(format)?;
        let needed = TEXTURE_REGION_LEN + width as usize * height as usize * bpt as usize;
        if buffer.payload_len() < needed {
            return Err(SyncError::InvalidLayout(format!(
                "buffer {} holds {} payload bytes, texture needs {needed}",
                buffer.identity(),
                buffer.payload_len()
            )));
        }
        Ok(Self {
            buffer,
            width,
            height,
            format,
        })
    }

    #[inline]
    pub fn identity(&self) -> ResourceId {
        self.buffer.identity()
    }

    #[inline]
    pub fn buffer(&self) -> &VersionedBuffer {
        &self.buffer
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Bytes per texel of the texture format.
    pub fn bytes_per_texel(&self) -> u32 {
        // Validated at construction.
        bytes_per_texel(self.format).unwrap_or(4)
    }

    /// Tightly packed row pitch of the texel area.
    #[inline]
    pub fn row_pitch(&self) -> u32 {
        self.width * self.bytes_per_texel()
    }

    pub(crate) fn full_region(&self) -> TextureRegion {
        TextureRegion {
            origin_x: 0,
            origin_y: 0,
            byte_offset: 0,
            bytes_per_row: self.row_pitch(),
            size_x: self.width as u16,
            size_y: self.height as u16,
        }
    }

    /// Copies `rows` (packed at `src_bytes_per_row`) into the rectangle at
    /// `origin` and records that rectangle as dirty, in a single commit.
    ///
    /// Returns the new buffer version.
    pub fn write_region(
        &self,
        origin: (u16, u16),
        size: (u16, u16),
        rows: &[u8],
        src_bytes_per_row: u32,
    ) -> Result<u32> {
        let (ox, oy) = (u32::from(origin.0), u32::from(origin.1));
        let (sx, sy) = (u32::from(size.0), u32::from(size.1));
        if ox + sx > self.width || oy + sy > self.height {
            return Err(SyncError::InvalidRegion {
                id: self.identity(),
                reason: format!(
                    "{sx}x{sy} at ({ox},{oy}) exceeds {}x{}",
                    self.width, self.height
                ),
            });
        }

        let bpt = self.bytes_per_texel();
        let row_bytes = (sx * bpt) as usize;
        if sy > 0 && (src_bytes_per_row < sx * bpt || rows.len() < src_bytes_per_row as usize * (sy as usize - 1) + row_bytes) {
            return Err(SyncError::InvalidLayout(format!(
                "{} source bytes at pitch {src_bytes_per_row} cannot fill {sx}x{sy} texels",
                rows.len()
            )));
        }

        let pitch = self.row_pitch();
        let region = TextureRegion {
            origin_x: origin.0,
            origin_y: origin.1,
            byte_offset: oy * pitch + ox * bpt,
            bytes_per_row: pitch,
            size_x: size.0,
            size_y: size.1,
        };

        let (version, ()) = self.buffer.update(|payload| {
            let (header, texels) = payload.split_at_mut(TEXTURE_REGION_LEN);
            for row in 0..sy as usize {
                let src = row * src_bytes_per_row as usize;
                let dst = region.byte_offset as usize + row * pitch as usize;
                texels[dst..dst + row_bytes].copy_from_slice(&rows[src..src + row_bytes]);
            }
            header.copy_from_slice(bytemuck::bytes_of(&region));
        });
        Ok(version)
    }
}

/// Reads the dirty-region header from a mutable texture payload.
pub fn read_region(payload: &[u8]) -> Option<TextureRegion> {
    payload
        .get(..TEXTURE_REGION_LEN)
        .map(bytemuck::pod_read_unaligned::<TextureRegion>)
}

/// Bytes per texel for uncompressed color formats.
pub fn bytes_per_texel(format: wgpu::TextureFormat) -> Result<u32> {
    format
        .block_copy_size(None)
        .filter(|_| format.block_dimensions() == (1, 1))
        .ok_or_else(|| SyncError::InvalidLayout(format!("unsupported texture format {format:?}")))
}
