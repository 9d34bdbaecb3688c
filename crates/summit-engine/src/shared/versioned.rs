use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::RwLock;

use crate::error::{Result, SyncError};

use super::identity::{IDENTITY_LEN, ResourceId};

/// Byte offset of the version counter inside a block.
pub const VERSION_OFFSET: usize = IDENTITY_LEN;
/// Bytes preceding the payload: identity + version.
pub const HEADER_LEN: usize = VERSION_OFFSET + 4;

/// Shared memory block carrying an identity, a dirty-version counter and a payload.
///
/// Layout (little-endian version):
///
/// ```text
///  [0..36)   identity   ASCII, NUL-padded
///  [36..40)  version    u32, +1 per committed write, wraps at u32::MAX
///  [40..)    payload
/// ```
///
/// Cloning the handle shares the block. The logic thread is the only writer;
/// the render thread only reads. The block sits behind a reader-writer lock,
/// so a reader always observes a payload together with the version of the
/// write that produced it.
#[derive(Clone)]
pub struct VersionedBuffer {
    inner: Arc<Block>,
}

struct Block {
    id: ResourceId,
    bytes: RwLock<Box<[u8]>>,
}

impl VersionedBuffer {
    /// Allocates a block with a random identity, version 0 and a zeroed payload.
    pub fn create(size: usize) -> Self {
        Self::with_identity(ResourceId::random(), size)
    }

    /// Allocates a block with a caller-chosen identity.
    pub fn with_identity(id: ResourceId, size: usize) -> Self {
        let mut bytes = vec![0u8; HEADER_LEN + size].into_boxed_slice();
        bytes[..IDENTITY_LEN].copy_from_slice(id.as_bytes());
        Self {
            inner: Arc::new(Block {
                id,
                bytes: RwLock::new(bytes),
            }),
        }
    }

    /// Allocates a block whose payload starts as `contents`.
    pub fn from_payload(id: ResourceId, contents: &[u8]) -> Self {
        let buffer = Self::with_identity(id, contents.len());
        buffer.inner.bytes.write()[HEADER_LEN..].copy_from_slice(contents);
        buffer
    }

    /// Adopts a raw block in the shared layout, keeping its identity and version.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(SyncError::InvalidLayout(format!(
                "block of {} bytes is shorter than the {HEADER_LEN}-byte header",
                raw.len()
            )));
        }
        let mut field = [0u8; IDENTITY_LEN];
        field.copy_from_slice(&raw[..IDENTITY_LEN]);
        let id = ResourceId::from_bytes(&field)?;

        Ok(Self {
            inner: Arc::new(Block {
                id,
                bytes: RwLock::new(raw.to_vec().into_boxed_slice()),
            }),
        })
    }

    /// Identity assigned at creation. Never changes.
    #[inline]
    pub fn identity(&self) -> ResourceId {
        self.inner.id
    }

    /// Current version of the block.
    pub fn peek_version(&self) -> u32 {
        read_version(&self.inner.bytes.read())
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.inner.bytes.read().len() - HEADER_LEN
    }

    /// Copies `bytes` into the payload at `offset`, then bumps the version.
    ///
    /// A zero-length write still bumps the version; it is how callers commit
    /// after a series of edits made through [`update`](Self::update) elsewhere.
    /// Returns the new version.
    pub fn write(&self, bytes: &[u8], offset: usize) -> Result<u32> {
        let mut block = self.inner.bytes.write();
        let capacity = block.len() - HEADER_LEN;
        let end = offset.checked_add(bytes.len()).filter(|&end| end <= capacity);
        let Some(end) = end else {
            return Err(SyncError::OutOfBounds {
                id: self.inner.id,
                offset,
                len: bytes.len(),
                capacity,
            });
        };

        block[HEADER_LEN + offset..HEADER_LEN + end].copy_from_slice(bytes);
        Ok(bump_version(&mut block))
    }

    /// Writes a plain-old-data value at `offset`.
    pub fn write_pod<T: Pod>(&self, value: &T, offset: usize) -> Result<u32> {
        self.write(bytemuck::bytes_of(value), offset)
    }

    /// Edits the payload in place under a single version bump.
    pub fn update<R>(&self, edit: impl FnOnce(&mut [u8]) -> R) -> (u32, R) {
        let mut block = self.inner.bytes.write();
        let out = edit(&mut block[HEADER_LEN..]);
        (bump_version(&mut block), out)
    }

    /// Reads the payload together with the version it belongs to.
    pub fn read<R>(&self, f: impl FnOnce(u32, &[u8]) -> R) -> R {
        let block = self.inner.bytes.read();
        f(read_version(&block), &block[HEADER_LEN..])
    }

    /// Reads a plain-old-data value at `offset`, if it fits.
    pub fn read_pod<T: Pod>(&self, offset: usize) -> Option<T> {
        self.read(|_, payload| {
            let end = offset.checked_add(std::mem::size_of::<T>())?;
            payload
                .get(offset..end)
                .map(bytemuck::pod_read_unaligned::<T>)
        })
    }

    /// Copies the whole block in its shared layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.bytes.read().to_vec()
    }

    /// Whether two handles share the same block.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl core::fmt::Debug for VersionedBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VersionedBuffer")
            .field("id", &self.inner.id)
            .field("version", &self.peek_version())
            .field("payload_len", &self.payload_len())
            .finish()
    }
}

/// Whether a reader that last saw `last_seen` must treat the payload as new.
///
/// Any difference counts as a change, so the wrap from `u32::MAX` to 0 is
/// detected like every other step.
#[inline]
pub fn has_advanced(last_seen: u32, live: u32) -> bool {
    live != last_seen
}

fn read_version(block: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&block[VERSION_OFFSET..HEADER_LEN]);
    u32::from_le_bytes(raw)
}

fn bump_version(block: &mut [u8]) -> u32 {
    let next = read_version(block).wrapping_add(1);
    block[VERSION_OFFSET..HEADER_LEN].copy_from_slice(&next.to_le_bytes());
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, size: usize) -> VersionedBuffer {
        VersionedBuffer::with_identity(ResourceId::new(name).unwrap(), size)
    }

    #[test]
    fn starts_at_version_zero_with_zeroed_payload() {
        let buf = VersionedBuffer::create(8);
        assert_eq!(buf.peek_version(), 0);
        assert_eq!(buf.payload_len(), 8);
        buf.read(|_, payload| assert!(payload.iter().all(|&b| b == 0)));
    }

    #[test]
    fn write_copies_then_bumps() {
        let buf = named("buf-1", 8);
        assert_eq!(buf.write(&[1, 2, 3], 2).unwrap(), 1);
        assert_eq!(buf.write(&[9], 0).unwrap(), 2);
        buf.read(|version, payload| {
            assert_eq!(version, 2);
            assert_eq!(payload, &[9, 0, 1, 2, 3, 0, 0, 0]);
        });
    }

    #[test]
    fn zero_length_write_commits() {
        let buf = named("commit", 4);
        buf.write(&[], 0).unwrap();
        buf.write(&[], 4).unwrap();
        assert_eq!(buf.peek_version(), 2);
    }

    #[test]
    fn out_of_range_write_leaves_version_alone() {
        let buf = named("small", 4);
        let err = buf.write(&[0; 3], 2).unwrap_err();
        assert!(matches!(err, SyncError::OutOfBounds { capacity: 4, .. }));
        assert!(buf.write(&[], usize::MAX).is_err());
        assert_eq!(buf.peek_version(), 0);
    }

    #[test]
    fn version_wraps_to_zero() {
        let mut raw = named("wrap", 2).to_bytes();
        raw[VERSION_OFFSET..HEADER_LEN].copy_from_slice(&u32::MAX.to_le_bytes());
        let buf = VersionedBuffer::from_bytes(&raw).unwrap();

        assert_eq!(buf.peek_version(), u32::MAX);
        assert_eq!(buf.write(&[1], 0).unwrap(), 0);
        assert!(has_advanced(u32::MAX, 0));
        assert!(!has_advanced(7, 7));
    }

    #[test]
    fn raw_layout_round_trips_identity_and_version() {
        let buf = named("layout", 4);
        buf.write(&[0xAA; 4], 0).unwrap();

        let raw = buf.to_bytes();
        assert_eq!(&raw[..6], b"layout");
        assert_eq!(&raw[VERSION_OFFSET..HEADER_LEN], &1u32.to_le_bytes());
        assert_eq!(&raw[HEADER_LEN..], &[0xAA; 4]);

        let adopted = VersionedBuffer::from_bytes(&raw).unwrap();
        assert_eq!(adopted.identity(), buf.identity());
        assert_eq!(adopted.peek_version(), 1);
        assert!(VersionedBuffer::from_bytes(&raw[..HEADER_LEN - 1]).is_err());
    }

    #[test]
    fn update_bumps_once() {
        let buf = named("batched", 4);
        let (version, ()) = buf.update(|payload| {
            payload[0] = 1;
            payload[3] = 4;
        });
        assert_eq!(version, 1);
        assert_eq!(buf.read_pod::<[u8; 4]>(0), Some([1, 0, 0, 4]));
        assert_eq!(buf.read_pod::<u32>(2), None);
    }

    #[test]
    fn clones_share_the_block() {
        let a = named("shared", 4);
        let b = a.clone();
        a.write_pod(&7u32, 0).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(b.read_pod::<u32>(0), Some(7));
        assert_eq!(b.peek_version(), 1);
    }
}
