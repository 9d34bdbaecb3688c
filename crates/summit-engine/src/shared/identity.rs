use core::fmt;

use crate::error::{Result, SyncError};

/// Width of the identity field at the head of every shared block.
pub const IDENTITY_LEN: usize = 36;

/// Fixed-width ASCII identity tag.
///
/// Freshly created buffers carry a hyphenated UUID, which fills the 36 bytes
/// exactly. Shorter caller-chosen names are NUL-padded.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ResourceId([u8; IDENTITY_LEN]);

impl ResourceId {
    /// Generates a random v4 UUID identity.
    pub fn random() -> Self {
        let mut bytes = [0u8; IDENTITY_LEN];
        let text = uuid::Uuid::new_v4().hyphenated().to_string();
        bytes.copy_from_slice(text.as_bytes());
        Self(bytes)
    }

    /// Builds an identity from caller-chosen text (e.g. `"buf-1"`).
    pub fn new(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(SyncError::InvalidIdentity("empty identity".into()));
        }
        if text.len() > IDENTITY_LEN {
            return Err(SyncError::InvalidIdentity(format!(
                "`{text}` is {} bytes, max {IDENTITY_LEN}",
                text.len()
            )));
        }
        if !text.is_ascii() || text.bytes().any(|b| b == 0) {
            return Err(SyncError::InvalidIdentity(format!("`{text}` is not printable ASCII")));
        }

        let mut bytes = [0u8; IDENTITY_LEN];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        Ok(Self(bytes))
    }

    /// Decodes the identity field of a raw block.
    pub fn from_bytes(raw: &[u8; IDENTITY_LEN]) -> Result<Self> {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(IDENTITY_LEN);
        if end == 0 {
            return Err(SyncError::InvalidIdentity("empty identity field".into()));
        }
        if !raw[..end].is_ascii() || raw[end..].iter().any(|&b| b != 0) {
            return Err(SyncError::InvalidIdentity("identity field is not NUL-padded ASCII".into()));
        }
        Ok(Self(*raw))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Identity text without padding.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(IDENTITY_LEN);
        // Constructors only admit ASCII, which is always valid UTF-8.
        core::str::from_utf8(&self.0[..end]).unwrap_or("<invalid>")
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.as_str())
    }
}
