/// Sampler option tuple, used as the sampler cache key.
///
/// Build with the constructors or struct syntax; the cache canonicalizes
/// before lookup so equivalent tuples share one sampler.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SamplerOptions {
    pub address_mode: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::MipmapFilterMode,
    pub compare: Option<wgpu::CompareFunction>,
    pub anisotropy_clamp: u16,
}

impl SamplerOptions {
    /// Nearest filtering, clamped: pixel-art sprites and tilemaps.
    pub const fn nearest() -> Self {
        Self {
            address_mode: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            compare: None,
            anisotropy_clamp: 1,
        }
    }

    pub const fn linear() -> Self {
        Self {
            address_mode: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            compare: None,
            anisotropy_clamp: 1,
        }
    }

    pub const fn with_address_mode(mut self, mode: wgpu::AddressMode) -> Self {
        self.address_mode = mode;
        self
    }

    /// Anisotropy is clamped to 1..=16 and forced to 1 unless every filter is linear.
    pub fn canonical(mut self) -> Self {
        let all_linear = self.mag_filter == wgpu::FilterMode::Linear
            && self.min_filter == wgpu::FilterMode::Linear
            && self.mipmap_filter == wgpu::MipmapFilterMode::Linear;
        self.anisotropy_clamp = if all_linear {
            self.anisotropy_clamp.clamp(1, 16)
        } else {
            1
        };
        self
    }
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self::linear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anisotropy_needs_linear_filtering() {
        let mut opts = SamplerOptions::nearest();
        opts.anisotropy_clamp = 8;
        assert_eq!(opts.canonical(), SamplerOptions::nearest());

        let mut opts = SamplerOptions::linear();
        opts.anisotropy_clamp = 64;
        assert_eq!(opts.canonical().anisotropy_clamp, 16);
        opts.anisotropy_clamp = 0;
        assert_eq!(opts.canonical(), SamplerOptions::linear());
    }
}
