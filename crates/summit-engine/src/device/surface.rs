//! Window-surface configuration and recovery for [`WgpuDevice`](super::WgpuDevice).

use super::SurfaceErrorAction;
use super::init::GpuInit;

const SRGB_FORMATS: [wgpu::TextureFormat; 2] = [
    wgpu::TextureFormat::Bgra8UnormSrgb,
    wgpu::TextureFormat::Rgba8UnormSrgb,
];

/// Builds the surface configuration for a `width` x `height` canvas, or
/// `None` when the surface reports no usable format.
///
/// Requested modes the surface does not support fall back to the first
/// supported one (FIFO for presentation, which every surface has).
pub(crate) fn surface_config(
    caps: &wgpu::SurfaceCapabilities,
    init: &GpuInit,
    width: u32,
    height: u32,
) -> Option<wgpu::SurfaceConfiguration> {
    let srgb = init
        .prefer_srgb
        .then(|| SRGB_FORMATS.into_iter().find(|f| caps.formats.contains(f)))
        .flatten();
    let format = srgb.or_else(|| caps.formats.first().copied())?;

    let present_mode = if caps.present_modes.contains(&init.present_mode) {
        init.present_mode
    } else {
        wgpu::PresentMode::Fifo
    };
    let alpha_mode = init
        .alpha_mode
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    Some(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode,
        alpha_mode,
        view_formats: Vec::new(),
        desired_maximum_frame_latency: init.desired_maximum_frame_latency,
    })
}

/// Reconfigures for a new size. Minimized windows report 0; those keep the
/// previous configuration until a real size arrives.
pub(crate) fn resize(
    surface: &wgpu::Surface<'_>,
    device: &wgpu::Device,
    config: &mut wgpu::SurfaceConfiguration,
    width: u32,
    height: u32,
) {
    if width > 0 && height > 0 && (config.width, config.height) != (width, height) {
        config.width = width;
        config.height = height;
        surface.configure(device, config);
    }
}

/// Decides what a failed `get_current_texture` means for this frame,
/// reconfiguring the surface when it was lost or outdated.
pub(crate) fn recover(
    surface: &wgpu::Surface<'_>,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    err: wgpu::SurfaceError,
) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
            surface.configure(device, config);
            SurfaceErrorAction::Reconfigured
        }
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: &[wgpu::TextureFormat]) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats: formats.to_vec(),
            present_modes: vec![wgpu::PresentMode::Fifo],
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            ..Default::default()
        }
    }

    #[test]
    fn prefers_srgb_then_first_format() {
        let init = GpuInit::default();
        let both = caps(&[wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8UnormSrgb]);
        let config = surface_config(&both, &init, 0, 10).unwrap();
        assert_eq!(config.format, wgpu::TextureFormat::Rgba8UnormSrgb);
        assert_eq!((config.width, config.height), (1, 10));

        let linear = GpuInit {
            prefer_srgb: false,
            ..GpuInit::default()
        };
        assert_eq!(
            surface_config(&both, &linear, 1, 1).unwrap().format,
            wgpu::TextureFormat::Bgra8Unorm
        );
        assert!(surface_config(&caps(&[]), &init, 1, 1).is_none());
    }

    #[test]
    fn unsupported_modes_fall_back() {
        let init = GpuInit {
            present_mode: wgpu::PresentMode::Mailbox,
            alpha_mode: Some(wgpu::CompositeAlphaMode::PreMultiplied),
            ..GpuInit::default()
        };
        let config = surface_config(&caps(&[wgpu::TextureFormat::Bgra8UnormSrgb]), &init, 4, 4).unwrap();
        assert_eq!(config.present_mode, wgpu::PresentMode::Fifo);
        assert_eq!(config.alpha_mode, wgpu::CompositeAlphaMode::Opaque);
    }
}
