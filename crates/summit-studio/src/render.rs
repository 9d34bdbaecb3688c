//! Render-thread loop: drain the control channel, then render.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use summit_engine::cache::CacheStats;
use summit_engine::device::{FrameOutcome, GpuDevice, SurfaceErrorAction};
use summit_engine::server::{ResourceServer, ServerConfig, ServerInbox};

#[derive(Debug, Default)]
pub struct RenderSummary {
    pub frames: u64,
    pub skipped: u64,
    pub draws: u64,
    pub stale_members: u64,
    pub stats: CacheStats,
    pub pipelines: usize,
}

/// Runs until every [`ServerHandle`](summit_engine::server::ServerHandle)
/// is dropped, then tears the server down.
pub fn run<D: GpuDevice>(device: D, inbox: ServerInbox<D::Canvas>, frame_interval: Duration) -> Result<RenderSummary> {
    let mut server = ResourceServer::new(device, ServerConfig::default());
    let mut summary = RenderSummary::default();

    loop {
        if !server.is_canvas_ready() {
            // Nothing to draw yet; block instead of spinning.
            let Ok(message) = inbox.next_blocking() else {
                break;
            };
            server.apply(message).context("applying control message")?;
        }

        let status = server.pump(&inbox).context("applying control message")?;
        if server.is_canvas_ready() {
            let report = server.render_frame().context("rendering frame")?;
            summary.frames += 1;
            summary.draws += u64::from(report.draws);
            summary.stale_members += u64::from(report.stale_members);
            match report.outcome {
                FrameOutcome::Presented => {}
                FrameOutcome::Skipped(SurfaceErrorAction::Fatal) => bail!("surface lost (fatal)"),
                FrameOutcome::Skipped(action) => {
                    log::warn!("frame {} skipped: {action:?}", report.frame);
                    summary.skipped += 1;
                }
            }
        }
        if status.disconnected {
            break;
        }
        thread::sleep(frame_interval);
    }

    summary.stats = *server.stats();
    summary.pipelines = server.pipelines().len();
    drop(server.into_device());
    Ok(summary)
}
