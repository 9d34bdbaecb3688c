mod level;
mod render;

use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};
use clap::Parser;
use summit_engine::device::{GpuDevice, GpuInit, RecordingDevice, WgpuCanvas, WgpuDevice};
use summit_engine::logging::{LoggingConfig, init_logging};
use summit_engine::paint::Color;
use summit_engine::server::{Reply, ServerHandle, channel};

use crate::level::Level;
use crate::render::RenderSummary;

/// Drives a small platformer level through the summit resource server.
#[derive(Debug, Parser)]
#[command(name = "summit-studio", version)]
struct Args {
    /// Render with the recording backend instead of the GPU.
    #[arg(long)]
    headless: bool,

    /// Logic frames to simulate before tearing the level down.
    #[arg(long, default_value_t = 180)]
    frames: u32,

    /// Canvas size in pixels.
    #[arg(long, default_value_t = 240)]
    width: u32,
    #[arg(long, default_value_t = 160)]
    height: u32,

    /// Background as `#RRGGBB` or `#RRGGBBAA`.
    #[arg(long, default_value = "#1d2b53")]
    background: String,

    /// Target frame rate for both threads.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// `env_logger` filter, e.g. `summit_engine=debug`.
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(match &args.log {
        Some(filter) => LoggingConfig::with_filter(filter.clone()),
        None => LoggingConfig::default(),
    });
    ensure!(args.width > 0 && args.height > 0, "canvas size must be non-zero");
    ensure!(args.fps > 0, "--fps must be positive");
    let background = Color::from_hex(&args.background)
        .ok_or_else(|| anyhow!("`{}` is not a #RRGGBB[AA] color", args.background))?;

    let summary = if args.headless {
        run(RecordingDevice::new(), (args.width, args.height), background, &args)?
    } else {
        match WgpuDevice::new_blocking(GpuInit::default()) {
            Ok(device) => {
                let canvas = WgpuCanvas::Offscreen {
                    width: args.width,
                    height: args.height,
                };
                run(device, canvas, background, &args)?
            }
            Err(err) => {
                log::warn!("no GPU available ({err:#}); falling back to the recording backend");
                run(RecordingDevice::new(), (args.width, args.height), background, &args)?
            }
        }
    };

    print_summary(&summary);
    Ok(())
}

/// Spawns the render thread with `device`, then plays the level from this thread.
fn run<D>(device: D, canvas: D::Canvas, background: Color, args: &Args) -> Result<RenderSummary>
where
    D: GpuDevice + Send + 'static,
    D::Canvas: Send + 'static,
{
    let frame_interval = Duration::from_secs(1) / args.fps;
    let (handle, inbox) = channel();
    let renderer = thread::Builder::new()
        .name("summit-render".into())
        .spawn(move || render::run(device, inbox, frame_interval))
        .context("spawning render thread")?;

    let played = play(&handle, canvas, background, args);
    drop(handle);

    let rendered = renderer
        .join()
        .map_err(|_| anyhow!("render thread panicked"))?;
    match (played, rendered) {
        (_, Err(err)) => {
            log::error!("render thread failed: {err:#}");
            Err(err)
        }
        (Err(err), Ok(_)) => Err(err),
        (Ok(()), Ok(summary)) => Ok(summary),
    }
}

/// Logic-thread body: wait for the canvas, build the level, step it, tear it down.
fn play<C>(handle: &ServerHandle<C>, canvas: C, background: Color, args: &Args) -> Result<()> {
    let ready = handle.init_canvas(canvas, background)?;
    match ready.recv_timeout(Duration::from_secs(10)) {
        Ok(Reply::Ready) => {}
        Ok(Reply::Failed(reason)) => bail!("canvas initialization failed: {reason}"),
        Err(RecvTimeoutError::Timeout) => bail!("render thread did not answer within 10s"),
        Err(RecvTimeoutError::Disconnected) => bail!("render thread exited during canvas initialization"),
    }

    let level = Level::build(handle, (args.width, args.height), wgpu::TextureFormat::Rgba8UnormSrgb)?;
    let frame_interval = Duration::from_secs(1) / args.fps;
    for frame in 1..=args.frames {
        level.step(frame)?;
        thread::sleep(frame_interval);
    }
    level.teardown(handle)
}

fn print_summary(summary: &RenderSummary) {
    let stats = &summary.stats;
    println!();
    println!("  summit-studio");
    println!("  ─────────────────────────────────────────");
    println!("  frames rendered      {:>8}", summary.frames);
    println!("  frames skipped       {:>8}", summary.skipped);
    println!("  draws                {:>8}", summary.draws);
    println!("  stale members        {:>8}", summary.stale_members);
    println!("  pipelines compiled   {:>8}", summary.pipelines);
    println!("  ─────────────────────────────────────────");
    println!("  buffers   created {:>5}  destroyed {:>5}", stats.buffers_created, stats.buffers_destroyed);
    println!("  textures  created {:>5}  destroyed {:>5}", stats.textures_created, stats.textures_destroyed);
    println!("  samplers  created {:>5}", stats.samplers_created);
    println!("  uploads   buffers {:>5}  textures  {:>5}", stats.buffer_uploads, stats.texture_uploads);
    println!("  bytes uploaded    {:>11}", stats.bytes_uploaded);
    println!();
}
