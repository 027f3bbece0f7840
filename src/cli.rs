use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::control::{describe_params, parse_assignment};
use crate::frame::{tick, FixedRateClock, FrameContext, Viewport};
use crate::gpu::readback::OffscreenTarget;
use crate::gpu::{GpuBackend, GpuContext, OFFSCREEN_FORMAT};
use crate::params::ParamSurface;
use crate::scene::Scene;
use crate::software::{Framebuffer, SoftwareBackend};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive window (default)
    Window {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Render frames to disk
    Render(RenderArgs),
    /// Print the tunable parameters
    Params {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RenderArgs {
    /// Output directory for frames
    #[arg(long)]
    out: PathBuf,

    /// Number of frames to render
    #[arg(long, default_value_t = 1)]
    frames: u32,

    /// Frames per second
    #[arg(long, default_value_t = 60.0)]
    fps: f32,

    /// Output width (defaults to the configured window width)
    #[arg(long)]
    width: Option<u32>,

    /// Output height (defaults to the configured window height)
    #[arg(long)]
    height: Option<u32>,

    /// Render on the CPU instead of the GPU
    #[arg(long)]
    software: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parameter override, e.g. `--set lensing_mass=0.05` (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    overrides: Vec<String>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => crate::app::run(AppConfig::default()),
        Some(Commands::Window { config }) => crate::app::run(AppConfig::load_or_default(config.as_deref())?),
        Some(Commands::Render(args)) => render_offline(args),
        Some(Commands::Params { config }) => {
            let config = AppConfig::load_or_default(config.as_deref())?;
            println!("{}", describe_params(&ParamSurface::new(config.params)));
            Ok(())
        }
    }
}

/// Fold `name=value` overrides into the configured parameters.
fn apply_overrides(config: &mut AppConfig, overrides: &[String]) -> Result<()> {
    let mut surface = ParamSurface::new(config.params.clone());
    for raw in overrides {
        let update = parse_assignment(raw).with_context(|| format!("Invalid --set '{}'", raw))?;
        surface
            .try_apply(update)
            .map_err(|rejection| anyhow!("Invalid --set '{}': {}", raw, rejection))?;
    }
    config.params = surface.params().clone();
    Ok(())
}

fn render_offline(args: RenderArgs) -> Result<()> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    apply_overrides(&mut config, &args.overrides)?;

    let width = args.width.unwrap_or(config.window.width);
    let height = args.height.unwrap_or(config.window.height);
    // Offline frames are rendered at their pixel size
    let viewport = Viewport::new(width as f64, height as f64, 1.0, config.max_pixel_ratio as f64);

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;

    log::info!(
        "Rendering {} frames at {}x{}, {} fps to {}",
        args.frames,
        width,
        height,
        args.fps,
        args.out.display()
    );

    if args.software {
        return render_software(&config, viewport, &args);
    }
    match pollster::block_on(GpuContext::headless()) {
        Ok(gpu) => render_gpu(&config, gpu, viewport, &args),
        Err(e) => {
            log::warn!("No GPU available ({:#}), using the software renderer", e);
            render_software(&config, viewport, &args)
        }
    }
}

fn render_software(config: &AppConfig, viewport: Viewport, args: &RenderArgs) -> Result<()> {
    let mut ctx = FrameContext::new(config, SoftwareBackend::default(), viewport)?;
    let mut target = Framebuffer::default();

    for (i, elapsed) in FixedRateClock::new(args.fps).take(args.frames as usize).enumerate() {
        let report = tick(&mut ctx, elapsed, &mut target)?;
        save_frame(&args.out, i, report.extent.width, report.extent.height, target.to_rgba8())?;
    }
    println!("Rendered {} frames to {}", args.frames, args.out.display());
    Ok(())
}

fn render_gpu(config: &AppConfig, gpu: GpuContext, viewport: Viewport, args: &RenderArgs) -> Result<()> {
    let scene = Scene::new(&config.stars);
    let extent = viewport.extent(config.params.resolution_scale);
    let GpuContext { device, queue, .. } = gpu;
    let backend = GpuBackend::new(device, queue, OFFSCREEN_FORMAT, extent, &scene)?;
    let mut ctx = FrameContext::with_scene(config, scene, backend, viewport)?;
    let mut offscreen = OffscreenTarget::new(ctx.composer.backend().device(), extent);

    for (i, elapsed) in FixedRateClock::new(args.fps).take(args.frames as usize).enumerate() {
        tick(&mut ctx, elapsed, offscreen.target_mut())?;
        let backend = ctx.composer.backend();
        let pixels = offscreen.read_rgba8(backend.device(), backend.queue())?;
        save_frame(&args.out, i, extent.width, extent.height, pixels)?;
    }
    println!("Rendered {} frames to {}", args.frames, args.out.display());
    Ok(())
}

fn save_frame(dir: &Path, index: usize, width: u32, height: u32, pixels: Vec<u8>) -> Result<()> {
    let image = image::RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("Frame {} has the wrong pixel count for {}x{}", index, width, height))?;
    let path = dir.join(format!("frame_{:05}.png", index));
    image
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::debug!("Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_args_parse() {
        let cli = Cli::try_parse_from([
            "event-horizon",
            "render",
            "--out",
            "frames",
            "--frames",
            "3",
            "--software",
            "--set",
            "lensing_mass=0.05",
            "--set",
            "bloom_enabled=off",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Render(args)) => {
                assert_eq!(args.frames, 3);
                assert!(args.software);
                assert_eq!(args.overrides.len(), 2);
                assert_eq!(args.fps, 60.0);
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_no_subcommand_means_window() {
        let cli = Cli::try_parse_from(["event-horizon"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_overrides_are_clamped_and_checked() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            &["lensing_mass=5".to_string(), "stars_visible=no".to_string()],
        )
        .unwrap();
        assert_eq!(config.params.lensing_mass, 0.1);
        assert!(!config.params.stars_visible);

        assert!(apply_overrides(&mut config, &["warp_factor=9".to_string()]).is_err());
        assert!(apply_overrides(&mut config, &["disk_speed=NaN".to_string()]).is_err());
    }
}
