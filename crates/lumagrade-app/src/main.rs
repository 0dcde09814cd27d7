//! lumagrade - render one graded preview frame to a PNG.
//!
//! Drives the same render loop a live preview uses, for a single refresh,
//! on either the hardware or the software device.

mod preview;

use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use lumagrade_core::{FilterParameters, FrameBuffer, PixelFormat, SurfaceSize};
use lumagrade_gpu::{SoftwareDevice, WgpuDevice};
use preview::PreviewJob;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lumagrade", version, about)]
struct Cli {
    /// Input image. A color-bar test pattern is used when omitted.
    input: Option<PathBuf>,

    /// Output PNG path.
    #[arg(long, short)]
    out: PathBuf,

    /// Filter parameters as a JSON object; missing fields are neutral.
    #[arg(long)]
    params: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Backend::Gpu)]
    backend: Backend,

    /// Show the original on the left and the graded frame on the right.
    #[arg(long)]
    split: bool,

    /// Render surface size, e.g. 1280x720. Defaults to the input size.
    #[arg(long)]
    size: Option<SurfaceSize>,

    /// Grain seed.
    #[arg(long, default_value_t = 0.0)]
    seed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Gpu,
    Software,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let frame = match &cli.input {
        Some(path) => load_frame(path)?,
        None => FrameBuffer::test_pattern(640, 360),
    };
    let params = match &cli.params {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("read parameters '{}'", path.display()))?;
            FilterParameters::from_json(&json)
                .with_context(|| format!("parse parameters '{}'", path.display()))?
        }
        None => FilterParameters::NEUTRAL,
    };
    let size = cli.size.unwrap_or(SurfaceSize::new(frame.width, frame.height));

    let job = PreviewJob {
        frame,
        params,
        split: cli.split,
        seed: cli.seed,
    };
    let output = match cli.backend {
        Backend::Gpu => {
            let device = WgpuDevice::new_blocking(size).context("open GPU device")?;
            job.render(device)?
        }
        Backend::Software => job.render(SoftwareDevice::new(size))?,
    };

    save_png(&cli.out, &output)?;
    info!(path = %cli.out.display(), %size, "wrote preview");
    Ok(())
}

fn load_frame(path: &Path) -> Result<FrameBuffer> {
    let image = image::open(path)
        .with_context(|| format!("open image '{}'", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    FrameBuffer::from_packed(width, height, PixelFormat::Rgba8, image.as_raw())
        .with_context(|| format!("decode image '{}'", path.display()))
}

fn save_png(path: &Path, frame: &FrameBuffer) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        path,
        &frame.to_packed_rgba(),
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))
}
