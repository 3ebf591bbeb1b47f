//! Composite one frame of a (schedule, layout) pair to PNG.

use std::path::{Path, PathBuf};

use anyhow::Context;
use director_render_engine::{CanvasKind, Compositor, FrameStats};
use image::ImageFormat;

use crate::studio::Studio;

pub async fn run(
    program: PathBuf,
    schedule: String,
    layout: String,
    out: PathBuf,
    width: u32,
    height: u32,
    frames: u32,
) -> anyhow::Result<()> {
    anyhow::ensure!(width > 0 && height > 0, "Canvas size must be non-zero");

    let studio = Studio::open(Some(&program)).await?;
    let asset_root = program.parent().unwrap_or(Path::new("."));
    let compositor = Compositor::with_raster(
        CanvasKind::Live,
        studio.services(asset_root),
        width,
        height,
    );

    compositor
        .assign(&schedule, &layout)
        .await
        .with_context(|| format!("Cannot compose {schedule}/{layout}"))?;

    let mut stats = FrameStats::default();
    for _ in 0..frames.max(1) {
        stats = compositor.render_frame();
    }

    compositor
        .snapshot()
        .image()
        .save_with_format(&out, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    compositor.dispose();

    println!("Rendered {schedule}/{layout} to {}", out.display());
    println!("  Canvas: {width}x{height}");
    println!(
        "  Video: {} drawn, {} pending, {} missing",
        stats.videos_drawn, stats.videos_pending, stats.videos_missing
    );
    if stats.playback_failures > 0 {
        println!("  Playback failures: {}", stats.playback_failures);
    }
    Ok(())
}
