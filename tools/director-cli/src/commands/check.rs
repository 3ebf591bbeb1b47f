//! Check host capabilities and configuration.

use std::sync::Arc;

use director_platform_core::{primary_display, HostCapabilities};
use director_render_engine::{FileAssetLoader, FontProvider};

use crate::studio::Studio;

pub async fn run() -> anyhow::Result<()> {
    println!("Director System Check");
    println!("{}", "=".repeat(50));

    let studio = Studio::open(None).await?;
    let host = &studio.host;

    let displays = host.list_capturable_displays().await?;
    println!("[OK] Displays detected: {}", displays.len());
    for d in &displays {
        println!(
            "     {} {}x{} {}",
            d.name,
            d.width,
            d.height,
            if d.is_primary { "(primary)" } else { "" }
        );
    }
    match primary_display(&displays) {
        Some(d) => println!("[OK] Program display: {}", d.name),
        None => println!("[WARN] No display available for capture"),
    }

    let windows = host.list_capturable_windows().await?;
    println!("[OK] Capturable windows: {}", windows.len());

    let gpu = host.report_gpu_vendor().await?;
    println!(
        "[OK] GPU: {} {} (encoder hint: {:?})",
        gpu.vendor,
        gpu.model,
        gpu.encoding_hint()
    );

    let fonts = FontProvider::new(studio.config.text.clone(), Arc::new(FileAssetLoader::new()));
    let font_ok = fonts.font().await.is_some();
    if font_ok {
        println!("[OK] Overlay font available");
    } else {
        println!("[WARN] No usable font; text overlays will be empty");
    }

    println!();
    if font_ok && !displays.is_empty() {
        println!("All capabilities are available. Director is ready.");
    } else {
        println!("Some capabilities are missing. See above.");
    }
    Ok(())
}
