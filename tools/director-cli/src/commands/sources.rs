//! List capture sources.

use std::path::PathBuf;

use crate::studio::Studio;

pub async fn run(program: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let studio = Studio::open(program.as_deref()).await?;
    let sources = studio.media.registry().list();

    if json {
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    println!("Capture sources: {}", sources.len());
    for source in &sources {
        let size = match (source.width, source.height) {
            (Some(w), Some(h)) => format!("{w}x{h}"),
            _ => "-".to_string(),
        };
        println!(
            "  {:<16} {:<7} {:<10} {}",
            source.id,
            format!("{:?}", source.kind).to_lowercase(),
            size,
            source.name
        );
    }
    Ok(())
}
