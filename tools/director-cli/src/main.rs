//! Director CLI - headless access to the compositing core.
//!
//! Usage:
//!   director render <PROGRAM>      Composite one frame to a PNG
//!   director validate <PROGRAM>    Check a program document
//!   director sources [PROGRAM]     List capture sources
//!   director check                 Check host capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod studio;

#[derive(Parser)]
#[command(
    name = "director",
    about = "Live broadcast compositing: preview, program, and overlays",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite a (schedule, layout) pair and write the frame as PNG
    Render {
        /// Program document (plans, schedules, layouts) as JSON
        program: PathBuf,

        /// Schedule id
        #[arg(short, long)]
        schedule: String,

        /// Layout id
        #[arg(short, long)]
        layout: String,

        /// Output PNG path
        #[arg(short, long, default_value = "frame.png")]
        out: PathBuf,

        /// Canvas width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Canvas height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Frames to draw before the snapshot
        #[arg(long, default_value = "1")]
        frames: u32,
    },

    /// Validate a program document
    Validate {
        /// Program document as JSON
        program: PathBuf,
    },

    /// List capture sources known to the host and the capture backend
    Sources {
        /// Program document whose referenced cameras are simulated
        program: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check host capabilities and configuration
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = director_common::config::DirectorConfig::load().logging;
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json_logs;
    director_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render {
            program,
            schedule,
            layout,
            out,
            width,
            height,
            frames,
        } => commands::render::run(program, schedule, layout, out, width, height, frames).await,
        Commands::Validate { program } => commands::validate::run(program),
        Commands::Sources { program, json } => commands::sources::run(program, json).await,
        Commands::Check => commands::check::run().await,
    }
}
