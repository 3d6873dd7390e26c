//! PanoStitch CLI: stitch dual-fisheye recordings into equirectangular video.
//!
//! Usage:
//!   panostitch unwarp -l ch01.mp4 -r ch02.mp4 -d 10 -o warped.mp4
//!   panostitch find -i files/ -t "6/26/2019 15:14:45" -c 1 2
//!   panostitch probe <PATH>...
//!   panostitch check

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "panostitch",
    about = "Stitch two fisheye recordings into an equirectangular panorama",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/panostitch/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unwarp and stitch a left/right fisheye pair
    Unwarp(commands::unwarp::UnwarpArgs),

    /// Find the recordings covering a timestamp and their skip offsets
    Find {
        /// Where to search for files
        #[arg(short, long)]
        input_directory: PathBuf,

        /// Target timestamp (e.g. "6/26/2019 15:14:45")
        #[arg(short, long)]
        timestamp: String,

        /// Channels to match (left first, then right)
        #[arg(short, long, num_args = 1.., required = true)]
        channels: Vec<u32>,

        /// Frame rate for computing skip amounts
        #[arg(long, default_value = "24")]
        fps: u32,

        /// File extension
        #[arg(short, long, default_value = ".mp4")]
        extension: String,
    },

    /// Show stream information for recordings
    Probe {
        /// Media files to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Check that the external tools are available
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => panostitch_common::config::AppConfig::load_from(path),
        None => panostitch_common::config::AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    panostitch_common::logging::init_logging(&config.logging);
    tracing::debug!(?config, "Loaded configuration");

    match cli.command {
        Commands::Unwarp(args) => commands::unwarp::run(args, &config).await,
        Commands::Find {
            input_directory,
            timestamp,
            channels,
            fps,
            extension,
        } => commands::find::run(input_directory, timestamp, channels, fps, extension),
        Commands::Probe { paths } => commands::probe::run(paths),
        Commands::Check => commands::check::run(),
    }
}
