//! rollcover - decompose piano roll scenes into minimal voice activations
//!
//! Subcommands:
//! - `rollcover render <scene>` - Print the scene's piano roll
//! - `rollcover erode <scene>` - List candidate activations per voice
//! - `rollcover decompose <scene>` - Find the minimal covering activations

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use minimal_activations::{DecompositionConfig, OrderRegime, ScanOrder};

mod commands;
mod scene;

#[derive(Parser)]
#[command(name = "rollcover")]
#[command(about = "Decompose piano roll scenes into minimal voice activations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the scene's piano roll as text
    Render {
        /// Scene TOML file
        scene: PathBuf,
    },

    /// Erode the scene's roll by its texture
    Erode {
        /// Scene TOML file
        scene: PathBuf,
    },

    /// Search for the minimal activations covering the scene's roll
    Decompose {
        /// Scene TOML file
        scene: PathBuf,

        /// Config file with a [decomposition] section
        #[arg(short, long, env = "ROLLCOVER_CONFIG")]
        config: Option<PathBuf>,

        /// Derivation order (default: chosen from the texture)
        #[arg(short, long)]
        order: Option<usize>,

        /// Maximum number of shortest paths to report
        #[arg(short, long)]
        max_paths: Option<usize>,

        /// Cell scan order: time-major or frequency-major
        #[arg(long)]
        scan: Option<ScanOrder>,

        /// Order heuristic: auto, dense or sparse
        #[arg(long)]
        regime: Option<OrderRegime>,

        /// Checkpoint database path (enables checkpointing)
        #[arg(long)]
        checkpoint_db: Option<PathBuf>,

        /// Checkpoint to the default database
        #[arg(long)]
        checkpoint: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Render { scene } => commands::render(&scene)?,
        Commands::Erode { scene } => commands::erode(&scene)?,
        Commands::Decompose {
            scene,
            config,
            order,
            max_paths,
            scan,
            regime,
            checkpoint_db,
            checkpoint,
        } => {
            let mut settings = match config {
                Some(path) => DecompositionConfig::from_file(&path)?,
                None => DecompositionConfig::from_env()?,
            };
            if order.is_some() {
                settings.order = order;
            }
            if let Some(max_paths) = max_paths {
                settings.max_paths = max_paths;
            }
            if let Some(scan) = scan {
                settings.scan = scan;
            }
            if let Some(regime) = regime {
                settings.regime = regime;
            }
            if checkpoint_db.is_some() {
                settings.checkpoint_db = checkpoint_db;
            }
            commands::decompose(&scene, &settings, checkpoint)?;
        }
    }

    Ok(())
}
