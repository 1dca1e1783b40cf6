use std::path::PathBuf;

use clap::{Parser, Subcommand};
use seedhead_core::{glam::DVec2, AppConfig, HeadlessRenderer, Simulation};
use tracing_subscriber::EnvFilter;

fn main() -> seedhead_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            frames,
            seed,
            pointer,
        } => run(config.as_ref(), frames, seed, pointer),
        Commands::Defaults => {
            println!("{}", AppConfig::live_defaults().to_json_pretty()?);
            Ok(())
        }
    }
}

fn run(
    config_path: Option<&PathBuf>,
    frames: Option<u64>,
    seed: Option<u64>,
    pointer: Option<Pointer>,
) -> seedhead_core::Result<()> {
    let mut config = match config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::live_defaults(),
    };
    if seed.is_some() {
        config.rng_seed = seed;
    }
    tracing::info!(config = ?config_path, frames, seed = config.rng_seed, "starting scene");

    let mut renderer = HeadlessRenderer::new();
    if let Some(Pointer(position)) = pointer {
        renderer.set_pointer(position);
    }
    let (summary, renderer) = Simulation::run(config, renderer, frames)?;
    let stats = renderer.stats();

    println!(
        "frames: {}  overruns: {}  worst overrun: {:.2} ms  lull: {:.3}",
        summary.frames,
        summary.overruns,
        summary.worst_overrun.as_secs_f64() * 1000.0,
        summary.final_lull
    );
    println!(
        "circles: {}  lines: {}  points: {}  moves: {}  undraws: {}  live: {}",
        stats.circles,
        stats.lines,
        stats.points,
        stats.moves,
        stats.undraws,
        renderer.live_count()
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Pointer position given as `X,Y`.
#[derive(Debug, Clone, Copy)]
struct Pointer(DVec2);

impl std::str::FromStr for Pointer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected X,Y but got `{s}`"))?;
        let coord = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|err| format!("invalid coordinate `{v}`: {err}"))
        };
        Ok(Pointer(DVec2::new(coord(x)?, coord(y)?)))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Starfield and fibonacci seed head animation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scene against the headless renderer.
    Run {
        /// JSON configuration file. Built-in defaults when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Stop after this many frames. Runs until interrupted otherwise.
        #[arg(short, long)]
        frames: Option<u64>,
        /// Seed for every random choice in the run.
        #[arg(short, long)]
        seed: Option<u64>,
        /// Fixed pointer position steering the star field, as `X,Y`.
        #[arg(short, long)]
        pointer: Option<Pointer>,
    },
    /// Print the default configuration as JSON.
    Defaults,
}
