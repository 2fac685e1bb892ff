//! arplace CLI: scripted session replay and config inspection.

use arplace::{ParentingMode, ReplayScript, SessionConfig};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "arplace")]
#[command(about = "Replay image-target tracking scripts against an AR placement session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a session through a tracking script.
    Replay(CliReplayArgs),

    /// Validate a session config and print a summary.
    ConfigInfo {
        /// Path to the session config (JSON).
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct CliReplayArgs {
    /// Path to the session config (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Path to the replay script (JSON).
    #[arg(long)]
    script: PathBuf,

    /// Path to write the replay report (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Override the settle threshold from the config.
    #[arg(long)]
    stable_frames: Option<u32>,

    /// Start the session active regardless of the config.
    #[arg(long)]
    active: bool,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay(args) => run_replay(&args),
        Commands::ConfigInfo { config } => run_config_info(&config),
    }
}

// ── config-info ────────────────────────────────────────────────────────

fn run_config_info(path: &Path) -> CliResult<()> {
    let config = SessionConfig::from_json_file(path)?;

    println!("arplace session config ({})", config.schema);
    if let Some(prefab) = &config.content {
        println!("  content:          {}", prefab.name);
        println!("  wrapper:          {}", prefab.wrapper);
        println!("  detach on settle: {}", prefab.detach_on_settle);
        println!("  vertical lock:    {}", prefab.vertical_lock);
        println!("  anchors:          {}", prefab.anchors.len());
        for anchor in &prefab.anchors {
            let [x, y, z] = anchor.pose.position;
            println!("    {:<16} at ({:.3}, {:.3}, {:.3})", anchor.name, x, y, z);
        }
    }
    if let Some(library) = &config.reference_library {
        println!(
            "  library:          {} ({} images)",
            library.name,
            library.images.len()
        );
    }
    println!("  active on start:  {}", config.set_active_on_start);
    println!("  stable frames:    {}", config.settle.stable_frames);
    println!(
        "  message lifetime: {} s",
        config.diagnostics.message_lifetime_s
    );

    Ok(())
}

// ── replay ─────────────────────────────────────────────────────────────

fn run_replay(args: &CliReplayArgs) -> CliResult<()> {
    tracing::info!("Loading config: {}", args.config.display());
    let mut config = SessionConfig::from_json_file(&args.config)?;
    if let Some(frames) = args.stable_frames {
        config.settle.stable_frames = frames;
    }
    if args.active {
        config.set_active_on_start = true;
    }

    tracing::info!("Loading script: {}", args.script.display());
    let script = ReplayScript::from_json_file(&args.script)?;
    tracing::info!(
        "{} frames at {:.4} s/frame",
        script.frames.len(),
        script.frame_dt_s
    );

    let report = arplace::replay(config, &script)?;

    let detached = report
        .frames
        .last()
        .and_then(|f| f.content.as_ref())
        .is_some_and(|c| c.mode == ParentingMode::Detached);
    tracing::info!(
        "{} events, final authority {:?}, content detached: {}",
        report.events.len(),
        report.frames.last().and_then(|f| f.authoritative),
        detached
    );

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Report written to {}", args.out.display());

    Ok(())
}
