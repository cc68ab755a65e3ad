//! mcrun CLI
//!
//! Runs and restarts rendezvous-driven particle simulations.

use anyhow::Context;
use clap::{Parser, Subcommand};
use mcrun_core::CancellationToken;
use mcrun_runner::{restart_policy, RunFile, Session, Start};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcrun")]
#[command(about = "Rendezvous-driven particle simulation runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand.
#[derive(clap::Args)]
struct Parallelism {
    /// Worker threads per rank (defaults to the run file, then all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// In-process ranks; rank 0 coordinates, the others run histories
    #[arg(long)]
    ranks: Option<usize>,

    /// Stop claiming batches as soon as an interrupt arrives
    #[arg(long)]
    interruptible: bool,

    /// Write run data as JSON to this file when done
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a fresh run
    Run {
        /// TOML run file
        #[arg(short, long)]
        config: PathBuf,

        #[command(flatten)]
        parallelism: Parallelism,
    },

    /// Continue a run from a rendezvous archive
    Restart {
        /// Archive to resume from (.json, .bin or .lz4)
        #[arg(short, long)]
        archive: PathBuf,

        /// Run this many more histories
        #[arg(long)]
        add_histories: Option<u64>,

        /// New wall-time budget (e.g. "30m", "2h")
        #[arg(long)]
        wall_time: Option<humantime::Duration>,

        /// Replace the archived run limits with the [run] section of this file
        #[arg(long, conflicts_with_all = ["add_histories", "wall_time"])]
        config: Option<PathBuf>,

        #[command(flatten)]
        parallelism: Parallelism,
    },
}

fn session(command: Commands) -> anyhow::Result<Session> {
    let (start, parallelism) = match command {
        Commands::Run {
            config,
            parallelism,
        } => {
            let file = RunFile::load(&config)
                .with_context(|| format!("Failed to load run file {}", config.display()))?;
            (Start::Fresh(file), parallelism)
        }
        Commands::Restart {
            archive,
            add_histories,
            wall_time,
            config,
            parallelism,
        } => {
            let updated = config
                .map(|path| RunFile::load(&path).and_then(|file| file.run.to_configuration()))
                .transpose()?;
            let policy = restart_policy(add_histories, wall_time.map(Into::into), updated);
            (Start::Restart { archive, policy }, parallelism)
        }
    };

    let mut session = Session::new(start);
    session.threads = parallelism.threads;
    session.ranks = parallelism.ranks;
    session.interruptible = parallelism.interruptible;
    session.export = parallelism.export;
    Ok(session)
}

/// Cancel `token` on Ctrl-C.
fn spawn_signal_listener(token: CancellationToken) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("mcrun-signals".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping at the next opportunity");
                    token.cancel();
                }
            })
        })?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let session = session(cli.command)?;

    let token = CancellationToken::new();
    spawn_signal_listener(token.clone())?;

    let outcome = session.run(token)?;
    info!(
        next_history = outcome.next_history,
        rendezvous = outcome.rendezvous,
        cancelled = outcome.cancelled,
        archive = %outcome.last_archive.display(),
        "Done"
    );
    Ok(())
}
