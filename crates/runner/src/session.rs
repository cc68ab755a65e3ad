//! One invocation of the runner: build managers, run, report.

use crate::config::RunFile;
use anyhow::{bail, Context};
use mcrun_core::{CancellationToken, CellGeometry, Communicator, StandardSource, TallyEventHandler};
use mcrun_distributed::LocalCommunicator;
use mcrun_manager::{ManagerFactory, ParticleSimulationManager, RestartPolicy};
use mcrun_types::RunConfiguration;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

type Factory = ManagerFactory<CellGeometry, StandardSource, TallyEventHandler>;
type Manager = ParticleSimulationManager<CellGeometry, StandardSource, TallyEventHandler>;

/// Where the run starts from.
#[derive(Debug, Clone)]
pub enum Start {
    Fresh(RunFile),
    Restart { archive: PathBuf, policy: RestartPolicy },
}

/// Restart policy implied by the `restart` flags.
pub fn restart_policy(
    add_histories: Option<u64>,
    wall_time: Option<Duration>,
    updated: Option<RunConfiguration>,
) -> RestartPolicy {
    match (updated, add_histories, wall_time) {
        (Some(config), _, _) => RestartPolicy::UpdatedConfiguration(config),
        (None, Some(added), Some(budget)) => RestartPolicy::ExtendHistoriesAndWallTime(added, budget),
        (None, Some(added), None) => RestartPolicy::ExtendHistories(added),
        (None, None, Some(budget)) => RestartPolicy::NewWallTime(budget),
        (None, None, None) => RestartPolicy::Unchanged,
    }
}

/// What the root rank ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub next_history: u64,
    pub rendezvous: u64,
    pub cancelled: bool,
    pub last_archive: PathBuf,
}

/// Settings of one runner invocation.
#[derive(Debug, Clone)]
pub struct Session {
    pub start: Start,
    pub threads: Option<usize>,
    pub ranks: Option<usize>,
    pub interruptible: bool,
    pub export: Option<PathBuf>,
    pub print_summary: bool,
}

impl Session {
    pub fn new(start: Start) -> Self {
        Self {
            start,
            threads: None,
            ranks: None,
            interruptible: false,
            export: None,
            print_summary: true,
        }
    }

    fn ranks(&self) -> usize {
        match (&self.start, self.ranks) {
            (_, Some(ranks)) => ranks,
            (Start::Fresh(file), None) => file.simulation.ranks,
            (Start::Restart { .. }, None) => 1,
        }
    }

    fn threads(&self) -> Option<usize> {
        match &self.start {
            Start::Fresh(file) => self.threads.or(file.simulation.threads),
            Start::Restart { .. } => self.threads,
        }
    }

    fn factory(&self) -> anyhow::Result<Factory> {
        let factory = match &self.start {
            Start::Fresh(file) => ManagerFactory::new(
                file.geometry(),
                file.source()?,
                TallyEventHandler::new(),
                file.run.to_configuration()?,
            )
            .with_simulation_name(file.simulation.name.clone())
            .with_archive_format(file.archive_format()?)
            .with_file_mode(file.simulation.file_mode)
            .with_archive_directory(file.simulation.archive_directory.clone())
            .with_seed(file.simulation.seed),
            Start::Restart { archive, policy } => {
                ManagerFactory::from_archive(archive, policy.clone())
                    .with_context(|| format!("Failed to restart from {}", archive.display()))?
            }
        };
        Ok(match self.threads() {
            Some(threads) => factory.with_threads(threads),
            None => factory,
        })
    }

    /// Run to completion or cancellation.
    pub fn run(&self, token: CancellationToken) -> anyhow::Result<SessionOutcome> {
        let ranks = self.ranks();
        if ranks == 0 {
            bail!("Rank count must be at least 1");
        }
        if ranks == 1 {
            let manager = self.factory()?.with_cancellation_token(token).build()?;
            return self.drive(manager);
        }

        info!(ranks, "Starting multi-rank run");
        let comms = LocalCommunicator::group(ranks);
        let outcomes: Vec<anyhow::Result<Option<SessionOutcome>>> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let token = token.clone();
                    s.spawn(move || -> anyhow::Result<Option<SessionOutcome>> {
                        let rank = comm.rank();
                        let comm: Arc<dyn Communicator> = Arc::new(comm);
                        let manager = self
                            .factory()?
                            .with_communicator(comm)
                            .with_cancellation_token(token)
                            .build()
                            .with_context(|| format!("Failed to build manager on {rank}"))?;
                        let outcome = self.drive(manager)?;
                        Ok(rank.is_root().then_some(outcome))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("Rank thread panicked")))
                })
                .collect()
        });

        let mut root = None;
        for outcome in outcomes {
            if let Some(outcome) = outcome? {
                root = Some(outcome);
            }
        }
        root.context("Root rank produced no outcome")
    }

    fn drive(&self, mut manager: Manager) -> anyhow::Result<SessionOutcome> {
        if self.interruptible {
            manager.run_interruptible_simulation()?;
        } else {
            manager.run_simulation()?;
        }

        let is_root = manager.topology().is_root();
        if is_root {
            manager.log_simulation_summary();
            if self.print_summary {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                manager.print_simulation_summary(&mut out)?;
                out.flush()?;
            }
            if let Some(path) = &self.export {
                export(&manager, path)?;
            }
        }

        let last_archive = match manager.number_of_rendezvous() {
            0 => PathBuf::new(),
            n => manager.rendezvous_archive_path(n - 1),
        };
        Ok(SessionOutcome {
            next_history: manager.next_history(),
            rendezvous: manager.number_of_rendezvous(),
            cancelled: manager.cancellation_token().is_cancelled(),
            last_archive,
        })
    }
}

fn export(manager: &Manager, path: &Path) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    manager
        .export_simulation_data(path, &mut out)
        .with_context(|| format!("Failed to export simulation data to {}", path.display()))
}
