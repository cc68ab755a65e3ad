//! Building managers for fresh runs and restarts.

use crate::controller::RendezvousController;
use crate::error::{ConfigError, SimulationError};
use crate::manager::ParticleSimulationManager;
use mcrun_aggregation::StatisticsAggregator;
use mcrun_archive::{ArchiveStore, CollaboratorBundle, RendezvousArchive};
use mcrun_core::{
    CancellationToken, Communicator, EventHandler, GeometryModel, ParticleSource,
    SerialCommunicator,
};
use mcrun_dispatch::HistoryDispatcher;
use mcrun_distributed::DistributedCoordinator;
use mcrun_types::{ArchiveFormat, RendezvousFileMode, RunConfiguration, SimulationState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How a restarted run continues from its archive.
#[derive(Debug, Clone, PartialEq)]
pub enum RestartPolicy {
    /// Resume with the archived configuration and history wall.
    Unchanged,
    /// Run this many more histories past the archived next history.
    ExtendHistories(u64),
    /// Keep the history wall, replace the wall-time budget.
    NewWallTime(Duration),
    /// Both of the above.
    ExtendHistoriesAndWallTime(u64, Duration),
    /// Replace the configuration. Its history target counts from the
    /// archived next history; 0 leaves the run unbounded.
    UpdatedConfiguration(RunConfiguration),
}

impl RestartPolicy {
    /// Fold this policy into an archived state and configuration.
    pub fn apply(
        self,
        state: &mut SimulationState,
        config: &mut RunConfiguration,
    ) -> Result<(), ConfigError> {
        match self {
            RestartPolicy::Unchanged => {}
            RestartPolicy::ExtendHistories(added) => extend(state, config, added)?,
            RestartPolicy::NewWallTime(budget) => {
                *config = config.clone().with_wall_time(budget);
            }
            RestartPolicy::ExtendHistoriesAndWallTime(added, budget) => {
                extend(state, config, added)?;
                *config = config.clone().with_wall_time(budget);
            }
            RestartPolicy::UpdatedConfiguration(updated) => {
                let updated = updated.normalized();
                state.history_wall = if updated.is_history_bounded() {
                    state.next_history.saturating_add(updated.history_target)
                } else {
                    0
                };
                *config = updated;
            }
        }
        Ok(())
    }
}

fn extend(
    state: &mut SimulationState,
    config: &mut RunConfiguration,
    added: u64,
) -> Result<(), ConfigError> {
    if added == 0 {
        return Err(ConfigError::NoHistoriesToAdd);
    }
    state.history_wall = state.next_history.saturating_add(added);
    config.history_target = added;
    Ok(())
}

/// Assembles a [`ParticleSimulationManager`].
///
/// ```text
///   ManagerFactory::new(model, source, handler, config)      fresh run
///   ManagerFactory::from_archive(path, RestartPolicy)        restart
///        │ .with_threads(n) .with_communicator(comm) ...
///        ▼
///     build() ── validates the plan ──▶ ParticleSimulationManager
/// ```
pub struct ManagerFactory<M, S, E> {
    model: M,
    source: S,
    event_handler: E,
    config: RunConfiguration,
    state: SimulationState,
    threads: usize,
    seed: u64,
    communicator: Arc<dyn Communicator>,
    archive_directory: PathBuf,
    token: CancellationToken,
    restarted: bool,
}

impl<M, S, E> ManagerFactory<M, S, E>
where
    M: GeometryModel,
    S: ParticleSource,
    E: EventHandler,
{
    /// Factory for a fresh run.
    pub fn new(model: M, source: S, event_handler: E, config: RunConfiguration) -> Self {
        let config = config.normalized();
        let mut state = SimulationState::default();
        state.history_wall = config.history_target;

        Self {
            model,
            source,
            event_handler,
            config,
            state,
            threads: default_threads(),
            seed: 0,
            communicator: Arc::new(SerialCommunicator),
            archive_directory: PathBuf::from("."),
            token: CancellationToken::new(),
            restarted: false,
        }
    }

    /// Factory that resumes the run saved at `path`.
    ///
    /// New archives go next to the loaded one unless
    /// [`with_archive_directory`](Self::with_archive_directory) says otherwise.
    pub fn from_archive(
        path: impl AsRef<Path>,
        policy: RestartPolicy,
    ) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let archive: RendezvousArchive<CollaboratorBundle<M, S, E>> = ArchiveStore::load(path)?;
        let RendezvousArchive {
            mut state,
            mut config,
            collaborators,
            ..
        } = archive;
        policy.apply(&mut state, &mut config)?;

        info!(
            archive = %path.display(),
            next_history = state.next_history,
            rendezvous = state.rendezvous_count,
            history_wall = state.history_wall,
            "Restarting from archive"
        );

        let archive_directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            model: collaborators.model,
            source: collaborators.source,
            event_handler: collaborators.event_handler,
            config,
            state,
            threads: default_threads(),
            seed: 0,
            communicator: Arc::new(SerialCommunicator),
            archive_directory,
            token: CancellationToken::new(),
            restarted: true,
        })
    }

    pub fn with_simulation_name(mut self, name: impl Into<String>) -> Self {
        self.state.simulation_name = name.into();
        self
    }

    pub fn with_archive_format(mut self, format: ArchiveFormat) -> Self {
        self.state.archive_format = format;
        self
    }

    pub fn with_file_mode(mut self, mode: RendezvousFileMode) -> Self {
        self.state.rendezvous_file_mode = mode;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_communicator(mut self, communicator: Arc<dyn Communicator>) -> Self {
        self.communicator = communicator;
        self
    }

    pub fn with_archive_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.archive_directory = directory.into();
        self
    }

    /// Share an existing token, e.g. one wired to a signal listener.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn build(self) -> Result<ParticleSimulationManager<M, S, E>, SimulationError> {
        if self.state.simulation_name.is_empty() {
            return Err(ConfigError::EmptyName.into());
        }
        if self.threads == 0 {
            return Err(ConfigError::NoThreads.into());
        }

        let coordinator = DistributedCoordinator::new(self.communicator);
        let topology = coordinator.topology();
        let plan = mcrun_planner::plan_checked(&self.config, topology.worker_count())?;

        if !self.config.is_history_bounded()
            && !self.config.is_wall_time_bounded()
            && plan.is_rendezvous_unbounded()
        {
            warn!("Run has no history target, wall-time budget or rendezvous cap; only cancellation stops it");
        }

        let dispatcher = HistoryDispatcher::new(
            self.threads,
            self.seed,
            self.config.snapshots_per_batch,
        )?;
        let controller = RendezvousController::new(
            self.state,
            self.config,
            plan,
            ArchiveStore::new(self.archive_directory),
            topology.is_root(),
        );

        info!(
            rank = %topology.local_rank(),
            ranks = topology.size(),
            threads = dispatcher.threads(),
            %plan,
            restarted = self.restarted,
            "Built particle simulation manager"
        );

        Ok(ParticleSimulationManager::new(
            self.model,
            self.source,
            self.event_handler,
            controller,
            dispatcher,
            StatisticsAggregator::new(topology.root()),
            coordinator,
            self.token,
        ))
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archived() -> (SimulationState, RunConfiguration) {
        let mut state = SimulationState::default();
        state.next_history = 40;
        state.rendezvous_count = 4;
        state.history_wall = 40;
        (state, RunConfiguration::new(40).with_min_rendezvous(4))
    }

    #[test]
    fn test_unchanged_keeps_everything() {
        let (mut state, mut config) = archived();
        let (before_state, before_config) = (state.clone(), config.clone());
        RestartPolicy::Unchanged.apply(&mut state, &mut config).unwrap();
        assert_eq!(state, before_state);
        assert_eq!(config, before_config);
    }

    #[test]
    fn test_extend_histories_moves_wall() {
        let (mut state, mut config) = archived();
        RestartPolicy::ExtendHistories(10)
            .apply(&mut state, &mut config)
            .unwrap();
        assert_eq!(state.history_wall, 50);
        assert_eq!(config.history_target, 10);
        assert_eq!(config.min_rendezvous, 4);
    }

    #[test]
    fn test_extend_by_zero_is_rejected() {
        let (mut state, mut config) = archived();
        assert!(matches!(
            RestartPolicy::ExtendHistories(0).apply(&mut state, &mut config),
            Err(ConfigError::NoHistoriesToAdd)
        ));
    }

    #[test]
    fn test_new_wall_time_keeps_wall() {
        let (mut state, mut config) = archived();
        RestartPolicy::NewWallTime(Duration::from_secs(30))
            .apply(&mut state, &mut config)
            .unwrap();
        assert_eq!(state.history_wall, 40);
        assert_eq!(config.wall_time_budget, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_updated_configuration_counts_from_next_history() {
        let (mut state, mut config) = archived();
        let updated = RunConfiguration::new(16)
            .with_min_rendezvous(2)
            .with_max_rendezvous_batch_size(100)
            .with_batch_multiplier(2);
        RestartPolicy::UpdatedConfiguration(updated.clone())
            .apply(&mut state, &mut config)
            .unwrap();
        assert_eq!(state.history_wall, 56);
        assert_eq!(config, updated.normalized());

        RestartPolicy::UpdatedConfiguration(RunConfiguration::new(0))
            .apply(&mut state, &mut config)
            .unwrap();
        assert_eq!(state.history_wall, 0);
    }
}
