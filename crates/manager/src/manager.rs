//! The particle simulation manager.

use crate::completion::CompletionCriterion;
use crate::controller::{IdentityChange, RendezvousController};
use crate::error::{ConfigError, SimulationError};
use crate::summary::{SimulationData, SimulationStatus};
use mcrun_aggregation::StatisticsAggregator;
use mcrun_archive::CollaboratorBundle;
use mcrun_core::{
    CancellationToken, CollaboratorPipeline, CommError, EventHandler, GeometryModel,
    ParticleSource,
};
use mcrun_dispatch::{HistoryDispatcher, LocalBatchQueue, StopCondition};
use mcrun_distributed::{
    CoordinatorOrder, DistributedCoordinator, RankReport, RendezvousOrder, RendezvousVerdict,
};
use mcrun_types::{ArchiveFormat, BatchPlan, RankTopology, RendezvousFileMode, RunConfiguration};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs particle histories in rendezvous-separated chunks.
///
/// Between two rendezvous every thread accumulates counters privately. At a
/// rendezvous the counters are reduced to the root, handed to the source
/// and event handler, and the whole run is archived so it can be restarted
/// from exactly that point.
///
/// With more than one rank the root only coordinates: it hands out batches
/// and writes archives while worker ranks run the histories.
pub struct ParticleSimulationManager<M, S, E> {
    model: M,
    source: S,
    event_handler: E,
    controller: RendezvousController,
    dispatcher: HistoryDispatcher,
    aggregator: StatisticsAggregator,
    coordinator: DistributedCoordinator,
    token: CancellationToken,
    /// Run time of finished invocations of this manager.
    run_time: Duration,
}

impl<M, S, E> ParticleSimulationManager<M, S, E>
where
    M: GeometryModel,
    S: ParticleSource,
    E: EventHandler,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        model: M,
        source: S,
        event_handler: E,
        controller: RendezvousController,
        dispatcher: HistoryDispatcher,
        aggregator: StatisticsAggregator,
        coordinator: DistributedCoordinator,
        token: CancellationToken,
    ) -> Self {
        Self {
            model,
            source,
            event_handler,
            controller,
            dispatcher,
            aggregator,
            coordinator,
            token,
            run_time: Duration::ZERO,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// First history the next rendezvous will run.
    pub fn next_history(&self) -> u64 {
        self.controller.state().next_history
    }

    /// Rendezvous completed since the run was first started.
    pub fn number_of_rendezvous(&self) -> u64 {
        self.controller.state().rendezvous_count
    }

    pub fn rendezvous_batch_size(&self) -> u64 {
        self.controller.plan().rendezvous_batch_size
    }

    pub fn batch_size(&self) -> u64 {
        self.controller.plan().batch_size
    }

    pub fn plan(&self) -> BatchPlan {
        self.controller.plan()
    }

    pub fn config(&self) -> &RunConfiguration {
        self.controller.config()
    }

    pub fn topology(&self) -> RankTopology {
        self.coordinator.topology()
    }

    pub fn simulation_name(&self) -> &str {
        &self.controller.state().simulation_name
    }

    pub fn simulation_archive_type(&self) -> ArchiveFormat {
        self.controller.state().archive_format
    }

    pub fn rendezvous_file_mode(&self) -> RendezvousFileMode {
        self.controller.state().rendezvous_file_mode
    }

    /// Absolute history the run stops at, if bounded.
    pub fn history_wall(&self) -> Option<u64> {
        let state = self.controller.state();
        state.is_history_bounded().then_some(state.history_wall)
    }

    /// Path the next archive write goes to.
    pub fn current_archive_path(&self) -> PathBuf {
        self.controller.current_archive_path()
    }

    /// Path of the archive written at rendezvous `index`, under the current
    /// name, format and file mode.
    pub fn rendezvous_archive_path(&self, index: u64) -> PathBuf {
        self.controller.archive_path(index)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn event_handler(&self) -> &E {
        &self.event_handler
    }

    /// Token that stops the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn simulation_status(&self) -> SimulationStatus {
        let state = self.controller.state();
        SimulationStatus {
            next_history: state.next_history,
            rendezvous_count: state.rendezvous_count,
            histories_run: self.dispatcher.progress().completed(),
            run_time: self.run_time,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Running
    // ═══════════════════════════════════════════════════════════════════════

    /// Run until the completion criterion is met or the run is cancelled.
    ///
    /// Cancellation is only honoured at rendezvous boundaries, so every
    /// rendezvous started runs to its end.
    pub fn run_simulation(&mut self) -> Result<(), SimulationError> {
        self.run(false)
    }

    /// Like [`run_simulation`](Self::run_simulation), but cancellation also
    /// stops workers from claiming further batches. The cut-short
    /// rendezvous is still reduced and archived.
    pub fn run_interruptible_simulation(&mut self) -> Result<(), SimulationError> {
        self.run(true)
    }

    /// Request a stop, as a signal handler would.
    pub fn signal_handler(&self, signal: i32) {
        warn!(signal, "Received signal, stopping at the next opportunity");
        self.token.cancel();
    }

    fn run(&mut self, interruptible: bool) -> Result<(), SimulationError> {
        let started = Instant::now();
        self.dispatcher.progress().reset();

        let state = self.controller.state();
        let criterion = CompletionCriterion::new(
            state.history_wall,
            self.controller.config().wall_time_budget,
            started,
        );
        info!(
            next_history = state.next_history,
            history_wall = state.history_wall,
            plan = %self.controller.plan(),
            interruptible,
            "Starting simulation"
        );

        let topology = self.coordinator.topology();
        let result = if !topology.is_distributed() {
            self.run_local(&criterion, interruptible, started)
        } else if topology.is_root() {
            self.run_coordinator(&criterion, interruptible, started)
        } else {
            self.run_worker(interruptible)
        };

        self.run_time += started.elapsed();
        match &result {
            Ok(()) => info!(
                next_history = self.next_history(),
                rendezvous = self.number_of_rendezvous(),
                run_time = ?self.run_time,
                cancelled = self.token.is_cancelled(),
                "Simulation finished"
            ),
            Err(e) => warn!(error = %e, "Simulation aborted"),
        }
        result
    }

    fn stop_condition(&self, criterion: &CompletionCriterion, interruptible: bool) -> StopCondition {
        let stop = StopCondition::never().with_deadline(criterion.deadline());
        if interruptible {
            stop.with_token(self.token.clone())
        } else {
            stop
        }
    }

    fn is_finished(&self, criterion: &CompletionCriterion) -> bool {
        criterion.is_complete(self.next_history(), Instant::now()) || self.token.is_cancelled()
    }

    fn run_local(
        &mut self,
        criterion: &CompletionCriterion,
        interruptible: bool,
        started: Instant,
    ) -> Result<(), SimulationError> {
        if criterion.is_complete(self.next_history(), started) {
            info!("Completion criterion already met, nothing to run");
            return Ok(());
        }

        loop {
            let range = self.controller.next_rendezvous_range();
            let queue = LocalBatchQueue::new(
                range.clone(),
                self.controller.plan().batch_size,
                self.stop_condition(criterion, interruptible),
            );
            let pipeline = CollaboratorPipeline {
                model: &self.model,
                source: &self.source,
                event_handler: &self.event_handler,
            };
            let report = self.dispatcher.dispatch(&queue, &pipeline)?;
            if let Some(reason) = queue.stop_reason() {
                info!(%reason, issued_end = queue.issued_end(), "Rendezvous cut short");
            }
            debug!(
                start = range.start,
                end = range.end,
                batches = report.batches,
                histories = report.histories,
                "Rendezvous histories done"
            );

            self.finish_rendezvous(queue.issued_end(), started)?;
            if self.is_finished(criterion) {
                return Ok(());
            }
        }
    }

    fn run_coordinator(
        &mut self,
        criterion: &CompletionCriterion,
        interruptible: bool,
        started: Instant,
    ) -> Result<(), SimulationError> {
        let result = if criterion.is_complete(self.next_history(), started) {
            info!("Completion criterion already met, nothing to run");
            Ok(())
        } else {
            self.coordinate(criterion, interruptible, started)
        };

        match result {
            Ok(()) => Ok(self.coordinator.terminate()?),
            Err(e) => {
                self.coordinator.abort(&e.to_string());
                Err(e)
            }
        }
    }

    fn coordinate(
        &mut self,
        criterion: &CompletionCriterion,
        interruptible: bool,
        started: Instant,
    ) -> Result<(), SimulationError> {
        loop {
            let range = self.controller.next_rendezvous_range();
            let order = RendezvousOrder {
                rendezvous: self.number_of_rendezvous(),
                start: range.start,
                end: range.end,
                batch_size: self.controller.plan().batch_size,
            };
            let stop = self.stop_condition(criterion, interruptible);
            let outcome = self.coordinator.run_rendezvous(order, &stop)?;
            if let Some(reason) = outcome.stop_reason {
                info!(%reason, issued_end = outcome.issued_end, "Rendezvous cut short");
            }

            let finished = self.finish_rendezvous(outcome.issued_end, started);
            let verdict = match &finished {
                Ok(()) => RendezvousVerdict::Committed,
                Err(e) => RendezvousVerdict::Aborted(e.to_string()),
            };
            self.coordinator.close_rendezvous(&verdict)?;
            finished?;
            if self.is_finished(criterion) {
                return Ok(());
            }
        }
    }

    fn run_worker(&mut self, interruptible: bool) -> Result<(), SimulationError> {
        loop {
            let order = match self.coordinator.await_order()? {
                CoordinatorOrder::Terminate => return Ok(()),
                CoordinatorOrder::Abort(reason) => {
                    return Err(CommError::CoordinatorFailed(reason).into());
                }
                CoordinatorOrder::Rendezvous(order) => order,
            };
            debug!(
                rendezvous = order.rendezvous,
                start = order.start,
                end = order.end,
                "Rendezvous order received"
            );

            let stop = if interruptible {
                StopCondition::never().with_token(self.token.clone())
            } else {
                StopCondition::never()
            };
            let report = {
                let queue = self.coordinator.batch_queue(stop);
                let pipeline = CollaboratorPipeline {
                    model: &self.model,
                    source: &self.source,
                    event_handler: &self.event_handler,
                };
                self.dispatcher.dispatch(&queue, &pipeline)?
            };
            self.coordinator.report_finished(RankReport {
                batches: report.batches,
                histories: report.histories,
            })?;

            self.aggregator.reduce(
                self.dispatcher.arena(),
                &mut self.source,
                &mut self.event_handler,
                self.coordinator.communicator(),
            )?;
            self.coordinator.await_verdict()?;
            self.controller.follow_rendezvous();
        }
    }

    /// Reduce, persist, then advance the state.
    fn finish_rendezvous(&mut self, issued_end: u64, started: Instant) -> Result<(), SimulationError> {
        self.aggregator.reduce(
            self.dispatcher.arena(),
            &mut self.source,
            &mut self.event_handler,
            self.coordinator.communicator(),
        )?;

        let run_time = self.run_time + started.elapsed();
        let bundle = CollaboratorBundle {
            model: &self.model,
            source: &self.source,
            event_handler: &self.event_handler,
        };
        let archive = self.controller.complete_rendezvous(issued_end, run_time, &bundle)?;

        let state = self.controller.state();
        info!(
            rendezvous = state.rendezvous_count,
            next_history = state.next_history,
            archive = ?archive,
            "Rendezvous complete"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Archive identity
    // ═══════════════════════════════════════════════════════════════════════

    /// Keep one archive file, overwritten at every rendezvous.
    pub fn use_single_rendezvous_file(&mut self) -> Result<(), SimulationError> {
        self.change_identity(IdentityChange {
            file_mode: Some(RendezvousFileMode::Single),
            ..Default::default()
        })
    }

    /// Write a separate, indexed archive per rendezvous.
    pub fn use_multiple_rendezvous_files(&mut self) -> Result<(), SimulationError> {
        self.change_identity(IdentityChange {
            file_mode: Some(RendezvousFileMode::Multiple),
            ..Default::default()
        })
    }

    pub fn set_simulation_name(&mut self, name: impl Into<String>) -> Result<(), SimulationError> {
        self.change_identity(IdentityChange {
            name: Some(name.into()),
            ..Default::default()
        })
    }

    pub fn set_simulation_archive_type(
        &mut self,
        format: ArchiveFormat,
    ) -> Result<(), SimulationError> {
        self.change_identity(IdentityChange {
            format: Some(format),
            ..Default::default()
        })
    }

    pub fn set_simulation_name_and_archive_type(
        &mut self,
        name: impl Into<String>,
        format: ArchiveFormat,
    ) -> Result<(), SimulationError> {
        self.change_identity(IdentityChange {
            name: Some(name.into()),
            format: Some(format),
            file_mode: None,
        })
    }

    fn change_identity(&mut self, change: IdentityChange) -> Result<(), SimulationError> {
        if change.name.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::EmptyName.into());
        }
        let bundle = CollaboratorBundle {
            model: &self.model,
            source: &self.source,
            event_handler: &self.event_handler,
        };
        self.controller.change_identity(change, self.run_time, &bundle)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Summaries
    // ═══════════════════════════════════════════════════════════════════════

    fn simulation_data(&self) -> SimulationData {
        let state = self.controller.state();
        SimulationData {
            simulation_name: state.simulation_name.clone(),
            next_history: state.next_history,
            rendezvous_count: state.rendezvous_count,
            histories_completed: self.aggregator.cumulative().tally.histories,
            simulation_time_s: self.run_time.as_secs_f64(),
            previous_simulation_time_s: state.previous_run_time.as_secs_f64(),
            plan: self.controller.plan(),
            model: self.model.name().to_string(),
            source_counters: *self.source.counters(),
            tally: *self.event_handler.tally(),
        }
    }

    pub fn print_simulation_summary(&self, os: &mut dyn Write) -> io::Result<()> {
        self.simulation_data().write_header(os)?;
        self.model.print_summary(os)?;
        self.source.print_summary(os)?;
        self.event_handler.print_summary(os)
    }

    pub fn log_simulation_summary(&self) {
        let data = self.simulation_data();
        info!(
            name = %data.simulation_name,
            histories_completed = data.histories_completed,
            simulation_time_s = data.simulation_time_s,
            previous_simulation_time_s = data.previous_simulation_time_s,
            rendezvous = data.rendezvous_count,
            next_history = data.next_history,
            "Simulation summary"
        );
        self.source.log_summary();
        self.event_handler.log_summary();
    }

    /// Write run data as JSON to `path`; progress text goes to `os`.
    ///
    /// Only the root writes; other ranks return immediately.
    pub fn export_simulation_data(
        &self,
        path: &Path,
        os: &mut dyn Write,
    ) -> Result<(), SimulationError> {
        if !self.coordinator.topology().is_root() {
            return Ok(());
        }
        write!(os, "Exporting simulation data to {}... ", path.display())?;
        os.flush()?;

        let mut file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut file, &self.simulation_data())
            .map_err(|e| SimulationError::Export(e.to_string()))?;
        file.flush()?;

        writeln!(os, "done.")?;
        info!(path = %path.display(), "Exported simulation data");
        Ok(())
    }

    /// Clear every accumulated statistic.
    pub fn reset_data(&mut self) {
        self.dispatcher.arena().clear();
        self.dispatcher.progress().reset();
        self.source.reset_data();
        self.event_handler.reset_data();
        self.aggregator.reset();
        debug!("Simulation data reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManagerFactory, RestartPolicy};
    use mcrun_archive::{ArchiveStore, RendezvousArchive};
    use mcrun_core::{CellGeometry, Communicator, StandardSource, TallyEventHandler};
    use mcrun_distributed::LocalCommunicator;
    use mcrun_planner::PlanError;
    use mcrun_test_helpers::{
        adjoint_photon_source, lost_photon_source, neutron_source, test_geometry,
        CancelAtHistory, FailingReductionHandler,
    };
    use mcrun_types::Rank;
    use std::sync::Arc;
    use std::thread;
    use tracing_test::traced_test;

    type Manager = ParticleSimulationManager<CellGeometry, StandardSource, TallyEventHandler>;
    type Bundle = CollaboratorBundle<CellGeometry, StandardSource, TallyEventHandler>;

    fn factory(
        dir: &Path,
        config: RunConfiguration,
    ) -> ManagerFactory<CellGeometry, StandardSource, TallyEventHandler> {
        ManagerFactory::new(test_geometry(), neutron_source(), TallyEventHandler::new(), config)
            .with_archive_directory(dir)
            .with_threads(2)
            .with_seed(7)
    }

    fn manager(dir: &Path, config: RunConfiguration) -> Manager {
        factory(dir, config).build().unwrap()
    }

    /// Run `body` once per rank of an in-process group, results in rank order.
    fn on_ranks<R: Send>(
        ranks: usize,
        body: impl Fn(Arc<dyn Communicator>) -> R + Sync,
    ) -> Vec<R> {
        let body = &body;
        thread::scope(|s| {
            let handles: Vec<_> = LocalCommunicator::group(ranks)
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let comm: Arc<dyn Communicator> = Arc::new(comm);
                        body(comm)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_small_fixed_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(5));
        assert_eq!(m.rendezvous_batch_size(), 5);
        assert_eq!(m.batch_size(), 5);

        m.run_simulation().unwrap();

        assert_eq!(m.next_history(), 5);
        assert_eq!(m.number_of_rendezvous(), 1);
        assert_eq!(m.event_handler().tally().histories, 5);
        assert_eq!(m.source().number_of_samples(), 5);
        assert_eq!(files_in(dir.path()), vec!["simulation_rendezvous_0.json"]);
    }

    #[test]
    fn test_run_splits_into_rendezvous() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(
            dir.path(),
            RunConfiguration::new(100).with_min_rendezvous(4).with_max_batch_size(5),
        );
        assert_eq!(m.rendezvous_batch_size(), 25);
        assert_eq!(m.batch_size(), 5);

        m.run_simulation().unwrap();

        assert_eq!(m.next_history(), 100);
        assert_eq!(m.number_of_rendezvous(), 4);
        assert_eq!(m.event_handler().tally().histories, 100);
        assert_eq!(
            files_in(dir.path()),
            (0..4)
                .map(|i| format!("simulation_rendezvous_{i}.json"))
                .collect::<Vec<_>>()
        );

        let last: RendezvousArchive<Bundle> =
            ArchiveStore::load(&dir.path().join("simulation_rendezvous_3.json")).unwrap();
        assert_eq!(last.state.next_history, 100);
        assert_eq!(last.state.rendezvous_count, 4);
        assert_eq!(last.collaborators.event_handler.tally().histories, 100);
    }

    #[test]
    fn test_partial_last_rendezvous() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(
            dir.path(),
            RunConfiguration::new(25).with_max_rendezvous_batch_size(10),
        );
        m.run_simulation().unwrap();

        assert_eq!(m.next_history(), 25);
        assert_eq!(m.number_of_rendezvous(), 3);
    }

    #[test]
    fn test_completed_run_does_nothing_more() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(5));
        m.run_simulation().unwrap();
        m.run_simulation().unwrap();

        assert_eq!(m.number_of_rendezvous(), 1);
        assert_eq!(m.event_handler().tally().histories, 5);
    }

    #[test]
    fn test_invalid_plans_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = factory(dir.path(), RunConfiguration::new(2).with_min_rendezvous(5))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SimulationError::Config(ConfigError::Plan(PlanError::EmptyRendezvous { .. }))
        ));

        let err = factory(dir.path(), RunConfiguration::new(5))
            .with_threads(0)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SimulationError::Config(ConfigError::NoThreads)));

        let err = factory(dir.path(), RunConfiguration::new(5))
            .with_simulation_name("")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SimulationError::Config(ConfigError::EmptyName)));
    }

    #[test]
    fn test_rename_writes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(5));
        m.set_simulation_name("test_sim_2").unwrap();

        assert_eq!(m.simulation_name(), "test_sim_2");
        assert_eq!(m.number_of_rendezvous(), 0);
        assert!(dir.path().join("test_sim_2_rendezvous_0.json").exists());

        assert!(matches!(
            m.set_simulation_name(""),
            Err(SimulationError::Config(ConfigError::EmptyName))
        ));
        assert_eq!(m.simulation_name(), "test_sim_2");
    }

    #[test]
    fn test_format_change_and_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(20).with_min_rendezvous(4));

        m.set_simulation_name_and_archive_type("s", ArchiveFormat::Bin)
            .unwrap();
        assert!(dir.path().join("s_rendezvous_0.bin").exists());

        m.set_simulation_archive_type(ArchiveFormat::Lz4).unwrap();
        assert!(dir.path().join("s_rendezvous_0.lz4").exists());

        m.use_single_rendezvous_file().unwrap();
        assert_eq!(m.rendezvous_file_mode(), RendezvousFileMode::Single);
        assert_eq!(m.current_archive_path(), dir.path().join("s_rendezvous.lz4"));

        m.run_simulation().unwrap();
        assert_eq!(
            files_in(dir.path()),
            vec!["s_rendezvous.lz4", "s_rendezvous_0.bin", "s_rendezvous_0.lz4"]
        );

        let archive: RendezvousArchive<Bundle> =
            ArchiveStore::load(&dir.path().join("s_rendezvous.lz4")).unwrap();
        assert_eq!(archive.state.rendezvous_count, 4);
        assert_eq!(archive.state.next_history, 20);

        m.use_multiple_rendezvous_files().unwrap();
        assert!(dir.path().join("s_rendezvous_4.lz4").exists());
    }

    #[test]
    fn test_wall_time_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = factory(
            dir.path(),
            RunConfiguration::new(0)
                .with_max_rendezvous_batch_size(200)
                .with_max_batch_size(20)
                .with_wall_time(Duration::from_millis(200)),
        )
        .with_file_mode(RendezvousFileMode::Single)
        .build()
        .unwrap();

        let started = Instant::now();
        m.run_simulation().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(m.next_history() > 0);
        assert!(m.number_of_rendezvous() > 0);
        assert_eq!(m.history_wall(), None);
        assert_eq!(files_in(dir.path()), vec!["simulation_rendezvous.json"]);
    }

    #[test]
    fn test_signal_before_interruptible_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(100).with_min_rendezvous(4));
        m.signal_handler(2);
        m.run_interruptible_simulation().unwrap();

        // One empty rendezvous, still archived.
        assert_eq!(m.next_history(), 0);
        assert_eq!(m.number_of_rendezvous(), 1);
        assert!(dir.path().join("simulation_rendezvous_0.json").exists());
    }

    #[test]
    fn test_signal_before_plain_run_finishes_rendezvous() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(100).with_min_rendezvous(4));
        m.cancellation_token().cancel();
        m.run_simulation().unwrap();

        assert_eq!(m.next_history(), 25);
        assert_eq!(m.number_of_rendezvous(), 1);
    }

    #[test]
    fn test_interruptible_run_stops_between_batches() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let mut m = ManagerFactory::new(
            test_geometry(),
            neutron_source(),
            CancelAtHistory::new(10, token.clone()),
            RunConfiguration::new(1000).with_max_batch_size(1),
        )
        .with_archive_directory(dir.path())
        .with_threads(1)
        .with_cancellation_token(token)
        .build()
        .unwrap();

        m.run_interruptible_simulation().unwrap();

        assert_eq!(m.next_history(), 11);
        assert_eq!(m.number_of_rendezvous(), 1);
        assert_eq!(m.event_handler().tally().histories, 11);
        assert!(m.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_failed_reduction_writes_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = ManagerFactory::new(
            test_geometry(),
            neutron_source(),
            FailingReductionHandler::default(),
            RunConfiguration::new(10),
        )
        .with_archive_directory(dir.path())
        .with_threads(1)
        .build()
        .unwrap();

        let err = m.run_simulation().unwrap_err();
        assert!(matches!(err, SimulationError::Reduction(_)));
        assert!(err.to_string().contains("bins do not match"));
        assert_eq!(m.next_history(), 0);
        assert_eq!(m.number_of_rendezvous(), 0);
        assert!(files_in(dir.path()).is_empty());

        // Statistics of the failed rendezvous were not absorbed.
        assert_eq!(m.event_handler().tally().histories, 0);
        assert_eq!(m.source().number_of_trials(), 0);
        let mut summary = Vec::new();
        m.print_simulation_summary(&mut summary).unwrap();
        assert!(String::from_utf8(summary)
            .unwrap()
            .contains("Number of histories completed: 0"));
    }

    #[test]
    fn test_lost_particles_are_tallied() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = ManagerFactory::new(
            test_geometry(),
            lost_photon_source(),
            TallyEventHandler::new(),
            RunConfiguration::new(8),
        )
        .with_archive_directory(dir.path())
        .with_threads(2)
        .build()
        .unwrap();
        m.run_simulation().unwrap();

        let tally = m.event_handler().tally();
        assert_eq!(tally.histories, 8);
        assert_eq!(tally.lost_particles, 8);
        assert_eq!(tally.source_particles, 0);
    }

    #[test]
    fn test_adjoint_probes_reach_handler() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = ManagerFactory::new(
            test_geometry(),
            adjoint_photon_source(&[0.9, 1.2]),
            TallyEventHandler::new(),
            RunConfiguration::new(6),
        )
        .with_archive_directory(dir.path())
        .with_threads(2)
        .build()
        .unwrap();
        m.run_simulation().unwrap();

        let tally = m.event_handler().tally();
        assert_eq!(tally.histories, 6);
        assert_eq!(tally.probe_particles, 12);
    }

    #[test]
    fn test_summary_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(5));
        m.run_simulation().unwrap();

        let mut out = Vec::new();
        m.print_simulation_summary(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Number of histories completed: 5"));
        assert!(text.contains("Simulation Time (s):"));

        let path = dir.path().join("data.json");
        let mut progress = Vec::new();
        m.export_simulation_data(&path, &mut progress).unwrap();
        assert!(String::from_utf8(progress).unwrap().ends_with("done.\n"));

        let data: SimulationData =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(data.histories_completed, 5);
        assert_eq!(data.next_history, 5);
        assert_eq!(data.tally.histories, 5);
        assert_eq!(data.model, "three-cell test geometry");
    }

    #[traced_test]
    #[test]
    fn test_log_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(3));
        m.run_simulation().unwrap();
        m.log_simulation_summary();

        assert!(logs_contain("Rendezvous complete"));
        assert!(logs_contain("Simulation summary"));
        assert!(logs_contain("histories_completed=3"));
    }

    #[test]
    fn test_status_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path(), RunConfiguration::new(12));
        m.run_simulation().unwrap();

        let status = m.simulation_status();
        assert_eq!(status.next_history, 12);
        assert_eq!(status.rendezvous_count, 1);
        assert_eq!(status.histories_run, 12);

        m.reset_data();
        assert_eq!(m.event_handler().tally().histories, 0);
        assert_eq!(m.source().number_of_trials(), 0);
        assert_eq!(m.simulation_status().histories_run, 0);
        // Position in the history stream is not statistics.
        assert_eq!(m.next_history(), 12);
    }

    #[test]
    fn test_restart_continues_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = manager(dir.path(), RunConfiguration::new(5));
        first.run_simulation().unwrap();

        let mut restarted: Manager = ManagerFactory::from_archive(
            dir.path().join("simulation_rendezvous_0.json"),
            RestartPolicy::ExtendHistories(10),
        )
        .unwrap()
        .with_threads(2)
        .build()
        .unwrap();
        assert_eq!(restarted.history_wall(), Some(15));
        restarted.run_simulation().unwrap();

        assert_eq!(restarted.next_history(), 15);
        assert_eq!(restarted.number_of_rendezvous(), 2);
        assert_eq!(restarted.event_handler().tally().histories, 15);
        assert!(dir.path().join("simulation_rendezvous_1.json").exists());
    }

    #[test]
    fn test_restart_with_updated_configuration() {
        let dir = tempfile::tempdir().unwrap();
        manager(dir.path(), RunConfiguration::new(10))
            .run_simulation()
            .unwrap();

        let updated = RunConfiguration::new(16)
            .with_min_rendezvous(2)
            .with_max_rendezvous_batch_size(100)
            .with_batch_multiplier(2)
            .with_wall_time_secs(30.0)
            .unwrap();
        let mut restarted: Manager = ManagerFactory::from_archive(
            dir.path().join("simulation_rendezvous_0.json"),
            RestartPolicy::UpdatedConfiguration(updated),
        )
        .unwrap()
        .with_threads(1)
        .build()
        .unwrap();

        assert_eq!(restarted.rendezvous_batch_size(), 8);
        assert_eq!(restarted.batch_size(), 4);
        restarted.run_simulation().unwrap();
        assert_eq!(restarted.next_history(), 26);
        assert_eq!(restarted.number_of_rendezvous(), 3);
    }

    #[test]
    fn test_restart_unchanged_resumes_cancelled_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = manager(dir.path(), RunConfiguration::new(20).with_min_rendezvous(2));
        first.signal_handler(15);
        first.run_simulation().unwrap();
        assert_eq!(first.next_history(), 10);

        let mut restarted: Manager = ManagerFactory::from_archive(
            dir.path().join("simulation_rendezvous_0.json"),
            RestartPolicy::Unchanged,
        )
        .unwrap()
        .build()
        .unwrap();
        restarted.run_simulation().unwrap();

        assert_eq!(restarted.next_history(), 20);
        assert_eq!(restarted.number_of_rendezvous(), 2);
        assert_eq!(restarted.event_handler().tally().histories, 20);
    }

    #[test]
    fn test_restart_with_new_wall_time_finishes_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = manager(dir.path(), RunConfiguration::new(20).with_min_rendezvous(2));
        first.signal_handler(2);
        first.run_simulation().unwrap();
        assert_eq!(first.next_history(), 10);

        let budget = Duration::from_secs(3600);
        let mut restarted: Manager = ManagerFactory::from_archive(
            dir.path().join("simulation_rendezvous_0.json"),
            RestartPolicy::NewWallTime(budget),
        )
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(restarted.config().wall_time_budget, Some(budget));
        assert_eq!(restarted.history_wall(), Some(20));
        restarted.run_simulation().unwrap();

        assert_eq!(restarted.next_history(), 20);
        assert_eq!(restarted.number_of_rendezvous(), 2);

        // The run is complete; a further restart with more time adds nothing.
        let mut again: Manager = ManagerFactory::from_archive(
            dir.path().join("simulation_rendezvous_1.json"),
            RestartPolicy::NewWallTime(budget),
        )
        .unwrap()
        .build()
        .unwrap();
        again.run_simulation().unwrap();
        assert_eq!(again.next_history(), 20);
        assert_eq!(again.number_of_rendezvous(), 2);
        assert!(!dir.path().join("simulation_rendezvous_2.json").exists());
    }

    #[test]
    fn test_restart_extending_histories_and_wall_time() {
        let dir = tempfile::tempdir().unwrap();
        manager(dir.path(), RunConfiguration::new(10))
            .run_simulation()
            .unwrap();

        let mut restarted: Manager = ManagerFactory::from_archive(
            dir.path().join("simulation_rendezvous_0.json"),
            RestartPolicy::ExtendHistoriesAndWallTime(5, Duration::from_secs(600)),
        )
        .unwrap()
        .build()
        .unwrap();
        restarted.run_simulation().unwrap();

        assert_eq!(restarted.next_history(), 15);
        assert_eq!(restarted.number_of_rendezvous(), 2);
        assert_eq!(restarted.event_handler().tally().histories, 15);
        assert_eq!(
            restarted.config().wall_time_budget,
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_huge_wall_time_runs_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfiguration::new(10).with_wall_time(Duration::from_secs(u64::MAX / 2));
        let mut m = manager(dir.path(), config);
        m.run_simulation().unwrap();
        assert_eq!(m.next_history(), 10);
    }

    #[test]
    fn test_restart_from_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let result = ManagerFactory::<CellGeometry, StandardSource, TallyEventHandler>::from_archive(
            dir.path().join("nothing_rendezvous_0.json"),
            RestartPolicy::Unchanged,
        );
        assert!(matches!(result, Err(SimulationError::Archive(_))));
    }

    #[test]
    fn test_distributed_run() {
        let dir = tempfile::tempdir().unwrap();
        let results = on_ranks(3, |comm| {
            let mut m = factory(dir.path(), RunConfiguration::new(60).with_min_rendezvous(3))
                .with_communicator(comm)
                .build()
                .unwrap();
            assert_eq!(m.rendezvous_batch_size(), 20);
            assert_eq!(m.batch_size(), 10);
            m.run_simulation().unwrap();
            (
                m.next_history(),
                m.number_of_rendezvous(),
                m.event_handler().tally().histories,
            )
        });

        assert_eq!(results[0], (60, 3, 60));
        for worker in &results[1..] {
            assert_eq!(worker.0, 0);
            assert_eq!(worker.1, 3);
        }
        assert_eq!(
            files_in(dir.path()),
            (0..3)
                .map(|i| format!("simulation_rendezvous_{i}.json"))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_distributed_archive_failure_stops_every_rank() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_directory");
        std::fs::write(&blocker, b"").unwrap();

        let results = on_ranks(2, |comm| {
            factory(&blocker, RunConfiguration::new(10))
                .with_communicator(comm)
                .build()
                .unwrap()
                .run_simulation()
        });

        assert!(matches!(results[0], Err(SimulationError::Archive(_))));
        match &results[1] {
            Err(SimulationError::Comm(CommError::CoordinatorFailed(reason))) => {
                assert!(reason.contains("not_a_directory"));
            }
            other => panic!("worker returned {other:?}"),
        }
    }

    #[test]
    fn test_distributed_worker_lost_before_run() {
        let dir = tempfile::tempdir().unwrap();
        let results = on_ranks(3, |comm| {
            if comm.rank() == Rank(2) {
                // As if this rank failed to build its manager.
                return None;
            }
            let mut m = factory(dir.path(), RunConfiguration::new(20))
                .with_communicator(comm)
                .build()
                .unwrap();
            Some(m.run_simulation().map(|()| m.next_history()))
        });

        assert!(matches!(
            results[0],
            Some(Err(SimulationError::Comm(CommError::Disconnected(Rank(2)))))
        ));
        let worker = results[1].as_ref().unwrap().as_ref().unwrap_err();
        assert!(worker.to_string().contains("Coordinator aborted the run"));
        assert!(files_in(dir.path()).is_empty());
    }

    #[test]
    fn test_distributed_interruptible_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let results = on_ranks(3, |comm| {
            let mut m = factory(dir.path(), RunConfiguration::new(60).with_min_rendezvous(3))
                .with_communicator(comm)
                .with_cancellation_token(token.clone())
                .build()
                .unwrap();
            m.run_interruptible_simulation().unwrap();
            (
                m.next_history(),
                m.number_of_rendezvous(),
                m.event_handler().tally().histories,
            )
        });

        for result in &results {
            assert_eq!(*result, (0, 1, 0));
        }
        assert_eq!(files_in(dir.path()), vec!["simulation_rendezvous_0.json"]);
    }

    #[test]
    fn test_distributed_restart() {
        let dir = tempfile::tempdir().unwrap();
        on_ranks(2, |comm| {
            factory(dir.path(), RunConfiguration::new(20).with_min_rendezvous(2))
                .with_communicator(comm)
                .build()
                .unwrap()
                .run_simulation()
                .unwrap();
        });
        let archive = dir.path().join("simulation_rendezvous_1.json");
        assert!(archive.exists());

        let results = on_ranks(2, |comm| {
            let mut m: Manager =
                ManagerFactory::from_archive(&archive, RestartPolicy::ExtendHistories(10))
                    .unwrap()
                    .with_threads(2)
                    .with_communicator(comm)
                    .build()
                    .unwrap();
            assert_eq!(m.rendezvous_batch_size(), 5);
            m.run_simulation().unwrap();
            (
                m.next_history(),
                m.number_of_rendezvous(),
                m.event_handler().tally().histories,
            )
        });

        assert_eq!(results[0], (30, 4, 30));
        // Workers keep the position they were restarted at.
        assert_eq!((results[1].0, results[1].1), (20, 4));
        assert!(dir.path().join("simulation_rendezvous_3.json").exists());
    }
}
