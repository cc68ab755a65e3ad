//! Rendezvous bookkeeping and archive persistence.

use mcrun_archive::{ArchiveError, ArchiveStore, RendezvousArchive};
use mcrun_types::{ArchiveFormat, BatchPlan, RendezvousFileMode, RunConfiguration, SimulationState};
use serde::Serialize;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Change of archive identity requested between rendezvous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityChange {
    pub name: Option<String>,
    pub format: Option<ArchiveFormat>,
    pub file_mode: Option<RendezvousFileMode>,
}

/// Owns the simulation state between rendezvous.
///
/// Every state change that must survive a restart goes through here. The new
/// state is written first and only committed once the archive is on disk, so
/// a failed write leaves the previous state in place.
#[derive(Debug)]
pub struct RendezvousController {
    state: SimulationState,
    config: RunConfiguration,
    plan: BatchPlan,
    store: ArchiveStore,
    writes_archives: bool,
}

impl RendezvousController {
    pub fn new(
        state: SimulationState,
        config: RunConfiguration,
        plan: BatchPlan,
        store: ArchiveStore,
        writes_archives: bool,
    ) -> Self {
        Self {
            state,
            config,
            plan,
            store,
            writes_archives,
        }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn plan(&self) -> BatchPlan {
        self.plan
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    pub fn writes_archives(&self) -> bool {
        self.writes_archives
    }

    /// Histories the next rendezvous covers, clipped to the history wall.
    pub fn next_rendezvous_range(&self) -> Range<u64> {
        let start = self.state.next_history;
        let mut end = start.saturating_add(self.plan.rendezvous_batch_size);
        if self.state.is_history_bounded() {
            end = end.min(self.state.history_wall.max(start));
        }
        start..end
    }

    /// Path of the archive the next write would produce.
    pub fn current_archive_path(&self) -> PathBuf {
        self.archive_path(self.state.rendezvous_count)
    }

    /// Path of the archive for rendezvous `index` under the current identity.
    pub fn archive_path(&self, index: u64) -> PathBuf {
        self.path_at(&self.state, index)
    }

    /// Record a finished rendezvous whose issued histories end at `issued_end`.
    ///
    /// `run_time` is the time this process has spent running so far.
    pub fn complete_rendezvous<C: Serialize>(
        &mut self,
        issued_end: u64,
        run_time: Duration,
        collaborators: &C,
    ) -> Result<Option<PathBuf>, ArchiveError> {
        let index = self.state.rendezvous_count;
        let mut next = self.state.clone();
        next.next_history = issued_end.max(next.next_history);
        next.rendezvous_count += 1;

        let path = self.persist(&next, index, run_time, collaborators)?;
        self.state = next;
        Ok(path)
    }

    /// Count a rendezvous the coordinator committed on a rank that keeps no
    /// history position of its own.
    pub fn follow_rendezvous(&mut self) {
        self.state.rendezvous_count += 1;
    }

    /// Apply `change` and write an archive under the new identity.
    pub fn change_identity<C: Serialize>(
        &mut self,
        change: IdentityChange,
        run_time: Duration,
        collaborators: &C,
    ) -> Result<Option<PathBuf>, ArchiveError> {
        let mut next = self.state.clone();
        if let Some(name) = change.name {
            next.simulation_name = name;
        }
        if let Some(format) = change.format {
            next.archive_format = format;
        }
        if let Some(mode) = change.file_mode {
            next.rendezvous_file_mode = mode;
        }

        let path = self.persist(&next, next.rendezvous_count, run_time, collaborators)?;
        info!(
            name = %next.simulation_name,
            format = %next.archive_format,
            mode = ?next.rendezvous_file_mode,
            "Archive identity changed"
        );
        self.state = next;
        Ok(path)
    }

    fn path_at(&self, state: &SimulationState, index: u64) -> PathBuf {
        self.store.path_for(
            &state.simulation_name,
            state.archive_format,
            state.rendezvous_file_mode,
            index,
        )
    }

    fn persist<C: Serialize>(
        &self,
        state: &SimulationState,
        index: u64,
        run_time: Duration,
        collaborators: &C,
    ) -> Result<Option<PathBuf>, ArchiveError> {
        if !self.writes_archives {
            return Ok(None);
        }
        let mut archived = state.clone();
        archived.previous_run_time += run_time;

        let path = self.path_at(state, index);
        let archive = RendezvousArchive::new(archived, self.config.clone(), collaborators);
        self.store.save(&path, &archive)?;
        Ok(Some(path))
    }
}
