//! Run summaries and exported run data.

use mcrun_types::{BatchPlan, HistoryTally, SamplingCounters};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::Duration;

/// Snapshot of a manager's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationStatus {
    pub next_history: u64,
    pub rendezvous_count: u64,
    /// Histories run by this process's threads since the last reset.
    pub histories_run: u64,
    /// Time spent running in this process.
    pub run_time: Duration,
}

/// Run data written by `export_simulation_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationData {
    pub simulation_name: String,
    pub next_history: u64,
    pub rendezvous_count: u64,
    pub histories_completed: u64,
    pub simulation_time_s: f64,
    pub previous_simulation_time_s: f64,
    pub plan: BatchPlan,
    pub model: String,
    pub source_counters: SamplingCounters,
    pub tally: HistoryTally,
}

impl SimulationData {
    /// Header lines of the simulation summary.
    pub fn write_header(&self, os: &mut dyn Write) -> io::Result<()> {
        writeln!(os, "Number of histories completed: {}", self.histories_completed)?;
        writeln!(os, "Simulation Time (s): {:.6}", self.simulation_time_s)?;
        if self.previous_simulation_time_s > 0.0 {
            writeln!(
                os,
                "Previous Simulation Time (s): {:.6}",
                self.previous_simulation_time_s
            )?;
        }
        writeln!(os, "Number of rendezvous: {}", self.rendezvous_count)?;
        writeln!(os, "Next history: {}", self.next_history)?;
        writeln!(os, "Rendezvous batch size: {}", self.plan.rendezvous_batch_size)?;
        writeln!(os, "Batch size: {}", self.plan.batch_size)
    }
}
