//! History-tally event handler.

use crate::{EventHandler, Reducible, SourceParticle, WorkerContext};
use mcrun_types::HistoryTally;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use tracing::info;

/// Event handler that tallies committed histories and source particles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TallyEventHandler {
    tally: HistoryTally,
}

impl TallyEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean committed weight per history.
    pub fn mean_weight_per_history(&self) -> f64 {
        if self.tally.histories == 0 {
            0.0
        } else {
            self.tally.total_weight / self.tally.histories as f64
        }
    }
}

impl Reducible for TallyEventHandler {
    fn reset_data(&mut self) {
        self.tally = HistoryTally::default();
    }
}

impl EventHandler for TallyEventHandler {
    fn commit_history(&self, _history: u64, particles: &[SourceParticle], ctx: &mut WorkerContext) {
        let tally = &mut ctx.counters.tally;
        tally.histories += 1;
        for particle in particles {
            if particle.probe {
                tally.probe_particles += 1;
            } else {
                tally.source_particles += 1;
                tally.total_weight += particle.weight;
            }
        }
    }

    fn tally(&self) -> &HistoryTally {
        &self.tally
    }

    fn absorb_tally(&mut self, reduced: &HistoryTally) {
        self.tally.merge(reduced);
    }

    fn print_summary(&self, os: &mut dyn Write) -> io::Result<()> {
        writeln!(os, "Event handler:")?;
        writeln!(os, "  Histories committed: {}", self.tally.histories)?;
        writeln!(os, "  Source particles: {}", self.tally.source_particles)?;
        writeln!(os, "  Probe particles: {}", self.tally.probe_particles)?;
        writeln!(os, "  Lost particles: {}", self.tally.lost_particles)?;
        writeln!(os, "  Mean weight per history: {:.6}", self.mean_weight_per_history())
    }

    fn log_summary(&self) {
        info!(
            histories = self.tally.histories,
            source_particles = self.tally.source_particles,
            probe_particles = self.tally.probe_particles,
            lost_particles = self.tally.lost_particles,
            "Event handler summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParticleKind;
    use mcrun_types::{ComponentId, WorkerIndex};
    use tracing_test::traced_test;

    #[test]
    fn test_probes_tallied_separately() {
        let handler = TallyEventHandler::new();
        let mut ctx = WorkerContext::new(WorkerIndex(0), 0);
        let source = SourceParticle::new(1, 0, ComponentId(0), ParticleKind::AdjointElectron);
        let mut probe = SourceParticle::new(1, 1, ComponentId(0), ParticleKind::AdjointElectron);
        probe.probe = true;

        handler.commit_history(1, &[source, probe], &mut ctx);

        let tally = ctx.counters.tally;
        assert_eq!(tally.histories, 1);
        assert_eq!(tally.source_particles, 1);
        assert_eq!(tally.probe_particles, 1);
        assert_eq!(tally.total_weight, 1.0);
    }

    #[traced_test]
    #[test]
    fn test_log_summary_reports_tally() {
        let mut handler = TallyEventHandler::new();
        handler.absorb_tally(&HistoryTally {
            histories: 12,
            ..Default::default()
        });
        handler.log_summary();
        assert!(logs_contain("Event handler summary"));
        assert!(logs_contain("histories=12"));
    }
}
