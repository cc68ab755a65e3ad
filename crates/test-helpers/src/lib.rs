//! Test fixtures.
//!
//! Small collaborator sets for unit tests, plus event handlers that cancel
//! a run or fail to reduce on demand.

use mcrun_core::{
    CancellationToken, CellGeometry, Communicator, ComponentVariant, EnergySpectrum, EventHandler,
    PointDistribution, Reducible, ReductionError, SourceComponent, SourceParticle,
    StandardSource, TallyEventHandler, WorkerContext,
};
use mcrun_types::{CellId, ComponentId, HistoryTally, Rank};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Geometry with cells 1, 2 and 3.
pub fn test_geometry() -> CellGeometry {
    CellGeometry::new("three-cell test geometry", [CellId(1), CellId(2), CellId(3)])
}

fn single_component(variant: ComponentVariant, cell: CellId) -> StandardSource {
    let distribution =
        PointDistribution::new(cell, EnergySpectrum::Uniform { min: 0.5, max: 2.0 });
    StandardSource::new(vec![SourceComponent::new(ComponentId(0), variant, distribution)])
        .expect("fixture source is valid")
}

/// Neutron point source in cell 1.
pub fn neutron_source() -> StandardSource {
    single_component(ComponentVariant::Neutron, CellId(1))
}

/// Adjoint photon source in cell 2 with the given critical line energies.
pub fn adjoint_photon_source(critical_energies: &[f64]) -> StandardSource {
    single_component(
        ComponentVariant::AdjointPhoton {
            critical_energies: critical_energies.to_vec(),
        },
        CellId(2),
    )
}

/// Photon source in a cell outside [`test_geometry`].
pub fn lost_photon_source() -> StandardSource {
    single_component(ComponentVariant::Photon, CellId(99))
}

/// Tally handler that cancels `token` once history `at` commits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAtHistory {
    pub at: u64,
    #[serde(skip)]
    pub token: CancellationToken,
    inner: TallyEventHandler,
}

impl CancelAtHistory {
    pub fn new(at: u64, token: CancellationToken) -> Self {
        Self {
            at,
            token,
            inner: TallyEventHandler::new(),
        }
    }
}

impl Reducible for CancelAtHistory {
    fn reset_data(&mut self) {
        self.inner.reset_data();
    }
}

impl EventHandler for CancelAtHistory {
    fn commit_history(&self, history: u64, particles: &[SourceParticle], ctx: &mut WorkerContext) {
        self.inner.commit_history(history, particles, ctx);
        if history == self.at {
            self.token.cancel();
        }
    }

    fn tally(&self) -> &HistoryTally {
        self.inner.tally()
    }

    fn absorb_tally(&mut self, reduced: &HistoryTally) {
        self.inner.absorb_tally(reduced);
    }

    fn print_summary(&self, os: &mut dyn Write) -> io::Result<()> {
        self.inner.print_summary(os)
    }

    fn log_summary(&self) {
        self.inner.log_summary();
    }
}

/// Tally handler whose own reduction always fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailingReductionHandler(pub TallyEventHandler);

impl Reducible for FailingReductionHandler {
    fn reduce_data(&mut self, _comm: &dyn Communicator, _root: Rank) -> Result<(), ReductionError> {
        Err(ReductionError::collaborator("flux estimator", "bins do not match"))
    }

    fn reset_data(&mut self) {
        self.0.reset_data();
    }
}

impl EventHandler for FailingReductionHandler {
    fn commit_history(&self, history: u64, particles: &[SourceParticle], ctx: &mut WorkerContext) {
        self.0.commit_history(history, particles, ctx);
    }

    fn tally(&self) -> &HistoryTally {
        self.0.tally()
    }

    fn absorb_tally(&mut self, reduced: &HistoryTally) {
        self.0.absorb_tally(reduced);
    }

    fn print_summary(&self, os: &mut dyn Write) -> io::Result<()> {
        self.0.print_summary(os)
    }

    fn log_summary(&self) {}
}
