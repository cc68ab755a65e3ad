//! Source particle states.

use mcrun_types::{CellId, ComponentId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Particle species a source component emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleKind {
    Neutron,
    Photon,
    Electron,
    Positron,
    AdjointPhoton,
    AdjointElectron,
}

impl ParticleKind {
    pub fn is_adjoint(self) -> bool {
        matches!(self, ParticleKind::AdjointPhoton | ParticleKind::AdjointElectron)
    }
}

impl fmt::Display for ParticleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParticleKind::Neutron => "neutron",
            ParticleKind::Photon => "photon",
            ParticleKind::Electron => "electron",
            ParticleKind::Positron => "positron",
            ParticleKind::AdjointPhoton => "adjoint photon",
            ParticleKind::AdjointElectron => "adjoint electron",
        };
        f.write_str(name)
    }
}

/// Initial phase-space state of a particle emitted by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceParticle {
    pub history: u64,
    /// Index of the state within its history.
    pub state_id: u64,
    pub source_id: ComponentId,
    pub kind: ParticleKind,
    /// Probe particles sit at a fixed critical energy.
    pub probe: bool,
    pub cell: CellId,
    pub position: [f64; 3],
    pub direction: [f64; 3],
    /// Energy (MeV).
    pub energy: f64,
    /// Time (s).
    pub time: f64,
    pub weight: f64,
}

impl SourceParticle {
    /// Unsampled state for `history`.
    pub fn new(history: u64, state_id: u64, source_id: ComponentId, kind: ParticleKind) -> Self {
        Self {
            history,
            state_id,
            source_id,
            kind,
            probe: false,
            cell: CellId(0),
            position: [0.0; 3],
            direction: [0.0, 0.0, 1.0],
            energy: 0.0,
            time: 0.0,
            weight: 1.0,
        }
    }
}
