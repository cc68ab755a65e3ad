//! Standard particle source.
//!
//! A source is a weighted set of components. Each history picks one
//! component, asks it how many particle states the history carries, then
//! initializes and samples each state. Forward components emit one state per
//! history. Adjoint components emit the sampled particle followed by one
//! probe per critical line energy.

use crate::{ParticleKind, ParticleSource, Reducible, SourceParticle, WorkerContext};
use mcrun_types::{CellId, ComponentId, PhaseSpaceDimension, SamplingCounters};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{self, Write};
use thiserror::Error;
use tracing::info;

/// Errors raised while assembling a source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("Source has no components")]
    NoComponents,

    #[error("{0} has a non-positive selection weight")]
    InvalidWeight(ComponentId),

    #[error("{0} has an invalid energy spectrum")]
    InvalidSpectrum(ComponentId),
}

/// Particle species of a component, with adjoint-only data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentVariant {
    Neutron,
    Photon,
    Electron,
    Positron,
    AdjointPhoton { critical_energies: Vec<f64> },
    AdjointElectron { critical_energies: Vec<f64> },
}

impl ComponentVariant {
    pub fn kind(&self) -> ParticleKind {
        match self {
            ComponentVariant::Neutron => ParticleKind::Neutron,
            ComponentVariant::Photon => ParticleKind::Photon,
            ComponentVariant::Electron => ParticleKind::Electron,
            ComponentVariant::Positron => ParticleKind::Positron,
            ComponentVariant::AdjointPhoton { .. } => ParticleKind::AdjointPhoton,
            ComponentVariant::AdjointElectron { .. } => ParticleKind::AdjointElectron,
        }
    }

    /// Critical line energies (empty for forward species).
    pub fn critical_energies(&self) -> &[f64] {
        match self {
            ComponentVariant::AdjointPhoton { critical_energies }
            | ComponentVariant::AdjointElectron { critical_energies } => critical_energies,
            _ => &[],
        }
    }
}

/// Energy spectrum of a component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergySpectrum {
    Mono(f64),
    Uniform { min: f64, max: f64 },
}

impl EnergySpectrum {
    fn is_valid(&self) -> bool {
        match *self {
            EnergySpectrum::Mono(e) => e > 0.0,
            EnergySpectrum::Uniform { min, max } => min > 0.0 && max > min,
        }
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        match *self {
            EnergySpectrum::Mono(e) => e,
            EnergySpectrum::Uniform { min, max } => rng.gen_range(min..max),
        }
    }
}

/// Isotropic point emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDistribution {
    pub cell: CellId,
    pub position: [f64; 3],
    pub energy: EnergySpectrum,
    pub time: f64,
    pub weight: f64,
}

impl PointDistribution {
    pub fn new(cell: CellId, energy: EnergySpectrum) -> Self {
        Self {
            cell,
            position: [0.0; 3],
            energy,
            time: 0.0,
            weight: 1.0,
        }
    }

    /// Sample every dimension, or every dimension but energy for probes.
    fn sample(&self, particle: &mut SourceParticle, ctx: &mut WorkerContext) {
        let sampling = &mut ctx.counters.sampling;
        sampling.record_trial(PhaseSpaceDimension::Position);
        sampling.record_sample(PhaseSpaceDimension::Position);
        particle.cell = self.cell;
        particle.position = self.position;

        // Rejection from the enclosing cube.
        let direction = loop {
            ctx.counters.sampling.record_trial(PhaseSpaceDimension::Direction);
            let v: [f64; 3] = [
                ctx.rng().gen_range(-1.0..1.0),
                ctx.rng().gen_range(-1.0..1.0),
                ctx.rng().gen_range(-1.0..1.0),
            ];
            let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            if norm > 1e-12 && norm <= 1.0 {
                break [v[0] / norm, v[1] / norm, v[2] / norm];
            }
        };
        ctx.counters.sampling.record_sample(PhaseSpaceDimension::Direction);
        particle.direction = direction;

        if !particle.probe {
            ctx.counters.sampling.record_trial(PhaseSpaceDimension::Energy);
            particle.energy = self.energy.sample(ctx.rng());
            ctx.counters.sampling.record_sample(PhaseSpaceDimension::Energy);
        }

        let sampling = &mut ctx.counters.sampling;
        for dimension in [PhaseSpaceDimension::Time, PhaseSpaceDimension::Weight] {
            sampling.record_trial(dimension);
            sampling.record_sample(dimension);
        }
        particle.time = self.time;
        particle.weight = self.weight;
    }
}

/// One weighted component of a [`StandardSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceComponent {
    pub id: ComponentId,
    pub selection_weight: f64,
    pub variant: ComponentVariant,
    pub distribution: PointDistribution,
}

impl SourceComponent {
    pub fn new(id: ComponentId, variant: ComponentVariant, distribution: PointDistribution) -> Self {
        Self {
            id,
            selection_weight: 1.0,
            variant,
            distribution,
        }
    }

    pub fn with_selection_weight(mut self, weight: f64) -> Self {
        self.selection_weight = weight;
        self
    }

    /// Number of particle states one history of this component carries.
    pub fn particle_state_count(&self) -> u64 {
        1 + self.variant.critical_energies().len() as u64
    }

    /// Unsampled state `state_id` of `history`.
    ///
    /// States past the first are probes pinned at a critical energy.
    pub fn initialize_state(&self, history: u64, state_id: u64) -> SourceParticle {
        let mut particle = SourceParticle::new(history, state_id, self.id, self.variant.kind());
        if state_id > 0 {
            if let Some(&energy) = self
                .variant
                .critical_energies()
                .get((state_id - 1) as usize)
            {
                particle.probe = true;
                particle.energy = energy;
            }
        }
        particle
    }

    /// Sample the phase space of an initialized state.
    pub fn sample_state(&self, particle: &mut SourceParticle, ctx: &mut WorkerContext) {
        self.distribution.sample(particle, ctx);
    }

    fn validate(&self) -> Result<(), SourceError> {
        if !(self.selection_weight > 0.0) {
            return Err(SourceError::InvalidWeight(self.id));
        }
        if !self.distribution.energy.is_valid() {
            return Err(SourceError::InvalidSpectrum(self.id));
        }
        Ok(())
    }
}

/// Weighted multi-component source.
///
/// Deserialized sources go through the same checks as [`StandardSource::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredSource")]
pub struct StandardSource {
    components: Vec<SourceComponent>,
    counters: SamplingCounters,
}

#[derive(Deserialize)]
struct StoredSource {
    components: Vec<SourceComponent>,
    counters: SamplingCounters,
}

impl TryFrom<StoredSource> for StandardSource {
    type Error = SourceError;

    fn try_from(stored: StoredSource) -> Result<Self, SourceError> {
        let mut source = StandardSource::new(stored.components)?;
        source.counters = stored.counters;
        Ok(source)
    }
}

impl StandardSource {
    pub fn new(components: Vec<SourceComponent>) -> Result<Self, SourceError> {
        if components.is_empty() {
            return Err(SourceError::NoComponents);
        }
        for component in &components {
            component.validate()?;
        }
        Ok(Self {
            components,
            counters: SamplingCounters::default(),
        })
    }

    pub fn components(&self) -> &[SourceComponent] {
        &self.components
    }

    fn select_component(&self, ctx: &mut WorkerContext) -> Option<&SourceComponent> {
        let total: f64 = self.components.iter().map(|c| c.selection_weight).sum();
        let mut target = ctx.rng().gen::<f64>() * total;
        for component in &self.components {
            if target < component.selection_weight {
                return Some(component);
            }
            target -= component.selection_weight;
        }
        // Rounding can leave a sliver past the last component.
        self.components.last()
    }
}

impl Reducible for StandardSource {
    fn reset_data(&mut self) {
        self.counters = SamplingCounters::default();
    }
}

impl ParticleSource for StandardSource {
    fn sample_particle_states(&self, history: u64, ctx: &mut WorkerContext) -> Vec<SourceParticle> {
        let Some(component) = self.select_component(ctx) else {
            return Vec::new();
        };
        ctx.counters.sampling.trials += 1;

        let states = (0..component.particle_state_count())
            .map(|state_id| {
                let mut particle = component.initialize_state(history, state_id);
                component.sample_state(&mut particle, ctx);
                particle
            })
            .collect();

        ctx.counters.sampling.samples += 1;
        states
    }

    fn starting_cells(&self) -> BTreeSet<CellId> {
        self.components.iter().map(|c| c.distribution.cell).collect()
    }

    fn counters(&self) -> &SamplingCounters {
        &self.counters
    }

    fn absorb_counters(&mut self, reduced: &SamplingCounters) {
        self.counters.merge(reduced);
    }

    fn print_summary(&self, os: &mut dyn Write) -> io::Result<()> {
        writeln!(os, "Source:")?;
        writeln!(os, "  Components: {}", self.components.len())?;
        writeln!(os, "  Trials: {}", self.counters.trials)?;
        writeln!(os, "  Samples: {}", self.counters.samples)?;
        writeln!(os, "  Efficiency: {:.6}", self.counters.efficiency())?;
        for dimension in PhaseSpaceDimension::ALL {
            writeln!(
                os,
                "  {} efficiency: {:.6}",
                dimension,
                self.counters.dimension_efficiency(dimension)
            )?;
        }
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            components = self.components.len(),
            trials = self.counters.trials,
            samples = self.counters.samples,
            efficiency = self.counters.efficiency(),
            direction_efficiency = self
                .counters
                .dimension_efficiency(PhaseSpaceDimension::Direction),
            "Source summary"
        );
    }
}
