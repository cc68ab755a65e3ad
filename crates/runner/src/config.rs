//! Run file configuration.
//!
//! A run file is TOML:
//!
//! ```toml
//! [simulation]
//! name = "sphere"
//! format = "lz4"
//! threads = 8
//!
//! [run]
//! histories = 1000000
//! min_rendezvous = 10
//! wall_time = "2h"
//!
//! [geometry]
//! cells = [1, 2, 3]
//!
//! [[source.components]]
//! cell = 1
//! variant = "neutron"
//! energy = { uniform = { min = 0.5, max = 2.0 } }
//! ```

use mcrun_core::{
    CellGeometry, ComponentVariant, EnergySpectrum, PointDistribution, SourceComponent,
    SourceError, StandardSource,
};
use mcrun_types::{
    ArchiveFormat, CellId, ComponentId, RendezvousFileMode, RunConfiguration, SimulationState,
    UnknownArchiveFormat,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a run file.
#[derive(Debug, Error)]
pub enum RunFileError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse run file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid wall time {value:?}: {source}")]
    WallTime {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error(transparent)]
    Format(#[from] UnknownArchiveFormat),

    #[error("Invalid source: {0}")]
    Source(#[from] SourceError),
}

/// Top-level run file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunFile {
    pub simulation: SimulationSection,
    pub run: RunSection,
    pub geometry: GeometrySection,
    pub source: SourceSection,
}

/// Naming, archive and parallelism settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    pub name: String,
    pub format: String,
    pub file_mode: RendezvousFileMode,
    pub threads: Option<usize>,
    pub ranks: usize,
    pub seed: u64,
    pub archive_directory: PathBuf,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: SimulationState::DEFAULT_NAME.to_string(),
            format: ArchiveFormat::default().to_string(),
            file_mode: RendezvousFileMode::default(),
            threads: None,
            ranks: 1,
            seed: 0,
            archive_directory: PathBuf::from("."),
        }
    }
}

/// Stopping rule and batch sizing. Zero limits mean "no limit".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub histories: u64,
    pub min_rendezvous: u64,
    pub max_rendezvous_batch_size: u64,
    pub batch_multiplier: u64,
    pub max_batch_size: u64,
    /// Human-readable budget, e.g. `"90s"` or `"1h 30m"`.
    pub wall_time: Option<String>,
    pub snapshots_per_batch: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        let defaults = RunConfiguration::default();
        Self {
            histories: defaults.history_target,
            min_rendezvous: defaults.min_rendezvous,
            max_rendezvous_batch_size: 0,
            batch_multiplier: defaults.batch_multiplier,
            max_batch_size: 0,
            wall_time: None,
            snapshots_per_batch: defaults.snapshots_per_batch,
        }
    }
}

impl RunSection {
    pub fn wall_time(&self) -> Result<Option<Duration>, RunFileError> {
        self.wall_time
            .as_deref()
            .map(|value| {
                humantime::parse_duration(value).map_err(|source| RunFileError::WallTime {
                    value: value.to_string(),
                    source,
                })
            })
            .transpose()
    }

    pub fn to_configuration(&self) -> Result<RunConfiguration, RunFileError> {
        let mut config = RunConfiguration::new(self.histories)
            .with_min_rendezvous(self.min_rendezvous)
            .with_max_rendezvous_batch_size(self.max_rendezvous_batch_size)
            .with_batch_multiplier(self.batch_multiplier)
            .with_max_batch_size(self.max_batch_size)
            .with_snapshots_per_batch(self.snapshots_per_batch);
        if let Some(budget) = self.wall_time()? {
            config = config.with_wall_time(budget);
        }
        Ok(config.normalized())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeometrySection {
    pub name: String,
    pub cells: Vec<CellId>,
}

impl Default for GeometrySection {
    fn default() -> Self {
        Self {
            name: "geometry".to_string(),
            cells: vec![CellId(1)],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub components: Vec<ComponentSection>,
}

/// One point-source component.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentSection {
    pub cell: CellId,
    pub variant: ComponentVariant,
    pub energy: EnergySpectrum,
    #[serde(default = "unit")]
    pub selection_weight: f64,
    #[serde(default)]
    pub position: [f64; 3],
    #[serde(default)]
    pub time: f64,
    #[serde(default = "unit")]
    pub weight: f64,
}

fn unit() -> f64 {
    1.0
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self, RunFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| RunFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, RunFileError> {
        Ok(toml::from_str(text)?)
    }

    pub fn archive_format(&self) -> Result<ArchiveFormat, RunFileError> {
        Ok(self.simulation.format.parse()?)
    }

    pub fn geometry(&self) -> CellGeometry {
        CellGeometry::new(
            self.geometry.name.clone(),
            self.geometry.cells.iter().copied(),
        )
    }

    pub fn source(&self) -> Result<StandardSource, RunFileError> {
        let components = self
            .source
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut distribution = PointDistribution::new(c.cell, c.energy);
                distribution.position = c.position;
                distribution.time = c.time;
                distribution.weight = c.weight;
                SourceComponent::new(ComponentId(i as u32), c.variant.clone(), distribution)
                    .with_selection_weight(c.selection_weight)
            })
            .collect();
        Ok(StandardSource::new(components)?)
    }
}
