//! Persistent simulation state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Encoding used for rendezvous archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Structured text (JSON).
    #[default]
    Json,
    /// Compact binary (bincode).
    Bin,
    /// Binary with LZ4 block compression.
    Lz4,
}

impl ArchiveFormat {
    /// All supported formats.
    pub const ALL: [ArchiveFormat; 3] = [ArchiveFormat::Json, ArchiveFormat::Bin, ArchiveFormat::Lz4];

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Json => "json",
            ArchiveFormat::Bin => "bin",
            ArchiveFormat::Lz4 => "lz4",
        }
    }

    /// Look up a format by file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Error returned when parsing an unknown archive format name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unrecognized archive format: {0}")]
pub struct UnknownArchiveFormat(pub String);

impl FromStr for ArchiveFormat {
    type Err = UnknownArchiveFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().trim_start_matches('.').to_lowercase();
        Self::from_extension(&lowered).ok_or_else(|| UnknownArchiveFormat(s.to_string()))
    }
}

/// Whether every rendezvous gets its own archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendezvousFileMode {
    /// One file, overwritten at each rendezvous.
    Single,
    /// One file per rendezvous, suffixed with its index.
    #[default]
    Multiple,
}

/// Mutable state of a run, persisted at every rendezvous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Next history number to issue. Never decreases.
    pub next_history: u64,

    /// Completed rendezvous. Never decreases.
    pub rendezvous_count: u64,

    /// Base name of the archive files.
    pub simulation_name: String,

    /// Encoding of the archive files.
    pub archive_format: ArchiveFormat,

    /// Archive rotation mode.
    pub rendezvous_file_mode: RendezvousFileMode,

    /// Absolute history number at which the run stops (0 = unbounded).
    pub history_wall: u64,

    /// Wall time accumulated by earlier invocations.
    pub previous_run_time: Duration,
}

impl SimulationState {
    /// Default archive base name.
    pub const DEFAULT_NAME: &'static str = "simulation";

    /// State of a run that has not issued any history yet.
    pub fn fresh(simulation_name: impl Into<String>, archive_format: ArchiveFormat) -> Self {
        Self {
            next_history: 0,
            rendezvous_count: 0,
            simulation_name: simulation_name.into(),
            archive_format,
            rendezvous_file_mode: RendezvousFileMode::default(),
            history_wall: 0,
            previous_run_time: Duration::ZERO,
        }
    }

    /// Whether the run stops at a history count.
    pub fn is_history_bounded(&self) -> bool {
        self.history_wall > 0
    }

    /// Histories left before the history wall, if bounded.
    pub fn remaining_histories(&self) -> Option<u64> {
        self.is_history_bounded()
            .then(|| self.history_wall.saturating_sub(self.next_history))
    }
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::fresh(Self::DEFAULT_NAME, ArchiveFormat::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_format_parsing() {
        assert_eq!("json".parse::<ArchiveFormat>(), Ok(ArchiveFormat::Json));
        assert_eq!(".LZ4".parse::<ArchiveFormat>(), Ok(ArchiveFormat::Lz4));
        assert_eq!(
            "xml".parse::<ArchiveFormat>(),
            Err(UnknownArchiveFormat("xml".to_string()))
        );
    }

    #[test]
    fn test_remaining_histories() {
        let mut state = SimulationState::default();
        assert_eq!(state.remaining_histories(), None);

        state.history_wall = 20;
        state.next_history = 15;
        assert_eq!(state.remaining_histories(), Some(5));

        state.next_history = 25;
        assert_eq!(state.remaining_histories(), Some(0));
    }

    #[test]
    fn test_default_file_mode_is_multiple() {
        let state = SimulationState::default();
        assert_eq!(state.rendezvous_file_mode, RendezvousFileMode::Multiple);
        assert_eq!(state.simulation_name, "simulation");
    }
}
