//! Cell-list geometry.

use crate::GeometryModel;
use mcrun_types::CellId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{self, Write};

/// Geometry described only by the set of cells it contains.
///
/// Enough to locate source particles; tracking through surfaces is left to
/// real geometry engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellGeometry {
    name: String,
    cells: BTreeSet<CellId>,
}

impl CellGeometry {
    pub fn new(name: impl Into<String>, cells: impl IntoIterator<Item = CellId>) -> Self {
        Self {
            name: name.into(),
            cells: cells.into_iter().collect(),
        }
    }

    pub fn cells(&self) -> &BTreeSet<CellId> {
        &self.cells
    }
}

impl GeometryModel for CellGeometry {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains_cell(&self, cell: CellId) -> bool {
        self.cells.contains(&cell)
    }

    fn print_summary(&self, os: &mut dyn Write) -> io::Result<()> {
        writeln!(os, "Geometry: {} ({} cells)", self.name, self.cells.len())
    }
}
