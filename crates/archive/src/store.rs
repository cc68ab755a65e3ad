//! Reading and writing archives on disk.

use crate::archive::{RendezvousArchive, ARCHIVE_MAGIC, ARCHIVE_VERSION};
use crate::{codec, naming, ArchiveError};
use mcrun_types::{ArchiveFormat, RendezvousFileMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Directory that rendezvous archives are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStore {
    directory: PathBuf,
}

impl ArchiveStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the archive for `name` at rendezvous `index`.
    pub fn path_for(
        &self,
        name: &str,
        format: ArchiveFormat,
        mode: RendezvousFileMode,
        index: u64,
    ) -> PathBuf {
        naming::archive_path(&self.directory, name, format, mode, index)
    }

    /// Write `archive` to `path`, replacing any previous file atomically.
    pub fn save<C: Serialize>(
        &self,
        path: &Path,
        archive: &RendezvousArchive<C>,
    ) -> Result<(), ArchiveError> {
        let bytes = codec::encode(archive, archive.header.format)?;
        atomic_write(path, &bytes).map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote archive");
        Ok(())
    }

    /// Read an archive, inferring the encoding from the file extension.
    pub fn load<C: DeserializeOwned>(path: &Path) -> Result<RendezvousArchive<C>, ArchiveError> {
        let format =
            naming::format_of(path).ok_or_else(|| ArchiveError::UnknownExtension(path.to_path_buf()))?;
        let bytes = fs::read(path).map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let archive: RendezvousArchive<C> = codec::decode(&bytes, format)?;
        if archive.header.magic != ARCHIVE_MAGIC {
            return Err(ArchiveError::NotAnArchive(path.to_path_buf()));
        }
        if archive.header.version != ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion(archive.header.version));
        }
        if archive.header.format != format {
            return Err(ArchiveError::FormatMismatch {
                expected: format,
                found: archive.header.format,
            });
        }
        Ok(archive)
    }
}

/// Write through a temporary file in the target directory, then rename it
/// over `path`. The temporary file is removed if any step fails.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
