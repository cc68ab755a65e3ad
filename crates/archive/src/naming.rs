//! Archive file naming.

use mcrun_types::{ArchiveFormat, RendezvousFileMode};
use std::path::{Path, PathBuf};

/// File name of an archive.
///
/// `Multiple` mode: `<name>_rendezvous_<index>.<ext>`.
/// `Single` mode: `<name>_rendezvous.<ext>`.
pub fn archive_file_name(
    name: &str,
    format: ArchiveFormat,
    mode: RendezvousFileMode,
    index: u64,
) -> String {
    match mode {
        RendezvousFileMode::Multiple => {
            format!("{name}_rendezvous_{index}.{}", format.extension())
        }
        RendezvousFileMode::Single => format!("{name}_rendezvous.{}", format.extension()),
    }
}

/// Full path of an archive inside `directory`.
pub fn archive_path(
    directory: &Path,
    name: &str,
    format: ArchiveFormat,
    mode: RendezvousFileMode,
    index: u64,
) -> PathBuf {
    directory.join(archive_file_name(name, format, mode, index))
}

/// Format implied by a path's extension.
pub fn format_of(path: &Path) -> Option<ArchiveFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ArchiveFormat::from_extension(&ext.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_mode_names() {
        assert_eq!(
            archive_file_name("test_sim_2", ArchiveFormat::Json, RendezvousFileMode::Multiple, 0),
            "test_sim_2_rendezvous_0.json"
        );
        assert_eq!(
            archive_file_name("run", ArchiveFormat::Lz4, RendezvousFileMode::Multiple, 12),
            "run_rendezvous_12.lz4"
        );
    }

    #[test]
    fn test_single_mode_ignores_index() {
        assert_eq!(
            archive_file_name("run", ArchiveFormat::Bin, RendezvousFileMode::Single, 7),
            "run_rendezvous.bin"
        );
    }

    #[test]
    fn test_format_of() {
        assert_eq!(format_of(Path::new("a/b_rendezvous_3.JSON")), Some(ArchiveFormat::Json));
        assert_eq!(format_of(Path::new("a/b_rendezvous.xml")), None);
        assert_eq!(format_of(Path::new("noext")), None);
    }
}
