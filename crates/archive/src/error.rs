//! Archive errors.

use mcrun_types::ArchiveFormat;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while saving or loading an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode archive: {0}")]
    Encode(String),

    #[error("Failed to decode {format} archive: {reason}")]
    Decode { format: ArchiveFormat, reason: String },

    #[error("Cannot infer archive format of {}", .0.display())]
    UnknownExtension(PathBuf),

    #[error("{} is not a rendezvous archive", .0.display())]
    NotAnArchive(PathBuf),

    #[error("Unsupported archive version {0}")]
    UnsupportedVersion(u32),

    #[error("Archive declares format {found} but was read as {expected}")]
    FormatMismatch {
        expected: ArchiveFormat,
        found: ArchiveFormat,
    },
}
