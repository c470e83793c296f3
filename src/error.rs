use std::path::PathBuf;
use std::process::ExitStatus;

use crate::core::probe::Unavailable;

/// Result type alias for mkksiso operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Every way a run can fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// One or more input paths do not exist. All of them are listed.
    #[error("Missing input files: {}", display_paths(.0))]
    MissingInputs(Vec<PathBuf>),

    /// Mounting the source ISO needs root.
    #[error("mkksiso must be run as root")]
    NotRoot,

    /// No mastering backend passed its probe.
    #[error("No suitable ISO mastering backend found (install xorrisofs or mkisofs)")]
    NoBackend,

    /// An external tool exited unsuccessfully.
    #[error("{step} failed ({status}): {}", .program.display())]
    ToolFailed {
        step: &'static str,
        program: PathBuf,
        status: ExitStatus,
        output: String,
    },

    /// An external tool could not be started at all.
    #[error("Failed to execute {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ISO carries an EFI boot image but none of the EFI config files.
    #[error("No EFI boot configuration found (tried {})", display_paths(.0))]
    MissingEfiConfig(Vec<PathBuf>),

    /// A boot image exists on the ISO but the tool to rebuild it is missing.
    #[error("Cannot rebuild {image}: {reason}")]
    MissingRegenerator {
        image: &'static str,
        reason: Unavailable,
    },

    /// Loop mounting or unmounting the source ISO failed.
    #[error("Mount error: {0}")]
    Mount(String),

    /// The ISO primary volume descriptor could not be read.
    #[error("Cannot read volume id from {}: {reason}", .path.display())]
    VolumeId { path: PathBuf, reason: String },

    /// Filesystem error tied to a path.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
