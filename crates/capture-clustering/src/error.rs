//! Fault taxonomy for a sorting batch.
//!
//! Every fault is fatal to the batch: nothing is retried, and photos placed
//! before the failure stay where they were placed.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// A run of sub-angle gaps was too short for a two-component fit.
    #[error("cannot fit a two-component mixture to {count} gap(s); each run between angle boundaries needs at least 2")]
    MixtureUnderflow { count: usize },

    /// The label sequence does not line up with the photo sequence.
    #[error("{labels} interval labels for {photos} photos; expected one label per consecutive pair")]
    LabelCount { photos: usize, labels: usize },

    /// A gap came out negative after sorting, so the timestamps are
    /// corrupt or the input was never sorted.
    #[error("negative interval of {seconds:.3}s between {} and {}", .earlier.display(), .later.display())]
    NegativeInterval {
        earlier: PathBuf,
        later: PathBuf,
        seconds: f64,
    },

    #[error("capture time for {}: {reason}", .path.display())]
    CaptureTime { path: PathBuf, reason: String },

    #[error("exiftool: {0}")]
    Exiftool(String),

    /// A counter-derived directory already existed, which the monotonic
    /// numbering discipline rules out for a clean output root.
    #[error("directory already exists: {} (stale output root, or photos not in chronological order)", .path.display())]
    DirectoryExists { path: PathBuf },

    #[error("destination already exists: {}", .path.display())]
    DestinationExists { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
