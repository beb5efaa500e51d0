//! Error type shared by every stage of a sweep.
//!
//! Nothing here is retried. Each variant aborts the run it occurs in; series
//! that were already written to the cache stay valid.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The benchmark binary (or the pinning wrapper) could not be started.
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("{binary} exited with {status}: {stderr}")]
    ExitStatus {
        binary: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Standard output was not a single floating point number.
    #[error("{binary} printed {output:?}, expected a single number")]
    MalformedOutput { binary: String, output: String },

    #[error("cache I/O on {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A cache entry exists but cannot be trusted. Delete the cache directory
    /// to recover.
    #[error("corrupt cache file {path}: {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to write plot {path}: {source}")]
    Plot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
