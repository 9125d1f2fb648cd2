//! Error types.
//!
//! Pool exhaustion is not an error: it is routed through the fallback
//! paths and shows up in the decision-path counters. Everything here
//! aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Library construction failures.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("benchmark library is empty")]
    Empty,

    #[error("duplicate library instance: {id}")]
    DuplicateInstance { id: String },

    #[error("benchmark library has {count} instances, more than the arena can index")]
    TooLarge { count: usize },
}

/// Fatal allocation failures. These indicate the library or the user set
/// was not validated upstream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    #[error("user join-count range is degenerate: min {min} >= max {max}")]
    DegenerateJoinRange { min: u32, max: u32 },

    #[error("no library instances with {num_joins} joins")]
    NoInstancesForJoinCount { num_joins: u32 },
}

/// Input parsing failures.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed record: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid arrival timestamp {value:?}")]
    InvalidTimestamp { value: String },

    #[error("invalid readset {value:?}")]
    InvalidReadset { value: String },

    #[error("invalid user key {value:?}, expected <user_id>#<instance_id>")]
    InvalidUserKey { value: String },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
