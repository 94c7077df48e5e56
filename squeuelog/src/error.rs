use slurmutils::{CommandError, ElapsedError};
use std::io;
use thiserror::Error;

/// A listing that could not be parsed.  These are fatal for the whole listing.

#[derive(Error, Debug)]
pub enum JobsError {
    #[error("Job {job}: {source}")]
    ElapsedTime {
        job: String,
        #[source]
        source: ElapsedError,
    },

    #[error("Job {job}: invalid node count {value:?}")]
    NodeCount { job: String, value: String },
}

/// The listing could not be obtained.

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A collection cycle failed, for either reason.

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Could not obtain job listing: {0}")]
    Source(#[from] SourceError),

    #[error("Could not parse job listing: {0}")]
    Parse(#[from] JobsError),
}
