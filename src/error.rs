//! Unified error model for the rebalancer.
//! Library code returns `crate::Result`; the binaries wrap it in `anyhow`
//! at the very edge for context-rich exits.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Snapshot read/write failure. Surfaced to the caller, never retried here.
    #[error("snapshot io: {reason}")]
    SnapshotIo { reason: String },

    /// Network or HTTP failure while contacting PD.
    #[error("pd fetch failed: {0}")]
    PdFetch(String),

    /// PD answered but the JSON payload did not parse.
    #[error("pd response decode failed: {0}")]
    PdDecode(String),

    /// A route lookup for an id the current route snapshot does not know.
    #[error("unknown region {0}")]
    UnknownRegion(u64),

    /// PD returned a failure marker for a submitted operator.
    #[error("operator rejected by pd: {response}")]
    OperatorRejected { response: String },

    /// An operator plan burned through its retry budget.
    #[error("region {region}: gave up after {retries} retries")]
    MaxRetriesExceeded { region: u64, retries: u32 },

    /// Ingest queue full or already shut down.
    #[error("ingest overloaded")]
    Overloaded,
}

impl Error {
    pub(crate) fn snapshot_io(err: impl std::fmt::Display) -> Self {
        Error::SnapshotIo { reason: err.to_string() }
    }
}
