//! The error taxonomy of the sync core (§7): kinds, not exhaustive types.
//!
//! The core never retries. Every fallible operation either returns one of
//! these variants or an absent value (`None`) where "not found" is a normal
//! outcome rather than a failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A referenced channel or candidate is missing. Store methods that can
    /// observe this return `Option` instead; this variant is for call sites
    /// that have no sensible `None` to return (e.g. `sync_video` on an id
    /// the fetcher no longer lists).
    #[error("not found: {0}")]
    NotFound(String),

    /// The Fetcher or Publisher adapter returned an error.
    #[error("adapter failure: {0}")]
    AdapterFailure(#[source] anyhow::Error),

    /// Underlying storage I/O failed.
    #[error("store failure: {0}")]
    StoreFailure(#[source] anyhow::Error),

    /// The operation's cancellation token was tripped.
    #[error("cancelled")]
    Cancelled,

    /// A rule value could not be parsed per its declared type. Per policy
    /// this is logged and the candidate passes that rule; this variant
    /// exists for the few call sites (rule import) where malformed input
    /// must be rejected outright rather than silently tolerated.
    #[error("malformed rule value: {0}")]
    Malformed(String),
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    pub fn adapter(err: impl Into<anyhow::Error>) -> Self {
        SyncError::AdapterFailure(err.into())
    }

    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        SyncError::StoreFailure(err.into())
    }
}

impl From<libsql::Error> for SyncError {
    fn from(err: libsql::Error) -> Self {
        SyncError::StoreFailure(err.into())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
