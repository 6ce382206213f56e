//! Error taxonomy for the caching layer.
//!
//! Only [`InstallError`] and [`QueuePersistError`] reach the page environment.
//! Everything else is absorbed by a fallback response or left for a later sync.

use thiserror::Error;

/// A single network request failed before producing a response.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  #[error("request to {url} failed: {reason}")]
  Network { url: String, reason: String },

  #[error("cannot fetch {0}: unsupported scheme")]
  UnsupportedScheme(String),
}

/// Populating a cache generation from the manifest failed.
#[derive(Debug, Error)]
pub enum InstallError {
  #[error("manifest resource {url} is unreachable")]
  Unreachable {
    url: String,
    #[source]
    source: FetchError,
  },

  #[error("manifest resource {url} returned status {status}")]
  BadStatus { url: String, status: u16 },

  #[error("invalid manifest entry '{entry}': {reason}")]
  InvalidEntry { entry: String, reason: String },

  #[error("failed to write cache generation {generation}: {reason}")]
  Storage { generation: String, reason: String },
}

/// A submission could not be written to durable storage.
#[derive(Debug, Error)]
#[error("failed to persist submission: {0}")]
pub struct QueuePersistError(pub String);

/// One replay of a queued submission did not complete.
#[derive(Debug, Error)]
pub enum SyncAttemptFailure {
  #[error("submission {id} could not reach the endpoint")]
  Network {
    id: i64,
    #[source]
    source: FetchError,
  },

  #[error("submission {id} was rejected with status {status}")]
  Rejected { id: i64, status: u16 },

  #[error("submission {id} was delivered but could not be removed: {reason}")]
  Removal { id: i64, reason: String },
}

/// A stale generation could not be deleted during activation.
#[derive(Debug, Error)]
#[error("failed to delete cache generation {generation}: {reason}")]
pub struct CacheDeletionFailure {
  pub generation: String,
  pub reason: String,
}

/// Errors the event dispatcher hands back to the page environment.
#[derive(Debug, Error)]
pub enum WorkerError {
  #[error(transparent)]
  Install(#[from] InstallError),

  #[error(transparent)]
  QueuePersist(#[from] QueuePersistError),
}
