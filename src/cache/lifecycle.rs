//! Install, activate and update transitions for cache generations.

use futures::future::join_all;
use std::sync::Arc;
use url::Url;

use super::storage::CacheStorage;
use super::traits::CacheKey;
use crate::error::{CacheDeletionFailure, InstallError};
use crate::net::{Network, Request, Response};

/// Result of a successful install.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
  pub generation: String,
  pub entries: usize,
  /// Take effect for new requests without waiting for old clients to go away
  pub skip_waiting: bool,
}

/// Result of an activation. Deletion failures are reported, never fatal.
#[derive(Debug)]
pub struct ActivateOutcome {
  pub generation: String,
  pub deleted: Vec<String>,
  pub failures: Vec<CacheDeletionFailure>,
}

/// Governs which cache generation exists, is ready, and is active.
pub struct LifecycleController<S: CacheStorage> {
  storage: Arc<S>,
  network: Arc<dyn Network>,
  version: String,
  manifest: Vec<Url>,
}

impl<S: CacheStorage> LifecycleController<S> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<dyn Network>,
    version: impl Into<String>,
    manifest: Vec<Url>,
  ) -> Self {
    Self {
      storage,
      network,
      version: version.into(),
      manifest,
    }
  }

  /// The generation this controller installs and activates.
  pub fn version(&self) -> &str {
    &self.version
  }

  /// Populate the current generation from the manifest.
  ///
  /// Nothing is written unless every manifest resource fetched successfully,
  /// and the generation is only marked ready after the write commits.
  pub async fn install(&self) -> Result<InstallOutcome, InstallError> {
    tracing::info!(generation = %self.version, resources = self.manifest.len(), "Installing");

    self
      .storage
      .open_generation(&self.version)
      .map_err(|e| self.storage_error(e))?;

    let entries = self.fetch_manifest().await?;
    self
      .storage
      .put_all(&self.version, &entries)
      .map_err(|e| self.storage_error(e))?;
    self
      .storage
      .mark_ready(&self.version)
      .map_err(|e| self.storage_error(e))?;

    tracing::info!(generation = %self.version, entries = entries.len(), "Install complete");
    Ok(InstallOutcome {
      generation: self.version.clone(),
      entries: entries.len(),
      skip_waiting: true,
    })
  }

  /// Delete every generation but the current one, then claim it as active.
  pub fn activate(&self) -> ActivateOutcome {
    tracing::info!(generation = %self.version, "Activating");

    let names = self.storage.generations().unwrap_or_else(|e| {
      tracing::warn!(error = %e, "Could not list cache generations");
      Vec::new()
    });

    let mut deleted = Vec::new();
    let mut failures = Vec::new();
    for name in names.into_iter().filter(|n| *n != self.version) {
      match self.storage.delete_generation(&name) {
        Ok(_) => {
          tracing::info!(generation = %name, "Deleted stale cache generation");
          deleted.push(name);
        }
        Err(e) => {
          let failure = CacheDeletionFailure {
            generation: name,
            reason: format!("{:#}", e),
          };
          tracing::warn!(error = %failure, "Skipping stale generation");
          failures.push(failure);
        }
      }
    }

    if let Err(e) = self.storage.set_active(&self.version) {
      tracing::error!(generation = %self.version, error = %e, "Failed to claim generation");
    }

    ActivateOutcome {
      generation: self.version.clone(),
      deleted,
      failures,
    }
  }

  /// Re-fetch the manifest into the active generation, overwriting by key.
  pub async fn update(&self) -> Result<usize, InstallError> {
    let generation = match self.storage.active_generation() {
      Ok(Some(active)) => active,
      Ok(None) => self.version.clone(),
      Err(e) => return Err(self.storage_error(e)),
    };
    tracing::info!(generation = %generation, "Refreshing cache from manifest");

    let entries = self.fetch_manifest().await?;
    self
      .storage
      .put_all(&generation, &entries)
      .map_err(|e| InstallError::Storage {
        generation: generation.clone(),
        reason: format!("{:#}", e),
      })?;

    Ok(entries.len())
  }

  /// Fetch every manifest resource concurrently; any failure fails the batch.
  async fn fetch_manifest(&self) -> Result<Vec<(CacheKey, Response)>, InstallError> {
    let fetches = self.manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = self
        .network
        .fetch(&request)
        .await
        .map_err(|source| InstallError::Unreachable {
          url: url.to_string(),
          source,
        })?;

      if !response.is_ok() {
        return Err(InstallError::BadStatus {
          url: url.to_string(),
          status: response.status,
        });
      }
      Ok((CacheKey::for_request(&request), response))
    });

    join_all(fetches)
      .await
      .into_iter()
      .collect::<Result<Vec<_>, _>>()
      .inspect_err(|e| tracing::error!(error = %e, "Manifest fetch failed"))
  }

  fn storage_error(&self, e: color_eyre::Report) -> InstallError {
    InstallError::Storage {
      generation: self.version.clone(),
      reason: format!("{:#}", e),
    }
  }
}
