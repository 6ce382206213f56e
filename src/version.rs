//! Periodic check of the site's version endpoint.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

use crate::cache::CacheStorage;
use crate::net::{Network, Request};

const DIGEST_KEY: &str = "version_digest";

/// Result of one version check.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCheck {
  pub version: Value,
  pub digest: String,
  /// True when the body differs from the one seen on the previous check
  pub changed: bool,
}

pub struct VersionChecker<S: CacheStorage> {
  storage: Arc<S>,
  network: Arc<dyn Network>,
  endpoint: Url,
}

impl<S: CacheStorage> VersionChecker<S> {
  pub fn new(storage: Arc<S>, network: Arc<dyn Network>, endpoint: Url) -> Self {
    Self {
      storage,
      network,
      endpoint,
    }
  }

  /// Fetch the version document and compare it with the last one seen.
  ///
  /// Failures are logged and yield `None`.
  pub async fn check(&self) -> Option<UpdateCheck> {
    let response = match self.network.fetch(&Request::get(self.endpoint.clone())).await {
      Ok(response) if response.is_ok() => response,
      Ok(response) => {
        tracing::warn!(status = response.status, "Version check rejected");
        return None;
      }
      Err(e) => {
        tracing::warn!(error = %e, "Version check failed");
        return None;
      }
    };

    let version: Value = match serde_json::from_slice(&response.body) {
      Ok(version) => version,
      Err(e) => {
        tracing::warn!(error = %e, "Version endpoint returned invalid JSON");
        return None;
      }
    };

    let digest = digest(&version);
    let previous = self.storage.get_meta(DIGEST_KEY).unwrap_or_else(|e| {
      tracing::warn!(error = %e, "Could not read previous version digest");
      None
    });
    if let Err(e) = self.storage.set_meta(DIGEST_KEY, &digest) {
      tracing::warn!(error = %e, "Could not store version digest");
    }

    let changed = previous.is_some_and(|p| p != digest);
    tracing::info!(%digest, changed, "Version check completed");

    Some(UpdateCheck {
      version,
      digest,
      changed,
    })
  }
}

/// SHA256 over the canonical JSON form; object keys serialize sorted.
fn digest(version: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(version.to_string().as_bytes());
  hex::encode(hasher.finalize())
}
