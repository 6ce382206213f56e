//! Request interceptor that resolves page requests against the cache or the network.

use reqwest::Method;
use std::sync::Arc;
use url::Url;

use super::storage::CacheStorage;
use super::traits::{CacheKey, CachedEntry, Resolved};
use crate::net::{Destination, Network, Request, RequestMode, Response};

/// What the interceptor decided to do with a request.
#[derive(Debug)]
pub enum Interception {
  /// Not ours: the request goes to the network untouched
  Passthrough,
  Respond(Resolved),
}

/// Sits between the page environment and the network.
///
/// Navigations are network-first so pages are fresh when online; everything
/// else is cache-first so visited assets load with no network at all. Failures
/// never escape: they resolve to a cached copy or a synthesized response.
pub struct RequestInterceptor<S: CacheStorage> {
  storage: Arc<S>,
  network: Arc<dyn Network>,
  offline_url: Url,
}

impl<S: CacheStorage> RequestInterceptor<S> {
  pub fn new(storage: Arc<S>, network: Arc<dyn Network>, offline_url: Url) -> Self {
    Self {
      storage,
      network,
      offline_url,
    }
  }

  pub async fn intercept(&self, request: &Request) -> Interception {
    if request.method != Method::GET || request.is_extension() {
      tracing::trace!(method = %request.method, url = %request.url, "Passing request through");
      return Interception::Passthrough;
    }

    // Pinned for the whole request, even if an activation lands mid-flight
    let generation = self.active_generation();

    let resolved = if request.mode == RequestMode::Navigate {
      self.network_first(request, generation.as_deref()).await
    } else {
      self.cache_first(request, generation.as_deref()).await
    };

    tracing::debug!(
      url = %request.url,
      source = resolved.source.label(),
      status = resolved.response.status,
      "Resolved request"
    );
    Interception::Respond(resolved)
  }

  /// Fetch from network; on failure fall back to the cached page, then the offline page.
  async fn network_first(&self, request: &Request, generation: Option<&str>) -> Resolved {
    let key = CacheKey::for_request(request);

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          self.store(generation, &key, &response);
        }
        Resolved::from_network(response)
      }
      Err(err) => {
        tracing::info!(url = %request.url, error = %err, "Navigation offline, trying cache");

        if let Some(entry) = self.lookup(generation, &key) {
          return Resolved::from_cache(entry);
        }
        if let Some(entry) = self.lookup(generation, &CacheKey::get(&self.offline_url)) {
          return Resolved::offline_page(entry);
        }

        tracing::warn!(url = %request.url, "No cached page and no offline page available");
        Resolved::unavailable()
      }
    }
  }

  /// Serve from cache; on a miss fetch and keep qualifying responses.
  async fn cache_first(&self, request: &Request, generation: Option<&str>) -> Resolved {
    let key = CacheKey::for_request(request);

    if let Some(entry) = self.lookup(generation, &key) {
      tracing::trace!(url = %request.url, cached_at = %entry.cached_at, "Cache hit");
      return Resolved::from_cache(entry);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          self.store(generation, &key, &response);
        } else {
          tracing::debug!(
            url = %request.url,
            status = response.status,
            kind = response.kind.as_str(),
            "Response not cacheable"
          );
        }
        Resolved::from_network(response)
      }
      Err(err) => {
        tracing::info!(url = %request.url, error = %err, "Fetch failed, serving fallback");
        if request.destination == Destination::Image {
          Resolved::placeholder()
        } else {
          Resolved::unavailable()
        }
      }
    }
  }

  fn active_generation(&self) -> Option<String> {
    self.storage.active_generation().unwrap_or_else(|e| {
      tracing::warn!(error = %e, "Could not read active cache generation");
      None
    })
  }

  /// Storage errors count as a miss.
  fn lookup(&self, generation: Option<&str>, key: &CacheKey) -> Option<CachedEntry> {
    let generation = generation?;
    self.storage.lookup(generation, key).unwrap_or_else(|e| {
      tracing::warn!(url = %key.url, error = %e, "Cache lookup failed");
      None
    })
  }

  fn store(&self, generation: Option<&str>, key: &CacheKey, response: &Response) {
    let Some(generation) = generation else {
      return;
    };
    if let Err(e) = self.storage.put(generation, key, response) {
      tracing::warn!(url = %key.url, error = %e, "Failed to cache response");
    }
  }
}
