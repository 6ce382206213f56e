//! Core types for the caching system.

use chrono::{DateTime, Utc};
use url::Url;

use crate::net::{Request, Response};

/// Identity of a cached request: exact URL plus method.
///
/// Lookups match on full equality of the URL without its fragment; there is
/// no prefix matching and no header-based negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub url: String,
  pub method: String,
}

impl CacheKey {
  /// Key for a plain GET of `url`.
  pub fn get(url: &Url) -> Self {
    Self {
      url: without_fragment(url),
      method: "GET".to_string(),
    }
  }

  pub fn for_request(request: &Request) -> Self {
    Self {
      url: without_fragment(&request.url),
      method: request.method.as_str().to_string(),
    }
  }
}

/// Fragments never reach the network, so they are not part of the identity.
fn without_fragment(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.into()
}

/// A stored response and when it was written.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// A response handed back to the page environment, with where it came from.
#[derive(Debug, Clone)]
pub struct Resolved {
  pub response: Response,
  pub source: ResponseSource,
}

impl Resolved {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  pub fn from_cache(entry: CachedEntry) -> Self {
    Self {
      response: entry.response,
      source: ResponseSource::Cache,
    }
  }

  pub fn offline_page(entry: CachedEntry) -> Self {
    Self {
      response: entry.response,
      source: ResponseSource::OfflinePage,
    }
  }

  pub fn placeholder() -> Self {
    Self {
      response: Response::placeholder_image(),
      source: ResponseSource::Placeholder,
    }
  }

  pub fn unavailable() -> Self {
    Self {
      response: Response::service_unavailable(),
      source: ResponseSource::Unavailable,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Stored entry in the active generation
  Cache,
  /// The cached offline fallback page
  OfflinePage,
  /// Synthesized image placeholder
  Placeholder,
  /// Synthesized 503
  Unavailable,
}

impl ResponseSource {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::OfflinePage => "offline-page",
      Self::Placeholder => "placeholder",
      Self::Unavailable => "unavailable",
    }
  }
}
