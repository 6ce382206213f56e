//! Versioned asset cache for offline viewing.
//!
//! This module provides:
//! - Cache generations named by version string, persisted in SQLite
//! - Install / activate / update transitions between generations
//! - Request interception: network-first for page loads, cache-first otherwise
//! - Fallback responses (offline page, image placeholder, 503) when the network is gone

mod interceptor;
mod lifecycle;
mod storage;
mod traits;

pub use interceptor::{Interception, RequestInterceptor};
pub use lifecycle::{ActivateOutcome, InstallOutcome, LifecycleController};
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CacheKey, CachedEntry, Resolved, ResponseSource};
