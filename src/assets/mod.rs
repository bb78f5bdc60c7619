//! Versioned asset cache for offline shell delivery.
//!
//! - Pre-caches a fixed manifest of URLs at install time, all-or-nothing
//! - Serves exact-URL matches cache-first, falling through to the network
//! - Invalidates by whole generation: activating a version deletes every other cache

mod fetcher;
mod manager;
mod storage;
mod types;

pub use fetcher::{Fetcher, HttpFetcher};
pub use manager::AssetCacheManager;
pub use storage::{CacheStorage, MemoryCacheStorage, SqliteCacheStorage};
pub use types::{AssetError, AssetResult, CachedEntry, CachedResponse, FetchResult, FetchSource};

use url::Url;

/// Default cache name, bumped whenever the shell changes.
pub const DEFAULT_VERSION: &str = "powerback-v1";

/// App shell pre-cached at install time.
pub const DEFAULT_MANIFEST: &[&str] = &[
  "/pwa/",
  "/pwa/index.html",
  "/pwa/dashboard/citizen.html",
  "/pwa/dashboard/police.html",
  "/pwa/dashboard/ngo.html",
  "/pwa/dashboard/watch.html",
  "/pwa/assets/css/style.css",
  "/pwa/assets/js/app.js",
  "/pwa/manifest.json",
  "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
  "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
];

/// Resolve a manifest entry or request path against the app origin.
///
/// Absolute URLs pass through unchanged apart from parsing.
pub fn resolve_url(origin: &str, entry: &str) -> AssetResult<String> {
  let invalid = |reason: String| AssetError::InvalidUrl {
    url: entry.to_string(),
    reason,
  };

  let base = Url::parse(origin).map_err(|e| invalid(format!("bad origin {}: {}", origin, e)))?;
  let url = base.join(entry).map_err(|e| invalid(e.to_string()))?;

  Ok(url.to_string())
}

/// Resolve every manifest entry, keeping order.
pub fn resolve_manifest<I, E>(origin: &str, entries: I) -> AssetResult<Vec<String>>
where
  I: IntoIterator<Item = E>,
  E: AsRef<str>,
{
  entries
    .into_iter()
    .map(|entry| resolve_url(origin, entry.as_ref()))
    .collect()
}
