//! Asset cache manager: install-time pre-cache, cache-first fetch and
//! whole-generation invalidation.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fetcher::Fetcher;
use super::storage::CacheStorage;
use super::types::{AssetError, AssetResult, CachedResponse, FetchResult};

/// Owns the named, versioned asset cache and serves fetches from it.
pub struct AssetCacheManager<S: CacheStorage, F: Fetcher> {
  storage: Arc<S>,
  fetcher: F,
  /// Current version tag, also the name of the live cache
  version: String,
  /// Absolute URLs pre-cached at install time, in order
  manifest: Vec<String>,
}

impl<S: CacheStorage, F: Fetcher> AssetCacheManager<S, F> {
  pub fn new(storage: S, fetcher: F, version: impl Into<String>, manifest: Vec<String>) -> Self {
    Self {
      storage: Arc::new(storage),
      fetcher,
      version: version.into(),
      manifest,
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn manifest(&self) -> &[String] {
    &self.manifest
  }

  /// Fetch every manifest URL and store them all under the current version.
  ///
  /// All-or-nothing: a transport failure or a non-2xx status on any URL fails
  /// the install and nothing is written. Returns the number of stored entries.
  pub async fn install(&self) -> AssetResult<usize> {
    info!(
      cache = %self.version,
      urls = self.manifest.len(),
      "pre-caching asset manifest"
    );

    let fetches = self.manifest.iter().map(|url| async move {
      let response = self.fetcher.fetch(url).await?;
      if !response.ok() {
        return Err(AssetError::Status {
          url: url.clone(),
          status: response.status,
        });
      }
      Ok((url.clone(), response))
    });

    let entries = match try_join_all(fetches).await {
      Ok(entries) => entries,
      Err(e) => {
        warn!(cache = %self.version, error = %e, "install failed, nothing cached");
        return Err(e);
      }
    };

    self.storage.put_all(&self.version, &entries)?;

    info!(cache = %self.version, entries = entries.len(), "install complete");
    Ok(entries.len())
  }

  /// Serve `url` from any live cache, falling through to the network on a miss.
  ///
  /// Network responses are returned as-is and never stored.
  pub async fn handle_fetch(&self, url: &str) -> AssetResult<FetchResult<CachedResponse>> {
    if let Some(entry) = self.storage.match_url(url)? {
      debug!(url, cache = %entry.cache_name, "cache hit");
      return Ok(FetchResult::from_cache(entry.response, entry.cached_at));
    }

    debug!(url, "cache miss, fetching from network");
    let response = self.fetcher.fetch(url).await?;
    Ok(FetchResult::from_network(response))
  }

  /// Make `new_version` current and delete every cache with a different name.
  ///
  /// Returns the names of the deleted caches.
  pub fn activate(&mut self, new_version: &str) -> AssetResult<Vec<String>> {
    let mut removed = Vec::new();

    for name in self.storage.cache_names()? {
      if name != new_version && self.storage.delete(&name)? {
        info!(cache = %name, "deleted outdated cache");
        removed.push(name);
      }
    }

    if !self.storage.has(new_version)? {
      warn!(cache = %new_version, "activated a version that has not been installed");
    }

    self.version = new_version.to_string();
    Ok(removed)
  }

  /// Names of all existing caches.
  pub fn cache_names(&self) -> AssetResult<Vec<String>> {
    Ok(self.storage.cache_names()?)
  }

  /// URLs stored in the cache called `name`.
  pub fn entries(&self, name: &str) -> AssetResult<Vec<String>> {
    Ok(self.storage.urls(name)?)
  }
}
