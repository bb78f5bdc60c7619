//! Core types for the asset cache.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A stored or freshly fetched HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Whether the status is in the 2xx range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// A cache entry as read back from storage.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub cache_name: String,
  pub url: String,
  pub response: CachedResponse,
  pub cached_at: DateTime<Utc>,
}

/// Result of a fetch through the cache, including where it was served from.
#[derive(Debug, Clone)]
pub struct FetchResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: FetchSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> FetchResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: FetchSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: FetchSource::Cache,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
  Network,
  Cache,
}

#[derive(Debug, Error)]
pub enum AssetError {
  #[error("failed to fetch {url}: {reason}")]
  Fetch { url: String, reason: String },
  #[error("{url} responded with status {status}")]
  Status { url: String, status: u16 },
  #[error("invalid asset url {url}: {reason}")]
  InvalidUrl { url: String, reason: String },
  #[error("cache storage failure: {0}")]
  Storage(String),
}

impl From<color_eyre::Report> for AssetError {
  fn from(report: color_eyre::Report) -> Self {
    AssetError::Storage(format!("{:#}", report))
  }
}

pub type AssetResult<T> = Result<T, AssetError>;
