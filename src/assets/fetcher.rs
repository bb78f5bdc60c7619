//! Network access for the asset cache.

use std::future::Future;
use std::time::Duration;

use super::types::{AssetError, AssetResult, CachedResponse};

/// Performs network requests on behalf of the cache manager.
///
/// Any HTTP status is a successful fetch; only transport failures are errors.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, url: &str) -> impl Future<Output = AssetResult<CachedResponse>> + Send;
}

/// Fetcher backed by a reqwest client.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> AssetResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| AssetError::Fetch {
        url: String::new(),
        reason: format!("failed to build http client: {}", e),
      })?;

    Ok(Self { client })
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, url: &str) -> AssetResult<CachedResponse> {
    let fetch_error = |e: reqwest::Error| AssetError::Fetch {
      url: url.to_string(),
      reason: e.to_string(),
    };

    let response = self.client.get(url).send().await.map_err(fetch_error)?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await.map_err(fetch_error)?.to_vec();

    Ok(CachedResponse {
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assets::{AssetCacheManager, FetchSource, MemoryCacheStorage};
  use crate::test_support::{test_client, MockServer};
  use axum::http::StatusCode;

  fn manager(
    server: &MockServer,
    paths: &[&str],
  ) -> AssetCacheManager<MemoryCacheStorage, HttpFetcher> {
    let manifest = paths
      .iter()
      .map(|p| format!("{}{}", server.url, p))
      .collect();
    AssetCacheManager::new(
      MemoryCacheStorage::new(),
      HttpFetcher::with_client(test_client()),
      "powerback-v1",
      manifest,
    )
  }

  #[tokio::test]
  async fn test_install_over_http_stores_body_and_headers() {
    let server = MockServer::start()
      .await
      .route("GET", "/pwa/index.html", StatusCode::OK, "<html>shell</html>")
      .route("GET", "/pwa/manifest.json", StatusCode::OK, "{}");
    let manager = manager(&server, &["/pwa/index.html", "/pwa/manifest.json"]);

    assert_eq!(manager.install().await.unwrap(), 2);

    let index = format!("{}/pwa/index.html", server.url);
    let result = manager.handle_fetch(&index).await.unwrap();
    assert_eq!(result.source, FetchSource::Cache);
    assert_eq!(result.data.status, 200);
    assert_eq!(result.data.body, b"<html>shell</html>".to_vec());
    assert_eq!(result.data.header("content-type"), Some("application/json"));
    assert_eq!(server.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_http_404_is_a_response_and_fails_install() {
    let server = MockServer::start()
      .await
      .route("GET", "/pwa/index.html", StatusCode::OK, "<html>shell</html>");
    let manager = manager(&server, &["/pwa/index.html", "/pwa/missing.js"]);

    let missing = format!("{}/pwa/missing.js", server.url);
    let response = manager.handle_fetch(&missing).await.unwrap();
    assert_eq!(response.source, FetchSource::Network);
    assert_eq!(response.data.status, 404);

    let err = manager.install().await.unwrap_err();
    assert!(matches!(err, AssetError::Status { status: 404, ref url } if *url == missing));
    assert!(manager.cache_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_unreachable_origin_is_a_fetch_error() {
    // Bind then release a port so nothing is listening on it
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
      .unwrap()
      .local_addr()
      .unwrap();
    let url = format!("http://{}/pwa/index.html", addr);
    let fetcher = HttpFetcher::with_client(test_client());

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert!(matches!(err, AssetError::Fetch { url: ref u, .. } if *u == url));
  }
}
