//! Client session: owns the data gateway, the asset cache and the real-time
//! subscription for one run of the client.

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::assets::{
  resolve_manifest, AssetCacheManager, CacheStorage, Fetcher, HttpFetcher, SqliteCacheStorage,
};
use crate::config::{Config, GatewayMode};
use crate::gateway::{ApiClient, DataGateway, Gateway, LocalGateway, RemoteGateway};
use crate::realtime::HttpStreamTransport;
use crate::store::{KeyValueStore, SqliteStore};

pub struct ClientSession<S: CacheStorage = SqliteCacheStorage, F: Fetcher = HttpFetcher> {
  config: Config,
  store: Arc<dyn KeyValueStore>,
  gateway: Gateway,
  assets: AssetCacheManager<S, F>,
}

impl ClientSession {
  /// Open storage and build the backend selected by `config.mode`.
  pub fn from_config(config: Config) -> Result<Self> {
    let db_path = config.storage.path.as_deref();
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(db_path)?);
    let timeout = Duration::from_secs(config.api.timeout_secs);

    let manifest = resolve_manifest(&config.assets.origin, &config.assets.manifest)?;
    let assets = AssetCacheManager::new(
      SqliteCacheStorage::open(db_path)?,
      HttpFetcher::new(timeout)?,
      config.assets.version.clone(),
      manifest,
    );

    let gateway = match config.mode {
      GatewayMode::Local => Gateway::Local(LocalGateway::new(store.clone(), config.transitions)),
      GatewayMode::Remote => {
        let api = ApiClient::new(&config.api.base_url, timeout, store.clone())?;
        let transport = HttpStreamTransport::new(config.api.realtime_url()?, timeout)?;
        Gateway::Remote(RemoteGateway::new(
          api,
          store.clone(),
          Arc::new(transport),
          config.realtime.clone(),
          config.transitions,
        ))
      }
    };

    info!(mode = ?config.mode, cache = %config.assets.version, "session ready");
    Ok(Self::new(config, store, gateway, assets))
  }
}

impl<S: CacheStorage, F: Fetcher> ClientSession<S, F> {
  pub fn new(
    config: Config,
    store: Arc<dyn KeyValueStore>,
    gateway: Gateway,
    assets: AssetCacheManager<S, F>,
  ) -> Self {
    Self {
      config,
      store,
      gateway,
      assets,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn store(&self) -> &Arc<dyn KeyValueStore> {
    &self.store
  }

  pub fn gateway(&self) -> &Gateway {
    &self.gateway
  }

  pub fn gateway_mut(&mut self) -> &mut Gateway {
    &mut self.gateway
  }

  pub fn assets(&self) -> &AssetCacheManager<S, F> {
    &self.assets
  }

  pub fn assets_mut(&mut self) -> &mut AssetCacheManager<S, F> {
    &mut self.assets
  }

  /// Close the real-time subscription. The persisted session is kept.
  pub async fn shutdown(mut self) {
    self.gateway.disconnect().await;
    info!("session shut down");
  }
}
