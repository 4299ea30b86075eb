//! REST API for the document registry.
//!
//! Exposes an axum [`Router`] over a [`Registry`] running on any [`Backend`].
//! Bearer authentication happens here; scopes and the authorization filter
//! are applied by the service layer.

pub mod auth;
pub mod error;
pub mod etag;
pub mod handlers;
pub mod params;
pub mod resolver;
pub mod views;

#[cfg(test)]
mod tests;

use std::{num::NonZeroU64, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use docreg_blob::FsBlobStore;
use docreg_core::authz::Grant;
use docreg_registry::{Backend, DEFAULT_CHUNK_SIZE, Registry, Settings};
use docreg_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use auth::Clients;
pub use error::{ApiError, Result};
pub use resolver::HttpResolver;

use handlers::{documents, object_links, parts, sendings, usage_rights};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `DOCREG_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "defaults::host")]
  pub host:                  String,
  #[serde(default = "defaults::port")]
  pub port:                  u16,
  /// Prefix of every self-URL in responses.
  pub base_url:              String,
  pub store_path:            PathBuf,
  pub blob_dir:              PathBuf,
  #[serde(default = "defaults::chunk_size")]
  pub chunk_size:            u64,
  #[serde(default = "defaults::max_parts")]
  pub max_parts:             u32,
  #[serde(default = "defaults::max_body_bytes")]
  pub max_body_bytes:        usize,
  #[serde(default = "defaults::upstream_timeout_ms")]
  pub upstream_timeout_ms:   u64,
  #[serde(default = "defaults::janitor_interval_secs")]
  pub janitor_interval_secs: u64,
  #[serde(default = "defaults::janitor_grace_secs")]
  pub janitor_grace_secs:    i64,
  #[serde(default)]
  pub clients:               Vec<ClientConfig>,
}

/// One API client and what it may do.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
  pub client_id:   String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub secret_hash: String,
  #[serde(default)]
  pub superuser:   bool,
  #[serde(default)]
  pub grants:      Vec<Grant>,
}

mod defaults {
  pub fn host() -> String { "127.0.0.1".into() }
  pub fn port() -> u16 { 8000 }
  pub fn chunk_size() -> u64 { super::DEFAULT_CHUNK_SIZE.get() }
  pub fn max_parts() -> u32 { 10_000 }
  pub fn max_body_bytes() -> usize { 64 * 1024 * 1024 }
  pub fn upstream_timeout_ms() -> u64 { 10_000 }
  pub fn janitor_interval_secs() -> u64 { 3600 }
  pub fn janitor_grace_secs() -> i64 { 86_400 }
}

impl ServerConfig {
  /// Service-layer settings derived from this configuration.
  pub fn settings(&self) -> anyhow::Result<Settings> {
    let chunk_size = NonZeroU64::new(self.chunk_size).context("chunk_size must be positive")?;
    Ok(Settings {
      chunk_size,
      max_parts: self.max_parts,
      janitor_grace: chrono::Duration::seconds(self.janitor_grace_secs),
      ..Settings::default()
    })
  }

  pub fn upstream_timeout(&self) -> Duration { Duration::from_millis(self.upstream_timeout_ms) }

  pub fn janitor_interval(&self) -> Duration { Duration::from_secs(self.janitor_interval_secs) }

  /// `base_url` without a trailing slash.
  pub fn base(&self) -> &str { self.base_url.trim_end_matches('/') }
}

// ─── Production backend ──────────────────────────────────────────────────────

/// SQLite metadata, filesystem blobs, HTTP lookups.
pub struct Production;

impl Backend for Production {
  type Repo = SqliteStore;
  type Blobs = FsBlobStore;
  type Resolver = HttpResolver;
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<K: Backend> {
  pub registry: Arc<Registry<K>>,
  pub config:   Arc<ServerConfig>,
  pub clients:  Arc<Clients>,
}

impl<K: Backend> Clone for AppState<K> {
  fn clone(&self) -> Self {
    Self {
      registry: self.registry.clone(),
      config:   self.config.clone(),
      clients:  self.clients.clone(),
    }
  }
}

impl<K: Backend> AppState<K> {
  pub fn new(registry: Registry<K>, config: ServerConfig) -> Self {
    let clients = Clients::new(config.clients.clone());
    Self {
      registry: Arc::new(registry),
      config:   Arc::new(config),
      clients:  Arc::new(clients),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the registry API. `HEAD` is answered by
/// every `GET` route.
pub fn router<K: Backend>(state: AppState<K>) -> Router {
  let body_limit = state.config.max_body_bytes;
  Router::new()
    // Documents
    .route("/documents",                 get(documents::list::<K>).post(documents::create::<K>))
    .route("/documents/_search",         post(documents::search::<K>))
    .route(
      "/documents/{id}",
      get(documents::get_one::<K>)
        .put(documents::replace::<K>)
        .patch(documents::patch::<K>)
        .delete(documents::destroy::<K>),
    )
    .route("/documents/{id}/download",   get(documents::download::<K>))
    .route("/documents/{id}/versions",   get(documents::versions::<K>))
    .route("/documents/{id}/lock",       post(documents::lock::<K>))
    .route("/documents/{id}/unlock",     post(documents::unlock::<K>))
    // Parts
    .route("/parts/{id}",                get(parts::get_one::<K>).put(parts::upload::<K>))
    // Usage rights
    .route(
      "/usageRights",
      get(usage_rights::list::<K>).post(usage_rights::create::<K>),
    )
    .route(
      "/usageRights/{id}",
      get(usage_rights::get_one::<K>)
        .put(usage_rights::replace::<K>)
        .patch(usage_rights::patch::<K>)
        .delete(usage_rights::destroy::<K>),
    )
    // Object links
    .route(
      "/objectLinks",
      get(object_links::list::<K>).post(object_links::create::<K>),
    )
    .route(
      "/objectLinks/{id}",
      get(object_links::get_one::<K>).delete(object_links::destroy::<K>),
    )
    // Sendings
    .route("/sendings",                  get(sendings::list::<K>).post(sendings::create::<K>))
    .route(
      "/sendings/{id}",
      get(sendings::get_one::<K>)
        .put(sendings::replace::<K>)
        .patch(sendings::patch::<K>)
        .delete(sendings::destroy::<K>),
    )
    .layer(DefaultBodyLimit::max(body_limit))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
