//! docreg server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) plus
//! `DOCREG_*` environment overrides, opens the SQLite store and blob
//! directory, starts the blob janitor, and serves the REST API over HTTP.
//!
//! # Client secret hashes
//!
//! To generate the argon2 PHC string for a client's `secret_hash`:
//!
//! ```
//! cargo run -p docreg-api --bin docreg-server -- --hash-secret
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use docreg_api::{AppState, HttpResolver, Production, ServerConfig};
use docreg_blob::FsBlobStore;
use docreg_registry::Registry;
use docreg_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Document registry server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a client secret read from stdin and exit.
  #[arg(long)]
  hash_secret: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_secret {
    let secret = read_secret()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(secret.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("DOCREG"))
    .build()
    .context("failed to read config file")?;

  let mut server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg.store_path = expand_tilde(&server_cfg.store_path);
  server_cfg.blob_dir = expand_tilde(&server_cfg.blob_dir);

  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store_path))?;
  let blobs = FsBlobStore::open(&server_cfg.blob_dir)
    .await
    .with_context(|| format!("failed to open blob directory {:?}", server_cfg.blob_dir))?;
  let resolver =
    HttpResolver::new(server_cfg.upstream_timeout()).context("failed to build HTTP client")?;

  let registry = Registry::<Production>::new(
    Arc::new(store),
    Arc::new(blobs),
    Arc::new(resolver),
    server_cfg.settings()?,
  );
  let state = AppState::new(registry, server_cfg.clone());

  let janitor = state.clone();
  let interval = server_cfg.janitor_interval();
  tokio::spawn(async move { janitor.registry.janitor.run(interval).await });

  let app = docreg_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read one line from stdin.
fn read_secret() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Secret: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the value of `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
  if let Ok(rest) = path.strip_prefix("~")
    && let Some(home) = std::env::var_os("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
