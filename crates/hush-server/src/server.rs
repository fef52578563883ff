use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{access_share, create_share, health, share_metadata};
use crate::lifecycle::ShareLifecycle;
use crate::passwords::DEFAULT_SALT;
use crate::store::{FileStore, RedisStore, Storage};
use crate::AppState;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Redis connection URL. Absent means the primary store is disabled.
    pub redis_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    /// Set `HUSH_FILE_STORAGE=false` to disable the JSON file fallback.
    pub file_storage: bool,
    /// Set `HUSH_REQUIRE_REDIS=true` to treat writes the primary missed as
    /// failures and to refuse startup without a reachable redis.
    pub require_redis: bool,
    pub password_salt: String,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HUSH_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("HUSH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            redis_url: std::env::var("HUSH_REDIS_URL")
                .or_else(|_| std::env::var("REDIS_URL"))
                .ok(),
            data_dir: std::env::var("HUSH_DATA_DIR").ok().map(PathBuf::from),
            file_storage: std::env::var("HUSH_FILE_STORAGE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            require_redis: std::env::var("HUSH_REQUIRE_REDIS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            password_salt: std::env::var("HUSH_PASSWORD_SALT")
                .unwrap_or_else(|_| DEFAULT_SALT.into()),
            cors_origins: std::env::var("HUSH_CORS_ORIGINS").ok(),
        }
    }
}

/// Resolve the directory holding `shares.json`.
fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

/// Assemble the HTTP surface over prepared state. Split out so tests can
/// drive the router without binding a socket.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/shares", post(create_share))
        .route("/api/shares/{id}/access", post(access_share))
        .route("/api/shares/{id}/metadata", get(share_metadata))
        .with_state(state)
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    // Connect the primary store if a URL was given.
    let redis = match &cfg.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => Some(store),
            Err(e) => {
                if cfg.require_redis {
                    anyhow::bail!("redis is required but unreachable: {e}");
                }
                warn!(error = %e, "redis unreachable, continuing on the file store");
                None
            }
        },
        None => {
            if cfg.require_redis {
                anyhow::bail!("HUSH_REQUIRE_REDIS is set but no redis URL is configured");
            }
            None
        }
    };

    let file = if cfg.file_storage {
        let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
        let path = data_dir.join("shares.json");
        info!(path = %path.display(), "file store enabled");
        Some(FileStore::new(path))
    } else {
        None
    };

    let storage = Storage::new(redis, file, cfg.require_redis);
    if !storage.has_primary() && !storage.has_secondary() {
        anyhow::bail!("no storage backend configured: set HUSH_REDIS_URL or enable file storage");
    }

    if cfg.password_salt == DEFAULT_SALT {
        warn!("using the built-in password salt; set HUSH_PASSWORD_SALT in production");
    }
    let state = AppState {
        lifecycle: ShareLifecycle::new(storage, cfg.password_salt),
    };

    let cors = build_cors(cfg.cors_origins.as_deref());
    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "hush server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<http::HeaderValue> =
                o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
