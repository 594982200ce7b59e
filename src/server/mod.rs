//! REST API server for the issue tracker.

pub mod repo;
pub mod routes;

use axum::routing::get;
use axum::Router;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use self::repo::IssueRepo;
use self::routes::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route(
      "/api/issues",
      get(routes::list_issues).post(routes::create_issue),
    )
    .route("/api/issues/analytics", get(routes::get_analytics))
    .route(
      "/api/issues/:id",
      get(routes::get_issue)
        .put(routes::update_issue)
        .delete(routes::delete_issue),
    )
    .route("/api/health", get(routes::health))
    .fallback(routes::not_found)
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

/// Default database location, e.g. `~/.local/share/trk/issues.db`.
fn default_database_path() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("trk").join("issues.db"))
}

/// Open the repository configured for this server.
pub fn open_repo(config: &ServerConfig) -> Result<IssueRepo> {
  match &config.database {
    Some(path) if path.as_os_str() == ":memory:" => IssueRepo::open_in_memory(),
    Some(path) => IssueRepo::open(path),
    None => IssueRepo::open(&default_database_path()?),
  }
}

/// Run the API server until the process is stopped.
pub async fn serve(config: &ServerConfig, seed: bool) -> Result<()> {
  let repo = open_repo(config)?;
  if seed {
    repo
      .seed()
      .map_err(|e| eyre!("Failed to seed database: {}", e))?;
  }

  let state = AppState {
    repo: Arc::new(repo),
    started_at: Instant::now(),
  };
  let app = router(state);

  let listener = tokio::net::TcpListener::bind(&config.bind)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", config.bind, e))?;
  let addr = listener.local_addr()?;
  info!("issue tracker API listening on http://{}/api", addr);

  axum::serve(listener, app).await?;

  Ok(())
}
