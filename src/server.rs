//! HTTP transport for the knowledge query service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/` | Request envelope `{ method, params }` (see [`crate::protocol`]) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Protocol failures keep the connection alive and answer with
//!
//! ```json
//! { "error": "unknown method: tools/destroy", "code": "method_not_found" }
//! ```
//!
//! Codes: `parse_error` (400), `bad_request` (400), `method_not_found` (404),
//! `not_found` (404), `internal` (500). Tool failures are not protocol
//! failures: they come back inside a successful `tools/call` result as
//! `{ success: false, error }`.
//!
//! # Lifecycle
//!
//! On start the server adopts the open session or starts its own, records a
//! `server-start` event, syncs the knowledge cache and spawns the periodic
//! refresh. Ctrl-C stops accepting requests, closes the session it started
//! and records `server-stop`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::ProtocolError;
use crate::knowledge::KnowledgeCache;
use crate::models::Impact;
use crate::protocol::QueryService;
use crate::store::MemoryStore;
use crate::traits::{ToolContext, ToolRegistry};

const SERVER_SESSION: &str = "Query service session";

/// Build the router for `service`. Exposed so callers can embed the
/// service under their own listener.
pub fn router(service: QueryService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(handle_request))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

/// Open the store, bind `[server].bind` and serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());
    let mut store = MemoryStore::open(&config)?;

    let owns_session = match store.current_session_id() {
        Some(id) => {
            tracing::info!(session = id, "adopting open session");
            false
        }
        None => {
            store.start_session(SERVER_SESSION)?;
            true
        }
    };
    store.add_development_event(
        "server-start",
        "Knowledge query service started",
        Vec::new(),
        Impact::Low,
    )?;

    let mut cache = KnowledgeCache::new();
    let stats = cache.sync(&store);
    tracing::info!(items = stats.total_items, "knowledge cache synced");

    let ctx = ToolContext::new(
        config.clone(),
        Arc::new(Mutex::new(store)),
        Arc::new(RwLock::new(cache)),
    );
    let service = QueryService::new(Arc::new(ToolRegistry::with_builtins()), ctx.clone());

    let refresh = tokio::spawn(refresh_cache(
        ctx.clone(),
        Duration::from_secs(config.server.cache_refresh_secs),
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        tools = service.registry().len(),
        "query service listening"
    );
    println!("Query service listening on http://{}", config.server.bind);

    let served = axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    refresh.abort();

    let mut store = ctx.store().await;
    if owns_session {
        store.end_session("Server shutdown via SIGINT")?;
    }
    store.add_development_event(
        "server-stop",
        "Knowledge query service stopped",
        Vec::new(),
        Impact::Low,
    )?;
    tracing::info!("query service stopped");

    served?;
    Ok(())
}

async fn refresh_cache(ctx: ToolContext, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately; the cache was just synced.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let store = ctx.store().await;
        let stats = ctx.sync_cache(&store).await;
        tracing::debug!(items = stats.total_items, "knowledge cache refreshed");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError(ProtocolError);

impl From<ProtocolError> for AppError {
    fn from(err: ProtocolError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST / ============

/// The body is taken raw so malformed JSON becomes a `parse_error`
/// response rather than an extractor rejection.
async fn handle_request(
    State(service): State<QueryService>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    Ok(Json(service.handle(&body).await?))
}
