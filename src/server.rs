//! Read-only JSON server for the reference store.
//!
//! Lets browser tools and workflow nodes fetch the subgenre list over HTTP
//! instead of reading the database file.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | All subgenres as a compact JSON array |
//! | `GET`  | `/subgenres.json` | Same as `/` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Any other path answers `404` with the error body below.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "store_unavailable", "message": "..." } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::export;
use crate::models::SubgenreRecord;
use subgenre_match_core::MatchError;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

/// Build the router. Split out from [`run_server`] so tests can bind it to
/// an ephemeral port.
pub fn build_router(config: Arc<Config>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_subgenres))
        .route("/subgenres.json", get(handle_subgenres))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(AppState { config })
}

/// Serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = build_router(Arc::new(config.clone()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Serving subgenres on http://{}/subgenres.json", bind_addr);
    tracing::info!(db = %config.db.path.display(), "server started");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(|e| e.downcast_ref::<MatchError>())
            .map(MatchError::code)
            .unwrap_or("internal");
        let status = if code == "store_unavailable" {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Handlers ============

async fn handle_subgenres(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubgenreRecord>>, AppError> {
    let records = export::load_records(&state.config).await.map_err(|e| {
        tracing::error!("failed to load subgenres: {:#}", e);
        AppError::from(e)
    })?;
    Ok(Json(records))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_not_found() -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: "Not found".to_string(),
    }
}
