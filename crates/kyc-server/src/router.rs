use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::documents::UPLOADS_ROUTE;
use crate::error::{ServerError, ServerResult};
use crate::handler;
use crate::state::AppState;

/// Build the axum router with all KYC endpoints.
pub fn build_router(state: AppState, config: &ServerConfig) -> ServerResult<Router> {
    Ok(Router::new()
        .route("/health", get(handler::health))
        .route("/kyc/submit", post(handler::submit))
        .route("/kyc/pending", get(handler::pending))
        .route("/kyc/verify/:kyc_id", post(handler::verify))
        .route("/kyc/status/:kyc_id", get(handler::status))
        .route("/kyc/history/:kyc_id", get(handler::history))
        .route("/kyc/ledger", get(handler::ledger))
        .route("/kyc/ledger/validate", get(handler::validate))
        .route("/kyc/:kyc_id", get(handler::details))
        .nest_service(UPLOADS_ROUTE, ServeDir::new(&config.upload_dir))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.allowed_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> ServerResult<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|_| ServerError::Config(format!("invalid CORS origin {origin:?}")))
        })
        .collect::<ServerResult<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any))
}
