use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    error::AppResult,
    middleware::request_id::{make_span_with_request_id, request_id_middleware},
    services::{ChatModel, GeminiProvider},
};

pub mod recommendations;

/// Shared, read-only application state
pub struct AppState {
    pub config: Config,
    /// `None` when no API key is configured
    pub model: Option<Arc<dyn ChatModel>>,
}

impl AppState {
    pub fn new(config: Config, model: Option<Arc<dyn ChatModel>>) -> Self {
        Self { config, model }
    }

    /// Builds the state for a running server, wiring up Gemini if a key is set
    pub fn from_config(config: Config) -> AppResult<Self> {
        let model = GeminiProvider::from_config(&config)?
            .map(|provider| Arc::new(provider) as Arc<dyn ChatModel>);

        match &model {
            Some(model) => tracing::info!(
                provider = model.name(),
                model = %config.gemini_model,
                timeout_secs = config.model_timeout_secs,
                "Model provider configured"
            ),
            None => tracing::warn!("GEMINI_API_KEY is not set; recommendation requests will fail"),
        }

        Ok(Self::new(config, model))
    }
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .with_state(state.clone());

    if let Some(assets_dir) = &state.config.assets_dir {
        router = router.nest_service("/assets", ServeDir::new(assets_dir));
    }

    if let Some(index_file) = &state.config.index_file {
        router = router.fallback_service(ServeFile::new(index_file));
    }

    router.layer(
        ServiceBuilder::new()
            .layer(CorsLayer::permissive())
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
    )
}

/// API routes under /api
fn api_routes() -> Router<Arc<AppState>> {
    Router::new().route("/recommend", post(recommendations::recommend))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
