use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{RecommendationRequest, RecommendationResponse},
    routes::AppState,
    services::recommendations::{self, IdPolicy},
};

/// Handler for `POST /api/recommend`
///
/// A body that cannot be read as JSON is treated as an internal failure, the
/// same as any other unexpected error.
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<RecommendationRequest>, JsonRejection>,
) -> AppResult<Json<RecommendationResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        AppError::Internal(format!("Unreadable request body: {}", rejection.body_text()))
    })?;

    tracing::info!(
        request_id = %request_id,
        product_count = request.products.as_ref().map_or(0, Vec::len),
        "Processing recommendation request"
    );

    let response = recommendations::get_recommendations(
        state.model.as_deref(),
        request,
        IdPolicy::from_flag(state.config.restrict_to_submitted_ids),
    )
    .await?;

    tracing::info!(
        request_id = %request_id,
        recommended_count = response.recommended_ids.len(),
        "Recommendation completed"
    );

    Ok(Json(response))
}
