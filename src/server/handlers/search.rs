use axum::extract::State;
use axum::Json;
use tracing::instrument;

use crate::assembler::SearchResponse;
use crate::search::{execute_search, SearchRequest};
use crate::server::AppState;

use super::ApiError;

#[instrument(skip(state, req), fields(clauses = req.clauses.len(), k = req.k))]
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let result = execute_search(&state.catalog, &state.config.search, req).await;

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code(),
    };
    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/v1/search", &status.to_string()])
        .inc();

    Ok(Json(result?))
}
