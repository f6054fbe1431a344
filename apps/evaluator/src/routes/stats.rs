use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::EvaluationStats;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub position_id: Option<String>,
}

/// GET /api/v1/evaluations/stats?position_id=
/// Coverage counts for one position, or for every answer when omitted.
pub async fn evaluation_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<EvaluationStats>, AppError> {
    if let Some(id) = &query.position_id {
        if id.trim().is_empty() {
            return Err(AppError::Validation("position_id must not be blank".into()));
        }
    }
    let stats = state
        .store
        .evaluation_stats(query.position_id.as_deref())
        .await?;
    Ok(Json(stats))
}
