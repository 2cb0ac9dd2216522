use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument, warn};

use super::types::{AiError, Recommendation, RequestToken};
use crate::meals::model::MealSlot;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations", post(request).delete(cancel))
        .route("/recommendations/latest", get(latest))
        .route("/recommendations/:token/accept", post(accept))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendBody {
    pub slot_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptBody {
    pub index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Error body for the recommendation routes; `raw` carries unreadable
/// provider output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiErrorBody {
    pub error: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

type AiRejection = (StatusCode, Json<AiErrorBody>);

#[instrument(skip(state))]
pub async fn request(
    State(state): State<AppState>,
    Json(body): Json<RecommendBody>,
) -> Result<Json<Recommendation>, AiRejection> {
    state
        .recommender
        .request_recommendation(&body.slot_id)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.recommender.cancel_pending().await,
    })
}

#[instrument(skip(state))]
pub async fn latest(
    State(state): State<AppState>,
) -> Result<Json<Recommendation>, (StatusCode, String)> {
    state
        .recommender
        .latest()
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "No recommendation yet".into()))
}

#[instrument(skip(state))]
pub async fn accept(
    State(state): State<AppState>,
    Path(token): Path<uuid::Uuid>,
    Json(body): Json<AcceptBody>,
) -> Result<Json<MealSlot>, AiRejection> {
    state
        .recommender
        .accept(RequestToken::from(token), body.index)
        .await
        .map(Json)
        .map_err(reject)
}

fn reject(e: AiError) -> AiRejection {
    let status = e.status_code();
    if status.is_server_error() {
        error!(error = %e, %status, "recommendation request failed");
    } else {
        warn!(error = %e, %status, "recommendation request rejected");
    }
    let raw = match &e {
        AiError::Parse { raw, .. } => Some(raw.clone()),
        _ => None,
    };
    (
        status,
        Json(AiErrorBody {
            error: e.to_string(),
            retryable: e.retryable(),
            raw,
        }),
    )
}
