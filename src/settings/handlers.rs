//! Settings screen: storage overview, data reset, API key and theme.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::theme::ThemeView;
use crate::meals::services::SyncStatus;
use crate::recommend::types::{AiError, CredentialStatus};
use crate::state::AppState;
use crate::storage::StorageStats;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/settings/storage", get(storage_overview))
        .route("/settings/data", delete(reset_data))
        .route(
            "/settings/api-key",
            get(api_key_status).put(save_api_key).delete(clear_api_key),
        )
        .route("/settings/api-key/default", post(save_default_api_key))
        .route("/settings/theme", get(get_theme))
        .route("/settings/theme/toggle", post(toggle_theme))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageOverview {
    #[serde(flatten)]
    pub stats: StorageStats,
    #[serde(flatten)]
    pub sync: SyncStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyBody {
    pub api_key: String,
}

#[instrument(skip(state))]
pub async fn storage_overview(
    State(state): State<AppState>,
) -> Result<Json<StorageOverview>, (StatusCode, String)> {
    let stats = state.storage.storage_stats().await.map_err(internal)?;
    let sync = state.meal_plan.sync_status().await;
    Ok(Json(StorageOverview { stats, sync }))
}

/// Wipes every stored key and returns the app to first-run state.
#[instrument(skip(state))]
pub async fn reset_data(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    state
        .meal_plan
        .reset_all()
        .await
        .map_err(|e| (e.status_code(), e.to_string()))?;
    state.recommender.reset().await;
    state.theme.reset().await;
    info!("local data cleared");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn api_key_status(
    State(state): State<AppState>,
) -> Result<Json<CredentialStatus>, (StatusCode, String)> {
    state.recommender.credential_status().await.map(Json).map_err(reject)
}

#[instrument(skip(state, body))]
pub async fn save_api_key(
    State(state): State<AppState>,
    Json(body): Json<ApiKeyBody>,
) -> Result<Json<CredentialStatus>, (StatusCode, String)> {
    state
        .recommender
        .set_credential(&body.api_key)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn clear_api_key(
    State(state): State<AppState>,
) -> Result<Json<CredentialStatus>, (StatusCode, String)> {
    state.recommender.clear_credential().await.map(Json).map_err(reject)
}

#[instrument(skip(state))]
pub async fn save_default_api_key(
    State(state): State<AppState>,
) -> Result<Json<CredentialStatus>, (StatusCode, String)> {
    state
        .recommender
        .save_default_credential()
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn get_theme(State(state): State<AppState>) -> Json<ThemeView> {
    Json(state.theme.current().await)
}

#[instrument(skip(state))]
pub async fn toggle_theme(
    State(state): State<AppState>,
) -> Result<Json<ThemeView>, (StatusCode, String)> {
    state.theme.toggle().await.map(Json).map_err(internal)
}

fn reject(e: AiError) -> (StatusCode, String) {
    (e.status_code(), e.to_string())
}

fn internal<E: std::error::Error>(e: E) -> (StatusCode, String) {
    error!(error = %e, "settings request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
