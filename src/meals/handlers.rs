use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use tracing::{error, instrument};

use crate::state::AppState;

use super::dto::{MealPlanResponse, ProfileResponse};
use super::model::{FoodRecord, MealSlot};
use super::services::{MealPlanError, NutritionSummary};
use crate::nutrition::{NutritionTargets, PersonalInfo};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/targets", get(get_targets))
        .route("/meals", get(get_meals))
        .route("/nutrition", get(get_nutrition))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", put(put_profile).delete(delete_profile))
        .route("/meals", delete(clear_meals))
        .route("/meals/:slot_id", put(put_meal).delete(delete_meal))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn get_profile(State(state): State<AppState>) -> Json<ProfileResponse> {
    let info = state.meal_plan.personal_info().await;
    let targets = state.meal_plan.targets().await;
    Json(ProfileResponse::new(info, targets))
}

#[instrument(skip(state, info))]
pub async fn put_profile(
    State(state): State<AppState>,
    Json(info): Json<PersonalInfo>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let targets = state
        .meal_plan
        .set_personal_info(info.clone())
        .await
        .map_err(reject)?;
    Ok(Json(ProfileResponse::new(Some(info), targets)))
}

#[instrument(skip(state))]
pub async fn delete_profile(
    State(state): State<AppState>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.meal_plan.clear_personal_info().await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_targets(State(state): State<AppState>) -> Json<NutritionTargets> {
    Json(state.meal_plan.targets().await.rounded())
}

#[instrument(skip(state))]
pub async fn get_meals(State(state): State<AppState>) -> Json<MealPlanResponse> {
    Json(state.meal_plan.meal_plan().await.into())
}

#[instrument(skip(state))]
pub async fn clear_meals(
    State(state): State<AppState>,
) -> Result<Json<MealPlanResponse>, (StatusCode, String)> {
    state.meal_plan.clear_all_meals().await.map_err(reject)?;
    Ok(Json(state.meal_plan.meal_plan().await.into()))
}

#[instrument(skip(state, food))]
pub async fn put_meal(
    State(state): State<AppState>,
    Path(slot_id): Path<String>,
    Json(food): Json<FoodRecord>,
) -> Result<Json<MealSlot>, (StatusCode, String)> {
    state
        .meal_plan
        .set_meal_food(&slot_id, food)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    Path(slot_id): Path<String>,
) -> Result<Json<MealSlot>, (StatusCode, String)> {
    state
        .meal_plan
        .clear_meal_slot(&slot_id)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn get_nutrition(State(state): State<AppState>) -> Json<NutritionSummary> {
    Json(state.meal_plan.summary().await)
}

fn reject(e: MealPlanError) -> (StatusCode, String) {
    let status = e.status_code();
    if status.is_server_error() {
        error!(error = %e, "meal plan mutation failed");
    }
    (status, e.to_string())
}
