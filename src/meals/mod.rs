mod dto;
pub mod handlers;
pub mod model;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use model::{FoodRecord, MealPlan, MealSlot, SlotId};
pub use services::{MealPlanError, MealPlanState};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
