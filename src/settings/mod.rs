pub mod handlers;
pub mod theme;

use crate::state::AppState;
use axum::Router;

pub use theme::{ThemeKind, ThemeSettings, ThemeView};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
