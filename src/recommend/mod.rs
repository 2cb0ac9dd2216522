pub mod client;
pub mod gemini;
pub mod handlers;
pub mod parse;
pub mod prompt;
pub mod types;

use crate::state::AppState;
use axum::Router;

pub use client::Recommender;
pub use gemini::GeminiClient;
pub use types::{AiError, Recommendation, RecommendationTransport, RequestToken};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
