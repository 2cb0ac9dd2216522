use std::fmt;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::meals::model::{FoodRecord, SlotId, UnknownSlot};
use crate::meals::services::MealPlanError;
use crate::nutrition::{NutritionTargets, PersonalInfo, TotalNutrition, ValidationError};
use crate::storage::StorageError;

/// Failures of the recommendation flow. None of these are retried
/// internally; retry is always a new call from the user.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("no Gemini API key configured")]
    MissingCredential,

    /// The provider rejected the key; the user should enter a new one.
    #[error("API key rejected by provider (status {status})")]
    Auth { status: u16 },

    #[error("recommendation request failed: {message}")]
    Network { status: Option<u16>, message: String },

    #[error("recommendation request timed out")]
    Timeout,

    /// The response could not be turned into food records. `raw` keeps the
    /// provider text for display and debugging.
    #[error("could not read recommendation: {reason}")]
    Parse { reason: String, raw: String },

    /// A newer request started, or this one was cancelled, before it resolved.
    #[error("recommendation superseded by a newer request")]
    Superseded,

    #[error(transparent)]
    UnknownSlot(#[from] UnknownSlot),

    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("credential storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Commit(#[from] MealPlanError),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl AiError {
    pub fn parse(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Whether asking again, unchanged, could succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout | Self::Superseded)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredential => StatusCode::PRECONDITION_FAILED,
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::Network { .. } | Self::Parse { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Superseded => StatusCode::CONFLICT,
            Self::UnknownSlot(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Commit(e) => e.status_code(),
            Self::Storage(_) | Self::HttpClientBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Identifies one recommendation request; only the newest may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestToken(Uuid);

impl RequestToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RequestToken {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Snapshot of nutrition state a prompt is built from.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub slot: SlotId,
    pub meal_type: &'static str,
    pub personal_info: Option<PersonalInfo>,
    pub targets: NutritionTargets,
    pub consumed: TotalNutrition,
    pub remaining: NutritionTargets,
    /// Share of the remaining budget for this slot, split evenly across the
    /// slots still open.
    pub slot_budget: NutritionTargets,
    pub open_slots: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub token: RequestToken,
    pub slot: SlotId,
    pub candidates: Vec<FoodRecord>,
    pub rationale: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Saved by the user in settings.
    User,
    /// Supplied by the build configuration.
    Config,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub configured: bool,
    pub source: Option<CredentialSource>,
    pub has_default: bool,
}

/// Sends one prompt to a generative model and returns its text.
#[async_trait]
pub trait RecommendationTransport: Send + Sync {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, AiError>;
}
