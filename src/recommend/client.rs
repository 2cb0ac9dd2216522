//! Recommendation flow: credential resolution, one provider call per request,
//! and a guard that only lets the newest request land.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::parse::parse_recommendation;
use super::prompt::build_prompt;
use super::types::{
    AiError, CredentialSource, CredentialStatus, Recommendation, RecommendationRequest,
    RecommendationTransport, RequestToken,
};
use crate::meals::model::{MealSlot, SlotId};
use crate::meals::services::MealPlanState;
use crate::nutrition::{Macros, ValidationError};
use crate::storage::StorageClient;

#[derive(Default)]
struct Tracker {
    pending: Option<RequestToken>,
    latest: Option<Recommendation>,
}

pub struct Recommender {
    storage: Arc<dyn StorageClient>,
    meal_plan: Arc<MealPlanState>,
    transport: Arc<dyn RecommendationTransport>,
    default_credential: Option<String>,
    tracker: Mutex<Tracker>,
}

impl Recommender {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        meal_plan: Arc<MealPlanState>,
        transport: Arc<dyn RecommendationTransport>,
        default_credential: Option<String>,
    ) -> Self {
        let default_credential = default_credential
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self {
            storage,
            meal_plan,
            transport,
            default_credential,
            tracker: Mutex::new(Tracker::default()),
        }
    }

    /// The key to send, with where it came from. A saved key wins over the
    /// configured default.
    pub async fn credential(&self) -> Result<Option<(String, CredentialSource)>, AiError> {
        if let Some(key) = self.storage.get_api_key().await? {
            if !key.trim().is_empty() {
                return Ok(Some((key, CredentialSource::User)));
            }
        }
        Ok(self
            .default_credential
            .clone()
            .map(|k| (k, CredentialSource::Config)))
    }

    pub async fn credential_status(&self) -> Result<CredentialStatus, AiError> {
        let source = self.credential().await?.map(|(_, source)| source);
        Ok(CredentialStatus {
            configured: source.is_some(),
            source,
            has_default: self.default_credential.is_some(),
        })
    }

    #[instrument(skip(self, key))]
    pub async fn set_credential(&self, key: &str) -> Result<CredentialStatus, AiError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::Blank("apiKey").into());
        }
        self.storage.set_api_key(Some(key)).await?;
        info!("api key saved");
        self.credential_status().await
    }

    #[instrument(skip(self))]
    pub async fn clear_credential(&self) -> Result<CredentialStatus, AiError> {
        self.storage.set_api_key(None).await?;
        info!("api key cleared");
        self.credential_status().await
    }

    /// Persist the configured default as the user's key.
    #[instrument(skip(self))]
    pub async fn save_default_credential(&self) -> Result<CredentialStatus, AiError> {
        let key = self
            .default_credential
            .as_deref()
            .ok_or(AiError::MissingCredential)?;
        self.storage.set_api_key(Some(key)).await?;
        info!("default api key saved");
        self.credential_status().await
    }

    /// Budget context for one slot. Remaining macros are split evenly across
    /// the open slots, counting the requested one even when it is filled.
    pub async fn build_request(&self, slot: SlotId) -> RecommendationRequest {
        let snapshot = self.meal_plan.snapshot().await;
        let remaining = snapshot.targets.remaining_after(snapshot.total_nutrition);

        let mut open_slots = snapshot
            .meal_plan
            .slots()
            .iter()
            .filter(|s| !s.has_food())
            .count();
        if snapshot.meal_plan.slot(slot).has_food() {
            open_slots += 1;
        }
        let share = open_slots.max(1) as f64;

        RecommendationRequest {
            slot,
            meal_type: slot.title(),
            personal_info: snapshot.personal_info,
            targets: snapshot.targets,
            consumed: snapshot.total_nutrition,
            remaining,
            slot_budget: Macros {
                calories: remaining.calories / share,
                protein_g: remaining.protein_g / share,
                carbs_g: remaining.carbs_g / share,
                fat_g: remaining.fat_g / share,
            },
            open_slots,
        }
    }

    /// Ask the provider once for suggestions for `slot_id`. If a newer
    /// request starts, or this one is cancelled, before the answer arrives,
    /// the answer is discarded and [`AiError::Superseded`] is returned.
    #[instrument(skip(self))]
    pub async fn request_recommendation(&self, slot_id: &str) -> Result<Recommendation, AiError> {
        let slot: SlotId = slot_id.parse()?;
        let Some((api_key, source)) = self.credential().await? else {
            warn!("recommendation requested without an api key");
            return Err(AiError::MissingCredential);
        };

        let request = self.build_request(slot).await;
        let prompt = build_prompt(&request);
        let token = self.begin().await;
        info!(%token, %slot, ?source, "requesting recommendation");

        let outcome = self
            .transport
            .generate(&api_key, &prompt)
            .await
            .and_then(|text| parse_recommendation(&text));

        let mut tracker = self.tracker.lock().await;
        if tracker.pending != Some(token) {
            debug!(%token, "discarding stale recommendation");
            return Err(AiError::Superseded);
        }
        tracker.pending = None;

        let parsed = outcome.map_err(|e| {
            warn!(%token, error = %e, "recommendation failed");
            e
        })?;
        let recommendation = Recommendation {
            token,
            slot,
            candidates: parsed.candidates,
            rationale: parsed.rationale,
            received_at: OffsetDateTime::now_utc(),
        };
        info!(%token, candidates = recommendation.candidates.len(), "recommendation ready");
        tracker.latest = Some(recommendation.clone());
        Ok(recommendation)
    }

    async fn begin(&self) -> RequestToken {
        let token = RequestToken::new();
        let mut tracker = self.tracker.lock().await;
        if let Some(previous) = tracker.pending.replace(token) {
            debug!(%previous, "superseding pending recommendation");
        }
        token
    }

    /// Abandon the in-flight request, if any. Returns whether one was pending.
    pub async fn cancel_pending(&self) -> bool {
        let cancelled = self.tracker.lock().await.pending.take();
        if let Some(token) = cancelled {
            info!(%token, "recommendation cancelled");
        }
        cancelled.is_some()
    }

    pub async fn latest(&self) -> Option<Recommendation> {
        self.tracker.lock().await.latest.clone()
    }

    /// Forget the in-flight request and the last result.
    pub async fn reset(&self) {
        *self.tracker.lock().await = Tracker::default();
    }

    /// Commit candidate `index` of the latest recommendation into its slot.
    #[instrument(skip(self))]
    pub async fn accept(&self, token: RequestToken, index: usize) -> Result<MealSlot, AiError> {
        let (slot, food) = {
            let tracker = self.tracker.lock().await;
            let latest = tracker
                .latest
                .as_ref()
                .filter(|r| r.token == token)
                .ok_or(AiError::Superseded)?;
            let food = latest.candidates.get(index).cloned().ok_or_else(|| {
                ValidationError::Invalid(format!(
                    "no candidate at index {index} ({} available)",
                    latest.candidates.len()
                ))
            })?;
            (latest.slot, food)
        };

        let committed = self.meal_plan.set_meal_food(slot.as_str(), food).await?;
        info!(%token, %slot, "recommendation accepted");
        Ok(committed)
    }
}
