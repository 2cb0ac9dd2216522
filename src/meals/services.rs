//! The authoritative in-memory profile and meal plan.
//!
//! Every mutation is written through to storage before it is committed in
//! memory, then published to subscribers. The inner mutex is held across the
//! storage write, so mutations never interleave.

use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument, warn};

use crate::meals::model::{FoodRecord, MealPlan, MealSlot, SlotId, UnknownSlot};
use crate::nutrition::{
    targets_for, NutritionProgress, NutritionTargets, PersonalInfo, TotalNutrition,
    ValidationError,
};
use crate::storage::{StorageClient, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum MealPlanError {
    #[error(transparent)]
    NotFound(#[from] UnknownSlot),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("change not saved: {0}")]
    Persistence(#[from] StorageError),
}

impl MealPlanError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Consistent view of everything the UI renders, published after each commit.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub revision: u64,
    pub personal_info: Option<PersonalInfo>,
    pub targets: NutritionTargets,
    pub meal_plan: MealPlan,
    pub total_nutrition: TotalNutrition,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NutritionSummary {
    pub has_profile: bool,
    pub targets: NutritionTargets,
    pub consumed: TotalNutrition,
    pub remaining: NutritionTargets,
    pub progress: NutritionProgress,
    pub meals_completed: usize,
    pub meals_total: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub revision: u64,
    /// Set when a write failed (or stored data could not be read) and memory
    /// may no longer match storage. Cleared by the next successful write.
    pub persistence_degraded: bool,
}

struct Inner {
    personal_info: Option<PersonalInfo>,
    plan: MealPlan,
    revision: u64,
    persistence_degraded: bool,
}

impl Inner {
    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            revision: self.revision,
            personal_info: self.personal_info.clone(),
            targets: targets_for(self.personal_info.as_ref()),
            meal_plan: self.plan.clone(),
            total_nutrition: self.plan.total_nutrition(),
        }
    }
}

pub struct MealPlanState {
    storage: Arc<dyn StorageClient>,
    inner: Mutex<Inner>,
    notifier: watch::Sender<StateSnapshot>,
}

impl MealPlanState {
    /// Load profile and plan from storage. Unreadable records start empty and
    /// mark the state as degraded instead of aborting startup.
    pub async fn hydrate(storage: Arc<dyn StorageClient>) -> Self {
        let mut degraded = false;

        let personal_info = match storage.get_personal_info().await {
            Ok(Some(info)) => match info.validate() {
                Ok(()) => Some(info),
                Err(e) => {
                    warn!(error = %e, "stored profile out of range; ignoring");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "failed to load profile");
                degraded = true;
                None
            }
        };

        let plan = match storage.get_meal_plan().await {
            Ok(plan) => plan.unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "failed to load meal plan");
                degraded = true;
                MealPlan::default()
            }
        };

        info!(
            has_profile = personal_info.is_some(),
            meals = plan.filled_count(),
            "meal plan state hydrated"
        );

        let inner = Inner {
            personal_info,
            plan,
            revision: 0,
            persistence_degraded: degraded,
        };
        let (notifier, _) = watch::channel(inner.snapshot());
        Self {
            storage,
            inner: Mutex::new(inner),
            notifier,
        }
    }

    /// Receives a fresh [`StateSnapshot`] after every committed mutation.
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.notifier.subscribe()
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn personal_info(&self) -> Option<PersonalInfo> {
        self.inner.lock().await.personal_info.clone()
    }

    pub async fn targets(&self) -> NutritionTargets {
        targets_for(self.inner.lock().await.personal_info.as_ref())
    }

    pub async fn meal_plan(&self) -> MealPlan {
        self.inner.lock().await.plan.clone()
    }

    pub async fn total_nutrition(&self) -> TotalNutrition {
        self.inner.lock().await.plan.total_nutrition()
    }

    pub async fn summary(&self) -> NutritionSummary {
        let inner = self.inner.lock().await;
        let targets = targets_for(inner.personal_info.as_ref());
        let consumed = inner.plan.total_nutrition();
        NutritionSummary {
            has_profile: inner.personal_info.is_some(),
            targets,
            consumed,
            remaining: targets.remaining_after(consumed),
            progress: NutritionProgress::between(consumed, targets),
            meals_completed: inner.plan.filled_count(),
            meals_total: inner.plan.slots().len(),
        }
    }

    pub async fn sync_status(&self) -> SyncStatus {
        let inner = self.inner.lock().await;
        SyncStatus {
            revision: inner.revision,
            persistence_degraded: inner.persistence_degraded,
        }
    }

    #[instrument(skip(self, info))]
    pub async fn set_personal_info(
        &self,
        info: PersonalInfo,
    ) -> Result<NutritionTargets, MealPlanError> {
        info.validate()?;
        let mut inner = self.inner.lock().await;
        let written = self.storage.set_personal_info(Some(&info)).await;
        Self::record_write(&mut inner, written)?;

        let targets = targets_for(Some(&info));
        inner.personal_info = Some(info);
        self.publish(&mut inner);
        info!(calories = targets.calories.round(), "profile updated");
        Ok(targets)
    }

    #[instrument(skip(self))]
    pub async fn clear_personal_info(&self) -> Result<(), MealPlanError> {
        let mut inner = self.inner.lock().await;
        let written = self.storage.set_personal_info(None).await;
        Self::record_write(&mut inner, written)?;

        inner.personal_info = None;
        self.publish(&mut inner);
        info!("profile cleared");
        Ok(())
    }

    #[instrument(skip(self, food))]
    pub async fn set_meal_food(
        &self,
        slot_id: &str,
        food: FoodRecord,
    ) -> Result<MealSlot, MealPlanError> {
        let id: SlotId = slot_id.parse()?;
        food.validate()?;
        let food = food.normalized();

        self.update_plan(|plan| plan.slot_mut(id).food = Some(food))
            .await
            .map(|plan| plan.slot(id).clone())
    }

    #[instrument(skip(self))]
    pub async fn clear_meal_slot(&self, slot_id: &str) -> Result<MealSlot, MealPlanError> {
        let id: SlotId = slot_id.parse()?;
        self.update_plan(|plan| plan.slot_mut(id).food = None)
            .await
            .map(|plan| plan.slot(id).clone())
    }

    /// Empties every slot with a single storage write.
    #[instrument(skip(self))]
    pub async fn clear_all_meals(&self) -> Result<(), MealPlanError> {
        self.update_plan(MealPlan::clear_all).await.map(|_| ())
    }

    /// Wipe storage, then drop the profile and every meal from memory.
    #[instrument(skip(self))]
    pub async fn reset_all(&self) -> Result<(), MealPlanError> {
        let mut inner = self.inner.lock().await;
        let written = self.storage.clear_all().await;
        Self::record_write(&mut inner, written)?;

        inner.personal_info = None;
        inner.plan = MealPlan::default();
        self.publish(&mut inner);
        info!("all data reset");
        Ok(())
    }

    async fn update_plan(
        &self,
        change: impl FnOnce(&mut MealPlan),
    ) -> Result<MealPlan, MealPlanError> {
        let mut inner = self.inner.lock().await;
        let mut next = inner.plan.clone();
        change(&mut next);

        let written = self.storage.set_meal_plan(&next).await;
        Self::record_write(&mut inner, written)?;

        inner.plan = next.clone();
        self.publish(&mut inner);
        Ok(next)
    }

    fn record_write(inner: &mut Inner, result: Result<(), StorageError>) -> Result<(), MealPlanError> {
        match result {
            Ok(()) => {
                inner.persistence_degraded = false;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "write-through failed; change not committed");
                inner.persistence_degraded = true;
                Err(e.into())
            }
        }
    }

    fn publish(&self, inner: &mut Inner) {
        inner.revision += 1;
        self.notifier.send_replace(inner.snapshot());
    }
}
