use serde::Serialize;

use crate::meals::model::{MealPlan, MealSlot};
use crate::nutrition::{NutritionTargets, PersonalInfo, TotalNutrition};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub personal_info: Option<PersonalInfo>,
    /// Rounded for display; all zero without a profile.
    pub targets: NutritionTargets,
}

impl ProfileResponse {
    pub fn new(personal_info: Option<PersonalInfo>, targets: NutritionTargets) -> Self {
        Self {
            personal_info,
            targets: targets.rounded(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanResponse {
    pub slots: Vec<MealSlot>,
    pub total_nutrition: TotalNutrition,
    pub meals_completed: usize,
}

impl From<MealPlan> for MealPlanResponse {
    fn from(plan: MealPlan) -> Self {
        Self {
            total_nutrition: plan.total_nutrition(),
            meals_completed: plan.filled_count(),
            slots: plan.slots().to_vec(),
        }
    }
}
