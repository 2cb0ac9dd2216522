//! Biometric profile and daily target derivation.
//!
//! Targets follow the Mifflin-St Jeor equation for basal metabolic rate,
//! scaled by a fixed activity multiplier and a goal factor, then split
//! 30/40/30 across protein, carbohydrate and fat.

use serde::{Deserialize, Serialize};

const PROTEIN_SHARE: f64 = 0.30;
const CARBS_SHARE: f64 = 0.40;
const FAT_SHARE: f64 = 0.30;

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

/// Rejected input. Raised before any state mutation or storage write.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{0} must be a finite, non-negative number")]
    NotNonNegative(&'static str),
    #[error("{0} must not be blank")]
    Blank(&'static str),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    #[serde(alias = "very_active")]
    VeryActive,
}

impl ActivityLevel {
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::Light => 1.375,
            Self::Moderate => 1.55,
            Self::Active => 1.725,
            Self::VeryActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Goal {
    Lose,
    Maintain,
    Gain,
}

impl Goal {
    /// Factor applied to total daily energy expenditure.
    pub fn calorie_factor(self) -> f64 {
        match self {
            Self::Lose => 0.8,
            Self::Maintain => 1.0,
            Self::Gain => 1.15,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Lose => "lose weight",
            Self::Maintain => "maintain weight",
            Self::Gain => "gain weight",
        }
    }
}

/// Biometric profile. Replaced wholesale on edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    #[serde(alias = "age")]
    pub age_years: u32,
    #[serde(alias = "weight")]
    pub weight_kg: f64,
    #[serde(alias = "height")]
    pub height_cm: f64,
    #[serde(alias = "gender")]
    pub sex: Sex,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
}

impl PersonalInfo {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("ageYears", f64::from(self.age_years), 1.0, 120.0)?;
        check_positive_range("weightKg", self.weight_kg, 500.0)?;
        check_positive_range("heightCm", self.height_cm, 300.0)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ValidationError::OutOfRange { field, min, max, value });
    }
    Ok(())
}

// Lower bound is exclusive: zero weight or height is never a valid body.
fn check_positive_range(field: &'static str, value: f64, max: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 || value > max {
        return Err(ValidationError::OutOfRange { field, min: 0.0, max, value });
    }
    Ok(())
}

/// Calories plus the three macros, in kcal and grams.
///
/// Used for derived targets, consumed totals, and single food records alike.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Macros {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

/// Daily targets derived from a [`PersonalInfo`]. Never stored.
pub type NutritionTargets = Macros;

/// Sum of the food recorded in every filled slot.
pub type TotalNutrition = Macros;

impl Macros {
    pub const ZERO: Macros = Macros {
        calories: 0.0,
        protein_g: 0.0,
        carbs_g: 0.0,
        fat_g: 0.0,
    };

    pub fn add(self, other: Macros) -> Macros {
        Macros {
            calories: self.calories + other.calories,
            protein_g: self.protein_g + other.protein_g,
            carbs_g: self.carbs_g + other.carbs_g,
            fat_g: self.fat_g + other.fat_g,
        }
    }

    /// Budget left per field, clamped at zero once a target is exceeded.
    pub fn remaining_after(self, consumed: Macros) -> Macros {
        Macros {
            calories: (self.calories - consumed.calories).max(0.0),
            protein_g: (self.protein_g - consumed.protein_g).max(0.0),
            carbs_g: (self.carbs_g - consumed.carbs_g).max(0.0),
            fat_g: (self.fat_g - consumed.fat_g).max(0.0),
        }
    }

    /// Whole units for display.
    pub fn rounded(self) -> Macros {
        Macros {
            calories: self.calories.round(),
            protein_g: self.protein_g.round(),
            carbs_g: self.carbs_g.round(),
            fat_g: self.fat_g.round(),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Macros::ZERO
    }
}

/// Basal metabolic rate in kcal/day (Mifflin-St Jeor).
pub fn bmr(info: &PersonalInfo) -> f64 {
    let base = 10.0 * info.weight_kg + 6.25 * info.height_cm - 5.0 * f64::from(info.age_years);
    match info.sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    }
}

/// Total daily energy expenditure: BMR scaled by activity.
pub fn tdee(info: &PersonalInfo) -> f64 {
    bmr(info) * info.activity_level.multiplier()
}

/// Derive daily targets from a profile. Pure; the same input always yields
/// the same targets. Values keep full precision, see [`Macros::rounded`].
pub fn compute_targets(info: &PersonalInfo) -> NutritionTargets {
    // extreme but in-range inputs can push the female equation below zero
    let calories = (tdee(info) * info.goal.calorie_factor()).max(0.0);
    Macros {
        calories,
        protein_g: calories * PROTEIN_SHARE / KCAL_PER_G_PROTEIN,
        carbs_g: calories * CARBS_SHARE / KCAL_PER_G_CARBS,
        fat_g: calories * FAT_SHARE / KCAL_PER_G_FAT,
    }
}

/// Targets for an optional profile; all-zero ("unset") when absent.
pub fn targets_for(info: Option<&PersonalInfo>) -> NutritionTargets {
    info.map(compute_targets).unwrap_or(Macros::ZERO)
}

/// Percentage of `target` reached by `value`. A zero target means "unset"
/// and always yields 0.
pub fn percent_of(value: f64, target: f64) -> f64 {
    if target <= 0.0 || !target.is_finite() {
        return 0.0;
    }
    value / target * 100.0
}

/// [`percent_of`] capped at 100, for progress bars.
pub fn progress_percent(value: f64, target: f64) -> f64 {
    percent_of(value, target).min(100.0)
}

pub fn is_over_target(value: f64, target: f64) -> bool {
    target > 0.0 && value > target
}

/// Per-macro progress towards a set of targets.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MacroProgress {
    pub percent: f64,
    pub capped_percent: f64,
    pub over_target: bool,
}

impl MacroProgress {
    pub fn new(value: f64, target: f64) -> Self {
        Self {
            percent: percent_of(value, target),
            capped_percent: progress_percent(value, target),
            over_target: is_over_target(value, target),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NutritionProgress {
    pub calories: MacroProgress,
    pub protein: MacroProgress,
    pub carbs: MacroProgress,
    pub fat: MacroProgress,
}

impl NutritionProgress {
    pub fn between(consumed: Macros, targets: Macros) -> Self {
        Self {
            calories: MacroProgress::new(consumed.calories, targets.calories),
            protein: MacroProgress::new(consumed.protein_g, targets.protein_g),
            carbs: MacroProgress::new(consumed.carbs_g, targets.carbs_g),
            fat: MacroProgress::new(consumed.fat_g, targets.fat_g),
        }
    }
}
