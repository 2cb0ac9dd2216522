use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use tracing::warn;

use crate::nutrition::{Macros, TotalNutrition, ValidationError};

/// A consumed (or suggested) food item. User-entered or AI-suggested;
/// never resolved against a nutrition database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoodRecord {
    pub name: String,
    pub calories: f64,
    #[serde(alias = "protein")]
    pub protein_g: f64,
    #[serde(alias = "carbs")]
    pub carbs_g: f64,
    #[serde(alias = "fat")]
    pub fat_g: f64,
}

impl FoodRecord {
    pub fn new(name: impl Into<String>, macros: Macros) -> Self {
        Self {
            name: name.into(),
            calories: macros.calories,
            protein_g: macros.protein_g,
            carbs_g: macros.carbs_g,
            fat_g: macros.fat_g,
        }
    }

    pub fn macros(&self) -> Macros {
        Macros {
            calories: self.calories,
            protein_g: self.protein_g,
            carbs_g: self.carbs_g,
            fat_g: self.fat_g,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Blank("name"));
        }
        let fields = [
            ("calories", self.calories),
            ("proteinG", self.protein_g),
            ("carbsG", self.carbs_g),
            ("fatG", self.fat_g),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::NotNonNegative(field));
            }
        }
        Ok(())
    }

    /// Trimmed copy, ready to store.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown meal slot: {0}")]
pub struct UnknownSlot(pub String);

/// Identity of a slot in the daily plan. The order of [`SlotId::ALL`] is the
/// plan order and never changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlotId {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl SlotId {
    pub const ALL: [SlotId; 4] = [SlotId::Breakfast, SlotId::Lunch, SlotId::Dinner, SlotId::Snack];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Breakfast => "Breakfast",
            Self::Lunch => "Lunch",
            Self::Dinner => "Dinner",
            Self::Snack => "Snack",
        }
    }

    pub fn time_label(self) -> &'static str {
        match self {
            Self::Breakfast => "8:00 AM",
            Self::Lunch => "12:30 PM",
            Self::Dinner => "7:00 PM",
            Self::Snack => "3:30 PM",
        }
    }

    fn position(self) -> usize {
        match self {
            Self::Breakfast => 0,
            Self::Lunch => 1,
            Self::Dinner => 2,
            Self::Snack => 3,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotId {
    type Err = UnknownSlot;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            "snack" | "snacks" => Ok(Self::Snack),
            _ => Err(UnknownSlot(s.to_string())),
        }
    }
}

/// One position in the daily plan. Only `food` ever changes.
#[derive(Debug, Clone, PartialEq)]
pub struct MealSlot {
    pub id: SlotId,
    pub title: String,
    pub time_label: String,
    pub food: Option<FoodRecord>,
}

impl MealSlot {
    pub fn empty(id: SlotId) -> Self {
        Self {
            id,
            title: id.title().to_string(),
            time_label: id.time_label().to_string(),
            food: None,
        }
    }

    pub fn has_food(&self) -> bool {
        self.food.is_some()
    }
}

// hasFood is derived from `food` and only ever written out, never read back
impl Serialize for MealSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("MealSlot", 5)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("title", &self.title)?;
        s.serialize_field("timeLabel", &self.time_label)?;
        s.serialize_field("food", &self.food)?;
        s.serialize_field("hasFood", &self.has_food())?;
        s.end()
    }
}

/// The single active daily plan: exactly one slot per [`SlotId`], in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "Vec<StoredSlot>", into = "Vec<MealSlot>")]
pub struct MealPlan {
    slots: Vec<MealSlot>,
}

/// A slot as found on disk. Kept loose so one bad entry (an id from another
/// version, a food missing a field) cannot make the rest of the plan unreadable.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredSlot {
    pub id: String,
    #[serde(default)]
    pub food: Option<serde_json::Value>,
}

impl Default for MealPlan {
    fn default() -> Self {
        Self {
            slots: SlotId::ALL.into_iter().map(MealSlot::empty).collect(),
        }
    }
}

impl From<Vec<StoredSlot>> for MealPlan {
    fn from(stored: Vec<StoredSlot>) -> Self {
        Self::from_stored(stored)
    }
}

impl From<MealPlan> for Vec<MealSlot> {
    fn from(plan: MealPlan) -> Self {
        plan.slots
    }
}

impl MealPlan {
    /// Rebuild the fixed layout from whatever was persisted. Titles and time
    /// labels are canonical; only food survives. Unknown ids and unreadable or
    /// invalid food are dropped. A later duplicate of a slot id wins, matching
    /// last-write semantics of the stored array.
    pub fn from_stored(stored: Vec<StoredSlot>) -> Self {
        let mut plan = Self::default();
        for slot in stored {
            let id = match slot.id.parse::<SlotId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "dropping stored slot");
                    continue;
                }
            };
            let food = slot.food.filter(|v| !v.is_null()).and_then(|value| {
                match serde_json::from_value::<FoodRecord>(value) {
                    Ok(food) if food.validate().is_ok() => Some(food.normalized()),
                    Ok(food) => {
                        warn!(slot = %id, name = %food.name, "dropping invalid stored food");
                        None
                    }
                    Err(e) => {
                        warn!(slot = %id, error = %e, "dropping unreadable stored food");
                        None
                    }
                }
            });
            plan.slot_mut(id).food = food;
        }
        plan
    }

    pub fn slots(&self) -> &[MealSlot] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> &MealSlot {
        &self.slots[id.position()]
    }

    pub fn slot_mut(&mut self, id: SlotId) -> &mut MealSlot {
        &mut self.slots[id.position()]
    }

    /// Σ of food over filled slots. Recomputed on every call.
    pub fn total_nutrition(&self) -> TotalNutrition {
        self.slots
            .iter()
            .filter_map(|s| s.food.as_ref())
            .fold(Macros::ZERO, |acc, f| acc.add(f.macros()))
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.has_food()).count()
    }

    pub fn has_any_food(&self) -> bool {
        self.filled_count() > 0
    }

    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            slot.food = None;
        }
    }
}
