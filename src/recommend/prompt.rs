use std::fmt::Write;

use super::types::RecommendationRequest;
use crate::nutrition::Macros;

pub const SUGGESTION_COUNT: usize = 3;

/// Natural-language prompt for one slot, ending in the response contract
/// [`super::parse::parse_recommendation`] expects.
pub fn build_prompt(req: &RecommendationRequest) -> String {
    let mut out = String::new();
    let meal = req.meal_type.to_lowercase();

    let _ = writeln!(
        out,
        "You are a nutrition assistant. Suggest {SUGGESTION_COUNT} {meal} options for today."
    );

    match &req.personal_info {
        Some(info) => {
            let _ = writeln!(
                out,
                "The user is {} years old, {:.0} kg, {:.0} cm, and wants to {}.",
                info.age_years,
                info.weight_kg,
                info.height_cm,
                info.goal.describe()
            );
            let _ = writeln!(out, "Daily targets: {}.", describe(req.targets));
            let _ = writeln!(out, "Already eaten today: {}.", describe(req.consumed));
            let _ = writeln!(out, "Remaining for the day: {}.", describe(req.remaining));
            let _ = writeln!(
                out,
                "{} meal slot(s) are still open; aim this {meal} at roughly {}.",
                req.open_slots,
                describe(req.slot_budget)
            );
        }
        None => {
            let _ = writeln!(
                out,
                "No personal targets are set. Suggest balanced, moderate portions for {meal}."
            );
            if !req.consumed.is_zero() {
                let _ = writeln!(out, "Already eaten today: {}.", describe(req.consumed));
            }
        }
    }

    out.push_str(
        "\nRespond with JSON only, no prose and no markdown, in exactly this shape:\n\
         {\"suggestions\": [{\"name\": string, \"calories\": number, \"protein\": number, \
         \"carbs\": number, \"fat\": number}], \"rationale\": string}\n\
         Calories are kcal for the whole portion; protein, carbs and fat are grams. \
         Use whole numbers.\n",
    );
    out
}

fn describe(m: Macros) -> String {
    let m = m.rounded();
    format!(
        "{} kcal, {}g protein, {}g carbs, {}g fat",
        m.calories, m.protein_g, m.carbs_g, m.fat_g
    )
}
