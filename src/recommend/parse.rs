//! Turns model output into validated food records.
//!
//! The expected shape is the JSON object requested by the prompt. Providers
//! drift, so fenced blocks, surrounding prose, a bare array, common key
//! aliases and unit-suffixed numbers are accepted. If no JSON yields a record
//! the text is read line by line (`Name - 350 kcal, 20g protein, ...`).
//! Records that fail validation are dropped; if none survive the whole
//! response is a parse error carrying the raw text.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use super::types::AiError;
use crate::meals::model::FoodRecord;

const LIST_KEYS: [&str; 6] = ["suggestions", "recommendations", "foods", "items", "meals", "options"];
const RATIONALE_KEYS: [&str; 4] = ["rationale", "reason", "explanation", "notes"];
const NAME_KEYS: [&str; 4] = ["name", "food", "title", "dish"];
const CALORIE_KEYS: [&str; 4] = ["calories", "kcal", "energy", "caloriesKcal"];
const PROTEIN_KEYS: [&str; 3] = ["protein", "proteinG", "protein_g"];
const CARB_KEYS: [&str; 4] = ["carbs", "carbsG", "carbs_g", "carbohydrates"];
const FAT_KEYS: [&str; 4] = ["fat", "fatG", "fat_g", "fats"];

lazy_static! {
    static ref FENCE_RE: Regex = Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").unwrap();
    static ref LEADING_NUMBER_RE: Regex = Regex::new(r"^\s*(\d+(?:\.\d+)?)").unwrap();
    static ref LIST_MARKER_RE: Regex = Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s+").unwrap();
    static ref RATIONALE_RE: Regex = Regex::new(r"(?i)^\s*\**(?:rationale|reason|why)\**\s*:\s*(.+)$").unwrap();
    static ref CALORIES_RE: Regex = Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s*(?:kcal|calories|cals?)\b|\b(?:calories|kcal)\s*[:=]?\s*(\d+(?:\.\d+)?)"
    )
    .unwrap();
    static ref PROTEIN_RE: Regex = Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s*g?\s*(?:of\s+)?protein\b|\bprotein\s*[:=]?\s*(\d+(?:\.\d+)?)"
    )
    .unwrap();
    static ref CARBS_RE: Regex = Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s*g?\s*(?:of\s+)?carb(?:ohydrate)?s?\b|\bcarb(?:ohydrate)?s?\s*[:=]?\s*(\d+(?:\.\d+)?)"
    )
    .unwrap();
    static ref FAT_RE: Regex = Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s*g?\s*(?:of\s+)?fats?\b|\bfats?\s*[:=]?\s*(\d+(?:\.\d+)?)"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecommendation {
    pub candidates: Vec<FoodRecord>,
    pub rationale: Option<String>,
}

pub fn parse_recommendation(raw: &str) -> Result<ParsedRecommendation, AiError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AiError::parse("empty response", raw));
    }

    let mut saw_json = false;
    for candidate in json_candidates(text) {
        let Ok(value) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        saw_json = true;
        let parsed = from_json(&value);
        if !parsed.candidates.is_empty() {
            return Ok(parsed);
        }
    }

    let parsed = from_lines(text);
    if !parsed.candidates.is_empty() {
        return Ok(parsed);
    }

    let reason = if saw_json {
        "no valid food suggestions in response"
    } else {
        "response is not in the expected format"
    };
    Err(AiError::parse(reason, raw))
}

fn json_candidates(text: &str) -> Vec<&str> {
    let mut out: Vec<&str> = FENCE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .collect();
    out.push(text);
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                out.push(&text[start..=end]);
            }
        }
    }
    out
}

fn from_json(value: &Value) -> ParsedRecommendation {
    let (items, rationale): (Vec<&Value>, Option<String>) = match value {
        Value::Array(items) => (items.iter().collect(), None),
        Value::Object(map) => {
            let rationale = first_string(map, &RATIONALE_KEYS);
            let list = LIST_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array));
            match list {
                Some(items) => (items.iter().collect(), rationale),
                None => (vec![value], rationale),
            }
        }
        _ => (Vec::new(), None),
    };

    let candidates = items.into_iter().filter_map(food_from_json).collect();
    ParsedRecommendation { candidates, rationale }
}

fn food_from_json(value: &Value) -> Option<FoodRecord> {
    let map = value.as_object()?;
    let food = FoodRecord {
        name: first_string(map, &NAME_KEYS)?,
        calories: first_number(map, &CALORIE_KEYS)?,
        protein_g: first_number(map, &PROTEIN_KEYS)?,
        carbs_g: first_number(map, &CARB_KEYS)?,
        fat_g: first_number(map, &FAT_KEYS)?,
    }
    .normalized();
    keep_valid(food)
}

fn keep_valid(food: FoodRecord) -> Option<FoodRecord> {
    match food.validate() {
        Ok(()) => Some(food),
        Err(e) => {
            debug!(name = %food.name, error = %e, "dropping suggested food");
            None
        }
    }
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_number(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| map.get(*k).and_then(number_of))
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => LEADING_NUMBER_RE
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

fn from_lines(text: &str) -> ParsedRecommendation {
    let mut candidates = Vec::new();
    let mut rationale = None;

    for line in text.lines() {
        if let Some(c) = RATIONALE_RE.captures(line) {
            rationale = c.get(1).map(|m| m.as_str().trim().to_string());
            continue;
        }
        if let Some(food) = food_from_line(line) {
            candidates.push(food);
        }
    }
    ParsedRecommendation { candidates, rationale }
}

fn food_from_line(line: &str) -> Option<FoodRecord> {
    let line = LIST_MARKER_RE.replace(line, "");
    let split = [" - ", " – ", " — ", ":", "|", "("]
        .iter()
        .filter_map(|sep| line.find(sep))
        .min()?;
    let (name, rest) = line.split_at(split);
    let name = name.replace("**", "").trim_matches(|c: char| c == '*' || c.is_whitespace()).to_string();

    let food = FoodRecord {
        name,
        calories: amount(&CALORIES_RE, rest)?,
        protein_g: amount(&PROTEIN_RE, rest)?,
        carbs_g: amount(&CARBS_RE, rest)?,
        fat_g: amount(&FAT_RE, rest)?,
    };
    keep_valid(food)
}

fn amount(re: &Regex, text: &str) -> Option<f64> {
    let caps = re.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_expected_shape() {
        let raw = r#"{"suggestions":[
            {"name":"Grilled salmon with quinoa","calories":520,"protein":38,"carbs":45,"fat":18},
            {"name":"Tofu stir-fry","calories":430,"protein":24,"carbs":50,"fat":14}
        ],"rationale":"High protein to close the gap."}"#;
        let parsed = parse_recommendation(raw).expect("parsed");
        assert_eq!(parsed.candidates.len(), 2);
        assert_eq!(parsed.candidates[0].name, "Grilled salmon with quinoa");
        assert_eq!(parsed.candidates[1].protein_g, 24.0);
        assert_eq!(parsed.rationale.as_deref(), Some("High protein to close the gap."));
    }

    #[test]
    fn tolerates_fences_prose_and_units() {
        let raw = "Here you go!\n```json\n[{\"food\":\"Greek yogurt bowl\",\"kcal\":\"310 kcal\",\"proteinG\":\"22g\",\"carbs_g\":35,\"fat\":\"8 g\"}]\n```\nEnjoy.";
        let parsed = parse_recommendation(raw).expect("parsed");
        assert_eq!(parsed.candidates.len(), 1);
        let food = &parsed.candidates[0];
        assert_eq!(food.name, "Greek yogurt bowl");
        assert_eq!(food.calories, 310.0);
        assert_eq!(food.protein_g, 22.0);
        assert_eq!(food.fat_g, 8.0);
        assert_eq!(parsed.rationale, None);
    }

    #[test]
    fn accepts_single_object_with_prose_around() {
        let raw = "Sure. {\"name\":\"Banana\",\"calories\":105,\"protein\":1.3,\"carbs\":27,\"fat\":0.4} Hope it helps";
        let parsed = parse_recommendation(raw).expect("parsed");
        assert_eq!(parsed.candidates[0].name, "Banana");
    }

    #[test]
    fn drops_invalid_items_but_keeps_valid_ones() {
        let raw = r#"{"suggestions":[
            {"name":"","calories":100,"protein":1,"carbs":1,"fat":1},
            {"name":"Mystery","calories":-5,"protein":1,"carbs":1,"fat":1},
            {"name":"No macros","calories":200},
            {"name":"Apple","calories":95,"protein":0.5,"carbs":25,"fat":0.3}
        ]}"#;
        let parsed = parse_recommendation(raw).expect("parsed");
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].name, "Apple");
    }

    #[test]
    fn falls_back_to_line_format() {
        let raw = "1. **Chicken wrap** - 450 kcal, 32g protein, 40g carbs, 15g fat\n\
                   2. Lentil salad: calories 380, protein 20g, carbs 48g, fat 10g\n\
                   Rationale: both fit the remaining budget.";
        let parsed = parse_recommendation(raw).expect("parsed");
        assert_eq!(parsed.candidates.len(), 2);
        assert_eq!(parsed.candidates[0].name, "Chicken wrap");
        assert_eq!(parsed.candidates[0].calories, 450.0);
        assert_eq!(parsed.candidates[1].name, "Lentil salad");
        assert_eq!(parsed.candidates[1].fat_g, 10.0);
        assert_eq!(parsed.rationale.as_deref(), Some("both fit the remaining budget."));
    }

    #[test]
    fn empty_or_unreadable_is_parse_error_with_raw() {
        assert!(matches!(parse_recommendation("   "), Err(AiError::Parse { .. })));

        let raw = "I'm sorry, I can't help with that.";
        match parse_recommendation(raw) {
            Err(AiError::Parse { raw: kept, reason }) => {
                assert_eq!(kept, raw);
                assert_eq!(reason, "response is not in the expected format");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn valid_json_without_foods_is_parse_error() {
        let raw = r#"{"suggestions":[],"rationale":"nothing fits"}"#;
        match parse_recommendation(raw) {
            Err(AiError::Parse { reason, .. }) => {
                assert_eq!(reason, "no valid food suggestions in response");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
