//! Progress calculation
//!
//! Produces the 0–100 completion score for a canonical step payload. The
//! function is pure and depends only on the schema and the payload, so the
//! engine computes the same score for a document no matter which session
//! wrote it, and aggregate rollups reproduce what any editor showed locally.

use super::{SectionKind, SectionSpec, StepSchema};
use serde_json::Value;

/// Weighted completion score in [0, 100]
///
/// Each section contributes `min(filled/total * weight, weight)` where
/// `filled` counts non-empty field slots and `total` counts applicable
/// slots. Repeatable sections scale `total` with the collection's current
/// length; an empty collection contributes zero, never a division error.
/// Filling a previously-empty field can only raise the score.
pub fn score(schema: &StepSchema, payload: &Value) -> u8 {
    let total: f64 = schema
        .sections
        .iter()
        .map(|section| section_score(section, payload))
        .sum();

    total.min(100.0).round() as u8
}

fn section_score(section: &SectionSpec, payload: &Value) -> f64 {
    let weight = f64::from(section.weight);
    let value = payload.get(section.key);

    let (filled, total) = match section.kind {
        SectionKind::Fields { fields } => {
            let filled = fields
                .iter()
                .filter(|path| value.map(|v| slot_filled(v, path)).unwrap_or(false))
                .count();
            (filled, fields.len())
        }
        SectionKind::Repeatable { item_fields } => {
            let records = value.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
            let filled = records
                .iter()
                .map(|record| {
                    item_fields
                        .iter()
                        .filter(|path| slot_filled(record, path))
                        .count()
                })
                .sum();
            (filled, records.len() * item_fields.len())
        }
    };

    if total == 0 {
        return 0.0;
    }

    (filled as f64 / total as f64 * weight).min(weight)
}

/// Resolve a dotted path and decide whether the slot counts as filled:
/// non-empty string (a typed answer or a selected option), positive number,
/// true, or non-empty array.
fn slot_filled(root: &Value, dotted: &str) -> bool {
    let mut current = root;
    for part in dotted.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return false,
        }
    }

    match current {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v > 0.0).unwrap_or(false),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StepRegistry;
    use serde_json::json;

    fn registry() -> StepRegistry {
        StepRegistry::builtin()
    }

    #[test]
    fn empty_payload_scores_zero() {
        let registry = registry();
        for number in registry.step_numbers() {
            let schema = registry.get(number).unwrap();
            assert_eq!(score(schema, &json!({})), 0);
            assert_eq!(score(schema, &schema.default_payload()), 0);
        }
    }

    #[test]
    fn score_is_always_in_range() {
        let registry = registry();
        let schema = registry.get(3).unwrap();

        // Every slot filled across several records
        let persona = json!({
            "id": 1,
            "profile": { "name": "A", "age": 30, "occupation": "B", "quote": "C" },
            "behaviorPattern": { "habits": "D", "channels": "E", "painPoints": "F" },
            "behaviorScenario": { "context": "G", "narrative": "H" }
        });
        let payload = json!({
            "personas": [persona.clone(), persona.clone(), persona],
            "needs": { "coreNeeds": "x", "frustrations": "y", "motivations": "z" },
            "insights": { "summary": "s", "opportunities": ["o"] }
        });

        assert_eq!(score(schema, &payload), 100);
    }

    /// One persona record, 2 of its 9 slots filled, section weight 35:
    /// 2/9 * 35 ≈ 7.78, rounded to 8.
    #[test]
    fn partial_repeatable_record_rounds_to_nearest() {
        let registry = registry();
        let schema = registry.get(3).unwrap();

        let payload = json!({
            "personas": [{
                "id": 1,
                "profile": { "name": "Mina", "age": 34 },
                "behaviorPattern": {},
                "behaviorScenario": {}
            }]
        });

        assert_eq!(score(schema, &payload), 8);
    }

    #[test]
    fn empty_collection_scores_zero_not_error() {
        let registry = registry();
        let schema = registry.get(3).unwrap();

        let payload = json!({ "personas": [] });
        assert_eq!(score(schema, &payload), 0);
    }

    #[test]
    fn filling_a_field_never_lowers_the_score() {
        let registry = registry();
        let schema = registry.get(1).unwrap();

        let before = json!({
            "basics": { "title": "My project" }
        });
        let after = json!({
            "basics": { "title": "My project", "summary": "Now with a summary" }
        });

        assert!(score(schema, &after) >= score(schema, &before));
    }

    #[test]
    fn adding_an_empty_record_dilutes_but_adding_fields_recovers() {
        let registry = registry();
        let schema = registry.get(5).unwrap();

        let one_full = json!({
            "features": [{ "name": "A", "description": "B", "priority": 1 }]
        });
        let one_full_one_empty = json!({
            "features": [{ "name": "A", "description": "B", "priority": 1 }, {}]
        });

        // A new empty record lowers the ratio (more applicable slots),
        // which is record growth, not field filling
        assert!(score(schema, &one_full_one_empty) < score(schema, &one_full));

        // Filling slots inside the new record only raises it again
        let second_filled = json!({
            "features": [
                { "name": "A", "description": "B", "priority": 1 },
                { "name": "C" }
            ]
        });
        assert!(score(schema, &second_filled) > score(schema, &one_full_one_empty));
    }

    #[test]
    fn slot_kinds_follow_fill_rules() {
        let registry = registry();
        let schema = registry.get(1).unwrap();

        // Zero is not a positive number, empty array is not filled
        let unfilled = json!({
            "basics": { "title": "", "summary": null, "category": 0 },
            "goals": { "successCriteria": [] }
        });
        assert_eq!(score(schema, &unfilled), 0);

        // Positive number and non-empty array both count
        let filled = json!({
            "basics": { "category": 2 },
            "goals": { "successCriteria": ["ship it"] }
        });
        assert!(score(schema, &filled) > 0);
    }

    #[test]
    fn scores_match_across_invocations() {
        let registry = registry();
        let schema = registry.get(2).unwrap();
        let payload = json!({
            "market": { "targetMarket": "teams", "problem": "lost context" },
            "competitors": [{ "name": "X", "strengths": "fast" }]
        });

        let a = score(schema, &payload);
        let b = score(schema, &payload);
        assert_eq!(a, b);
        assert!(a > 0 && a <= 100);
    }
}
