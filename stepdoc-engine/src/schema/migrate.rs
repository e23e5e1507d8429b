//! Schema migration for stored step payloads
//!
//! Step documents written by older clients can carry legacy shapes. The
//! migrator normalizes whatever is stored into the step's canonical shape on
//! read and before every write, so the progress calculator and every editor
//! see one shape per step.
//!
//! Migration is idempotent: canonicalizing an already-canonical payload is a
//! pass-through. A payload matching no known legacy or canonical shape is
//! never an error; it passes through and downstream code treats its fields
//! as empty.

use super::{StepRegistry, StepSchema};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Top-level key where lifted values with no canonical destination are kept
pub const ADDITIONAL_BUCKET: &str = "additional";

type LiftMatch = fn(&Map<String, Value>) -> bool;
type LiftApply = fn(&StepSchema, Map<String, Value>) -> Map<String, Value>;

/// One recognized legacy shape and its lift into the canonical shape
struct LegacyLift {
    matches: LiftMatch,
    apply: LiftApply,
}

/// Lift table, extensible per step as historical shapes surface
fn lifts_for(step_number: i64) -> &'static [LegacyLift] {
    match step_number {
        // Personas were originally a single nested record instead of an
        // array of records
        3 => &[LegacyLift {
            matches: singular_persona_marker,
            apply: lift_singular_persona,
        }],
        _ => &[],
    }
}

fn singular_persona_marker(obj: &Map<String, Value>) -> bool {
    !obj.contains_key("personas")
        && (obj.contains_key("profile") || obj.contains_key("behaviorPattern"))
}

/// `{profile, behaviorPattern, ...}` becomes
/// `{personas: [{id: 1, profile, behaviorPattern, behaviorScenario}], ...}`
fn lift_singular_persona(schema: &StepSchema, mut obj: Map<String, Value>) -> Map<String, Value> {
    let profile = obj.remove("profile").unwrap_or_else(|| json!({}));
    let behavior_pattern = obj.remove("behaviorPattern").unwrap_or_else(|| json!({}));
    let behavior_scenario = obj.remove("behaviorScenario").unwrap_or_else(|| json!({}));

    let record = json!({
        "id": 1,
        "profile": profile,
        "behaviorPattern": behavior_pattern,
        "behaviorScenario": behavior_scenario,
    });

    let mut out = Map::new();
    out.insert("personas".to_string(), json!([record]));
    retain_leftovers(schema, obj, &mut out);
    out
}

/// Keep leftover keys: canonical section keys move straight over, anything
/// else that still holds a non-empty value lands in the default bucket
/// instead of being dropped.
fn retain_leftovers(schema: &StepSchema, leftovers: Map<String, Value>, out: &mut Map<String, Value>) {
    let mut bucket = match out.remove(ADDITIONAL_BUCKET) {
        Some(Value::Object(existing)) => existing,
        _ => Map::new(),
    };

    for (key, value) in leftovers {
        if schema.sections.iter().any(|s| s.key == key) || key == ADDITIONAL_BUCKET {
            if key == ADDITIONAL_BUCKET {
                if let Value::Object(nested) = value {
                    bucket.extend(nested);
                    continue;
                }
            }
            out.insert(key, value);
        } else if !is_empty_value(&value) {
            bucket.insert(key, value);
        }
    }

    if !bucket.is_empty() {
        out.insert(ADDITIONAL_BUCKET.to_string(), Value::Object(bucket));
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Normalizes raw step payloads into the canonical shape
#[derive(Clone)]
pub struct Migrator {
    registry: Arc<StepRegistry>,
}

impl Migrator {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self { registry }
    }

    /// Canonicalize a raw payload for the given step
    ///
    /// Null becomes an empty document. A non-object payload is treated as
    /// unreadable and degrades to an empty document (logged, never fatal).
    pub fn canonicalize(&self, step_number: i64, raw: Value) -> Value {
        let schema = match self.registry.get(step_number) {
            Some(schema) => schema,
            None => return raw,
        };

        let obj = match raw {
            Value::Null => return Value::Object(Map::new()),
            Value::Object(obj) => obj,
            other => {
                warn!(
                    "Step {} payload is not an object ({}); treating fields as empty",
                    step_number,
                    type_name(&other)
                );
                return Value::Object(Map::new());
            }
        };

        for lift in lifts_for(step_number) {
            if (lift.matches)(&obj) {
                return Value::Object((lift.apply)(schema, obj));
            }
        }

        if !obj.is_empty() && !schema.has_canonical_marker(&obj) {
            // No known legacy shape and no canonical key: ambiguous. The
            // fields simply won't count toward progress until a lift for
            // this shape is added to the table.
            warn!(
                "Step {} payload matches no known shape; fields will score as empty",
                step_number
            );
        }

        Value::Object(obj)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
