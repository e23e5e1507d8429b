//! Step schema registry
//!
//! Every step in the product's fixed authoring sequence has a `StepSchema`
//! describing its canonical payload shape: named sections, section weights,
//! and the field slots the progress calculator counts. Payload shapes vary
//! by step number, so all step-specific behavior (migration lifts, scoring
//! weights, defaults) hangs off this registry instead of per-page branching.

pub mod migrate;
pub mod progress;

use serde_json::{json, Value};
use std::collections::BTreeMap;

/// How a section's field slots are counted
#[derive(Debug, Clone, Copy)]
pub enum SectionKind {
    /// A fixed set of field slots inside one section object
    Fields {
        /// Dotted paths relative to the section object
        fields: &'static [&'static str],
    },
    /// A repeatable collection: the section value is an array of records,
    /// each contributing the same per-record field slots. Slot count scales
    /// with the collection's current length; an empty collection has zero
    /// slots and scores zero.
    Repeatable {
        /// Dotted paths relative to each record
        item_fields: &'static [&'static str],
    },
}

/// One weighted section of a step's canonical payload
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    /// Top-level key of the section inside the canonical payload
    pub key: &'static str,
    /// Fixed weight; weights of a step's sections sum to 100
    pub weight: u32,
    pub kind: SectionKind,
}

/// Canonical shape description for one step
#[derive(Debug, Clone)]
pub struct StepSchema {
    /// 1-based position in the fixed sequence
    pub number: i64,
    /// Short machine name of the step
    pub name: &'static str,
    pub sections: Vec<SectionSpec>,
}

impl StepSchema {
    /// Default (empty) canonical payload for this step
    ///
    /// Used by the cross-step resolver when the source step does not exist
    /// yet: readers get the canonical shape with empty sections, never an
    /// error.
    pub fn default_payload(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for section in &self.sections {
            let empty = match section.kind {
                SectionKind::Fields { .. } => json!({}),
                SectionKind::Repeatable { .. } => json!([]),
            };
            obj.insert(section.key.to_string(), empty);
        }
        Value::Object(obj)
    }

    /// Whether any canonical section key is present in the payload
    pub fn has_canonical_marker(&self, payload: &serde_json::Map<String, Value>) -> bool {
        self.sections.iter().any(|s| payload.contains_key(s.key))
    }
}

/// Registry of all steps in the authoring sequence, keyed by step number
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: BTreeMap<i64, StepSchema>,
}

impl StepRegistry {
    /// The product's fixed nine-step authoring sequence
    pub fn builtin() -> Self {
        let steps = vec![
            StepSchema {
                number: 1,
                name: "overview",
                sections: vec![
                    SectionSpec {
                        key: "basics",
                        weight: 40,
                        kind: SectionKind::Fields {
                            fields: &["title", "summary", "category"],
                        },
                    },
                    SectionSpec {
                        key: "goals",
                        weight: 35,
                        kind: SectionKind::Fields {
                            fields: &["objective", "successCriteria", "constraints"],
                        },
                    },
                    SectionSpec {
                        key: "team",
                        weight: 25,
                        kind: SectionKind::Fields {
                            fields: &["members", "kickoff"],
                        },
                    },
                ],
            },
            StepSchema {
                number: 2,
                name: "research",
                sections: vec![
                    SectionSpec {
                        key: "market",
                        weight: 40,
                        kind: SectionKind::Fields {
                            fields: &["targetMarket", "problem", "evidence"],
                        },
                    },
                    SectionSpec {
                        key: "competitors",
                        weight: 60,
                        kind: SectionKind::Repeatable {
                            item_fields: &["name", "strengths", "weaknesses"],
                        },
                    },
                ],
            },
            StepSchema {
                number: 3,
                name: "personas",
                sections: vec![
                    SectionSpec {
                        key: "personas",
                        weight: 35,
                        kind: SectionKind::Repeatable {
                            item_fields: &[
                                "profile.name",
                                "profile.age",
                                "profile.occupation",
                                "profile.quote",
                                "behaviorPattern.habits",
                                "behaviorPattern.channels",
                                "behaviorPattern.painPoints",
                                "behaviorScenario.context",
                                "behaviorScenario.narrative",
                            ],
                        },
                    },
                    SectionSpec {
                        key: "needs",
                        weight: 35,
                        kind: SectionKind::Fields {
                            fields: &["coreNeeds", "frustrations", "motivations"],
                        },
                    },
                    SectionSpec {
                        key: "insights",
                        weight: 30,
                        kind: SectionKind::Fields {
                            fields: &["summary", "opportunities"],
                        },
                    },
                ],
            },
            StepSchema {
                number: 4,
                name: "journeys",
                sections: vec![
                    SectionSpec {
                        key: "journeys",
                        weight: 70,
                        kind: SectionKind::Repeatable {
                            item_fields: &["stage", "actions", "thoughts", "painPoints"],
                        },
                    },
                    SectionSpec {
                        key: "reflection",
                        weight: 30,
                        kind: SectionKind::Fields {
                            fields: &["summary", "keyMoments"],
                        },
                    },
                ],
            },
            StepSchema {
                number: 5,
                name: "requirements",
                sections: vec![
                    SectionSpec {
                        key: "features",
                        weight: 60,
                        kind: SectionKind::Repeatable {
                            item_fields: &["name", "description", "priority"],
                        },
                    },
                    SectionSpec {
                        key: "scope",
                        weight: 40,
                        kind: SectionKind::Fields {
                            fields: &["inScope", "outOfScope"],
                        },
                    },
                ],
            },
            StepSchema {
                number: 6,
                name: "outline",
                sections: vec![
                    SectionSpec {
                        key: "structure",
                        weight: 55,
                        kind: SectionKind::Fields {
                            fields: &["sections", "flow", "notes"],
                        },
                    },
                    SectionSpec {
                        key: "references",
                        weight: 45,
                        kind: SectionKind::Fields {
                            fields: &["sources", "assets"],
                        },
                    },
                ],
            },
            StepSchema {
                number: 7,
                name: "drafts",
                sections: vec![
                    SectionSpec {
                        key: "drafts",
                        weight: 80,
                        kind: SectionKind::Repeatable {
                            item_fields: &["title", "body", "status"],
                        },
                    },
                    SectionSpec {
                        key: "notes",
                        weight: 20,
                        kind: SectionKind::Fields {
                            fields: &["openIssues"],
                        },
                    },
                ],
            },
            StepSchema {
                number: 8,
                name: "review",
                sections: vec![
                    SectionSpec {
                        key: "feedback",
                        weight: 50,
                        kind: SectionKind::Repeatable {
                            item_fields: &["reviewer", "comments", "rating"],
                        },
                    },
                    SectionSpec {
                        key: "revisions",
                        weight: 50,
                        kind: SectionKind::Fields {
                            fields: &["changes", "resolution"],
                        },
                    },
                ],
            },
            StepSchema {
                number: 9,
                name: "launch",
                sections: vec![
                    SectionSpec {
                        key: "plan",
                        weight: 60,
                        kind: SectionKind::Fields {
                            fields: &["channels", "timeline", "ownersNotes"],
                        },
                    },
                    SectionSpec {
                        key: "checklist",
                        weight: 40,
                        kind: SectionKind::Fields {
                            fields: &["items", "signoff"],
                        },
                    },
                ],
            },
        ];

        let steps = steps.into_iter().map(|s| (s.number, s)).collect();
        Self { steps }
    }

    pub fn get(&self, step_number: i64) -> Option<&StepSchema> {
        self.steps.get(&step_number)
    }

    /// Number of steps in the sequence
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All step numbers, in sequence order
    pub fn step_numbers(&self) -> impl Iterator<Item = i64> + '_ {
        self.steps.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_weights_sum_to_100_for_every_step() {
        let registry = StepRegistry::builtin();
        for number in registry.step_numbers() {
            let schema = registry.get(number).unwrap();
            let total: u32 = schema.sections.iter().map(|s| s.weight).sum();
            assert_eq!(total, 100, "step {} weights sum to {}", number, total);
        }
    }

    #[test]
    fn registry_covers_contiguous_sequence() {
        let registry = StepRegistry::builtin();
        let numbers: Vec<i64> = registry.step_numbers().collect();
        assert_eq!(numbers, (1..=9).collect::<Vec<i64>>());
    }

    #[test]
    fn default_payload_has_all_section_keys() {
        let registry = StepRegistry::builtin();
        let schema = registry.get(3).unwrap();
        let payload = schema.default_payload();
        let obj = payload.as_object().unwrap();

        assert!(obj["personas"].is_array());
        assert!(obj["needs"].is_object());
        assert!(obj["insights"].is_object());
    }

    #[test]
    fn canonical_marker_detection() {
        let registry = StepRegistry::builtin();
        let schema = registry.get(3).unwrap();

        let canonical = json!({ "personas": [] });
        assert!(schema.has_canonical_marker(canonical.as_object().unwrap()));

        let legacy = json!({ "profile": {}, "behaviorPattern": {} });
        assert!(!schema.has_canonical_marker(legacy.as_object().unwrap()));
    }
}
