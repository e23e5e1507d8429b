//! Cross-step reference resolver
//!
//! Later steps pre-populate or annotate their forms from earlier steps'
//! documents (personas feed journeys, features feed drafts). The resolver is
//! strictly read-only and tolerant: a source step that hasn't been saved yet
//! resolves to the schema's default payload, never an error.

use serde_json::Value;
use std::sync::Arc;
use stepdoc_common::{Error, Result};
use uuid::Uuid;

use super::repository::StepRepository;
use crate::schema::StepRegistry;

#[derive(Clone)]
pub struct CrossStepResolver {
    repo: StepRepository,
    registry: Arc<StepRegistry>,
}

impl CrossStepResolver {
    pub fn new(repo: StepRepository) -> Self {
        let registry = repo.registry().clone();
        Self { repo, registry }
    }

    /// Read an earlier step's canonical payload, or its defaults when the
    /// step has no document yet
    pub async fn read_step(&self, project_id: &Uuid, source_step_number: i64) -> Result<Value> {
        let schema = self
            .registry
            .get(source_step_number)
            .ok_or_else(|| Error::Validation(format!("unknown step {}", source_step_number)))?;

        match self.repo.load(project_id, source_step_number).await? {
            Some(document) => Ok(document.payload),
            None => Ok(schema.default_payload()),
        }
    }
}
