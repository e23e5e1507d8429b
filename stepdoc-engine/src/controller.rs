//! Step document controller
//!
//! One parameterized controller for every step in the sequence: pages are
//! thin views over this, not per-page copies of the save/submit plumbing.
//! A save runs membership check → canonicalize → score → charge gate →
//! upsert → project mirror refresh in a single transaction, then fans the
//! change notification out; nothing is persisted if any part fails.

use serde_json::Value;
use std::sync::Arc;
use stepdoc_common::events::{EventBus, StepEvent, StepEventKind};
use stepdoc_common::{Error, Result};
use uuid::Uuid;

use crate::schema::migrate::Migrator;
use crate::schema::{progress, StepRegistry, StepSchema};
use crate::store::{ChargeOutcome, CreditGate, CrossStepResolver, StepData, StepDocument, StepRepository};
use crate::submission::{Acknowledgement, SubmissionState};

/// Outcome of a successful save
#[derive(Debug, Clone)]
pub struct SaveResult {
    pub document: StepDocument,
    pub charge: ChargeOutcome,
}

#[derive(Clone)]
pub struct StepController {
    repo: StepRepository,
    resolver: CrossStepResolver,
    migrator: Migrator,
    registry: Arc<StepRegistry>,
    bus: Arc<EventBus>,
}

impl StepController {
    pub fn new(repo: StepRepository, bus: Arc<EventBus>) -> Self {
        let registry = repo.registry().clone();
        Self {
            resolver: CrossStepResolver::new(repo.clone()),
            migrator: Migrator::new(registry.clone()),
            registry,
            repo,
            bus,
        }
    }

    pub fn repository(&self) -> &StepRepository {
        &self.repo
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn schema(&self, step_number: i64) -> Result<&StepSchema> {
        self.registry
            .get(step_number)
            .ok_or_else(|| Error::Validation(format!("unknown step {}", step_number)))
    }

    /// Verify identifiers and project membership before touching documents
    async fn authorize(&self, project_id: &Uuid, user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(Error::Validation("missing user id".to_string()));
        }

        // Distinguish a missing project from a membership refusal
        self.repo.project(project_id).await?;

        if self.repo.is_member(project_id, user_id).await? {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "user {} is not a member of project {}",
                user_id, project_id
            )))
        }
    }

    pub async fn create_project(&self, owner_id: &str, title: &str) -> Result<stepdoc_common::db::models::Project> {
        if owner_id.trim().is_empty() {
            return Err(Error::Validation("missing owner id".to_string()));
        }
        if title.trim().is_empty() {
            return Err(Error::Validation("missing project title".to_string()));
        }

        self.repo.create_project(owner_id, title).await
    }

    pub async fn get_project(&self, project_id: &Uuid, user_id: &str) -> Result<stepdoc_common::db::models::Project> {
        self.authorize(project_id, user_id).await?;
        self.repo.project(project_id).await
    }

    /// Load a step document (canonical payload), or `None` if never saved
    pub async fn load_step(
        &self,
        project_id: &Uuid,
        step_number: i64,
        user_id: &str,
    ) -> Result<Option<StepDocument>> {
        self.schema(step_number)?;
        self.authorize(project_id, user_id).await?;
        self.repo.load(project_id, step_number).await
    }

    /// Save a draft payload
    ///
    /// Canonicalizes and scores the payload, charges the one-time credit for
    /// this (project, step) key if it was never charged, and writes the
    /// document — all in one transaction. A submitted step rejects the save.
    pub async fn save_step(
        &self,
        project_id: &Uuid,
        step_number: i64,
        user_id: &str,
        raw_payload: Value,
    ) -> Result<SaveResult> {
        let schema = self.schema(step_number)?;
        self.authorize(project_id, user_id).await?;

        let payload = self.migrator.canonicalize(step_number, raw_payload);
        let progress = progress::score(schema, &payload);

        let mut tx = self.repo.pool().begin().await?;

        if let Some(existing) = StepRepository::fetch_state_in(&mut tx, project_id, step_number).await? {
            let state = SubmissionState::from_flag(existing.is_submitted);
            if !state.can_edit() {
                return Err(Error::Conflict(format!(
                    "step {} is submitted and read-only",
                    step_number
                )));
            }
        }

        let charge = CreditGate::charge_in(&mut tx, project_id, step_number).await?;

        let data = StepData {
            payload,
            progress,
            is_submitted: false,
        };
        StepRepository::upsert_in(&mut tx, project_id, step_number, &data).await?;
        self.repo
            .refresh_project_mirror_in(&mut tx, project_id, step_number)
            .await?;

        tx.commit().await?;

        self.bus.emit_lossy(StepEvent {
            project_id: *project_id,
            step_number,
            kind: StepEventKind::Saved,
        });

        let document = self
            .repo
            .load(project_id, step_number)
            .await?
            .ok_or_else(|| Error::Internal("saved step vanished".to_string()))?;

        Ok(SaveResult { document, charge })
    }

    /// Submit the step: recompute progress at this moment, then freeze
    pub async fn submit_step(
        &self,
        project_id: &Uuid,
        step_number: i64,
        user_id: &str,
        ack: Acknowledgement,
    ) -> Result<StepDocument> {
        ack.ensure_confirmed("submit")?;
        let schema = self.schema(step_number)?;
        self.authorize(project_id, user_id).await?;

        let mut tx = self.repo.pool().begin().await?;

        let existing = StepRepository::fetch_state_in(&mut tx, project_id, step_number)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("step {} has not been saved yet", step_number))
            })?;

        let state = SubmissionState::from_flag(existing.is_submitted);
        let next = state.submit(step_number)?;

        let payload = self.migrator.canonicalize(step_number, existing.payload);
        let progress = progress::score(schema, &payload);

        let data = StepData {
            payload,
            progress,
            is_submitted: next.is_submitted(),
        };
        StepRepository::upsert_in(&mut tx, project_id, step_number, &data).await?;
        self.repo
            .refresh_project_mirror_in(&mut tx, project_id, step_number)
            .await?;

        tx.commit().await?;

        self.bus.emit_lossy(StepEvent {
            project_id: *project_id,
            step_number,
            kind: StepEventKind::Submitted,
        });

        self.repo
            .load(project_id, step_number)
            .await?
            .ok_or_else(|| Error::Internal("submitted step vanished".to_string()))
    }

    /// Withdraw the submission: the document becomes editable again, and the
    /// progress recorded at submission stays as it was
    pub async fn withdraw_step(
        &self,
        project_id: &Uuid,
        step_number: i64,
        user_id: &str,
        ack: Acknowledgement,
    ) -> Result<StepDocument> {
        ack.ensure_confirmed("withdraw")?;
        self.schema(step_number)?;
        self.authorize(project_id, user_id).await?;

        let mut tx = self.repo.pool().begin().await?;

        let existing = StepRepository::fetch_state_in(&mut tx, project_id, step_number)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("step {} has not been saved yet", step_number))
            })?;

        let state = SubmissionState::from_flag(existing.is_submitted);
        let next = state.withdraw(step_number)?;

        let data = StepData {
            payload: existing.payload,
            progress: existing.progress,
            is_submitted: next.is_submitted(),
        };
        StepRepository::upsert_in(&mut tx, project_id, step_number, &data).await?;
        self.repo
            .refresh_project_mirror_in(&mut tx, project_id, step_number)
            .await?;

        tx.commit().await?;

        self.bus.emit_lossy(StepEvent {
            project_id: *project_id,
            step_number,
            kind: StepEventKind::Withdrawn,
        });

        self.repo
            .load(project_id, step_number)
            .await?
            .ok_or_else(|| Error::Internal("withdrawn step vanished".to_string()))
    }

    /// Read-only lookup of an earlier step's canonical payload
    pub async fn read_reference(
        &self,
        project_id: &Uuid,
        source_step_number: i64,
        user_id: &str,
    ) -> Result<Value> {
        self.authorize(project_id, user_id).await?;
        self.resolver.read_step(project_id, source_step_number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepdoc_common::db::init_database;

    async fn setup() -> (StepController, Uuid, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();
        let repo = StepRepository::new(pool, Arc::new(StepRegistry::builtin()));
        let bus = Arc::new(EventBus::new(64));
        let controller = StepController::new(repo, bus);
        let project = controller.create_project("owner-1", "Test project").await.unwrap();
        let project_id = Uuid::parse_str(&project.guid).unwrap();
        (controller, project_id, dir)
    }

    fn confirmed() -> Acknowledgement {
        Acknowledgement { confirm: true }
    }

    #[tokio::test]
    async fn save_charges_once_then_saves_free() {
        let (controller, project_id, _dir) = setup().await;

        let first = controller
            .save_step(&project_id, 1, "owner-1", json!({ "basics": { "title": "A" } }))
            .await
            .unwrap();
        assert_eq!(first.charge, ChargeOutcome::Charged);

        let second = controller
            .save_step(&project_id, 1, "owner-1", json!({ "basics": { "title": "B" } }))
            .await
            .unwrap();
        assert_eq!(second.charge, ChargeOutcome::AlreadyCharged);
        assert_eq!(second.document.payload["basics"]["title"], "B");
    }

    #[tokio::test]
    async fn save_scores_the_canonical_payload() {
        let (controller, project_id, _dir) = setup().await;

        // Legacy persona shape: canonicalized before scoring, so the two
        // filled profile slots count (2/9 of weight 35, rounded)
        let result = controller
            .save_step(
                &project_id,
                3,
                "owner-1",
                json!({ "profile": { "name": "Mina", "age": 34 } }),
            )
            .await
            .unwrap();

        assert_eq!(result.document.progress, 8);
        assert_eq!(result.document.payload["personas"][0]["profile"]["name"], "Mina");
    }

    #[tokio::test]
    async fn non_member_cannot_save() {
        let (controller, project_id, _dir) = setup().await;

        let err = controller
            .save_step(&project_id, 1, "stranger", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Permission(_)));
    }

    #[tokio::test]
    async fn submitted_step_rejects_saves_until_withdrawn() {
        let (controller, project_id, _dir) = setup().await;

        controller
            .save_step(&project_id, 1, "owner-1", json!({ "basics": { "title": "A" } }))
            .await
            .unwrap();
        controller
            .submit_step(&project_id, 1, "owner-1", confirmed())
            .await
            .unwrap();

        let err = controller
            .save_step(&project_id, 1, "owner-1", json!({ "basics": { "title": "B" } }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        controller
            .withdraw_step(&project_id, 1, "owner-1", confirmed())
            .await
            .unwrap();
        controller
            .save_step(&project_id, 1, "owner-1", json!({ "basics": { "title": "B" } }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn submit_requires_confirmation() {
        let (controller, project_id, _dir) = setup().await;

        controller
            .save_step(&project_id, 1, "owner-1", json!({}))
            .await
            .unwrap();

        let err = controller
            .submit_step(&project_id, 1, "owner-1", Acknowledgement::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn progress_reflects_the_final_submit_not_the_first() {
        let (controller, project_id, _dir) = setup().await;

        controller
            .save_step(&project_id, 1, "owner-1", json!({ "basics": { "title": "A" } }))
            .await
            .unwrap();
        let first = controller
            .submit_step(&project_id, 1, "owner-1", confirmed())
            .await
            .unwrap();

        controller
            .withdraw_step(&project_id, 1, "owner-1", confirmed())
            .await
            .unwrap();

        // Withdraw alone never changes progress
        let after_withdraw = controller
            .load_step(&project_id, 1, "owner-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after_withdraw.progress, first.progress);
        assert!(!after_withdraw.is_submitted);

        // More fields, then re-submit: progress recomputed at this moment
        controller
            .save_step(
                &project_id,
                1,
                "owner-1",
                json!({ "basics": { "title": "A", "summary": "B", "category": "tool" } }),
            )
            .await
            .unwrap();
        let second = controller
            .submit_step(&project_id, 1, "owner-1", confirmed())
            .await
            .unwrap();

        assert!(second.is_submitted);
        assert!(second.progress > first.progress);
    }

    #[tokio::test]
    async fn insufficient_credit_aborts_whole_save() {
        let (controller, project_id, _dir) = setup().await;

        sqlx::query("UPDATE credit_accounts SET balance = 0 WHERE owner_id = 'owner-1'")
            .execute(controller.repository().pool())
            .await
            .unwrap();

        let err = controller
            .save_step(&project_id, 2, "owner-1", json!({ "market": { "problem": "x" } }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientCredit { .. }));

        // Neither document nor charge was persisted
        assert!(controller
            .load_step(&project_id, 2, "owner-1")
            .await
            .unwrap()
            .is_none());
        let charges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credit_charges")
            .fetch_one(controller.repository().pool())
            .await
            .unwrap();
        assert_eq!(charges, 0);
    }

    #[tokio::test]
    async fn save_emits_change_notification() {
        let (controller, project_id, _dir) = setup().await;
        let mut rx = controller.bus().subscribe();

        controller
            .save_step(&project_id, 1, "owner-1", json!({}))
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.project_id, project_id);
        assert_eq!(event.step_number, 1);
        assert_eq!(event.kind, StepEventKind::Saved);
    }

    #[tokio::test]
    async fn reference_reads_earlier_step_or_defaults() {
        let (controller, project_id, _dir) = setup().await;

        // Not saved yet: defaults
        let defaults = controller
            .read_reference(&project_id, 3, "owner-1")
            .await
            .unwrap();
        assert!(defaults["personas"].as_array().unwrap().is_empty());

        controller
            .save_step(
                &project_id,
                3,
                "owner-1",
                json!({ "personas": [{ "id": 1, "profile": { "name": "Mina" } }] }),
            )
            .await
            .unwrap();

        let resolved = controller
            .read_reference(&project_id, 3, "owner-1")
            .await
            .unwrap();
        assert_eq!(resolved["personas"][0]["profile"]["name"], "Mina");
    }

    #[tokio::test]
    async fn unknown_step_is_a_validation_error() {
        let (controller, project_id, _dir) = setup().await;
        let err = controller
            .save_step(&project_id, 99, "owner-1", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
