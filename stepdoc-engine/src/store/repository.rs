//! Step document repository
//!
//! The persistence boundary for step documents. Whatever shape is stored,
//! `load` hands back a canonical payload (migrate-on-read); `upsert` writes
//! the document against the `(project_id, step_number)` conflict key and
//! refreshes the project-level mirrors (`progress_rate`, `current_step`).
//!
//! The stored `progress` is supplied by the caller; the repository records
//! it without recomputing. A hardened deployment would re-derive it here
//! with the same calculator before writing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use stepdoc_common::db::models::Project;
use stepdoc_common::db::setting_i64;
use stepdoc_common::{Error, Result};
use tracing::warn;
use uuid::Uuid;

use crate::schema::migrate::Migrator;
use crate::schema::StepRegistry;

/// The JSON document embedded in `project_steps.step_data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepData {
    pub payload: Value,
    pub progress: u8,
    pub is_submitted: bool,
}

impl StepData {
    pub fn empty() -> Self {
        Self {
            payload: Value::Object(serde_json::Map::new()),
            progress: 0,
            is_submitted: false,
        }
    }
}

/// A loaded step document with its row timestamp
#[derive(Debug, Clone, Serialize)]
pub struct StepDocument {
    pub payload: Value,
    pub progress: u8,
    pub is_submitted: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StepRepository {
    pool: SqlitePool,
    registry: Arc<StepRegistry>,
    migrator: Migrator,
}

impl StepRepository {
    pub fn new(pool: SqlitePool, registry: Arc<StepRegistry>) -> Self {
        let migrator = Migrator::new(registry.clone());
        Self {
            pool,
            registry,
            migrator,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    /// Load a step document, canonicalizing the stored payload
    ///
    /// Returns `Ok(None)` when no row exists. An unparseable stored document
    /// degrades to an empty one rather than failing the read.
    pub async fn load(&self, project_id: &Uuid, step_number: i64) -> Result<Option<StepDocument>> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT step_data, updated_at FROM project_steps \
             WHERE project_id = ? AND step_number = ?",
        )
        .bind(project_id.to_string())
        .bind(step_number)
        .fetch_optional(&self.pool)
        .await?;

        let Some((step_data, updated_at)) = row else {
            return Ok(None);
        };

        let data = parse_step_data(&step_data, project_id, step_number);
        let payload = self.migrator.canonicalize(step_number, data.payload);

        Ok(Some(StepDocument {
            payload,
            progress: data.progress,
            is_submitted: data.is_submitted,
            updated_at,
        }))
    }

    /// Fetch the raw stored document inside a transaction (no migration)
    ///
    /// Used by write paths that need the current `is_submitted`/`progress`
    /// under the same transaction as their own write.
    pub async fn fetch_state_in(
        tx: &mut Transaction<'_, Sqlite>,
        project_id: &Uuid,
        step_number: i64,
    ) -> Result<Option<StepData>> {
        let step_data: Option<String> = sqlx::query_scalar(
            "SELECT step_data FROM project_steps WHERE project_id = ? AND step_number = ?",
        )
        .bind(project_id.to_string())
        .bind(step_number)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(step_data.map(|raw| parse_step_data(&raw, project_id, step_number)))
    }

    /// Create or overwrite the row for `(project_id, step_number)`
    pub async fn upsert_in(
        tx: &mut Transaction<'_, Sqlite>,
        project_id: &Uuid,
        step_number: i64,
        data: &StepData,
    ) -> Result<()> {
        let step_data =
            serde_json::to_string(data).map_err(|e| Error::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO project_steps (project_id, step_number, step_data, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(project_id, step_number) DO UPDATE SET \
                 step_data = excluded.step_data, \
                 updated_at = excluded.updated_at",
        )
        .bind(project_id.to_string())
        .bind(step_number)
        .bind(step_data)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Refresh the project's derived mirrors after a step write
    ///
    /// `progress_rate` is the mean of per-step progress across the whole
    /// sequence (unsaved steps count as zero); `current_step` is a
    /// high-water mark.
    pub async fn refresh_project_mirror_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        project_id: &Uuid,
        step_number: i64,
    ) -> Result<()> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(json_extract(step_data, '$.progress')), 0) \
             FROM project_steps WHERE project_id = ?",
        )
        .bind(project_id.to_string())
        .fetch_one(&mut **tx)
        .await?;

        let steps = self.registry.len().max(1) as f64;
        let progress_rate = (sum as f64 / steps).round() as i64;

        sqlx::query(
            "UPDATE projects SET \
                 progress_rate = ?, \
                 current_step = MAX(current_step, ?), \
                 updated_at = ? \
             WHERE guid = ?",
        )
        .bind(progress_rate)
        .bind(step_number)
        .bind(Utc::now())
        .bind(project_id.to_string())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Create a project and make sure its owner has a credit account
    pub async fn create_project(&self, owner_id: &str, title: &str) -> Result<Project> {
        let guid = Uuid::new_v4();
        let initial_balance = setting_i64(&self.pool, "initial_credit_balance", 10).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO projects (guid, owner_id, title) VALUES (?, ?, ?)")
            .bind(guid.to_string())
            .bind(owner_id)
            .bind(title)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO credit_accounts (owner_id, balance) VALUES (?, ?)")
            .bind(owner_id)
            .bind(initial_balance)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.project(&guid).await
    }

    pub async fn project(&self, project_id: &Uuid) -> Result<Project> {
        let project: Option<Project> = sqlx::query_as(
            "SELECT guid, owner_id, title, current_step, progress_rate, created_at, updated_at \
             FROM projects WHERE guid = ?",
        )
        .bind(project_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        project.ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
    }

    /// Whether the user may read/write this project's steps
    ///
    /// Owners always qualify; everyone else needs a membership row. Who gets
    /// a membership row is the identity provider's business, not ours.
    pub async fn is_member(&self, project_id: &Uuid, user_id: &str) -> Result<bool> {
        let allowed: bool = sqlx::query_scalar(
            "SELECT EXISTS( \
                 SELECT 1 FROM projects WHERE guid = ?1 AND owner_id = ?2 \
                 UNION \
                 SELECT 1 FROM project_members WHERE project_id = ?1 AND user_id = ?2 \
             )",
        )
        .bind(project_id.to_string())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(allowed)
    }

    pub async fn add_member(&self, project_id: &Uuid, user_id: &str, role: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO project_members (project_id, user_id, role) VALUES (?, ?, ?)",
        )
        .bind(project_id.to_string())
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Parse a stored step_data blob; degrade to an empty document when the
/// stored text is unreadable
fn parse_step_data(raw: &str, project_id: &Uuid, step_number: i64) -> StepData {
    match serde_json::from_str(raw) {
        Ok(data) => data,
        Err(e) => {
            warn!(
                "Unreadable step_data for project {} step {}: {}; treating as empty",
                project_id, step_number, e
            );
            StepData::empty()
        }
    }
}
