//! Credit gate
//!
//! Saving a step for the first time deducts a metered charge from the
//! project owner's credit balance. The charge happens at most once per
//! (project, step) key, ever, no matter how many sessions save concurrently:
//! the append-only charge row's composite primary key serializes racing
//! writers at the storage layer, which is the only place independent client
//! sessions share state.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use stepdoc_common::{Error, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a charge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// This call created the charge record and decremented the balance
    Charged,
    /// A charge record already existed; nothing was deducted
    AlreadyCharged,
}

impl ChargeOutcome {
    pub fn charged(&self) -> bool {
        matches!(self, ChargeOutcome::Charged)
    }
}

/// Idempotent, concurrency-safe one-time charge per (project, step)
#[derive(Clone)]
pub struct CreditGate {
    pool: SqlitePool,
}

impl CreditGate {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Charge the key in its own transaction
    pub async fn charge_once(&self, project_id: &Uuid, step_number: i64) -> Result<ChargeOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = Self::charge_in(&mut tx, project_id, step_number).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Charge the key inside a caller-owned transaction
    ///
    /// Save composes this with the document upsert so a failure in either
    /// rolls back both: no charge without a saved document, no partial
    /// writes. On `Err` the caller must drop the transaction (rollback).
    ///
    /// The insert runs before any read so a racing session blocks on the
    /// write lock instead of failing a stale-snapshot upgrade; the loser
    /// then observes the winner's row as a plain uniqueness violation.
    pub async fn charge_in(
        tx: &mut Transaction<'_, Sqlite>,
        project_id: &Uuid,
        step_number: i64,
    ) -> Result<ChargeOutcome> {
        // The insert is the serialization point: of two racing sessions,
        // exactly one row wins the primary key
        let inserted = sqlx::query(
            "INSERT INTO credit_charges (project_id, step_number, charged_at) VALUES (?, ?, ?)",
        )
        .bind(project_id.to_string())
        .bind(step_number)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(
                    "Charge for project {} step {} already recorded",
                    project_id, step_number
                );
                return Ok(ChargeOutcome::AlreadyCharged);
            }
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(Error::NotFound(format!("project {}", project_id)));
            }
            Err(e) => return Err(e.into()),
        }

        let cost: i64 = sqlx::query_scalar::<_, Option<String>>(
            "SELECT value FROM settings WHERE key = 'step_save_credit_cost'",
        )
        .fetch_optional(&mut **tx)
        .await?
        .flatten()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

        let owner_id: Option<String> =
            sqlx::query_scalar("SELECT owner_id FROM projects WHERE guid = ?")
                .bind(project_id.to_string())
                .fetch_optional(&mut **tx)
                .await?;

        // Rollback (via the dropped transaction) also removes the charge row
        let owner_id = owner_id
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;

        let updated = sqlx::query(
            "UPDATE credit_accounts SET balance = balance - ?, updated_at = ? \
             WHERE owner_id = ? AND balance >= ?",
        )
        .bind(cost)
        .bind(Utc::now())
        .bind(&owner_id)
        .bind(cost)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            let available: i64 = sqlx::query_scalar(
                "SELECT COALESCE((SELECT balance FROM credit_accounts WHERE owner_id = ?), 0)",
            )
            .bind(&owner_id)
            .fetch_one(&mut **tx)
            .await?;

            return Err(Error::InsufficientCredit {
                required: cost,
                available,
            });
        }

        info!(
            "Charged {} credit(s) for project {} step {}",
            cost, project_id, step_number
        );
        Ok(ChargeOutcome::Charged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepdoc_common::db::init_database;

    async fn setup() -> (SqlitePool, Uuid, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();

        let project_id = Uuid::new_v4();
        sqlx::query("INSERT INTO projects (guid, owner_id, title) VALUES (?, 'owner-1', 'T')")
            .bind(project_id.to_string())
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO credit_accounts (owner_id, balance) VALUES ('owner-1', 3)")
            .execute(&pool)
            .await
            .unwrap();

        (pool, project_id, dir)
    }

    async fn balance(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT balance FROM credit_accounts WHERE owner_id = 'owner-1'")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_charge_decrements_then_repeat_is_free() {
        let (pool, project_id, _dir) = setup().await;
        let gate = CreditGate::new(pool.clone());

        let first = gate.charge_once(&project_id, 8).await.unwrap();
        assert_eq!(first, ChargeOutcome::Charged);
        assert_eq!(balance(&pool).await, 2);

        let second = gate.charge_once(&project_id, 8).await.unwrap();
        assert_eq!(second, ChargeOutcome::AlreadyCharged);
        assert_eq!(balance(&pool).await, 2);
    }

    #[tokio::test]
    async fn distinct_steps_charge_separately() {
        let (pool, project_id, _dir) = setup().await;
        let gate = CreditGate::new(pool.clone());

        gate.charge_once(&project_id, 1).await.unwrap();
        gate.charge_once(&project_id, 2).await.unwrap();
        assert_eq!(balance(&pool).await, 1);
    }

    #[tokio::test]
    async fn insufficient_balance_leaves_no_charge_record() {
        let (pool, project_id, _dir) = setup().await;
        sqlx::query("UPDATE credit_accounts SET balance = 0 WHERE owner_id = 'owner-1'")
            .execute(&pool)
            .await
            .unwrap();

        let gate = CreditGate::new(pool.clone());
        let err = gate.charge_once(&project_id, 5).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientCredit { required: 1, available: 0 }
        ));

        // Rollback removed the charge row, so a refill can charge later
        let charges: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM credit_charges WHERE step_number = 5")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(charges, 0);
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let (pool, _project_id, _dir) = setup().await;
        let gate = CreditGate::new(pool);

        let err = gate.charge_once(&Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
