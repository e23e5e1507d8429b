//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub guid: String,
    pub owner_id: String,
    pub title: String,
    pub current_step: i64,
    pub progress_rate: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditAccount {
    pub owner_id: String,
    pub balance: i64,
}

/// Raw project_steps row; `step_data` holds the JSON step document
#[derive(Debug, Clone, FromRow)]
pub struct StepRow {
    pub project_id: String,
    pub step_number: i64,
    pub step_data: String,
    pub updated_at: DateTime<Utc>,
}
