use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::utils::error::AppError;

pub const ACCOUNT_TYPE_ADMIN: &str = "admin";

/// Login account. Authentication happens upstream; this row carries the
/// profile the core reads plus the denormalized risk fields admin tooling
/// writes back.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub account_type: String,
    pub risk_score: i32,
    pub risk_reasons: Vec<String>,
    pub flagged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ACCOUNT_COLUMNS: &str = "id, name, email, phone, account_type, risk_score, risk_reasons, flagged, created_at, updated_at";

impl Account {
    pub fn is_admin(&self) -> bool {
        self.account_type == ACCOUNT_TYPE_ADMIN
    }

    pub async fn find<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<Account, AppError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Account '{}' was not found", id)))?;

        Ok(account)
    }

    /// Admin write-back of a risk assessment onto the account row. The risk
    /// engine itself never calls this.
    pub async fn write_risk_fields<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        risk_score: i32,
        risk_reasons: &[String],
        flagged: bool,
    ) -> Result<Account, AppError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts
             SET risk_score = $2, risk_reasons = $3, flagged = $4, updated_at = now()
             WHERE id = $1
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .bind(risk_score)
        .bind(risk_reasons)
        .bind(flagged)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Account '{}' was not found", id)))?;

        Ok(account)
    }
}
