use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::utils::error::AppError;

pub const EVENT_AUTH_OTP_REQUESTED: &str = "auth_otp_requested";
pub const EVENT_IDENTITY_OTP_REQUESTED: &str = "identity_otp_requested";
pub const EVENT_IDENTITY_VERIFIED: &str = "identity_verified";
pub const EVENT_PURCHASE_COMPLETED: &str = "purchase_completed";
pub const EVENT_FULFILLMENT_ANOMALY: &str = "fulfillment_anomaly";

/// Append-only audit trail of sensitive actions. Input to the risk engine;
/// never mutated or deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub email: Option<String>,
    pub event_type: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

pub struct NewSecurityEvent<'a> {
    pub account_id: Option<Uuid>,
    pub email: Option<&'a str>,
    pub event_type: &'a str,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub metadata: Option<Value>,
}

impl SecurityEvent {
    pub async fn record<'e>(
        executor: impl PgExecutor<'e>,
        new: NewSecurityEvent<'_>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO security_events (account_id, email, event_type, ip, user_agent, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(new.account_id)
        .bind(new.email)
        .bind(new.event_type)
        .bind(new.ip)
        .bind(new.user_agent)
        .bind(new.metadata)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// OTP requests (either purpose) tied to the account or its email since
    /// the cutoff. Feeds the OTP-velocity risk rule.
    pub async fn count_otp_requests<'e>(
        executor: impl PgExecutor<'e>,
        account_id: Uuid,
        email: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM security_events
             WHERE (account_id = $1 OR email = $2)
               AND event_type IN ($3, $4)
               AND created_at >= $5",
        )
        .bind(account_id)
        .bind(email)
        .bind(EVENT_AUTH_OTP_REQUESTED)
        .bind(EVENT_IDENTITY_OTP_REQUESTED)
        .bind(cutoff)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    /// Distinct event ids referenced by purchase_completed events for the
    /// account since the cutoff. Feeds the cross-event burst risk rule.
    pub async fn count_distinct_purchase_events<'e>(
        executor: impl PgExecutor<'e>,
        account_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT metadata->>'event_id') FROM security_events
             WHERE account_id = $1
               AND event_type = $2
               AND metadata->>'event_id' IS NOT NULL
               AND created_at >= $3",
        )
        .bind(account_id)
        .bind(EVENT_PURCHASE_COMPLETED)
        .bind(cutoff)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }
}
