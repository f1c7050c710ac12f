use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::middlewares::RequestMeta;
use crate::models::account::Account;
use crate::utils::error::AppError;

pub const IDENTITY_STATUS_ACTIVE: &str = "active";

/// A verified real-world buyer profile, distinct from the login account.
/// One email maps to at most one identity (schema UNIQUE), and the owning
/// account never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub owner_account_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_ip: Option<String>,
    pub created_user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

const IDENTITY_COLUMNS: &str = "id, owner_account_id, name, email, phone, verified_at, status, created_ip, created_user_agent, created_at";

impl Identity {
    pub fn is_usable_for_checkout(&self) -> bool {
        self.verified_at.is_some() && self.status == IDENTITY_STATUS_ACTIVE
    }

    pub async fn find_by_email<'e>(
        executor: impl PgExecutor<'e>,
        email: &str,
    ) -> Result<Option<Identity>, AppError> {
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM verified_identities WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(executor)
        .await?;

        Ok(identity)
    }

    /// Upsert keyed by email, ahead of OTP delivery. Fails with a conflict
    /// when the email is already claimed by another account; is a no-op when
    /// the identity is already verified (idempotent re-registration).
    /// `verified_at` stays untouched until the OTP matches.
    pub async fn register_or_update<'e, E>(
        executor: E,
        owner_account_id: Uuid,
        name: &str,
        email: &str,
        phone: &str,
        meta: &RequestMeta,
    ) -> Result<Identity, AppError>
    where
        E: PgExecutor<'e> + Copy,
    {
        if let Some(existing) = Identity::find_by_email(executor, email).await? {
            if existing.owner_account_id != owner_account_id {
                return Err(AppError::Conflict(
                    "This email is already verified by another account".to_string(),
                ));
            }
            if existing.verified_at.is_some() {
                return Ok(existing);
            }
        }

        let identity = sqlx::query_as::<_, Identity>(&format!(
            "INSERT INTO verified_identities (owner_account_id, name, email, phone, created_ip, created_user_agent)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (email) DO UPDATE
             SET name = $2, phone = $4, created_ip = $5, created_user_agent = $6
             RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(owner_account_id)
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(meta.ip.as_deref())
        .bind(meta.user_agent.as_deref())
        .fetch_one(executor)
        .await?;

        Ok(identity)
    }

    /// Flips the identity to verified+active after a successful OTP match.
    pub async fn mark_verified<'e>(
        executor: impl PgExecutor<'e>,
        email: &str,
        owner_account_id: Uuid,
    ) -> Result<Identity, AppError> {
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "UPDATE verified_identities
             SET verified_at = now(), status = 'active'
             WHERE email = $1 AND owner_account_id = $2
             RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(email)
        .bind(owner_account_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Identity not found".to_string()))?;

        Ok(identity)
    }

    /// The "buy for myself" path: when checkout names no identity, the
    /// account's own email is used. A missing self identity is synthesized
    /// from the account profile and auto-verified without an OTP round trip.
    pub async fn resolve_or_create_self<'e, E>(
        executor: E,
        account: &Account,
        meta: &RequestMeta,
    ) -> Result<Identity, AppError>
    where
        E: PgExecutor<'e> + Copy,
    {
        if let Some(existing) = Identity::find_by_email(executor, &account.email).await? {
            if existing.owner_account_id != account.id {
                return Err(AppError::Conflict(
                    "This email is already verified by another account".to_string(),
                ));
            }
            return Ok(existing);
        }

        let identity = sqlx::query_as::<_, Identity>(&format!(
            "INSERT INTO verified_identities (owner_account_id, name, email, phone, verified_at, status, created_ip, created_user_agent)
             VALUES ($1, $2, $3, $4, now(), 'active', $5, $6)
             RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.phone.as_deref().unwrap_or_default())
        .bind(meta.ip.as_deref())
        .bind(meta.user_agent.as_deref())
        .fetch_one(executor)
        .await?;

        Ok(identity)
    }

    pub async fn list_owned<'e>(
        executor: impl PgExecutor<'e>,
        owner_account_id: Uuid,
    ) -> Result<Vec<Identity>, AppError> {
        let identities = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM verified_identities
             WHERE owner_account_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(owner_account_id)
        .fetch_all(executor)
        .await?;

        Ok(identities)
    }

    /// Loads an explicitly chosen identity for checkout. Ownership failures
    /// read as not-found so callers learn nothing about other accounts'
    /// identities; an owned-but-unusable identity is forbidden.
    pub async fn find_for_checkout<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        owner_account_id: Uuid,
    ) -> Result<Identity, AppError> {
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM verified_identities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        let identity = match identity {
            Some(identity) if identity.owner_account_id == owner_account_id => identity,
            _ => return Err(AppError::NotFound("Verified identity not found".to_string())),
        };

        if !identity.is_usable_for_checkout() {
            return Err(AppError::Forbidden(
                "Identity is not verified or is deactivated".to_string(),
            ));
        }

        Ok(identity)
    }

    /// Identities created since the cutoff, for the risk engine's IP
    /// fan-out rule.
    pub async fn created_since<'e>(
        executor: impl PgExecutor<'e>,
        owner_account_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Identity>, AppError> {
        let identities = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM verified_identities
             WHERE owner_account_id = $1 AND created_at >= $2"
        ))
        .bind(owner_account_id)
        .bind(cutoff)
        .fetch_all(executor)
        .await?;

        Ok(identities)
    }

    /// Serializes concurrent fulfillments for one identity: the row lock is
    /// held until the surrounding transaction commits, which makes the
    /// per-identity cap re-check race-free.
    pub async fn lock_row<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<(), AppError> {
        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM verified_identities WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(executor)
                .await?;

        if locked.is_none() {
            return Err(AppError::NotFound("Verified identity not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(verified: bool, status: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            owner_account_id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+15550100".to_string(),
            verified_at: verified.then(Utc::now),
            status: status.to_string(),
            created_ip: None,
            created_user_agent: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_unverified_identity_cannot_check_out() {
        assert!(!identity(false, "active").is_usable_for_checkout());
    }

    #[test]
    fn test_deactivated_identity_cannot_check_out() {
        assert!(!identity(true, "deactivated").is_usable_for_checkout());
    }

    #[test]
    fn test_verified_active_identity_can_check_out() {
        assert!(identity(true, "active").is_usable_for_checkout());
    }
}
