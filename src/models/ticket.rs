use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::utils::error::AppError;

/// Derived tier status. Stored as text; `derive_status` is the single source
/// of truth for the transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierStatus {
    Active,
    SoldOut,
    Inactive,
}

impl TierStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TierStatus::Active => "active",
            TierStatus::SoldOut => "sold_out",
            TierStatus::Inactive => "inactive",
        }
    }
}

/// Once the owning event has ended the tier is inactive no matter how much
/// stock is left; otherwise zero stock means sold out.
pub fn derive_status(
    remaining_quantity: i32,
    event_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> TierStatus {
    if event_end < now {
        TierStatus::Inactive
    } else if remaining_quantity == 0 {
        TierStatus::SoldOut
    } else {
        TierStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub remaining_quantity: i32,
    pub sale_start: DateTime<Utc>,
    pub sale_end: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const TIER_COLUMNS: &str = "id, event_id, title, description, price, remaining_quantity, sale_start, sale_end, status, created_at, updated_at";

impl TicketTier {
    pub async fn find<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<TicketTier, AppError> {
        let tier = sqlx::query_as::<_, TicketTier>(&format!(
            "SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket tier '{}' was not found", id)))?;

        Ok(tier)
    }

    pub async fn list_for_event<'e>(
        executor: impl PgExecutor<'e>,
        event_id: Uuid,
    ) -> Result<Vec<TicketTier>, AppError> {
        let tiers = sqlx::query_as::<_, TicketTier>(&format!(
            "SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE event_id = $1 ORDER BY created_at"
        ))
        .bind(event_id)
        .fetch_all(executor)
        .await?;

        Ok(tiers)
    }

    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        event_id: Uuid,
        title: &str,
        description: Option<&str>,
        price: Decimal,
        quantity: i32,
        sale_start: DateTime<Utc>,
        sale_end: DateTime<Utc>,
        initial_status: TierStatus,
    ) -> Result<TicketTier, AppError> {
        let tier = sqlx::query_as::<_, TicketTier>(&format!(
            "INSERT INTO ticket_tiers (event_id, title, description, price, remaining_quantity, sale_start, sale_end, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {TIER_COLUMNS}"
        ))
        .bind(event_id)
        .bind(title)
        .bind(description)
        .bind(price)
        .bind(quantity)
        .bind(sale_start)
        .bind(sale_end)
        .bind(initial_status.as_str())
        .fetch_one(executor)
        .await?;

        Ok(tier)
    }

    /// Atomically takes `quantity` units off the shelf. The WHERE clause is
    /// the oversell guard: the decrement only happens if enough stock is
    /// still there at write time. Returns None when the guard fails.
    pub async fn try_reserve<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        quantity: i32,
    ) -> Result<Option<TicketTier>, AppError> {
        let tier = sqlx::query_as::<_, TicketTier>(&format!(
            "UPDATE ticket_tiers
             SET remaining_quantity = remaining_quantity - $2, updated_at = now()
             WHERE id = $1 AND remaining_quantity >= $2
             RETURNING {TIER_COLUMNS}"
        ))
        .bind(id)
        .bind(quantity)
        .fetch_optional(executor)
        .await?;

        Ok(tier)
    }

    /// Recomputes the stored status from current stock and the owning
    /// event's end date. Invoked after every reservation; also useful at
    /// read time so listings never show a stale "active".
    pub async fn refresh_status<'e>(
        mut self,
        executor: impl PgExecutor<'e>,
        event_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TicketTier, AppError> {
        let derived = derive_status(self.remaining_quantity, event_end, now);
        if self.status != derived.as_str() {
            sqlx::query("UPDATE ticket_tiers SET status = $2, updated_at = now() WHERE id = $1")
                .bind(self.id)
                .bind(derived.as_str())
                .execute(executor)
                .await?;
            self.status = derived.as_str().to_string();
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_sold_out_when_no_stock_left() {
        let now = Utc::now();
        let end = now + Duration::hours(2);
        assert_eq!(derive_status(0, end, now), TierStatus::SoldOut);
    }

    #[test]
    fn test_inactive_once_event_ended_regardless_of_stock() {
        let now = Utc::now();
        let end = now - Duration::minutes(1);
        assert_eq!(derive_status(50, end, now), TierStatus::Inactive);
        assert_eq!(derive_status(0, end, now), TierStatus::Inactive);
    }

    #[test]
    fn test_active_with_stock_and_running_event() {
        let now = Utc::now();
        let end = now + Duration::days(1);
        assert_eq!(derive_status(1, end, now), TierStatus::Active);
        assert_eq!(derive_status(500, end, now), TierStatus::Active);
    }

    #[test]
    fn test_status_strings_match_schema_values() {
        assert_eq!(TierStatus::Active.as_str(), "active");
        assert_eq!(TierStatus::SoldOut.as_str(), "sold_out");
        assert_eq!(TierStatus::Inactive.as_str(), "inactive");
    }
}
