use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::utils::error::AppError;

pub const PURCHASE_STATUS_USED: &str = "used";

/// A confirmed acquisition of N units of one tier. Immutable once written,
/// except for the status flip at check-in.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub buyer_account_id: Uuid,
    pub ticket_tier_id: Uuid,
    pub event_id: Uuid,
    pub identity_id: Uuid,
    pub quantity: i32,
    pub total_price: Decimal,
    pub is_paid: bool,
    pub order_ref: String,
    pub payment_ref: String,
    pub provider_order_id: Option<String>,
    pub redemption_code: String,
    pub status: String,
    pub purchased_at: DateTime<Utc>,
}

pub struct NewPurchase<'a> {
    pub buyer_account_id: Uuid,
    pub ticket_tier_id: Uuid,
    pub event_id: Uuid,
    pub identity_id: Uuid,
    pub quantity: i32,
    pub total_price: Decimal,
    pub order_ref: &'a str,
    pub payment_ref: &'a str,
    pub provider_order_id: &'a str,
    pub redemption_code: &'a str,
}

const PURCHASE_COLUMNS: &str = "id, buyer_account_id, ticket_tier_id, event_id, identity_id, quantity, total_price, is_paid, order_ref, payment_ref, provider_order_id, redemption_code, status, purchased_at";

/// Constraint backing the fulfillment idempotency guarantee. The lookup in
/// `find_by_provider_order_id` is only a fast path; this index is what makes
/// replays safe under concurrent webhook deliveries.
const PROVIDER_ORDER_UNIQUE_CONSTRAINT: &str = "purchases_provider_order_id_key";

impl Purchase {
    pub async fn find_by_provider_order_id<'e>(
        executor: impl PgExecutor<'e>,
        provider_order_id: &str,
    ) -> Result<Option<Purchase>, AppError> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE provider_order_id = $1"
        ))
        .bind(provider_order_id)
        .fetch_optional(executor)
        .await?;

        Ok(purchase)
    }

    /// How many paid tickets this identity already holds for the event.
    pub async fn sum_paid_quantity<'e>(
        executor: impl PgExecutor<'e>,
        event_id: Uuid,
        identity_id: Uuid,
    ) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM purchases
             WHERE event_id = $1 AND identity_id = $2 AND is_paid = TRUE",
        )
        .bind(event_id)
        .bind(identity_id)
        .fetch_one(executor)
        .await?;

        Ok(total)
    }

    /// Inserts exactly one paid purchase row. Returns Ok(None) when another
    /// fulfillment of the same provider order won the insert race, so the
    /// caller can fall back to the winner's row.
    pub async fn record<'e>(
        executor: impl PgExecutor<'e>,
        new: NewPurchase<'_>,
    ) -> Result<Option<Purchase>, AppError> {
        let inserted = sqlx::query_as::<_, Purchase>(&format!(
            "INSERT INTO purchases (buyer_account_id, ticket_tier_id, event_id, identity_id, quantity, total_price, is_paid, order_ref, payment_ref, provider_order_id, redemption_code)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8, $9, $10)
             RETURNING {PURCHASE_COLUMNS}"
        ))
        .bind(new.buyer_account_id)
        .bind(new.ticket_tier_id)
        .bind(new.event_id)
        .bind(new.identity_id)
        .bind(new.quantity)
        .bind(new.total_price)
        .bind(new.order_ref)
        .bind(new.payment_ref)
        .bind(new.provider_order_id)
        .bind(new.redemption_code)
        .fetch_one(executor)
        .await;

        match inserted {
            Ok(purchase) => Ok(Some(purchase)),
            Err(sqlx::Error::Database(db))
                if db.constraint() == Some(PROVIDER_ORDER_UNIQUE_CONSTRAINT) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check-in: only the buyer or an admin may redeem the purchase.
    pub async fn mark_used<'e, E>(
        executor: E,
        purchase_id: Uuid,
        ticket_tier_id: Uuid,
        requester_account_id: Uuid,
        requester_is_admin: bool,
    ) -> Result<Purchase, AppError>
    where
        E: PgExecutor<'e> + Copy,
    {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1 AND ticket_tier_id = $2"
        ))
        .bind(purchase_id)
        .bind(ticket_tier_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase not found".to_string()))?;

        if purchase.buyer_account_id != requester_account_id && !requester_is_admin {
            return Err(AppError::Forbidden(
                "You are not authorized to mark this ticket as used".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Purchase>(&format!(
            "UPDATE purchases SET status = $2 WHERE id = $1 RETURNING {PURCHASE_COLUMNS}"
        ))
        .bind(purchase_id)
        .bind(PURCHASE_STATUS_USED)
        .fetch_one(executor)
        .await?;

        Ok(updated)
    }

    pub async fn list_for_account<'e>(
        executor: impl PgExecutor<'e>,
        buyer_account_id: Uuid,
    ) -> Result<Vec<Purchase>, AppError> {
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases
             WHERE buyer_account_id = $1
             ORDER BY purchased_at DESC"
        ))
        .bind(buyer_account_id)
        .fetch_all(executor)
        .await?;

        Ok(purchases)
    }

    pub async fn list_all<'e>(executor: impl PgExecutor<'e>) -> Result<Vec<Purchase>, AppError> {
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases ORDER BY purchased_at DESC"
        ))
        .fetch_all(executor)
        .await?;

        Ok(purchases)
    }
}
