//! Checkout orchestration: the optimistic pre-checked initiation and the
//! authoritative, transactional fulfillment driven by the provider webhook.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::middlewares::{AccountContext, RequestMeta};
use crate::models::account::Account;
use crate::models::event::Event;
use crate::models::identity::Identity;
use crate::models::purchase::{NewPurchase, Purchase};
use crate::models::security_event::{
    NewSecurityEvent, SecurityEvent, EVENT_FULFILLMENT_ANOMALY, EVENT_PURCHASE_COMPLETED,
};
use crate::models::ticket::TicketTier;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::payment::{amount_minor_units, CheckoutSessionRequest, OrderMetadata};
use crate::utils::redemption::generate_redemption_code;
use crate::utils::response::success;
use crate::utils::webhook::{verify_signature, SIGNATURE_HEADER};

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub quantity: i64,
    pub identity_id: Option<Uuid>,
}

/// Step 1 of a purchase. Validates identity, cap, and availability, then
/// hands off to the payment provider. Deliberately persists nothing: an
/// abandoned checkout leaves no trace to clean up.
pub async fn initiate_checkout(
    State(state): State<AppState>,
    ctx: AccountContext,
    meta: RequestMeta,
    Path(tier_id): Path<Uuid>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    if request.quantity <= 0 || i32::try_from(request.quantity).is_err() {
        return Err(AppError::ValidationError(
            "Quantity must be a positive integer".to_string(),
        ));
    }
    let quantity = request.quantity as i32;

    let identity = match request.identity_id {
        Some(identity_id) => {
            Identity::find_for_checkout(&state.pool, identity_id, ctx.account_id).await?
        }
        None => {
            let account = Account::find(&state.pool, ctx.account_id).await?;
            Identity::resolve_or_create_self(&state.pool, &account, &meta).await?
        }
    };

    let tier = TicketTier::find(&state.pool, tier_id).await?;
    let event = Event::find(&state.pool, tier.event_id).await?;

    // Advisory only; the atomic reservation at fulfillment is authoritative.
    if tier.remaining_quantity < quantity {
        return Err(AppError::InsufficientInventory(
            "Not enough tickets available".to_string(),
        ));
    }

    let limit = state.config.per_event_identity_limit;
    let already_bought = Purchase::sum_paid_quantity(&state.pool, event.id, identity.id).await?;
    if already_bought + i64::from(quantity) > limit {
        return Err(AppError::LimitExceeded(format!(
            "Max {limit} tickets per identity per event"
        )));
    }

    let session = state
        .payments
        .create_checkout_session(CheckoutSessionRequest {
            customer_email: identity.email.clone(),
            customer_name: identity.name.clone(),
            amount_minor_units: amount_minor_units(tier.price, quantity)?,
            metadata: OrderMetadata {
                tier_id: tier.id,
                event_id: event.id,
                quantity,
                identity_id: identity.id,
                buyer_account_id: ctx.account_id,
            },
        })
        .await?;

    Ok(success(
        json!({
            "checkout_url": session.url,
            "session_id": session.session_id,
        }),
        "Checkout session created",
    )
    .into_response())
}

/// The paid-order event as delivered by the provider. Only `order.paid`
/// reaches fulfillment.
#[derive(Debug, Deserialize)]
pub struct ProviderEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: ProviderOrder,
}

#[derive(Debug, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Converts a confirmed payment into decremented inventory plus a purchase
/// row, exactly once per provider order id no matter how often the provider
/// retries delivery.
///
/// Everything runs in one transaction holding the identity row lock, so
/// concurrent fulfillments for the same identity serialize and the cap
/// re-check cannot be raced past. Idempotency does not depend on the
/// fast-path lookup: the unique index on provider_order_id catches any
/// insert race and the loser adopts the winner's row.
pub async fn fulfill_order(state: &AppState, order: &ProviderOrder) -> Result<Purchase, AppError> {
    let metadata = OrderMetadata::parse(&order.metadata)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;

    Identity::lock_row(&mut *tx, metadata.identity_id).await?;

    if let Some(existing) = Purchase::find_by_provider_order_id(&mut *tx, &order.id).await? {
        tx.commit().await?;
        tracing::info!(provider_order_id = %order.id, purchase_id = %existing.id, "Replayed fulfillment, returning existing purchase");
        return Ok(existing);
    }

    let tier = TicketTier::find(&mut *tx, metadata.tier_id).await?;
    let event = Event::find(&mut *tx, metadata.event_id).await?;

    let limit = state.config.per_event_identity_limit;
    let already_bought =
        Purchase::sum_paid_quantity(&mut *tx, event.id, metadata.identity_id).await?;
    if already_bought + i64::from(metadata.quantity) > limit {
        tx.rollback().await?;
        record_anomaly(
            state,
            &order.id,
            &metadata,
            format!("per-identity limit of {limit} already consumed"),
        )
        .await?;
        return Err(AppError::LimitExceeded(format!(
            "Max {limit} tickets per identity per event"
        )));
    }

    let Some(reserved) = TicketTier::try_reserve(&mut *tx, tier.id, metadata.quantity).await?
    else {
        // Payment is already captured; this needs an operator, not a retry.
        tx.rollback().await?;
        record_anomaly(
            state,
            &order.id,
            &metadata,
            "inventory exhausted after payment capture".to_string(),
        )
        .await?;
        return Err(AppError::InsufficientInventory(
            "Not enough tickets available".to_string(),
        ));
    };

    let reserved = reserved.refresh_status(&mut *tx, event.end_date, now).await?;

    let total_price = tier.price * Decimal::from(metadata.quantity);
    let redemption_code =
        generate_redemption_code(reserved.id, metadata.buyer_account_id, now);

    let recorded = Purchase::record(
        &mut *tx,
        NewPurchase {
            buyer_account_id: metadata.buyer_account_id,
            ticket_tier_id: reserved.id,
            event_id: event.id,
            identity_id: metadata.identity_id,
            quantity: metadata.quantity,
            total_price,
            order_ref: &order.id,
            payment_ref: &order.id,
            provider_order_id: &order.id,
            redemption_code: &redemption_code,
        },
    )
    .await?;

    let purchase = match recorded {
        Some(purchase) => purchase,
        None => {
            // Lost the provider-order-id insert race: roll back our
            // reservation and adopt the winner's row.
            tx.rollback().await?;
            return Purchase::find_by_provider_order_id(&state.pool, &order.id)
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerError(
                        "Duplicate fulfillment detected but winning purchase not found".to_string(),
                    )
                });
        }
    };

    SecurityEvent::record(
        &mut *tx,
        NewSecurityEvent {
            account_id: Some(metadata.buyer_account_id),
            email: None,
            event_type: EVENT_PURCHASE_COMPLETED,
            ip: None,
            user_agent: None,
            metadata: Some(json!({
                "event_id": event.id.to_string(),
                "tier_id": reserved.id.to_string(),
                "quantity": metadata.quantity,
                "amount": total_price.to_string(),
                "identity_id": metadata.identity_id.to_string(),
                "provider_order_id": order.id,
            })),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        provider_order_id = %order.id,
        purchase_id = %purchase.id,
        tier_id = %reserved.id,
        quantity = metadata.quantity,
        "Fulfilled order"
    );

    Ok(purchase)
}

/// Durably records a fulfillment anomaly before the webhook acknowledges.
/// Money has changed hands, so losing this record is not an option.
async fn record_anomaly(
    state: &AppState,
    provider_order_id: &str,
    metadata: &OrderMetadata,
    detail: String,
) -> Result<(), AppError> {
    tracing::error!(
        provider_order_id,
        tier_id = %metadata.tier_id,
        quantity = metadata.quantity,
        detail = %detail,
        "Fulfillment anomaly, manual reconciliation required"
    );

    SecurityEvent::record(
        &state.pool,
        NewSecurityEvent {
            account_id: Some(metadata.buyer_account_id),
            email: None,
            event_type: EVENT_FULFILLMENT_ANOMALY,
            ip: None,
            user_agent: None,
            metadata: Some(json!({
                "provider_order_id": provider_order_id,
                "tier_id": metadata.tier_id.to_string(),
                "event_id": metadata.event_id.to_string(),
                "identity_id": metadata.identity_id.to_string(),
                "quantity": metadata.quantity,
                "detail": detail,
            })),
        },
    )
    .await
}

/// Provider webhook endpoint. Signature first, then fulfillment. Anomalies
/// are acknowledged once durably recorded so the provider stops retrying a
/// delivery that can never succeed.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let secret = state.config.webhook_secret.as_deref().ok_or_else(|| {
        AppError::InternalServerError("POLAR_WEBHOOK_SECRET not configured".to_string())
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::ValidationError("Missing webhook signature".to_string()))?;

    if !verify_signature(secret, &body, signature) {
        return Err(AppError::Forbidden("Invalid webhook signature".to_string()));
    }

    let event: ProviderEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(format!("Malformed webhook payload: {e}")))?;

    if event.event_type != "order.paid" {
        return Ok(success(json!({ "received": true }), "Event ignored").into_response());
    }

    match fulfill_order(&state, &event.data).await {
        Ok(_) => Ok(success(json!({ "received": true }), "Order fulfilled").into_response()),
        // Recorded anomalies are acked so the provider stops retrying.
        Err(AppError::InsufficientInventory(_)) | Err(AppError::LimitExceeded(_)) => {
            Ok(success(json!({ "received": true }), "Anomaly recorded").into_response())
        }
        Err(e) => Err(e),
    }
}

#[derive(Deserialize)]
pub struct MarkUsedPath {
    pub tier_id: Uuid,
    pub purchase_id: Uuid,
}

/// Event check-in: flips the purchase to used. Owner or admin only.
pub async fn mark_purchase_used(
    State(state): State<AppState>,
    ctx: AccountContext,
    Path(path): Path<MarkUsedPath>,
) -> Result<Response, AppError> {
    let purchase = Purchase::mark_used(
        &state.pool,
        path.purchase_id,
        path.tier_id,
        ctx.account_id,
        ctx.is_admin(),
    )
    .await?;

    Ok(success(purchase, "Ticket marked as used").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_event_deserializes_with_metadata() {
        let raw = r#"{
            "type": "order.paid",
            "data": {
                "id": "ord_123",
                "metadata": {"quantity": "2"}
            }
        }"#;
        let event: ProviderEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type, "order.paid");
        assert_eq!(event.data.id, "ord_123");
        assert_eq!(event.data.metadata.get("quantity").unwrap(), "2");
    }

    #[test]
    fn test_provider_event_tolerates_missing_metadata() {
        let raw = r#"{"type": "order.refunded", "data": {"id": "ord_9"}}"#;
        let event: ProviderEvent = serde_json::from_str(raw).unwrap();
        assert!(event.data.metadata.is_empty());
    }
}
