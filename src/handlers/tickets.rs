//! Ticket tier management: creation and per-event listing with derived
//! status applied at the read boundary.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::middlewares::AccountContext;
use crate::models::event::Event;
use crate::models::ticket::{derive_status, TicketTier};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Deserialize)]
pub struct CreateTierBody {
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub quantity: i64,
    pub sale_start: DateTime<Utc>,
    pub sale_end: DateTime<Utc>,
}

pub async fn create_tier(
    State(state): State<AppState>,
    ctx: AccountContext,
    Path(event_id): Path<Uuid>,
    Json(body): Json<CreateTierBody>,
) -> Result<Response, AppError> {
    ctx.require_admin()?;

    if body.title.trim().is_empty() {
        return Err(AppError::ValidationError("Title is required".to_string()));
    }
    if body.price < Decimal::ZERO {
        return Err(AppError::ValidationError(
            "Price must not be negative".to_string(),
        ));
    }
    let quantity = i32::try_from(body.quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| {
            AppError::ValidationError("Quantity must be a positive integer".to_string())
        })?;

    let event = Event::find(&state.pool, event_id).await?;

    // An already-ended event yields an inactive tier from the start.
    let initial_status = derive_status(quantity, event.end_date, Utc::now());

    let tier = TicketTier::create(
        &state.pool,
        event.id,
        body.title.trim(),
        body.description.as_deref(),
        body.price,
        quantity,
        body.sale_start,
        body.sale_end,
        initial_status,
    )
    .await?;

    Ok(created(tier, "Ticket tier created successfully").into_response())
}

pub async fn list_tiers(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = Event::find(&state.pool, event_id).await?;
    let tiers = TicketTier::list_for_event(&state.pool, event.id).await?;

    // Display statuses must never be stale.
    let now = Utc::now();
    let mut refreshed = Vec::with_capacity(tiers.len());
    for tier in tiers {
        refreshed.push(tier.refresh_status(&state.pool, event.end_date, now).await?);
    }

    Ok(success(refreshed, "Ticket tiers fetched").into_response())
}
