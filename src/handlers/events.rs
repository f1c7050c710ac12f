//! The minimal event surface the ticketing core needs: create and fetch.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::middlewares::AccountContext;
use crate::models::event::Event;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Deserialize)]
pub struct CreateEventBody {
    pub title: String,
    pub description: Option<String>,
    pub venue: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

pub async fn create_event(
    State(state): State<AppState>,
    ctx: AccountContext,
    Json(body): Json<CreateEventBody>,
) -> Result<Response, AppError> {
    ctx.require_admin()?;

    if body.title.trim().is_empty() || body.venue.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Title and venue are required".to_string(),
        ));
    }
    if body.end_date <= body.start_date {
        return Err(AppError::ValidationError(
            "Event end date must be after the start date".to_string(),
        ));
    }

    let event = Event::create(
        &state.pool,
        ctx.account_id,
        body.title.trim(),
        body.description.as_deref(),
        body.venue.trim(),
        body.start_date,
        body.end_date,
    )
    .await?;

    Ok(created(event, "Event created successfully").into_response())
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = Event::find(&state.pool, event_id).await?;
    Ok(success(event, "Event fetched").into_response())
}
