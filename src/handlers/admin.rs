//! Admin triage surface: on-demand risk assessment and the flag write-back.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::middlewares::AccountContext;
use crate::models::account::Account;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::utils::risk::score_account;

pub async fn account_risk(
    State(state): State<AppState>,
    ctx: AccountContext,
    Path(account_id): Path<Uuid>,
) -> Result<Response, AppError> {
    ctx.require_admin()?;

    let account = Account::find(&state.pool, account_id).await?;
    let assessment = score_account(&state.pool, &account, Utc::now()).await?;

    Ok(success(assessment, "Risk assessment computed").into_response())
}

#[derive(Deserialize)]
pub struct FlagAccountBody {
    pub flagged: bool,
}

/// Persists the current assessment onto the account's denormalized risk
/// fields. This is the admin write-back path; the risk engine itself never
/// mutates anything.
pub async fn flag_account(
    State(state): State<AppState>,
    ctx: AccountContext,
    Path(account_id): Path<Uuid>,
    Json(body): Json<FlagAccountBody>,
) -> Result<Response, AppError> {
    ctx.require_admin()?;

    let account = Account::find(&state.pool, account_id).await?;
    let assessment = score_account(&state.pool, &account, Utc::now()).await?;

    let updated = Account::write_risk_fields(
        &state.pool,
        account.id,
        assessment.score,
        &assessment.reasons,
        body.flagged,
    )
    .await?;

    Ok(success(updated, "Account risk fields updated").into_response())
}
