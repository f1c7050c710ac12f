//! Purchase listings: the buyer's wallet and the admin dashboard feed.

use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::middlewares::AccountContext;
use crate::models::purchase::Purchase;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn my_purchases(
    State(state): State<AppState>,
    ctx: AccountContext,
) -> Result<Response, AppError> {
    let purchases = Purchase::list_for_account(&state.pool, ctx.account_id).await?;
    Ok(success(purchases, "Purchases fetched").into_response())
}

pub async fn all_purchases(
    State(state): State<AppState>,
    ctx: AccountContext,
) -> Result<Response, AppError> {
    ctx.require_admin()?;
    let purchases = Purchase::list_all(&state.pool).await?;
    Ok(success(purchases, "Purchases fetched").into_response())
}
