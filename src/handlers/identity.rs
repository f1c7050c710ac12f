//! Identity verification flow: OTP request, OTP verification, listing.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::middlewares::{AccountContext, RequestMeta};
use crate::models::identity::Identity;
use crate::models::otp::{OtpCode, OTP_PURPOSE_IDENTITY};
use crate::models::security_event::{
    NewSecurityEvent, SecurityEvent, EVENT_IDENTITY_OTP_REQUESTED, EVENT_IDENTITY_VERIFIED,
};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

#[derive(Deserialize)]
pub struct RequestOtpBody {
    pub name: String,
    pub email: String,
    pub phone: String,
}

pub async fn request_identity_otp(
    State(state): State<AppState>,
    ctx: AccountContext,
    meta: RequestMeta,
    Json(body): Json<RequestOtpBody>,
) -> Result<Response, AppError> {
    if body.name.trim().is_empty() || body.email.trim().is_empty() || body.phone.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Name, email, and phone are required".to_string(),
        ));
    }

    let identity = Identity::register_or_update(
        &state.pool,
        ctx.account_id,
        body.name.trim(),
        body.email.trim(),
        body.phone.trim(),
        &meta,
    )
    .await?;

    if identity.verified_at.is_some() {
        return Ok(success(identity, "Identity already verified").into_response());
    }

    let code = OtpCode::issue(&state.pool, &identity.email, OTP_PURPOSE_IDENTITY).await?;

    let mail_body = format!(
        "Hello {},\n\nYour identity verification code is: {}\nThis code expires in 5 minutes.",
        identity.name, code
    );
    state
        .mailer
        .send(&identity.email, "Identity Verification OTP", &mail_body)
        .await?;

    SecurityEvent::record(
        &state.pool,
        NewSecurityEvent {
            account_id: Some(ctx.account_id),
            email: Some(&identity.email),
            event_type: EVENT_IDENTITY_OTP_REQUESTED,
            ip: meta.ip.as_deref(),
            user_agent: meta.user_agent.as_deref(),
            metadata: None,
        },
    )
    .await?;

    Ok(empty_success("OTP sent successfully").into_response())
}

#[derive(Deserialize)]
pub struct VerifyOtpBody {
    pub email: String,
    pub otp: String,
}

pub async fn verify_identity_otp(
    State(state): State<AppState>,
    ctx: AccountContext,
    meta: RequestMeta,
    Json(body): Json<VerifyOtpBody>,
) -> Result<Response, AppError> {
    if body.email.trim().is_empty() || body.otp.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Email and OTP are required".to_string(),
        ));
    }

    let matched =
        OtpCode::verify(&state.pool, body.email.trim(), body.otp.trim(), OTP_PURPOSE_IDENTITY)
            .await?;
    if !matched {
        return Err(AppError::ValidationError("Invalid OTP".to_string()));
    }

    let identity = Identity::mark_verified(&state.pool, body.email.trim(), ctx.account_id).await?;

    SecurityEvent::record(
        &state.pool,
        NewSecurityEvent {
            account_id: Some(ctx.account_id),
            email: Some(&identity.email),
            event_type: EVENT_IDENTITY_VERIFIED,
            ip: meta.ip.as_deref(),
            user_agent: meta.user_agent.as_deref(),
            metadata: Some(json!({ "identity_id": identity.id.to_string() })),
        },
    )
    .await?;

    Ok(success(identity, "Identity verified").into_response())
}

pub async fn my_identities(
    State(state): State<AppState>,
    ctx: AccountContext,
) -> Result<Response, AppError> {
    let identities = Identity::list_owned(&state.pool, ctx.account_id).await?;
    Ok(success(identities, "Identities fetched").into_response())
}
