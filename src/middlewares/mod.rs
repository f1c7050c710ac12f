//! Request-scoped context extractors.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! account as trusted headers. The core reads them without re-validating.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::models::account::ACCOUNT_TYPE_ADMIN;
use crate::utils::error::AppError;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ACCOUNT_EMAIL_HEADER: &str = "x-account-email";
pub const ACCOUNT_TYPE_HEADER: &str = "x-account-type";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// The authenticated account context supplied by the upstream auth provider.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub account_id: Uuid,
    pub email: String,
    pub account_type: String,
}

impl AccountContext {
    pub fn is_admin(&self) -> bool {
        self.account_type == ACCOUNT_TYPE_ADMIN
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "This action requires an admin account".to_string(),
            ))
        }
    }
}

pub fn parse_account_headers(headers: &HeaderMap) -> Result<AccountContext, AppError> {
    let header = |name: &str| -> Result<&str, AppError> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::AuthError(format!("Missing authenticated context ({name})")))
    };

    let account_id = header(ACCOUNT_ID_HEADER)?
        .parse::<Uuid>()
        .map_err(|_| AppError::AuthError("Malformed account id in authenticated context".to_string()))?;

    Ok(AccountContext {
        account_id,
        email: header(ACCOUNT_EMAIL_HEADER)?.to_string(),
        account_type: header(ACCOUNT_TYPE_HEADER)?.to_string(),
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AccountContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_account_headers(&parts.headers)
    }
}

/// Source IP and user agent, recorded on security events. Both optional;
/// extraction never fails.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub fn parse_request_meta(headers: &HeaderMap) -> RequestMeta {
    let ip = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    RequestMeta { ip, user_agent }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parse_request_meta(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(id: &str, email: &str, kind: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(ACCOUNT_ID_HEADER, HeaderValue::from_str(id).unwrap());
        map.insert(ACCOUNT_EMAIL_HEADER, HeaderValue::from_str(email).unwrap());
        map.insert(ACCOUNT_TYPE_HEADER, HeaderValue::from_str(kind).unwrap());
        map
    }

    #[test]
    fn test_parses_complete_context() {
        let id = Uuid::new_v4();
        let ctx = parse_account_headers(&headers(&id.to_string(), "a@x.com", "user")).unwrap();
        assert_eq!(ctx.account_id, id);
        assert_eq!(ctx.email, "a@x.com");
        assert!(!ctx.is_admin());
    }

    #[test]
    fn test_admin_flag_and_guard() {
        let id = Uuid::new_v4().to_string();
        let ctx = parse_account_headers(&headers(&id, "a@x.com", "admin")).unwrap();
        assert!(ctx.is_admin());
        assert!(ctx.require_admin().is_ok());

        let ctx = parse_account_headers(&headers(&id, "a@x.com", "user")).unwrap();
        assert!(matches!(ctx.require_admin(), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_missing_or_malformed_context_is_unauthorized() {
        let err = parse_account_headers(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));

        let err = parse_account_headers(&headers("not-a-uuid", "a@x.com", "user")).unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[test]
    fn test_request_meta_takes_first_forwarded_ip() {
        let mut map = HeaderMap::new();
        map.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        map.insert(USER_AGENT, HeaderValue::from_static("test-agent"));

        let meta = parse_request_meta(&map);
        assert_eq!(meta.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.user_agent.as_deref(), Some("test-agent"));

        let empty = parse_request_meta(&HeaderMap::new());
        assert!(empty.ip.is_none());
        assert!(empty.user_agent.is_none());
    }
}
