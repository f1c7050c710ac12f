use std::env;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

use crate::utils::mail::MailConfig;
use crate::utils::payment::PolarConfig;

/// How many paid tickets one identity may hold per event. Overridable so
/// operators can tune the cap without a deploy.
pub const DEFAULT_PER_EVENT_IDENTITY_LIMIT: i64 = 2;

pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub per_event_identity_limit: i64,
    pub payment: PolarConfig,
    pub webhook_secret: Option<String>,
    pub mail: MailConfig,
    pub skip_email: bool,
    pub allowed_origins: String,
    /// Enables HSTS and other HTTPS-only behavior.
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/odeon".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3001),
            per_event_identity_limit: env::var("PER_EVENT_IDENTITY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|limit| *limit > 0)
                .unwrap_or(DEFAULT_PER_EVENT_IDENTITY_LIMIT),
            payment: PolarConfig {
                api_url: env::var("POLAR_API_URL")
                    .unwrap_or_else(|_| "https://api.polar.sh".to_string()),
                access_token: env::var("POLAR_ACCESS_TOKEN").unwrap_or_default(),
                product_id: env::var("POLAR_PRODUCT_ID").unwrap_or_default(),
                success_url: env::var("POLAR_SUCCESS_URL").unwrap_or_default(),
                currency: env::var("POLAR_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            },
            webhook_secret: env::var("POLAR_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            mail: MailConfig {
                api_url: env::var("MAIL_API_URL").unwrap_or_default(),
                api_key: env::var("MAIL_API_KEY").unwrap_or_default(),
            },
            skip_email: env::var("SKIP_EMAIL")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
            allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| cors::DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so parallel test threads never race on the env var.
    #[test]
    fn test_per_event_identity_limit_parsing() {
        env::remove_var("PER_EVENT_IDENTITY_LIMIT");
        assert_eq!(
            Config::from_env().per_event_identity_limit,
            DEFAULT_PER_EVENT_IDENTITY_LIMIT
        );

        env::set_var("PER_EVENT_IDENTITY_LIMIT", "4");
        assert_eq!(Config::from_env().per_event_identity_limit, 4);

        env::set_var("PER_EVENT_IDENTITY_LIMIT", "0");
        assert_eq!(
            Config::from_env().per_event_identity_limit,
            DEFAULT_PER_EVENT_IDENTITY_LIMIT
        );

        env::set_var("PER_EVENT_IDENTITY_LIMIT", "many");
        assert_eq!(
            Config::from_env().per_event_identity_limit,
            DEFAULT_PER_EVENT_IDENTITY_LIMIT
        );
        env::remove_var("PER_EVENT_IDENTITY_LIMIT");
    }

    #[test]
    fn test_payment_defaults() {
        let config = Config::from_env();
        assert_eq!(config.payment.currency, "usd");
        assert_eq!(config.payment.api_url, "https://api.polar.sh");
    }
}
