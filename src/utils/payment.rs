//! Outbound payment-provider integration and the metadata-bag contract.
//!
//! The metadata bag is the only state the orchestrator can rely on at
//! fulfillment time: a flat string-keyed map the provider must round-trip
//! verbatim on the paid-order event.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::utils::error::AppError;

/// Parsed, validated metadata bag. Every field is mandatory; fulfillment
/// never guesses defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMetadata {
    pub tier_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    pub identity_id: Uuid,
    pub buyer_account_id: Uuid,
}

impl OrderMetadata {
    /// All values transmitted as strings, per the provider contract.
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("tier_id".to_string(), self.tier_id.to_string()),
            ("event_id".to_string(), self.event_id.to_string()),
            ("quantity".to_string(), self.quantity.to_string()),
            ("identity_id".to_string(), self.identity_id.to_string()),
            (
                "buyer_account_id".to_string(),
                self.buyer_account_id.to_string(),
            ),
        ])
    }

    pub fn parse(map: &HashMap<String, String>) -> Result<OrderMetadata, AppError> {
        let field = |key: &str| -> Result<&str, AppError> {
            map.get(key)
                .map(String::as_str)
                .ok_or_else(|| AppError::ValidationError(format!("Order metadata is missing '{key}'")))
        };
        let uuid_field = |key: &str| -> Result<Uuid, AppError> {
            field(key)?.parse::<Uuid>().map_err(|_| {
                AppError::ValidationError(format!("Order metadata field '{key}' is not a valid id"))
            })
        };

        let quantity: i32 = field("quantity")?.parse().map_err(|_| {
            AppError::ValidationError("Order metadata field 'quantity' is not an integer".to_string())
        })?;
        if quantity <= 0 {
            return Err(AppError::ValidationError(
                "Order metadata field 'quantity' must be positive".to_string(),
            ));
        }

        Ok(OrderMetadata {
            tier_id: uuid_field("tier_id")?,
            event_id: uuid_field("event_id")?,
            quantity,
            identity_id: uuid_field("identity_id")?,
            buyer_account_id: uuid_field("buyer_account_id")?,
        })
    }
}

/// A checkout session created on the provider side. The buyer is redirected
/// to `url`; nothing is persisted locally until the paid-order event.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub url: String,
    pub session_id: String,
}

pub struct CheckoutSessionRequest {
    pub customer_email: String,
    pub customer_name: String,
    pub amount_minor_units: i64,
    pub metadata: OrderMetadata,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, AppError>;
}

/// Converts a unit price and quantity to the provider's minor-unit amount.
pub fn amount_minor_units(unit_price: Decimal, quantity: i32) -> Result<i64, AppError> {
    let total = unit_price * Decimal::from(quantity) * Decimal::from(100);
    total.round().to_i64().ok_or_else(|| {
        AppError::ValidationError("Order total is out of range for the payment provider".to_string())
    })
}

#[derive(Debug, Clone)]
pub struct PolarConfig {
    pub api_url: String,
    pub access_token: String,
    pub product_id: String,
    pub success_url: String,
    pub currency: String,
}

/// HTTP client for the Polar-style checkout API.
pub struct PolarClient {
    http: reqwest::Client,
    config: PolarConfig,
}

#[derive(Deserialize)]
struct PolarCheckoutResponse {
    id: String,
    url: String,
}

impl PolarClient {
    pub fn new(config: PolarConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PaymentProvider for PolarClient {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, AppError> {
        let body = json!({
            "product_id": self.config.product_id,
            "success_url": self.config.success_url,
            "customer_email": request.customer_email,
            "customer_name": request.customer_name,
            "metadata": request.metadata.to_map(),
            "amount": request.amount_minor_units,
            "currency": self.config.currency,
        });

        let response = self
            .http
            .post(format!("{}/v1/checkouts", self.config.api_url))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Checkout session failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalServiceError(format!(
                "Payment provider rejected checkout session ({status})"
            )));
        }

        let parsed: PolarCheckoutResponse = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Malformed checkout session response: {e}"))
        })?;

        Ok(CheckoutSession {
            url: parsed.url,
            session_id: parsed.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OrderMetadata {
        OrderMetadata {
            tier_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            quantity: 2,
            identity_id: Uuid::new_v4(),
            buyer_account_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_metadata_round_trips_through_string_map() {
        let metadata = sample();
        let parsed = OrderMetadata::parse(&metadata.to_map()).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_missing_field_is_fatal() {
        let mut map = sample().to_map();
        map.remove("identity_id");
        let err = OrderMetadata::parse(&map).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_non_integer_quantity_is_fatal() {
        let mut map = sample().to_map();
        map.insert("quantity".to_string(), "two".to_string());
        assert!(matches!(
            OrderMetadata::parse(&map),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_zero_and_negative_quantity_are_rejected() {
        for bad in ["0", "-3"] {
            let mut map = sample().to_map();
            map.insert("quantity".to_string(), bad.to_string());
            assert!(matches!(
                OrderMetadata::parse(&map),
                Err(AppError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_malformed_uuid_is_fatal() {
        let mut map = sample().to_map();
        map.insert("tier_id".to_string(), "not-a-uuid".to_string());
        assert!(matches!(
            OrderMetadata::parse(&map),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_in_minor_units() {
        let price = Decimal::new(10050, 2); // 100.50
        assert_eq!(amount_minor_units(price, 2).unwrap(), 20100);
        assert_eq!(amount_minor_units(Decimal::from(100), 1).unwrap(), 10000);
    }
}
