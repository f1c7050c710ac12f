use axum::{
    routing::{get, post},
    Router,
};

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{admin, checkout, events, health_check, identity, purchases, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let cors = create_cors_layer(&state.config.allowed_origins);
    let security_headers = create_security_headers_layer(state.config.production);

    Router::new()
        .route("/health", get(health_check))
        .route("/identity/otp", post(identity::request_identity_otp))
        .route("/identity/verify", post(identity::verify_identity_otp))
        .route("/identity/mine", get(identity::my_identities))
        .route("/events", post(events::create_event))
        .route("/events/:event_id", get(events::get_event))
        .route(
            "/events/:event_id/tickets",
            post(tickets::create_tier).get(tickets::list_tiers),
        )
        .route("/tickets/:tier_id/checkout", post(checkout::initiate_checkout))
        .route(
            "/tickets/:tier_id/purchases/:purchase_id/use",
            post(checkout::mark_purchase_used),
        )
        .route("/purchases/mine", get(purchases::my_purchases))
        .route("/payments/webhook", post(checkout::payment_webhook))
        .route("/admin/purchases", get(purchases::all_purchases))
        .route("/admin/accounts/:account_id/risk", get(admin::account_risk))
        .route("/admin/accounts/:account_id/flag", post(admin::flag_account))
        .layer(security_headers)
        .layer(cors)
        .with_state(state)
}
