//! Redemption codes: the QR payload printed on a fulfilled ticket.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

const NONCE_LEN: usize = 8;

/// Binds tier + buyer + a timestamp nonce. The random suffix keeps codes
/// unique even when the same buyer's fulfillments land in the same
/// millisecond.
pub fn generate_redemption_code(tier_id: Uuid, buyer_id: Uuid, now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect();

    format!("{tier_id}-{buyer_id}-{}-{suffix}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_binds_tier_and_buyer() {
        let tier = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let code = generate_redemption_code(tier, buyer, Utc::now());
        assert!(code.contains(&tier.to_string()));
        assert!(code.contains(&buyer.to_string()));
    }

    #[test]
    fn test_codes_are_unique_at_the_same_instant() {
        let tier = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let now = Utc::now();
        let a = generate_redemption_code(tier, buyer, now);
        let b = generate_redemption_code(tier, buyer, now);
        assert_ne!(a, b);
    }
}
