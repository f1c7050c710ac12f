//! Heuristic risk scoring over the security-event trail.
//!
//! Each rule is an independent pure function over pre-gathered inputs; the
//! reducer evaluates them in a fixed order and sums the triggered weights.
//! Thresholds, windows, and weights live here as named constants so
//! operators can tune them without touching rule logic.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::models::account::Account;
use crate::models::identity::Identity;
use crate::models::security_event::SecurityEvent;
use crate::utils::error::AppError;

pub const OTP_VELOCITY_WINDOW_MINUTES: i64 = 15;
pub const OTP_VELOCITY_THRESHOLD: i64 = 6;
pub const OTP_VELOCITY_WEIGHT: i32 = 30;

pub const IDENTITY_FANOUT_WINDOW_HOURS: i64 = 24;
pub const IDENTITY_FANOUT_THRESHOLD: i64 = 4;
pub const IDENTITY_FANOUT_WEIGHT: i32 = 25;

pub const PURCHASE_BURST_WINDOW_HOURS: i64 = 1;
pub const PURCHASE_BURST_THRESHOLD: i64 = 4;
pub const PURCHASE_BURST_WEIGHT: i32 = 20;

/// Signals gathered per account before scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskInputs {
    /// OTP requests (any purpose) in the last 15 minutes.
    pub otp_requests: i64,
    /// Largest group of identities created from one IP in the last 24 hours.
    pub max_identities_same_ip: i64,
    /// Distinct events purchased for in the last hour.
    pub distinct_purchase_events: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub score: i32,
    pub reasons: Vec<String>,
}

fn otp_velocity_rule(inputs: &RiskInputs) -> Option<(i32, String)> {
    (inputs.otp_requests >= OTP_VELOCITY_THRESHOLD).then(|| {
        (
            OTP_VELOCITY_WEIGHT,
            format!("High OTP volume in 15m ({})", inputs.otp_requests),
        )
    })
}

fn identity_fanout_rule(inputs: &RiskInputs) -> Option<(i32, String)> {
    (inputs.max_identities_same_ip >= IDENTITY_FANOUT_THRESHOLD).then(|| {
        (
            IDENTITY_FANOUT_WEIGHT,
            format!(
                "Multiple identities from same IP in 24h ({})",
                inputs.max_identities_same_ip
            ),
        )
    })
}

fn purchase_burst_rule(inputs: &RiskInputs) -> Option<(i32, String)> {
    (inputs.distinct_purchase_events >= PURCHASE_BURST_THRESHOLD).then(|| {
        (
            PURCHASE_BURST_WEIGHT,
            format!(
                "Purchases across many events in 1h ({})",
                inputs.distinct_purchase_events
            ),
        )
    })
}

/// Fixed-order reducer: OTP velocity, then identity fan-out, then purchase
/// burst. Reasons come out in the same order.
pub fn score(inputs: &RiskInputs) -> RiskAssessment {
    let rules: [fn(&RiskInputs) -> Option<(i32, String)>; 3] =
        [otp_velocity_rule, identity_fanout_rule, purchase_burst_rule];

    let mut total = 0;
    let mut reasons = Vec::new();
    for rule in rules {
        if let Some((weight, reason)) = rule(inputs) {
            total += weight;
            reasons.push(reason);
        }
    }

    RiskAssessment {
        score: total,
        reasons,
    }
}

/// Largest same-IP group among the given identities. Identities with no
/// recorded creation IP are skipped.
pub fn max_ip_fanout(identities: &[Identity]) -> i64 {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for identity in identities {
        if let Some(ip) = identity.created_ip.as_deref() {
            *counts.entry(ip).or_insert(0) += 1;
        }
    }
    counts.values().copied().max().unwrap_or(0)
}

pub async fn gather_inputs(
    pool: &PgPool,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<RiskInputs, AppError> {
    let otp_cutoff = now - Duration::minutes(OTP_VELOCITY_WINDOW_MINUTES);
    let otp_requests =
        SecurityEvent::count_otp_requests(pool, account.id, &account.email, otp_cutoff).await?;

    let identity_cutoff = now - Duration::hours(IDENTITY_FANOUT_WINDOW_HOURS);
    let identities = Identity::created_since(pool, account.id, identity_cutoff).await?;
    let max_identities_same_ip = max_ip_fanout(&identities);

    let purchase_cutoff = now - Duration::hours(PURCHASE_BURST_WINDOW_HOURS);
    let distinct_purchase_events =
        SecurityEvent::count_distinct_purchase_events(pool, account.id, purchase_cutoff).await?;

    Ok(RiskInputs {
        otp_requests,
        max_identities_same_ip,
        distinct_purchase_events,
    })
}

/// On-demand assessment for one account. Read-only: persisting the result is
/// the caller's business.
pub async fn score_account(
    pool: &PgPool,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<RiskAssessment, AppError> {
    let inputs = gather_inputs(pool, account, now).await?;
    Ok(score(&inputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn inputs(otp: i64, fanout: i64, burst: i64) -> RiskInputs {
        RiskInputs {
            otp_requests: otp,
            max_identities_same_ip: fanout,
            distinct_purchase_events: burst,
        }
    }

    #[test]
    fn test_quiet_account_scores_zero() {
        let assessment = score(&inputs(0, 0, 0));
        assert_eq!(assessment.score, 0);
        assert!(assessment.reasons.is_empty());
    }

    #[test]
    fn test_otp_velocity_triggers_at_threshold() {
        assert_eq!(score(&inputs(5, 0, 0)).score, 0);
        let assessment = score(&inputs(6, 0, 0));
        assert_eq!(assessment.score, OTP_VELOCITY_WEIGHT);
        assert_eq!(assessment.reasons, vec!["High OTP volume in 15m (6)"]);
    }

    #[test]
    fn test_seven_otp_requests_scenario() {
        let assessment = score(&inputs(7, 0, 0));
        assert_eq!(assessment.score, 30);
        assert_eq!(assessment.reasons, vec!["High OTP volume in 15m (7)"]);
    }

    #[test]
    fn test_identity_fanout_triggers_at_threshold() {
        assert_eq!(score(&inputs(0, 3, 0)).score, 0);
        let assessment = score(&inputs(0, 4, 0));
        assert_eq!(assessment.score, IDENTITY_FANOUT_WEIGHT);
        assert_eq!(
            assessment.reasons,
            vec!["Multiple identities from same IP in 24h (4)"]
        );
    }

    #[test]
    fn test_purchase_burst_triggers_at_threshold() {
        assert_eq!(score(&inputs(0, 0, 3)).score, 0);
        let assessment = score(&inputs(0, 0, 4));
        assert_eq!(assessment.score, PURCHASE_BURST_WEIGHT);
        assert_eq!(
            assessment.reasons,
            vec!["Purchases across many events in 1h (4)"]
        );
    }

    #[test]
    fn test_all_rules_sum_in_evaluation_order() {
        let assessment = score(&inputs(10, 5, 6));
        assert_eq!(
            assessment.score,
            OTP_VELOCITY_WEIGHT + IDENTITY_FANOUT_WEIGHT + PURCHASE_BURST_WEIGHT
        );
        assert_eq!(
            assessment.reasons,
            vec![
                "High OTP volume in 15m (10)",
                "Multiple identities from same IP in 24h (5)",
                "Purchases across many events in 1h (6)",
            ]
        );
    }

    #[test]
    fn test_more_events_never_lower_a_rule_contribution() {
        let mut previous = 0;
        for otp in 0..20 {
            let current = score(&inputs(otp, 0, 0)).score;
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_max_ip_fanout_ignores_missing_ips() {
        let make = |ip: Option<&str>| Identity {
            id: Uuid::new_v4(),
            owner_account_id: Uuid::new_v4(),
            name: "n".to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            phone: "1".to_string(),
            verified_at: None,
            status: "active".to_string(),
            created_ip: ip.map(str::to_string),
            created_user_agent: None,
            created_at: Utc::now(),
        };

        let identities = vec![
            make(Some("10.0.0.1")),
            make(Some("10.0.0.1")),
            make(Some("10.0.0.2")),
            make(None),
        ];
        assert_eq!(max_ip_fanout(&identities), 2);
        assert_eq!(max_ip_fanout(&[]), 0);
    }
}
