use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::utils::error::AppError;

pub const OTP_PURPOSE_IDENTITY: &str = "identity";
pub const OTP_TTL_MINUTES: i64 = 5;
const OTP_DIGITS: usize = 6;
const GENERATION_RETRIES: u32 = 5;

#[derive(Debug, Clone, FromRow)]
pub struct OtpCode {
    pub id: Uuid,
    pub email: String,
    pub code: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

impl OtpCode {
    /// Issues a fresh code, retrying a few times to avoid colliding with
    /// another live code for the same purpose.
    pub async fn issue<'e, E>(executor: E, email: &str, purpose: &str) -> Result<String, AppError>
    where
        E: PgExecutor<'e> + Copy,
    {
        let cutoff = Utc::now() - Duration::minutes(OTP_TTL_MINUTES);

        let mut code = random_code();
        let mut retries = GENERATION_RETRIES;
        loop {
            let duplicate: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM otp_codes WHERE code = $1 AND purpose = $2 AND created_at >= $3",
            )
            .bind(&code)
            .bind(purpose)
            .bind(cutoff)
            .fetch_one(executor)
            .await?;

            if duplicate == 0 {
                break;
            }
            retries -= 1;
            if retries == 0 {
                return Err(AppError::InternalServerError(
                    "Failed to generate a unique OTP after multiple attempts".to_string(),
                ));
            }
            code = random_code();
        }

        sqlx::query("INSERT INTO otp_codes (email, code, purpose) VALUES ($1, $2, $3)")
            .bind(email)
            .bind(&code)
            .bind(purpose)
            .execute(executor)
            .await?;

        Ok(code)
    }

    /// True when an unexpired matching code exists. Expiry is a created-at
    /// cutoff; stale rows are ignored rather than eagerly deleted.
    pub async fn verify<'e>(
        executor: impl PgExecutor<'e>,
        email: &str,
        code: &str,
        purpose: &str,
    ) -> Result<bool, AppError> {
        let cutoff = Utc::now() - Duration::minutes(OTP_TTL_MINUTES);

        let matches: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_codes
             WHERE email = $1 AND code = $2 AND purpose = $3 AND created_at >= $4",
        )
        .bind(email)
        .bind(code)
        .bind(purpose)
        .bind(cutoff)
        .fetch_one(executor)
        .await?;

        Ok(matches > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_code_is_six_digits() {
        for _ in 0..50 {
            let code = random_code();
            assert_eq!(code.len(), OTP_DIGITS);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
