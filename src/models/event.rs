use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_account_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub venue: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

const EVENT_COLUMNS: &str =
    "id, organizer_account_id, title, description, venue, start_date, end_date, created_at";

impl Event {
    pub async fn find<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<Event, AppError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{}' was not found", id)))?;

        Ok(event)
    }

    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        organizer_account_id: Uuid,
        title: &str,
        description: Option<&str>,
        venue: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Event, AppError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO events (organizer_account_id, title, description, venue, start_date, end_date)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(organizer_account_id)
        .bind(title)
        .bind(description)
        .bind(venue)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(executor)
        .await?;

        Ok(event)
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_date < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event_ending(end: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            organizer_account_id: Uuid::new_v4(),
            title: "Test".to_string(),
            description: None,
            venue: "Hall".to_string(),
            start_date: end - Duration::hours(4),
            end_date: end,
            created_at: end - Duration::days(30),
        }
    }

    #[test]
    fn test_has_ended() {
        let now = Utc::now();
        assert!(event_ending(now - Duration::seconds(1)).has_ended(now));
        assert!(!event_ending(now + Duration::hours(1)).has_ended(now));
    }
}
