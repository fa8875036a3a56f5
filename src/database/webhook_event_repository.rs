use crate::database::error::DatabaseError;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const COLUMNS: &str = "id, event_id, provider, payload, signature, verified, provider_ref, \
     external_ref, processed, attempts, last_error, received_at, processed_at";

/// A stored provider callback. Unverified events are kept for audit but are
/// never applied to a payment record; `processed` flips exactly once.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEventRow {
    pub id: Uuid,
    pub event_id: String,
    pub provider: String,
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    pub verified: bool,
    pub provider_ref: Option<String>,
    pub external_ref: Option<String>,
    pub processed: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct NewWebhookEvent<'a> {
    pub event_id: &'a str,
    pub provider: &'a str,
    pub payload: serde_json::Value,
    pub signature: Option<&'a str>,
    pub verified: bool,
    pub provider_ref: Option<&'a str>,
    pub external_ref: Option<&'a str>,
}

pub struct WebhookEventRepository {
    pool: PgPool,
}

impl WebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records a delivery. Providers redeliver, so `event_id` collisions are
    /// normal; the boolean reports whether this delivery was the first.
    pub async fn log_event(
        &self,
        event: NewWebhookEvent<'_>,
    ) -> Result<(WebhookEventRow, bool), DatabaseError> {
        let inserted = sqlx::query_as::<_, WebhookEventRow>(&format!(
            "INSERT INTO webhook_events \
             (event_id, provider, payload, signature, verified, provider_ref, external_ref) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (event_id) DO NOTHING \
             RETURNING {COLUMNS}"
        ))
        .bind(event.event_id)
        .bind(event.provider)
        .bind(&event.payload)
        .bind(event.signature)
        .bind(event.verified)
        .bind(event.provider_ref)
        .bind(event.external_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        let existing = sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {COLUMNS} FROM webhook_events WHERE event_id = $1"
        ))
        .bind(event.event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok((existing, false))
    }

    /// Flips `processed`, guarded so a concurrent replay worker and the
    /// inline handler cannot both claim the same event.
    pub async fn mark_processed(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE webhook_events \
             SET processed = TRUE, processed_at = NOW() \
             WHERE id = $1 AND processed = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE webhook_events \
             SET attempts = attempts + 1, last_error = $2 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    /// Verified events that have not been applied yet, for the replay
    /// worker. Capped attempts keep a poison event from looping forever.
    pub async fn find_unprocessed(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<WebhookEventRow>, DatabaseError> {
        sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {COLUMNS} FROM webhook_events \
             WHERE processed = FALSE AND verified = TRUE AND attempts < $1 \
             ORDER BY received_at ASC \
             LIMIT $2"
        ))
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRow>, DatabaseError> {
        sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {COLUMNS} FROM webhook_events WHERE event_id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
