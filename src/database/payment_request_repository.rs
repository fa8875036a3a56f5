use crate::database::error::DatabaseError;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

const COLUMNS: &str = "id, external_ref, provider, direction, amount, currency, phone, note, \
     status, provider_ref, financial_txn_id, failure_reason, attempt_count, next_retry_at, \
     needs_review, review_reason, created_at, updated_at";

/// One row of the system of record. Status values are the lowercase state
/// machine words; every status mutation in this repository is guarded on the
/// previous status so concurrent writers cannot clobber each other.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRequestRow {
    pub id: Uuid,
    pub external_ref: String,
    pub provider: String,
    pub direction: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub phone: String,
    pub note: Option<String>,
    pub status: String,
    pub provider_ref: Option<String>,
    pub financial_txn_id: Option<String>,
    pub failure_reason: Option<String>,
    pub attempt_count: i32,
    pub next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

pub struct NewPaymentRequest<'a> {
    pub external_ref: &'a str,
    pub provider: &'a str,
    pub direction: &'a str,
    pub amount: BigDecimal,
    pub currency: &'a str,
    pub phone: &'a str,
    pub note: Option<&'a str>,
}

pub struct PaymentRequestRepository {
    pool: PgPool,
}

impl PaymentRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new record in `pending`, or returns the existing row when
    /// the (provider, direction, external_ref) tuple already exists. The
    /// boolean reports whether a row was created.
    pub async fn insert_pending(
        &self,
        req: NewPaymentRequest<'_>,
    ) -> Result<(PaymentRequestRow, bool), DatabaseError> {
        let inserted = sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "INSERT INTO payment_requests \
             (external_ref, provider, direction, amount, currency, phone, note, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending') \
             ON CONFLICT (provider, direction, external_ref) DO NOTHING \
             RETURNING {COLUMNS}"
        ))
        .bind(req.external_ref)
        .bind(req.provider)
        .bind(req.direction)
        .bind(&req.amount)
        .bind(req.currency)
        .bind(req.phone)
        .bind(req.note)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        // Conflict path: somebody (possibly us, on an earlier attempt)
        // already holds this tuple.
        let existing = sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {COLUMNS} FROM payment_requests \
             WHERE provider = $1 AND direction = $2 AND external_ref = $3"
        ))
        .bind(req.provider)
        .bind(req.direction)
        .bind(req.external_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok((existing, false))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRequestRow>, DatabaseError> {
        sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {COLUMNS} FROM payment_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<PaymentRequestRow>, DatabaseError> {
        sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {COLUMNS} FROM payment_requests WHERE external_ref = $1"
        ))
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_provider_ref(
        &self,
        provider: &str,
        provider_ref: &str,
    ) -> Result<Option<PaymentRequestRow>, DatabaseError> {
        sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {COLUMNS} FROM payment_requests \
             WHERE provider = $1 AND provider_ref = $2"
        ))
        .bind(provider)
        .bind(provider_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// pending -> submitted, recording the provider correlation id. Returns
    /// false when the row was not pending, which callers treat as an
    /// expected duplicate acknowledgment.
    pub async fn mark_submitted(
        &self,
        id: Uuid,
        provider_ref: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payment_requests \
             SET status = 'submitted', provider_ref = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(provider_ref)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// submitted -> succeeded|failed. The status guard makes concurrent push
    /// and pull reconciliation safe without any extra locking. Returns false
    /// when the row was no longer submitted.
    pub async fn complete_submitted(
        &self,
        id: Uuid,
        status: &str,
        financial_txn_id: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payment_requests \
             SET status = $2, \
                 financial_txn_id = COALESCE($3, financial_txn_id), \
                 failure_reason = $4, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'submitted'",
        )
        .bind(id)
        .bind(status)
        .bind(financial_txn_id)
        .bind(failure_reason)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// pending -> failed. Used for cancellation, permanent provider
    /// rejections, and the retry ceiling.
    pub async fn fail_pending(&self, id: Uuid, reason: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payment_requests \
             SET status = 'failed', failure_reason = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Bumps the attempt counter and books the next retry slot. Guarded on
    /// pending; a record that resolved in the meantime is left alone.
    pub async fn schedule_retry(
        &self,
        id: Uuid,
        next_retry_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payment_requests \
             SET attempt_count = attempt_count + 1, next_retry_at = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn flag_for_review(&self, id: Uuid, reason: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE payment_requests \
             SET needs_review = TRUE, review_reason = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    /// Pending rows with a due retry slot.
    pub async fn find_due_retries(
        &self,
        limit: i64,
    ) -> Result<Vec<PaymentRequestRow>, DatabaseError> {
        sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {COLUMNS} FROM payment_requests \
             WHERE status = 'pending' AND next_retry_at IS NOT NULL AND next_retry_at <= NOW() \
             ORDER BY next_retry_at ASC \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Pending rows that never got a provider acknowledgment and have no
    /// retry booked yet.
    pub async fn find_stale_pending(
        &self,
        older_than_secs: i32,
        limit: i64,
    ) -> Result<Vec<PaymentRequestRow>, DatabaseError> {
        sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {COLUMNS} FROM payment_requests \
             WHERE status = 'pending' AND next_retry_at IS NULL \
               AND created_at < NOW() - INTERVAL '1 second' * $1 \
             ORDER BY created_at ASC \
             LIMIT $2"
        ))
        .bind(older_than_secs)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Submitted rows past the grace period with no terminal outcome, due
    /// for an active status poll.
    pub async fn find_stale_submitted(
        &self,
        older_than_secs: i32,
        limit: i64,
    ) -> Result<Vec<PaymentRequestRow>, DatabaseError> {
        sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {COLUMNS} FROM payment_requests \
             WHERE status = 'submitted' \
               AND updated_at < NOW() - INTERVAL '1 second' * $1 \
             ORDER BY updated_at ASC \
             LIMIT $2"
        ))
        .bind(older_than_secs)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_needing_review(
        &self,
        limit: i64,
    ) -> Result<Vec<PaymentRequestRow>, DatabaseError> {
        sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {COLUMNS} FROM payment_requests \
             WHERE needs_review = TRUE \
             ORDER BY updated_at ASC \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
