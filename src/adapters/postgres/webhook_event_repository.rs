//! PostgreSQL implementation of WebhookEventRepository.
//!
//! `claim` is an insert-if-absent followed by a conditional UPDATE that only
//! succeeds for an unprocessed row with no live lease. Exactly one of several
//! concurrent deliveries sees the UPDATE affect its row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::db_error;
use crate::domain::billing::{ReconcileOutcome, WebhookEventRecord};
use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp};
use crate::ports::{ClaimOutcome, WebhookEventRepository};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: String,
    event_type: String,
    payload: serde_json::Value,
    processed: bool,
    processing_error: Option<String>,
    outcome: Option<String>,
    subscription_id: Option<Uuid>,
    claimed_at: Option<DateTime<Utc>>,
    attempts: i32,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<EventRow> for WebhookEventRecord {
    fn from(row: EventRow) -> Self {
        WebhookEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            payload: row.payload,
            processed: row.processed,
            processing_error: row.processing_error,
            outcome: row.outcome,
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            claimed_at: row.claimed_at.map(Timestamp::from_datetime),
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            received_at: Timestamp::from_datetime(row.received_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
        }
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn claim(
        &self,
        record: &WebhookEventRecord,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, payload, received_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.received_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("record webhook event"))?;

        let claimed = sqlx::query(
            r#"
            UPDATE webhook_events
            SET claimed_at = NOW(), attempts = attempts + 1
            WHERE event_id = $1
              AND NOT processed
              AND (claimed_at IS NULL OR claimed_at <= NOW() - make_interval(secs => $2))
            "#,
        )
        .bind(&record.event_id)
        .bind(lease.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(db_error("claim webhook event"))?;

        if claimed.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        let processed: bool =
            sqlx::query_scalar("SELECT processed FROM webhook_events WHERE event_id = $1")
                .bind(&record.event_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("read webhook event"))?;
        Ok(if processed {
            ClaimOutcome::AlreadyProcessed
        } else {
            ClaimOutcome::InFlight
        })
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        subscription_id: Option<SubscriptionId>,
        outcome: &ReconcileOutcome,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE webhook_events SET
                processed = TRUE,
                processed_at = NOW(),
                processing_error = NULL,
                outcome = $2,
                subscription_id = COALESCE($3, subscription_id),
                claimed_at = NULL
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(outcome.to_string())
        .bind(subscription_id.map(|id| *id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(db_error("mark webhook processed"))?;
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE webhook_events SET processing_error = $2, claimed_at = NULL WHERE event_id = $1",
        )
        .bind(event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_error("mark webhook failed"))?;
        Ok(())
    }

    async fn find(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, payload, processed, processing_error, outcome,
                   subscription_id, claimed_at, attempts, received_at, processed_at
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find webhook event"))?;
        Ok(row.map(WebhookEventRecord::from))
    }

    async fn count_failures_since(&self, since: Timestamp) -> Result<u64, DomainError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM webhook_events WHERE processing_error IS NOT NULL AND received_at >= $1",
        )
        .bind(since.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("count webhook failures"))?;
        Ok(n.max(0) as u64)
    }

    async fn purge_processed_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE processed AND received_at < $1")
            .bind(before.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("purge webhook events"))?;
        Ok(result.rows_affected())
    }
}
