//! PostgreSQL implementation of CheckoutSessionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_error, parse_column};
use crate::domain::billing::CheckoutSessionRecord;
use crate::domain::foundation::{DomainError, Money, SubscriptionId, Timestamp};
use crate::ports::CheckoutSessionRepository;

pub struct PostgresCheckoutSessionRepository {
    pool: PgPool,
}

impl PostgresCheckoutSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError> {
        let sql = format!(
            "SELECT {} FROM checkout_sessions WHERE {} ORDER BY created_at DESC LIMIT 1",
            COLUMNS, clause
        );
        let row: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find checkout session"))?;
        row.map(CheckoutSessionRecord::try_from).transpose()
    }
}

const COLUMNS: &str = "session_id, subscription_id, payment_intent_id, amount_cents, currency, \
                       status, checkout_url, last_error, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    subscription_id: Uuid,
    payment_intent_id: Option<String>,
    amount_cents: i64,
    currency: String,
    status: String,
    checkout_url: Option<String>,
    last_error: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for CheckoutSessionRecord {
    type Error = DomainError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(CheckoutSessionRecord {
            session_id: row.session_id,
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            payment_intent_id: row.payment_intent_id,
            amount: Money::from_cents(row.amount_cents),
            currency: row.currency,
            status: parse_column("checkout_session_status", &row.status)?,
            checkout_url: row.checkout_url,
            last_error: row.last_error,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl CheckoutSessionRepository for PostgresCheckoutSessionRepository {
    async fn save(&self, record: &CheckoutSessionRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO checkout_sessions (
                session_id, subscription_id, payment_intent_id, amount_cents, currency,
                status, checkout_url, last_error, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (session_id) DO UPDATE SET
                payment_intent_id = EXCLUDED.payment_intent_id,
                status = EXCLUDED.status,
                checkout_url = EXCLUDED.checkout_url,
                last_error = EXCLUDED.last_error,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.session_id)
        .bind(record.subscription_id.as_uuid())
        .bind(&record.payment_intent_id)
        .bind(record.amount.cents())
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(&record.checkout_url)
        .bind(&record.last_error)
        .bind(record.created_at.as_datetime())
        .bind(record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("save checkout session"))?;
        Ok(())
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError> {
        self.fetch_one_where("session_id = $1", session_id).await
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError> {
        self.fetch_one_where("payment_intent_id = $1", payment_intent_id)
            .await
    }

    async fn find_latest_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<CheckoutSessionRecord>, DomainError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM checkout_sessions WHERE subscription_id = $1 \
             ORDER BY created_at DESC LIMIT 1",
            COLUMNS
        ))
        .bind(subscription_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find checkout session"))?;
        row.map(CheckoutSessionRecord::try_from).transpose()
    }
}
