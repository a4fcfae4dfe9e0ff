//! PostgreSQL implementation of SubscriptionRepository.
//!
//! The duplicate-purchase guard takes a transaction-scoped advisory lock on
//! the normalized email, so the open-purchase check and the insert cannot
//! interleave with another checkout for the same address. Updates are a
//! compare-and-swap on `version`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{db_error, parse_column};
use crate::domain::billing::{Integration, IntegrationStatus, Subscription, SubscriptionStatus};
use crate::domain::foundation::{
    CouponId, DomainError, ErrorCode, Money, SubscriptionId, TierId, Timestamp,
};
use crate::ports::{InsertOutcome, IntegrationCounts, SubscriptionLookup, SubscriptionRepository};

const SELECT_COLUMNS: &str = r#"
    SELECT id, email, organization_name, contact_name, phone,
           tier_id, tier_name, billing_period,
           base_cents, discount_cents, final_cents, coupon_id, coupon_code, coupon_released,
           status, start_date, end_date, next_billing_date,
           customer_id, checkout_session_id, payment_intent_id,
           gateway_subscription_id, last_invoice_id, failure_reason,
           integration_status, organization_id, tenant_slug, integration_data,
           integration_error, integration_attempts, integration_updated_at,
           integration_claimed_at, created_at, updated_at, version
    FROM subscriptions
"#;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    email: String,
    organization_name: String,
    contact_name: String,
    phone: Option<String>,
    tier_id: Uuid,
    tier_name: String,
    billing_period: String,
    base_cents: i64,
    discount_cents: i64,
    final_cents: i64,
    coupon_id: Option<Uuid>,
    coupon_code: Option<String>,
    coupon_released: bool,
    status: String,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    next_billing_date: Option<DateTime<Utc>>,
    customer_id: Option<String>,
    checkout_session_id: Option<String>,
    payment_intent_id: Option<String>,
    gateway_subscription_id: Option<String>,
    last_invoice_id: Option<String>,
    failure_reason: Option<String>,
    integration_status: String,
    organization_id: Option<String>,
    tenant_slug: Option<String>,
    integration_data: Option<serde_json::Value>,
    integration_error: Option<String>,
    integration_attempts: i32,
    integration_updated_at: Option<DateTime<Utc>>,
    integration_claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            email: row.email,
            organization_name: row.organization_name,
            contact_name: row.contact_name,
            phone: row.phone,
            tier_id: TierId::from_uuid(row.tier_id),
            tier_name: row.tier_name,
            billing_period: parse_column("billing_period", &row.billing_period)?,
            base_amount: Money::from_cents(row.base_cents),
            discount_amount: Money::from_cents(row.discount_cents),
            final_amount: Money::from_cents(row.final_cents),
            coupon_id: row.coupon_id.map(CouponId::from_uuid),
            coupon_code: row.coupon_code,
            coupon_released: row.coupon_released,
            status: parse_column("status", &row.status)?,
            start_date: row.start_date.map(Timestamp::from_datetime),
            end_date: row.end_date.map(Timestamp::from_datetime),
            next_billing_date: row.next_billing_date.map(Timestamp::from_datetime),
            customer_id: row.customer_id,
            checkout_session_id: row.checkout_session_id,
            payment_intent_id: row.payment_intent_id,
            gateway_subscription_id: row.gateway_subscription_id,
            last_invoice_id: row.last_invoice_id,
            failure_reason: row.failure_reason,
            integration: Integration {
                status: parse_column("integration_status", &row.integration_status)?,
                organization_id: row.organization_id,
                tenant_slug: row.tenant_slug,
                data: row.integration_data,
                error: row.integration_error,
                attempts: u32::try_from(row.integration_attempts).unwrap_or(0),
                updated_at: row.integration_updated_at.map(Timestamp::from_datetime),
                claimed_at: row.integration_claimed_at.map(Timestamp::from_datetime),
            },
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            version: row.version,
        })
    }
}

fn lookup_clause(lookup: &SubscriptionLookup) -> (&'static str, LookupValue<'_>) {
    match lookup {
        SubscriptionLookup::Id(id) => ("id = ", LookupValue::Uuid(*id.as_uuid())),
        SubscriptionLookup::CheckoutSession(v) => ("checkout_session_id = ", LookupValue::Text(v)),
        SubscriptionLookup::PaymentIntent(v) => ("payment_intent_id = ", LookupValue::Text(v)),
        SubscriptionLookup::GatewaySubscription(v) => {
            ("gateway_subscription_id = ", LookupValue::Text(v))
        }
        SubscriptionLookup::OrganizationId(v) => ("organization_id = ", LookupValue::Text(v)),
        SubscriptionLookup::TenantSlug(v) => ("tenant_slug = ", LookupValue::Text(v)),
        SubscriptionLookup::LatestForEmail(v) => (
            "email_normalized = ",
            LookupValue::Owned(crate::domain::billing::normalize_email(v)),
        ),
    }
}

enum LookupValue<'a> {
    Uuid(Uuid),
    Text(&'a str),
    Owned(String),
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert_if_no_open_purchase(
        &self,
        subscription: &Subscription,
    ) -> Result<InsertOutcome, DomainError> {
        let email = subscription.normalized_email();
        let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&email)
            .execute(&mut *tx)
            .await
            .map_err(db_error("lock email"))?;

        let open: Vec<&str> = SubscriptionStatus::OPEN_PURCHASE
            .iter()
            .map(|s| s.as_str())
            .collect();
        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM subscriptions
            WHERE email_normalized = $1 AND status = ANY($2)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&email)
        .bind(&open)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("check open purchase"))?;

        if let Some(id) = existing {
            tx.rollback().await.map_err(db_error("rollback"))?;
            return Ok(InsertOutcome::OpenPurchaseExists(SubscriptionId::from_uuid(id)));
        }

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, email, email_normalized, organization_name, contact_name, phone,
                tier_id, tier_name, billing_period,
                base_cents, discount_cents, final_cents, coupon_id, coupon_code,
                status, customer_id, integration_status, created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(&subscription.email)
        .bind(&email)
        .bind(&subscription.organization_name)
        .bind(&subscription.contact_name)
        .bind(&subscription.phone)
        .bind(subscription.tier_id.as_uuid())
        .bind(&subscription.tier_name)
        .bind(subscription.billing_period.as_str())
        .bind(subscription.base_amount.cents())
        .bind(subscription.discount_amount.cents())
        .bind(subscription.final_amount.cents())
        .bind(subscription.coupon_id.map(|c| *c.as_uuid()))
        .bind(&subscription.coupon_code)
        .bind(subscription.status.as_str())
        .bind(&subscription.customer_id)
        .bind(subscription.integration.status.as_str())
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.version)
        .execute(&mut *tx)
        .await
        .map_err(db_error("insert subscription"))?;

        tx.commit().await.map_err(db_error("commit subscription"))?;
        Ok(InsertOutcome::Inserted)
    }

    async fn update(&self, subscription: &mut Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $3,
                start_date = $4,
                end_date = $5,
                next_billing_date = $6,
                customer_id = $7,
                checkout_session_id = $8,
                payment_intent_id = $9,
                gateway_subscription_id = $10,
                last_invoice_id = $11,
                failure_reason = $12,
                integration_status = $13,
                organization_id = $14,
                tenant_slug = $15,
                integration_data = $16,
                integration_error = $17,
                integration_attempts = $18,
                integration_updated_at = $19,
                coupon_id = $20,
                coupon_code = $21,
                updated_at = $22,
                integration_claimed_at = $23,
                coupon_released = $24,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.version)
        .bind(subscription.status.as_str())
        .bind(subscription.start_date.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.end_date.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.next_billing_date.as_ref().map(Timestamp::as_datetime))
        .bind(&subscription.customer_id)
        .bind(&subscription.checkout_session_id)
        .bind(&subscription.payment_intent_id)
        .bind(&subscription.gateway_subscription_id)
        .bind(&subscription.last_invoice_id)
        .bind(&subscription.failure_reason)
        .bind(subscription.integration.status.as_str())
        .bind(&subscription.integration.organization_id)
        .bind(&subscription.integration.tenant_slug)
        .bind(&subscription.integration.data)
        .bind(&subscription.integration.error)
        .bind(i32::try_from(subscription.integration.attempts).unwrap_or(i32::MAX))
        .bind(subscription.integration.updated_at.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.coupon_id.map(|c| *c.as_uuid()))
        .bind(&subscription.coupon_code)
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.integration.claimed_at.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.coupon_released)
        .execute(&self.pool)
        .await
        .map_err(db_error("update subscription"))?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subscriptions WHERE id = $1)")
                    .bind(subscription.id.as_uuid())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(db_error("check subscription"))?;
            return Err(if exists {
                DomainError::new(
                    ErrorCode::ConcurrentModification,
                    format!("subscription {} was modified concurrently", subscription.id),
                )
            } else {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("subscription {} not found", subscription.id),
                )
            });
        }

        subscription.version += 1;
        Ok(())
    }

    async fn find(&self, lookup: &SubscriptionLookup) -> Result<Option<Subscription>, DomainError> {
        let (clause, value) = lookup_clause(lookup);
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(SELECT_COLUMNS);
        query.push(" WHERE ").push(clause);
        match value {
            LookupValue::Uuid(id) => query.push_bind(id),
            LookupValue::Text(v) => query.push_bind(v),
            LookupValue::Owned(v) => query.push_bind(v),
        };
        query.push(" ORDER BY created_at DESC LIMIT 1");

        let row: Option<SubscriptionRow> = query
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find subscription"))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn list_active_by_integration(
        &self,
        statuses: &[IntegrationStatus],
        created_after: Option<Timestamp>,
    ) -> Result<Vec<Subscription>, DomainError> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(SELECT_COLUMNS);
        query
            .push(" WHERE status = 'active' AND integration_status = ANY(")
            .push_bind(statuses)
            .push(")");
        if let Some(after) = created_after {
            query.push(" AND created_at >= ").push_bind(*after.as_datetime());
        }
        query.push(" ORDER BY created_at ASC");

        let rows: Vec<SubscriptionRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list subscriptions"))?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn integration_counts(&self) -> Result<IntegrationCounts, DomainError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT integration_status, COUNT(*)
            FROM subscriptions
            WHERE status = 'active'
            GROUP BY integration_status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("count integrations"))?;

        let mut counts = IntegrationCounts::default();
        for (status, n) in rows {
            let n = n.max(0) as u64;
            counts.total += n;
            match parse_column("integration_status", &status)? {
                IntegrationStatus::NotStarted => counts.not_started += n,
                IntegrationStatus::Pending => counts.pending += n,
                IntegrationStatus::Completed => counts.completed += n,
                IntegrationStatus::Failed => counts.failed += n,
                IntegrationStatus::Cancelled => counts.cancelled += n,
            }
        }
        Ok(counts)
    }

    async fn count_failed_integrations_since(&self, since: Timestamp) -> Result<u64, DomainError> {
        let n: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM subscriptions
            WHERE status = 'active' AND integration_status = 'failed' AND updated_at >= $1
            "#,
        )
        .bind(since.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("count failed integrations"))?;
        Ok(n.max(0) as u64)
    }

    async fn count_awaiting_payment_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let n: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM subscriptions
            WHERE status IN ('pending', 'processing') AND created_at < $1
            "#,
        )
        .bind(before.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("count pending payments"))?;
        Ok(n.max(0) as u64)
    }
}
