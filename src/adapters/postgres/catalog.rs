//! PostgreSQL implementations of the catalog ports.
//!
//! Coupon counters only move through single conditional UPDATEs, so two
//! checkouts racing for the last use of a capped coupon cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::db_error;
use crate::domain::billing::{Coupon, CouponCode, Discount, PricingTier};
use crate::domain::foundation::{
    CouponId, DomainError, ErrorCode, Money, Percentage, TierId, Timestamp,
};
use crate::ports::{CouponRepository, PricingTierRepository};

// ════════════════════════════════════════════════════════════════════════════
// Pricing tiers
// ════════════════════════════════════════════════════════════════════════════

pub struct PostgresPricingTierRepository {
    pool: PgPool,
}

impl PostgresPricingTierRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TierRow {
    id: Uuid,
    name: String,
    slug: String,
    description: String,
    max_users: i32,
    monthly_cents: i64,
    annual_cents: Option<i64>,
    features: sqlx::types::Json<Vec<String>>,
    is_popular: bool,
    is_active: bool,
    sort_order: i32,
}

impl From<TierRow> for PricingTier {
    fn from(row: TierRow) -> Self {
        PricingTier {
            id: TierId::from_uuid(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
            max_users: u32::try_from(row.max_users).unwrap_or(0),
            monthly_price: Money::from_cents(row.monthly_cents),
            annual_price: row.annual_cents.map(Money::from_cents),
            features: row.features.0,
            is_popular: row.is_popular,
            is_active: row.is_active,
            sort_order: row.sort_order,
        }
    }
}

const TIER_COLUMNS: &str = "id, name, slug, description, max_users, monthly_cents, annual_cents, \
                            features, is_popular, is_active, sort_order";

#[async_trait]
impl PricingTierRepository for PostgresPricingTierRepository {
    async fn find_by_id(&self, id: &TierId) -> Result<Option<PricingTier>, DomainError> {
        let row: Option<TierRow> =
            sqlx::query_as(&format!("SELECT {} FROM pricing_tiers WHERE id = $1", TIER_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("find tier"))?;
        Ok(row.map(PricingTier::from))
    }

    async fn list_active(&self) -> Result<Vec<PricingTier>, DomainError> {
        let rows: Vec<TierRow> = sqlx::query_as(&format!(
            "SELECT {} FROM pricing_tiers WHERE is_active ORDER BY sort_order, name",
            TIER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list tiers"))?;
        Ok(rows.into_iter().map(PricingTier::from).collect())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Coupons
// ════════════════════════════════════════════════════════════════════════════

pub struct PostgresCouponRepository {
    pool: PgPool,
}

impl PostgresCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    name: String,
    description: String,
    discount_type: String,
    discount_value: i64,
    max_uses: Option<i32>,
    used_count: i32,
    minimum_cents: Option<i64>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    applicable_tiers: Vec<Uuid>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = DomainError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let discount = match row.discount_type.as_str() {
            "percentage" => Discount::Percentage(
                Percentage::try_from_basis_points(row.discount_value)?,
            ),
            "fixed" => Discount::Fixed(Money::from_cents(row.discount_value)),
            other => {
                return Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Invalid discount type value: {}", other),
                ))
            }
        };

        Ok(Coupon {
            id: CouponId::from_uuid(row.id),
            code: CouponCode::parse(&row.code)?,
            name: row.name,
            description: row.description,
            discount,
            max_uses: row.max_uses.and_then(|v| u32::try_from(v).ok()),
            used_count: u32::try_from(row.used_count).unwrap_or(0),
            minimum_amount: row.minimum_cents.map(Money::from_cents),
            valid_from: row.valid_from.map(Timestamp::from_datetime),
            valid_until: row.valid_until.map(Timestamp::from_datetime),
            applicable_tiers: row.applicable_tiers.into_iter().map(TierId::from_uuid).collect(),
            is_active: row.is_active,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[async_trait]
impl CouponRepository for PostgresCouponRepository {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, DomainError> {
        let row: Option<CouponRow> = sqlx::query_as(
            r#"
            SELECT c.id, c.code, c.name, c.description, c.discount_type, c.discount_value,
                   c.max_uses, c.used_count, c.minimum_cents, c.valid_from, c.valid_until,
                   c.is_active, c.created_at,
                   COALESCE(
                       ARRAY(SELECT ct.tier_id FROM coupon_tiers ct WHERE ct.coupon_id = c.id),
                       '{}'
                   ) AS applicable_tiers
            FROM coupons c
            WHERE c.code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find coupon"))?;
        row.map(Coupon::try_from).transpose()
    }

    async fn reserve_use(&self, id: &CouponId) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE coupons SET used_count = used_count + 1
            WHERE id = $1
              AND (max_uses IS NULL OR max_uses = 0 OR used_count < max_uses)
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error("reserve coupon use"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_use(&self, id: &CouponId) -> Result<(), DomainError> {
        sqlx::query("UPDATE coupons SET used_count = GREATEST(used_count - 1, 0) WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error("release coupon use"))?;
        Ok(())
    }
}
