use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use marche_catalog::{Promotion, PromotionTarget};
use marche_order::{PromotionRepository, RepositoryError};
use crate::error::{decode_error, storage_error};

const COLUMNS: &str = "id, title, code, public, target_coordinator_id, discount_type, discount_value, start_at, end_at, usage_limit, used_count, used_amount, created_at, updated_at";

pub struct PgPromotionRepository {
    pool: PgPool,
}

impl PgPromotionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PromotionRow {
    id: Uuid,
    title: String,
    code: String,
    public: bool,
    target_coordinator_id: Option<Uuid>,
    discount_type: String,
    discount_value: i64,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    usage_limit: Option<i64>,
    used_count: i64,
    used_amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = RepositoryError;

    fn try_from(row: PromotionRow) -> Result<Self, Self::Error> {
        Ok(Promotion {
            id: row.id,
            title: row.title,
            code: row.code,
            public: row.public,
            target: row.target_coordinator_id.map_or(PromotionTarget::AllShop, PromotionTarget::Shop),
            discount_type: row.discount_type.parse().map_err(decode_error)?,
            discount_value: row.discount_value,
            start_at: row.start_at,
            end_at: row.end_at,
            usage_limit: row.usage_limit,
            used_count: row.used_count,
            used_amount: row.used_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn db(err: sqlx::Error) -> RepositoryError {
    storage_error("promotion", err)
}

impl PgPromotionRepository {
    async fn exists(&self, id: Uuid) -> Result<bool, RepositoryError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM promotions WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }

    fn not_found(id: Uuid) -> RepositoryError {
        RepositoryError::NotFound {
            entity: "promotion",
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl PromotionRepository for PgPromotionRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Promotion>, RepositoryError> {
        let row: Option<PromotionRow> = sqlx::query_as(&format!("SELECT {} FROM promotions WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Promotion>, RepositoryError> {
        let row: Option<PromotionRow> = sqlx::query_as(&format!("SELECT {} FROM promotions WHERE code = $1", COLUMNS))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn save(&self, promotion: &Promotion) -> Result<(), RepositoryError> {
        let target = match promotion.target {
            PromotionTarget::AllShop => None,
            PromotionTarget::Shop(id) => Some(id),
        };

        // Usage counters are owned by try_consume/release and never overwritten here
        sqlx::query(
            r#"
            INSERT INTO promotions (id, title, code, public, target_coordinator_id, discount_type, discount_value,
                start_at, end_at, usage_limit, used_count, used_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                code = EXCLUDED.code,
                public = EXCLUDED.public,
                target_coordinator_id = EXCLUDED.target_coordinator_id,
                discount_type = EXCLUDED.discount_type,
                discount_value = EXCLUDED.discount_value,
                start_at = EXCLUDED.start_at,
                end_at = EXCLUDED.end_at,
                usage_limit = EXCLUDED.usage_limit,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(promotion.id)
        .bind(&promotion.title)
        .bind(&promotion.code)
        .bind(promotion.public)
        .bind(target)
        .bind(promotion.discount_type.as_str())
        .bind(promotion.discount_value)
        .bind(promotion.start_at)
        .bind(promotion.end_at)
        .bind(promotion.usage_limit)
        .bind(promotion.used_count)
        .bind(promotion.used_amount)
        .bind(promotion.created_at)
        .bind(promotion.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match storage_error("promotion code", e) {
            RepositoryError::Duplicate { entity, .. } => RepositoryError::Duplicate {
                entity,
                id: promotion.code.clone(),
            },
            other => other,
        })?;
        Ok(())
    }

    async fn try_consume(&self, id: Uuid, amount: i64, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        // Single conditional UPDATE: the row lock serialises concurrent consumers
        let result = sqlx::query(
            r#"
            UPDATE promotions
            SET used_count = used_count + 1, used_amount = used_amount + $2, updated_at = $3
            WHERE id = $1
              AND public
              AND start_at <= $3 AND $3 <= end_at
              AND (usage_limit IS NULL OR used_count < usage_limit)
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(Self::not_found(id))
        }
    }

    async fn release(&self, id: Uuid, amount: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE promotions
            SET used_count = GREATEST(used_count - 1, 0),
                used_amount = GREATEST(used_amount - $2, 0),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}
