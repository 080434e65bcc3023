use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use marche_catalog::{BoxRateTable, Shipping};
use marche_order::{RepositoryError, ShippingRepository};
use crate::error::storage_error;

const COLUMNS: &str = "id, coordinator_id, name, is_default, box60, box80, box100, has_free_shipping, free_shipping_rates, created_at, updated_at";

pub struct PgShippingRepository {
    pool: PgPool,
}

impl PgShippingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShippingRow {
    id: Uuid,
    coordinator_id: Uuid,
    name: String,
    is_default: bool,
    box60: Json<BoxRateTable>,
    box80: Json<BoxRateTable>,
    box100: Json<BoxRateTable>,
    has_free_shipping: bool,
    free_shipping_rates: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ShippingRow> for Shipping {
    fn from(row: ShippingRow) -> Self {
        Shipping {
            id: row.id,
            coordinator_id: row.coordinator_id,
            name: row.name,
            is_default: row.is_default,
            box60: row.box60.0,
            box80: row.box80.0,
            box100: row.box100.0,
            has_free_shipping: row.has_free_shipping,
            free_shipping_rates: row.free_shipping_rates,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn db(err: sqlx::Error) -> RepositoryError {
    storage_error("shipping", err)
}

#[async_trait]
impl ShippingRepository for PgShippingRepository {
    async fn get_default(&self, coordinator_id: Uuid) -> Result<Option<Shipping>, RepositoryError> {
        let row: Option<ShippingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM shippings WHERE coordinator_id = $1 AND is_default",
            COLUMNS
        ))
        .bind(coordinator_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        Ok(row.map(Shipping::from))
    }

    async fn list(&self, coordinator_id: Uuid) -> Result<Vec<Shipping>, RepositoryError> {
        let rows: Vec<ShippingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM shippings WHERE coordinator_id = $1 ORDER BY created_at, id",
            COLUMNS
        ))
        .bind(coordinator_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(Shipping::from).collect())
    }

    async fn save(&self, shipping: &Shipping) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        if shipping.is_default {
            sqlx::query("UPDATE shippings SET is_default = FALSE WHERE coordinator_id = $1 AND id <> $2 AND is_default")
                .bind(shipping.coordinator_id)
                .bind(shipping.id)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
        }

        sqlx::query(
            r#"
            INSERT INTO shippings (id, coordinator_id, name, is_default, box60, box80, box100,
                has_free_shipping, free_shipping_rates, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                is_default = EXCLUDED.is_default,
                box60 = EXCLUDED.box60,
                box80 = EXCLUDED.box80,
                box100 = EXCLUDED.box100,
                has_free_shipping = EXCLUDED.has_free_shipping,
                free_shipping_rates = EXCLUDED.free_shipping_rates,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(shipping.id)
        .bind(shipping.coordinator_id)
        .bind(&shipping.name)
        .bind(shipping.is_default)
        .bind(Json(&shipping.box60))
        .bind(Json(&shipping.box80))
        .bind(Json(&shipping.box100))
        .bind(shipping.has_free_shipping)
        .bind(shipping.free_shipping_rates)
        .bind(shipping.created_at)
        .bind(shipping.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(())
    }
}
