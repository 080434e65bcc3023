use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use marche_catalog::{BoxWeights, Experience, Product};
use marche_order::{ProductRepository, RepositoryError};
use crate::error::{decode_error, out_of_range, storage_error};

pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    coordinator_id: Uuid,
    producer_id: Uuid,
    name: String,
    price: i64,
    delivery_type: String,
    box60_weight: i32,
    box80_weight: i32,
    box100_weight: i32,
    is_public: bool,
}

#[derive(sqlx::FromRow)]
struct ExperienceRow {
    id: Uuid,
    coordinator_id: Uuid,
    title: String,
    adult_price: i64,
    child_price: i64,
    is_public: bool,
}

fn weight(column: &'static str, value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| out_of_range(column, value as i64))
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: row.id,
            coordinator_id: row.coordinator_id,
            producer_id: row.producer_id,
            name: row.name,
            price: row.price,
            delivery_type: row.delivery_type.parse().map_err(decode_error)?,
            box_weights: BoxWeights::new(
                weight("box60_weight", row.box60_weight)?,
                weight("box80_weight", row.box80_weight)?,
                weight("box100_weight", row.box100_weight)?,
            ),
            is_public: row.is_public,
        })
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, coordinator_id, producer_id, name, price, delivery_type, box60_weight, box80_weight, box100_weight, is_public FROM products WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("product", e))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_experience(&self, id: Uuid) -> Result<Option<Experience>, RepositoryError> {
        let row: Option<ExperienceRow> = sqlx::query_as(
            "SELECT id, coordinator_id, title, adult_price, child_price, is_public FROM experiences WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("experience", e))?;

        Ok(row.map(|r| Experience {
            id: r.id,
            coordinator_id: r.coordinator_id,
            title: r.title,
            adult_price: r.adult_price,
            child_price: r.child_price,
            is_public: r.is_public,
        }))
    }
}
