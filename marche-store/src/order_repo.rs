use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use marche_catalog::{BoxSize, DeliveryType};
use marche_core::Address;
use marche_order::{
    FulfillmentStatus, Order, OrderExperience, OrderFilter, OrderFulfillment, OrderItem, OrderPayment, OrderRefund,
    OrderRepository, PromotionRelease, RepositoryError, ShippingCarrier, ShippingMethod,
};
use crate::error::{decode_error, out_of_range, storage_error};

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    coordinator_id: Uuid,
    promotion_id: Option<Uuid>,
    order_type: String,
    status: String,
    shipping_message: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    transaction_id: Option<String>,
    method: String,
    status: String,
    subtotal: i64,
    discount: i64,
    shipping_fee: i64,
    shipping_discount: i64,
    tax: i64,
    total: i64,
    authorized_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct RefundRow {
    description: String,
    total: i64,
    refunded_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct FulfillmentRow {
    id: Uuid,
    order_id: Uuid,
    box_number: i32,
    box_size: i16,
    box_rate: i16,
    delivery_type: String,
    status: String,
    shipping_carrier: String,
    tracking_number: Option<String>,
    shipping_method: String,
    shipping_fee: i64,
    shipped_at: Option<DateTime<Utc>>,
    address: Json<Address>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    fulfillment_id: Uuid,
    product_id: Uuid,
    product_name: String,
    price: i64,
    quantity: i32,
}

#[derive(sqlx::FromRow)]
struct ExperienceRow {
    experience_id: Uuid,
    adult_count: i32,
    adult_price: i64,
    child_count: i32,
    child_price: i64,
    scheduled_on: NaiveDate,
    remarks: Option<String>,
}

fn to_u32(column: &'static str, value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| out_of_range(column, value as i64))
}

impl TryFrom<PaymentRow> for OrderPayment {
    type Error = RepositoryError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(OrderPayment {
            transaction_id: row.transaction_id,
            method: row.method.parse().map_err(decode_error)?,
            status: row.status.parse().map_err(decode_error)?,
            subtotal: row.subtotal,
            discount: row.discount,
            shipping_fee: row.shipping_fee,
            shipping_discount: row.shipping_discount,
            tax: row.tax,
            total: row.total,
            authorized_at: row.authorized_at,
            paid_at: row.paid_at,
            refunded_at: row.refunded_at,
        })
    }
}

impl TryFrom<FulfillmentRow> for OrderFulfillment {
    type Error = RepositoryError;

    fn try_from(row: FulfillmentRow) -> Result<Self, Self::Error> {
        let box_rate = u8::try_from(row.box_rate).map_err(|_| out_of_range("box_rate", row.box_rate as i64))?;
        Ok(OrderFulfillment {
            id: row.id,
            order_id: row.order_id,
            box_number: to_u32("box_number", row.box_number)?,
            box_size: BoxSize::from_i16(row.box_size).map_err(decode_error)?,
            box_rate,
            delivery_type: row.delivery_type.parse::<DeliveryType>().map_err(decode_error)?,
            status: row.status.parse::<FulfillmentStatus>().map_err(decode_error)?,
            shipping_carrier: row.shipping_carrier.parse::<ShippingCarrier>().map_err(decode_error)?,
            tracking_number: row.tracking_number,
            shipping_method: row.shipping_method.parse::<ShippingMethod>().map_err(decode_error)?,
            shipping_fee: row.shipping_fee,
            shipped_at: row.shipped_at,
            address: row.address.0,
        })
    }
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            fulfillment_id: row.fulfillment_id,
            product_id: row.product_id,
            product_name: row.product_name,
            price: row.price,
            quantity: to_u32("quantity", row.quantity)?,
        })
    }
}

impl TryFrom<ExperienceRow> for OrderExperience {
    type Error = RepositoryError;

    fn try_from(row: ExperienceRow) -> Result<Self, Self::Error> {
        Ok(OrderExperience {
            experience_id: row.experience_id,
            adult_count: to_u32("adult_count", row.adult_count)?,
            adult_price: row.adult_price,
            child_count: to_u32("child_count", row.child_count)?,
            child_price: row.child_price,
            scheduled_on: row.scheduled_on,
            remarks: row.remarks,
        })
    }
}

fn db(err: sqlx::Error) -> RepositoryError {
    storage_error("order", err)
}

async fn insert_children(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), RepositoryError> {
    let p = &order.payment;
    sqlx::query(
        r#"
        INSERT INTO order_payments (order_id, transaction_id, method, status, subtotal, discount, shipping_fee,
            shipping_discount, tax, total, authorized_at, paid_at, refunded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(order.id)
    .bind(&p.transaction_id)
    .bind(p.method.as_str())
    .bind(p.status.as_str())
    .bind(p.subtotal)
    .bind(p.discount)
    .bind(p.shipping_fee)
    .bind(p.shipping_discount)
    .bind(p.tax)
    .bind(p.total)
    .bind(p.authorized_at)
    .bind(p.paid_at)
    .bind(p.refunded_at)
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    for f in &order.fulfillments {
        sqlx::query(
            r#"
            INSERT INTO order_fulfillments (id, order_id, box_number, box_size, box_rate, delivery_type, status,
                shipping_carrier, tracking_number, shipping_method, shipping_fee, shipped_at, address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(f.id)
        .bind(order.id)
        .bind(to_i32("box_number", f.box_number)?)
        .bind(f.box_size.as_i16())
        .bind(f.box_rate as i16)
        .bind(f.delivery_type.as_str())
        .bind(f.status.as_str())
        .bind(f.shipping_carrier.as_str())
        .bind(&f.tracking_number)
        .bind(f.shipping_method.as_str())
        .bind(f.shipping_fee)
        .bind(f.shipped_at)
        .bind(Json(&f.address))
        .execute(&mut **tx)
        .await
        .map_err(db)?;
    }

    for item in &order.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, fulfillment_id, product_id, product_name, price, quantity)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id)
        .bind(order.id)
        .bind(item.fulfillment_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.price)
        .bind(to_i32("quantity", item.quantity)?)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
    }

    if let Some(e) = &order.experience {
        sqlx::query(
            r#"
            INSERT INTO order_experiences (order_id, experience_id, adult_count, adult_price, child_count,
                child_price, scheduled_on, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id)
        .bind(e.experience_id)
        .bind(to_i32("adult_count", e.adult_count)?)
        .bind(e.adult_price)
        .bind(to_i32("child_count", e.child_count)?)
        .bind(e.child_price)
        .bind(e.scheduled_on)
        .bind(&e.remarks)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
    }

    insert_refund(tx, order).await
}

async fn insert_refund(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), RepositoryError> {
    if let Some(refund) = &order.refund {
        sqlx::query(
            r#"
            INSERT INTO order_refunds (order_id, description, total, refunded_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(&refund.description)
        .bind(refund.total)
        .bind(refund.refunded_at)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
    }
    Ok(())
}

/// Give back one promotion use inside the order's transaction.
async fn release_promotion(
    tx: &mut Transaction<'_, Postgres>,
    release: &PromotionRelease,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r#"
        UPDATE promotions
        SET used_count = GREATEST(used_count - 1, 0),
            used_amount = GREATEST(used_amount - $2, 0),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(release.promotion_id)
    .bind(release.amount)
    .execute(&mut **tx)
    .await
    .map_err(|e| storage_error("promotion", e))?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound {
            entity: "promotion",
            id: release.promotion_id.to_string(),
        });
    }
    Ok(())
}

fn to_i32(column: &'static str, value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| RepositoryError::Storage(format!("{} does not fit a column: {}", column, value)))
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, coordinator_id, promotion_id, order_type, status, shipping_message,
                version, created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.coordinator_id)
        .bind(order.promotion_id)
        .bind(order.order_type.as_str())
        .bind(order.status.as_str())
        .bind(&order.shipping_message)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        insert_children(&mut tx, order).await?;

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, user_id, coordinator_id, promotion_id, order_type, status, shipping_message, version, created_at, updated_at, completed_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payment: PaymentRow = sqlx::query_as(
            "SELECT transaction_id, method, status, subtotal, discount, shipping_fee, shipping_discount, tax, total, authorized_at, paid_at, refunded_at FROM order_payments WHERE order_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;

        let refund: Option<RefundRow> =
            sqlx::query_as("SELECT description, total, refunded_at FROM order_refunds WHERE order_id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;

        let fulfillments: Vec<FulfillmentRow> = sqlx::query_as(
            "SELECT id, order_id, box_number, box_size, box_rate, delivery_type, status, shipping_carrier, tracking_number, shipping_method, shipping_fee, shipped_at, address FROM order_fulfillments WHERE order_id = $1 ORDER BY box_number",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let items: Vec<ItemRow> = sqlx::query_as(
            "SELECT i.id, i.order_id, i.fulfillment_id, i.product_id, i.product_name, i.price, i.quantity FROM order_items i JOIN order_fulfillments f ON f.id = i.fulfillment_id WHERE i.order_id = $1 ORDER BY f.box_number, i.id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let experience: Option<ExperienceRow> = sqlx::query_as(
            "SELECT experience_id, adult_count, adult_price, child_count, child_price, scheduled_on, remarks FROM order_experiences WHERE order_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        Ok(Some(Order {
            id: row.id,
            user_id: row.user_id,
            coordinator_id: row.coordinator_id,
            promotion_id: row.promotion_id,
            order_type: row.order_type.parse().map_err(decode_error)?,
            status: row.status.parse().map_err(decode_error)?,
            payment: OrderPayment::try_from(payment)?,
            refund: refund.map(|r| OrderRefund {
                description: r.description,
                total: r.total,
                refunded_at: r.refunded_at,
            }),
            fulfillments: fulfillments
                .into_iter()
                .map(OrderFulfillment::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            items: items.into_iter().map(OrderItem::try_from).collect::<Result<Vec<_>, _>>()?,
            experience: experience.map(OrderExperience::try_from).transpose()?,
            shipping_message: row.shipping_message,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        }))
    }

    async fn update(
        &self,
        order: &Order,
        expected_version: i64,
        release: Option<&PromotionRelease>,
    ) -> Result<i64, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET promotion_id = $2, status = $3, shipping_message = $4, version = version + 1,
                updated_at = $5, completed_at = $6
            WHERE id = $1 AND version = $7
            RETURNING version
            "#,
        )
        .bind(order.id)
        .bind(order.promotion_id)
        .bind(order.status.as_str())
        .bind(&order.shipping_message)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?;

        let Some(new_version) = new_version else {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db)?;
            return Err(match actual {
                Some(actual) => RepositoryError::ConcurrentModification {
                    order_id: order.id,
                    expected: expected_version,
                    actual,
                },
                None => RepositoryError::NotFound {
                    entity: "order",
                    id: order.id.to_string(),
                },
            });
        };

        let p = &order.payment;
        sqlx::query(
            r#"
            UPDATE order_payments
            SET transaction_id = $2, status = $3, authorized_at = $4, paid_at = $5, refunded_at = $6
            WHERE order_id = $1
            "#,
        )
        .bind(order.id)
        .bind(&p.transaction_id)
        .bind(p.status.as_str())
        .bind(p.authorized_at)
        .bind(p.paid_at)
        .bind(p.refunded_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        for f in &order.fulfillments {
            sqlx::query(
                r#"
                UPDATE order_fulfillments
                SET status = $3, shipping_carrier = $4, tracking_number = $5, shipped_at = $6
                WHERE id = $1 AND order_id = $2
                "#,
            )
            .bind(f.id)
            .bind(order.id)
            .bind(f.status.as_str())
            .bind(f.shipping_carrier.as_str())
            .bind(&f.tracking_number)
            .bind(f.shipped_at)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        insert_refund(&mut tx, order).await?;

        if let Some(release) = release {
            release_promotion(&mut tx, release).await?;
        }

        tx.commit().await.map_err(db)?;
        Ok(new_version)
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let statuses: Vec<String> = filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE ($1::uuid IS NULL OR coordinator_id = $1)
              AND (cardinality($2::text[]) = 0 OR status = ANY($2))
            ORDER BY created_at, id
            "#,
        )
        .bind(filter.coordinator_id)
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            // Rows deleted between the two reads are skipped
            if let Some(order) = self.get(id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}
