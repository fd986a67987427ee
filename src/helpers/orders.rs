use anyhow::Context;
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, PgTextExpressionMethods,
    QueryDsl, SelectableHelper, dsl::IntoBoxed, pg::Pg, sql_types::BigInt,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    core::{
        app_error::AppError,
        pagination::{PageQuery, Paginated},
    },
    enums::OrderStatus,
    models::{CreateOrderEntity, CreateOrderItemEntity, OrderEntity, OrderItemEntity},
    schema::{app_users, customer_orders, order_items},
};

const ORDER_NUMBER_PREFIX: &str = "ORD-";
/// Key of the transaction-scoped advisory lock serializing order numbering.
const ORDER_NUMBER_LOCK: i64 = 0x4f52_4445_52;

/// `ORD-0001` for the first order, otherwise the last number plus one.
/// A malformed last number continues from the last row id.
pub fn next_order_number(last: Option<(i32, &str)>) -> String {
    let next = match last {
        None => 1,
        Some((id, number)) => match number
            .rsplit('-')
            .next()
            .and_then(|tail| tail.parse::<u64>().ok())
        {
            Some(seq) => seq + 1,
            None => {
                tracing::warn!("Unparseable order number {:?}, continuing from id", number);
                u64::try_from(id).unwrap_or(0) + 1
            }
        },
    };
    format!("{ORDER_NUMBER_PREFIX}{next:04}")
}

pub fn line_subtotal(unit_price: &BigDecimal, quantity: i32) -> BigDecimal {
    unit_price * BigDecimal::from(quantity)
}

pub fn order_total<'a>(lines: impl IntoIterator<Item = (&'a BigDecimal, i32)>) -> BigDecimal {
    lines
        .into_iter()
        .fold(BigDecimal::zero(), |total, (price, qty)| {
            total + line_subtotal(price, qty)
        })
}

/// Next order number. Must run inside a transaction; the advisory lock is
/// released on commit.
pub async fn generate_order_number(conn: &mut AsyncPgConnection) -> Result<String, AppError> {
    diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
        .bind::<BigInt, _>(ORDER_NUMBER_LOCK)
        .execute(conn)
        .await
        .context("Failed to take the order number lock")?;

    let last: Option<(i32, String)> = customer_orders::table
        .select((customer_orders::id, customer_orders::order_number))
        .order_by(customer_orders::id.desc())
        .first(conn)
        .await
        .optional()?;

    Ok(next_order_number(
        last.as_ref().map(|(id, number)| (*id, number.as_str())),
    ))
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub user_id: i32,
    pub lines: Vec<NewOrderLine>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub meta_info: Value,
}

/// Inserts an order and its items. Call inside a transaction.
pub async fn create_order(
    conn: &mut AsyncPgConnection,
    new_order: NewOrder,
) -> Result<(OrderEntity, Vec<OrderItemEntity>), AppError> {
    if new_order.lines.is_empty() {
        return Err(AppError::BadRequest("An order needs at least one item".into()));
    }
    if new_order.lines.iter().any(|line| line.quantity <= 0) {
        return Err(AppError::BadRequest("Quantities must be positive".into()));
    }

    let order_number = generate_order_number(conn).await?;
    let total_amount = order_total(
        new_order
            .lines
            .iter()
            .map(|line| (&line.unit_price, line.quantity)),
    );

    let order: OrderEntity = diesel::insert_into(customer_orders::table)
        .values(CreateOrderEntity {
            order_number,
            total_amount,
            status: OrderStatus::Pending.to_string(),
            shipping_address: new_order.shipping_address,
            billing_address: new_order.billing_address,
            meta_info: if new_order.meta_info.is_null() {
                Value::Object(Default::default())
            } else {
                new_order.meta_info
            },
            user_id: new_order.user_id,
        })
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await?;

    let items: Vec<CreateOrderItemEntity> = new_order
        .lines
        .into_iter()
        .map(|line| CreateOrderItemEntity {
            order_id: order.id,
            product_id: line.product_id,
            quantity: line.quantity,
            subtotal: line_subtotal(&line.unit_price, line.quantity),
            unit_price: line.unit_price,
            meta_info: Value::Object(Default::default()),
        })
        .collect();

    let items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
        .values(&items)
        .returning(OrderItemEntity::as_returning())
        .get_results(conn)
        .await?;

    tracing::info!("Created order {} for user {}", order.order_number, order.user_id);
    Ok((order, items))
}

/// Recomputes `total_amount` from the order's items.
pub async fn recalculate_total(
    conn: &mut AsyncPgConnection,
    order_id: i32,
) -> Result<OrderEntity, AppError> {
    let lines: Vec<(BigDecimal, i32)> = order_items::table
        .filter(order_items::order_id.eq(order_id))
        .select((order_items::unit_price, order_items::quantity))
        .load(conn)
        .await?;
    let total = order_total(lines.iter().map(|(price, qty)| (price, *qty)));

    let order = diesel::update(customer_orders::table.find(order_id))
        .set((
            customer_orders::total_amount.eq(total),
            customer_orders::updated_at.eq(Utc::now()),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await?;
    Ok(order)
}

/// Adds a product to an order, merging with an existing line. Call inside a transaction.
pub async fn add_order_item(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    line: NewOrderLine,
) -> Result<OrderEntity, AppError> {
    if line.quantity <= 0 {
        return Err(AppError::BadRequest("Quantity must be positive".into()));
    }

    let existing: Option<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order_id))
        .filter(order_items::product_id.eq(line.product_id))
        .select(OrderItemEntity::as_select())
        .first(conn)
        .await
        .optional()?;

    match existing {
        Some(item) => {
            let quantity = item.quantity + line.quantity;
            diesel::update(order_items::table.find(item.id))
                .set((
                    order_items::quantity.eq(quantity),
                    order_items::subtotal.eq(line_subtotal(&item.unit_price, quantity)),
                    order_items::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .await?;
        }
        None => {
            diesel::insert_into(order_items::table)
                .values(CreateOrderItemEntity {
                    order_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    subtotal: line_subtotal(&line.unit_price, line.quantity),
                    unit_price: line.unit_price,
                    meta_info: Value::Object(Default::default()),
                })
                .execute(conn)
                .await?;
        }
    }

    recalculate_total(conn, order_id).await
}

/// Sets an item's quantity; zero or less removes it. Call inside a transaction.
pub async fn set_order_item_quantity(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    item_id: i32,
    quantity: i32,
) -> Result<OrderEntity, AppError> {
    let item: OrderItemEntity = order_items::table
        .filter(order_items::order_id.eq(order_id))
        .filter(order_items::id.eq(item_id))
        .select(OrderItemEntity::as_select())
        .first(conn)
        .await?;

    if quantity <= 0 {
        diesel::delete(order_items::table.find(item.id))
            .execute(conn)
            .await?;
    } else {
        diesel::update(order_items::table.find(item.id))
            .set((
                order_items::quantity.eq(quantity),
                order_items::subtotal.eq(line_subtotal(&item.unit_price, quantity)),
                order_items::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;
    }

    recalculate_total(conn, order_id).await
}

#[derive(Deserialize, IntoParams, Debug, Default, Clone)]
#[into_params(parameter_in = Query)]
pub struct OrderFilter {
    pub status: Option<String>,
    /// Matches order number or customer username.
    pub search: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: OrderEntity,
    pub username: String,
}

type OrdersWithUsers = diesel::dsl::InnerJoin<customer_orders::table, app_users::table>;

fn filtered_orders(filter: &OrderFilter) -> IntoBoxed<'static, OrdersWithUsers, Pg> {
    let mut query = customer_orders::table
        .inner_join(app_users::table)
        .filter(customer_orders::is_deleted.eq(filter.deleted))
        .into_boxed();

    if let Some(status) = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        query = query.filter(customer_orders::status.eq(status.to_string()));
    }
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{term}%");
        query = query.filter(
            customer_orders::order_number
                .ilike(pattern.clone())
                .or(app_users::username.ilike(pattern)),
        );
    }
    query
}

pub async fn fetch_orders(
    conn: &mut AsyncPgConnection,
    filter: &OrderFilter,
    page: &PageQuery,
) -> Result<Paginated<OrderSummary>, AppError> {
    let total: i64 = filtered_orders(filter).count().get_result(conn).await?;

    let rows: Vec<(OrderEntity, String)> = filtered_orders(filter)
        .select((OrderEntity::as_select(), app_users::username))
        .order_by(customer_orders::created_at.desc())
        .limit(page.per_page())
        .offset(page.offset())
        .load(conn)
        .await?;

    let items = rows
        .into_iter()
        .map(|(order, username)| OrderSummary { order, username })
        .collect();
    Ok(Paginated::new(items, page, total))
}

/// Looks an order up by numeric id or by order number.
pub async fn fetch_order(
    conn: &mut AsyncPgConnection,
    identifier: &str,
) -> Result<OrderEntity, AppError> {
    let query = customer_orders::table.select(OrderEntity::as_select());
    let order = match identifier.parse::<i32>() {
        Ok(id) => query.filter(customer_orders::id.eq(id)).first(conn).await?,
        Err(_) => {
            query
                .filter(customer_orders::order_number.eq(identifier))
                .first(conn)
                .await?
        }
    };
    Ok(order)
}

/// A shopper's own orders, newest first. Soft-deleted orders are hidden.
pub async fn fetch_user_orders(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    page: &PageQuery,
) -> Result<Paginated<OrderEntity>, AppError> {
    let mine = || {
        customer_orders::table
            .filter(customer_orders::user_id.eq(user_id))
            .filter(customer_orders::is_deleted.eq(false))
    };
    let total: i64 = mine().count().get_result(conn).await?;
    let items = mine()
        .select(OrderEntity::as_select())
        .order_by(customer_orders::created_at.desc())
        .limit(page.per_page())
        .offset(page.offset())
        .load(conn)
        .await?;
    Ok(Paginated::new(items, page, total))
}

/// Like `fetch_order` but 404s on orders owned by someone else.
pub async fn fetch_user_order(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    identifier: &str,
) -> Result<OrderEntity, AppError> {
    let order = fetch_order(conn, identifier).await?;
    if order.user_id != user_id || order.is_deleted {
        return Err(AppError::NotFound);
    }
    Ok(order)
}

pub async fn fetch_order_items(
    conn: &mut AsyncPgConnection,
    order_id: i32,
) -> Result<Vec<OrderItemEntity>, AppError> {
    Ok(order_items::table
        .filter(order_items::order_id.eq(order_id))
        .select(OrderItemEntity::as_select())
        .order_by(order_items::id.asc())
        .load(conn)
        .await?)
}

pub async fn distinct_statuses(conn: &mut AsyncPgConnection) -> Result<Vec<String>, AppError> {
    Ok(customer_orders::table
        .select(customer_orders::status)
        .distinct()
        .order_by(customer_orders::status.asc())
        .load(conn)
        .await?)
}

pub async fn update_status(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    status: OrderStatus,
) -> Result<OrderEntity, AppError> {
    Ok(diesel::update(customer_orders::table.find(order_id))
        .set((
            customer_orders::status.eq(status.as_str()),
            customer_orders::updated_at.eq(Utc::now()),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await?)
}

/// Flips `is_deleted`. Only rows currently in the opposite state match, so a
/// repeated call is a 404.
pub async fn set_deleted(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    deleted: bool,
) -> Result<OrderEntity, AppError> {
    Ok(diesel::update(
        customer_orders::table
            .find(order_id)
            .filter(customer_orders::is_deleted.eq(!deleted)),
    )
    .set((
        customer_orders::is_deleted.eq(deleted),
        customer_orders::updated_at.eq(Utc::now()),
    ))
    .returning(OrderEntity::as_returning())
    .get_result(conn)
    .await?)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn numbers_orders_sequentially() {
        assert_eq!(next_order_number(None), "ORD-0001");
        assert_eq!(next_order_number(Some((1, "ORD-0001"))), "ORD-0002");
        assert_eq!(next_order_number(Some((9, "ORD-0999"))), "ORD-1000");
        assert_eq!(next_order_number(Some((12, "ORD-10000"))), "ORD-10001");
    }

    #[test]
    fn malformed_number_continues_from_id() {
        assert_eq!(next_order_number(Some((41, "legacy"))), "ORD-0042");
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let a = BigDecimal::from_str("19.99").unwrap();
        let b = BigDecimal::from_str("5.50").unwrap();
        let total = order_total([(&a, 3), (&b, 2)]);
        assert_eq!(total, BigDecimal::from_str("70.97").unwrap());
        assert_eq!(order_total(std::iter::empty()), BigDecimal::zero());
    }
}
