use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper, upsert::excluded};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    core::app_error::AppError,
    enums::PublishStatus,
    helpers::orders::line_subtotal,
    models::{CartEntity, CartItemEntity, CreateCartEntity, CreateCartItemEntity},
    schema::{cart_items, carts, products},
};

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct CartItemInput {
    pub product_id: i32,
    pub quantity: Option<i32>,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct CartQuantityInput {
    pub quantity: i32,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItemEntity,
    pub product_name: String,
    pub product_slug: String,
    #[schema(value_type = String)]
    pub subtotal: BigDecimal,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct CartView {
    pub cart_id: i32,
    pub items: Vec<CartLine>,
    #[schema(value_type = String)]
    pub total: BigDecimal,
    pub item_count: i64,
}

/// `(Σ price × quantity, Σ quantity)`
pub fn cart_totals<'a>(lines: impl IntoIterator<Item = (&'a BigDecimal, i32)>) -> (BigDecimal, i64) {
    lines
        .into_iter()
        .fold((BigDecimal::zero(), 0), |(total, count), (price, quantity)| {
            (total + line_subtotal(price, quantity), count + i64::from(quantity))
        })
}

pub async fn get_or_create_cart(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> Result<CartEntity, AppError> {
    diesel::insert_into(carts::table)
        .values(CreateCartEntity { user_id })
        .on_conflict(carts::user_id)
        .do_nothing()
        .execute(conn)
        .await?;

    Ok(carts::table
        .filter(carts::user_id.eq(user_id))
        .select(CartEntity::as_select())
        .first(conn)
        .await?)
}

pub async fn fetch_cart(conn: &mut AsyncPgConnection, user_id: i32) -> Result<CartView, AppError> {
    let cart = get_or_create_cart(conn, user_id).await?;
    let rows: Vec<(CartItemEntity, String, String)> = cart_items::table
        .inner_join(products::table)
        .filter(cart_items::cart_id.eq(cart.id))
        .select((CartItemEntity::as_select(), products::name, products::slug))
        .order_by(cart_items::id.asc())
        .load(conn)
        .await?;

    let (total, item_count) = cart_totals(rows.iter().map(|(item, ..)| (&item.price, item.quantity)));
    let items = rows
        .into_iter()
        .map(|(item, product_name, product_slug)| CartLine {
            subtotal: line_subtotal(&item.price, item.quantity),
            item,
            product_name,
            product_slug,
        })
        .collect();

    Ok(CartView {
        cart_id: cart.id,
        items,
        total,
        item_count,
    })
}

/// Adds to an existing line's quantity and refreshes its captured price.
pub async fn add_item(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    input: CartItemInput,
) -> Result<CartView, AppError> {
    let quantity = input.quantity.unwrap_or(1);
    if quantity <= 0 {
        return Err(AppError::BadRequest("Quantity must be positive".into()));
    }

    let price: BigDecimal = products::table
        .filter(products::id.eq(input.product_id))
        .filter(products::pub_status.eq(PublishStatus::Published.as_str()))
        .select(products::selling_price)
        .first(conn)
        .await
        .optional()?
        .ok_or(AppError::NotFound)?;

    let cart = get_or_create_cart(conn, user_id).await?;
    diesel::insert_into(cart_items::table)
        .values(CreateCartItemEntity {
            cart_id: cart.id,
            product_id: input.product_id,
            quantity,
            price,
        })
        .on_conflict((cart_items::cart_id, cart_items::product_id))
        .do_update()
        .set((
            cart_items::quantity.eq(cart_items::quantity + excluded(cart_items::quantity)),
            cart_items::price.eq(excluded(cart_items::price)),
            cart_items::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

    fetch_cart(conn, user_id).await
}

/// Quantity of zero or less removes the line.
pub async fn set_item_quantity(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    product_id: i32,
    quantity: i32,
) -> Result<CartView, AppError> {
    if quantity <= 0 {
        return remove_item(conn, user_id, product_id).await;
    }

    let cart = get_or_create_cart(conn, user_id).await?;
    let updated = diesel::update(
        cart_items::table
            .filter(cart_items::cart_id.eq(cart.id))
            .filter(cart_items::product_id.eq(product_id)),
    )
    .set((
        cart_items::quantity.eq(quantity),
        cart_items::updated_at.eq(Utc::now()),
    ))
    .execute(conn)
    .await?;
    if updated == 0 {
        return Err(AppError::NotFound);
    }

    fetch_cart(conn, user_id).await
}

pub async fn remove_item(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    product_id: i32,
) -> Result<CartView, AppError> {
    let cart = get_or_create_cart(conn, user_id).await?;
    diesel::delete(
        cart_items::table
            .filter(cart_items::cart_id.eq(cart.id))
            .filter(cart_items::product_id.eq(product_id)),
    )
    .execute(conn)
    .await?;

    fetch_cart(conn, user_id).await
}

pub async fn clear_cart(conn: &mut AsyncPgConnection, user_id: i32) -> Result<usize, AppError> {
    let cart = get_or_create_cart(conn, user_id).await?;
    Ok(
        diesel::delete(cart_items::table.filter(cart_items::cart_id.eq(cart.id)))
            .execute(conn)
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn totals_sum_price_times_quantity() {
        let shirt = BigDecimal::from_str("12.50").unwrap();
        let socks = BigDecimal::from_str("3.25").unwrap();
        let (total, count) = cart_totals([(&shirt, 2), (&socks, 4)]);
        assert_eq!(total, BigDecimal::from_str("38.00").unwrap());
        assert_eq!(count, 6);
    }

    #[test]
    fn empty_cart_totals_are_zero() {
        let (total, count) = cart_totals(std::iter::empty());
        assert!(total.is_zero());
        assert_eq!(count, 0);
    }
}
