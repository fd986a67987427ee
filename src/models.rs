use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::enums::{PaymentStatus, PaymentType};

// Users

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::app_users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AppUserEntity {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::app_users)]
pub struct CreateAppUserEntity {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProfileEntity {
    pub id: i32,
    pub user_id: i32,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub profile_picture_id: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement of the editable profile fields; the picture is kept.
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::profiles)]
#[diesel(treat_none_as_null = true)]
pub struct UpsertProfileEntity {
    pub user_id: i32,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::addresses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AddressEntity {
    pub id: i32,
    pub user_id: i32,
    pub country: Option<String>,
    pub state: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::addresses)]
#[diesel(treat_none_as_null = true)]
pub struct UpsertAddressEntity {
    pub user_id: i32,
    pub country: Option<String>,
    pub state: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// Media

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::media)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MediaEntity {
    pub id: i32,
    pub filename: String,
    /// Public path, e.g. `/uploads/3f2a...-shirt.png`.
    pub media_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::media)]
pub struct CreateMediaEntity {
    pub filename: String,
    pub media_path: String,
}

// Wallets

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::wallets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WalletEntity {
    pub id: i32,
    pub user_id: i32,
    #[schema(value_type = String)]
    pub balance: BigDecimal,
    pub currency_code: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::wallets)]
pub struct CreateWalletEntity {
    pub user_id: i32,
    pub currency_code: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransactionEntity {
    pub id: i32,
    pub key: String,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub transaction_type: String,
    pub narration: Option<String>,
    pub status: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::transactions)]
pub struct CreateTransactionEntity {
    pub key: String,
    pub amount: BigDecimal,
    pub transaction_type: String,
    pub narration: Option<String>,
    pub status: String,
    pub user_id: i32,
}

// Payments

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentEntity {
    pub id: i32,
    pub key: String,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub narration: Option<String>,
    pub payment_method: String,
    pub status: String,
    pub meta_info: Value,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntity {
    /// Payments created before `payment_type` was recorded are wallet top-ups.
    pub fn payment_type(&self) -> PaymentType {
        self.meta_info
            .get("payment_type")
            .and_then(Value::as_str)
            .and_then(|value| value.parse().ok())
            .unwrap_or(PaymentType::WalletTopUp)
    }

    pub fn order_id(&self) -> Option<i32> {
        self.meta_info
            .get("order_id")
            .and_then(Value::as_i64)
            .and_then(|id| i32::try_from(id).ok())
    }

    pub fn status(&self) -> Option<PaymentStatus> {
        self.status.parse().ok()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::payments)]
pub struct CreatePaymentEntity {
    pub key: String,
    pub amount: BigDecimal,
    pub narration: Option<String>,
    pub payment_method: String,
    pub status: String,
    pub meta_info: Value,
    pub user_id: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::processed_webhook_events)]
pub struct CreateProcessedWebhookEventEntity {
    pub event_id: String,
    pub provider: String,
    pub payment_key: String,
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::customer_orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub order_number: String,
    #[schema(value_type = String)]
    pub total_amount: BigDecimal,
    pub status: String,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub meta_info: Value,
    pub is_deleted: bool,
    pub payment_id: Option<i32>,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::customer_orders)]
pub struct CreateOrderEntity {
    pub order_number: String,
    pub total_amount: BigDecimal,
    pub status: String,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub meta_info: Value,
    pub user_id: i32,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: BigDecimal,
    #[schema(value_type = String)]
    pub subtotal: BigDecimal,
    pub meta_info: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub subtotal: BigDecimal,
    pub meta_info: Value,
}

// Catalog

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CategoryEntity {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
    pub parent_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub media_id: Option<i32>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::categories)]
#[diesel(treat_none_as_null = true)]
pub struct CreateCategoryEntity {
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
    pub parent_id: Option<i32>,
    pub media_id: Option<i32>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::tags)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TagEntity {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::tags)]
pub struct CreateTagEntity {
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub uuid: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub selling_price: BigDecimal,
    #[schema(value_type = Option<String>)]
    pub actual_price: Option<BigDecimal>,
    pub pub_status: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Comma separated.
    pub sizes: Option<String>,
    /// Comma separated.
    pub colors: Option<String>,
    pub media_id: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::products)]
pub struct CreateProductEntity {
    pub uuid: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub selling_price: BigDecimal,
    pub actual_price: Option<BigDecimal>,
    pub pub_status: String,
    pub user_id: i32,
    pub sizes: Option<String>,
    pub colors: Option<String>,
    pub media_id: Option<i32>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::products)]
#[diesel(treat_none_as_null = true)]
pub struct UpdateProductEntity {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub selling_price: BigDecimal,
    pub actual_price: Option<BigDecimal>,
    pub pub_status: String,
    pub updated_at: DateTime<Utc>,
    pub sizes: Option<String>,
    pub colors: Option<String>,
    pub media_id: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::product_categories)]
pub struct ProductCategoryEntity {
    pub product_id: i32,
    pub category_id: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::product_tags)]
pub struct ProductTagEntity {
    pub product_id: i32,
    pub tag_id: i32,
}

// Navigation

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::navigation_menus)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NavigationMenuEntity {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::navigation_menus)]
pub struct CreateNavigationMenuEntity {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::nav_menu_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NavMenuItemEntity {
    pub id: i32,
    pub menu_id: i32,
    pub name: String,
    pub label: Option<String>,
    pub slug: String,
    pub url: Option<String>,
    pub item_type: String,
    pub ref_id: Option<i32>,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub is_active: bool,
    pub icon_class: Option<String>,
    pub icon_path: Option<String>,
    pub parent_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::nav_menu_items)]
pub struct CreateNavMenuItemEntity {
    pub menu_id: i32,
    pub name: String,
    pub label: Option<String>,
    pub slug: String,
    pub url: Option<String>,
    pub item_type: String,
    pub ref_id: Option<i32>,
    pub sort_order: i32,
    pub is_active: bool,
    pub icon_class: Option<String>,
    pub icon_path: Option<String>,
}

// Carts

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartEntity {
    pub id: i32,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::carts)]
pub struct CreateCartEntity {
    pub user_id: i32,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub id: i32,
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

// Settings

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::general_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GeneralSettingEntity {
    pub key: String,
    pub value: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::payment_method_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentMethodSettingEntity {
    pub id: i32,
    pub method: String,
    pub key: String,
    pub value: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    fn payment(meta_info: Value) -> PaymentEntity {
        PaymentEntity {
            id: 1,
            key: "ref-1".into(),
            amount: BigDecimal::from_str("10.00").unwrap(),
            narration: None,
            payment_method: "paystack".into(),
            status: "pending".into(),
            meta_info,
            user_id: 7,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn payment_meta_defaults_to_wallet_top_up() {
        let payment = payment(json!({}));
        assert_eq!(payment.payment_type(), PaymentType::WalletTopUp);
        assert_eq!(payment.order_id(), None);
    }

    #[test]
    fn payment_meta_reads_order_payment() {
        let payment = payment(json!({"payment_type": "order_payment", "order_id": 42}));
        assert_eq!(payment.payment_type(), PaymentType::OrderPayment);
        assert_eq!(payment.order_id(), Some(42));
        assert_eq!(payment.status(), Some(PaymentStatus::Pending));
    }
}
