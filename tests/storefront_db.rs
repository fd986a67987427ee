//! Runs against a real Postgres. Every test returns early when
//! `DATABASE_URL` is unset; the embedded migrations are applied once.

use std::{collections::HashSet, str::FromStr, time::Duration};

use axum::http::{HeaderMap, HeaderValue};
use bigdecimal::BigDecimal;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha512;
use shopfront_service::{
    api::paystack::SIGNATURE_HEADER,
    core::{
        app_error::AppError,
        app_state::AppState,
        config::{AppConfig, AuthConfig, DatabaseConfig, GatewayUrls, ServerConfig},
        db,
    },
    enums::{
        CheckoutMethod, OrderStatus, PaymentMethod, PaymentMethodSettingKey, PaymentStatus,
        PublishStatus, UserRole,
    },
    helpers::{
        account::{ProfileInput, account_view, save_profile, set_profile_picture},
        cart::{CartItemInput, add_item, fetch_cart},
        categories::{CategoryInput, UNCATEGORIZED_SLUG, create_category, delete_category, fetch_category},
        checkout::{CheckoutInput, checkout, pay_pending_order},
        media::{delete_media, save_media},
        orders::{
            NewOrder, NewOrderLine, add_order_item, create_order, fetch_order, fetch_order_items,
            set_order_item_quantity,
        },
        payments::{
            PaymentManager, PaymentOutcome, SETTLED_ORDER_MESSAGE, apply_reported_status,
            fetch_payment, generate_reference,
        },
        products::{ProductInput, create_product, update_product},
        settings::save_payment_method_settings,
    },
    models::{
        AppUserEntity, CreateAppUserEntity, CreatePaymentEntity, CreateWalletEntity, OrderEntity,
        OrderItemEntity, PaymentEntity,
    },
    schema::{
        app_users, categories, customer_orders, payments, processed_webhook_events,
        product_categories, transactions, wallets,
    },
};
use tokio::sync::OnceCell;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
const PAYSTACK_KEY: &str = "sk_test_storefront";

static PREPARED: OnceCell<()> = OnceCell::const_new();

fn config(database_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            url: database_url.into(),
        },
        auth: AuthConfig {
            secret: "test-secret".into(),
            token_ttl: Duration::from_secs(60),
        },
        // Nothing listens on port 9, so every gateway call fails to connect.
        gateways: GatewayUrls {
            paystack: "http://127.0.0.1:9".into(),
            flutterwave: "http://127.0.0.1:9".into(),
            bitpay: "http://127.0.0.1:9".into(),
        },
        settings_cache_ttl: Duration::from_secs(60),
        domain_name: "http://shop.test".into(),
        media_dir: std::env::temp_dir()
            .join("shopfront-media")
            .display()
            .to_string(),
        super_admin: None,
    }
}

async fn prepare(database_url: &str) {
    db::run_migrations_blocking(MIGRATIONS, database_url)
        .await
        .expect("migrations apply");

    let state = AppState::new(
        db::create_pool(database_url).await.expect("pool builds"),
        config(database_url),
    );
    let conn = &mut state.db_pool.get().await.expect("connection");
    save_payment_method_settings(
        conn,
        &state.settings_cache,
        PaymentMethod::Gateway,
        &[
            (PaymentMethodSettingKey::Enabled, "true".into()),
            (PaymentMethodSettingKey::Provider, "paystack".into()),
            (PaymentMethodSettingKey::PaystackApiKey, PAYSTACK_KEY.into()),
        ],
    )
    .await
    .expect("gateway settings saved");
}

/// A fresh pool per test; pools do not outlive the runtime that built them.
async fn test_state() -> Option<AppState> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set, skipping");
        return None;
    };
    PREPARED.get_or_init(|| prepare(&database_url)).await;
    let pool = db::create_pool(&database_url).await.expect("pool builds");
    Some(AppState::new(pool, config(&database_url)))
}

fn unique() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

async fn create_customer(conn: &mut AsyncPgConnection, currency: &str) -> i32 {
    let tag = unique();
    let user: AppUserEntity = diesel::insert_into(app_users::table)
        .values(CreateAppUserEntity {
            username: format!("shopper_{tag}"),
            email: format!("{tag}@shop.test"),
            password_hash: "not-a-hash".into(),
            role: UserRole::Customer.to_string(),
        })
        .returning(AppUserEntity::as_returning())
        .get_result(conn)
        .await
        .unwrap();
    diesel::insert_into(wallets::table)
        .values(CreateWalletEntity {
            user_id: user.id,
            currency_code: currency.into(),
        })
        .execute(conn)
        .await
        .unwrap();
    user.id
}

async fn published_product(
    conn: &mut AsyncPgConnection,
    owner: i32,
    price: &str,
    category_ids: Vec<i32>,
) -> i32 {
    create_product(
        conn,
        owner,
        ProductInput {
            name: format!("Item {}", unique()),
            description: None,
            selling_price: dec(price),
            actual_price: None,
            pub_status: Some(PublishStatus::Published),
            category_ids,
            tags: None,
            sizes: None,
            colors: None,
            media_id: None,
        },
    )
    .await
    .unwrap()
    .product
    .id
}

async fn place_order(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    lines: Vec<NewOrderLine>,
) -> (OrderEntity, Vec<OrderItemEntity>) {
    conn.transaction::<_, AppError, _>(move |conn| {
        Box::pin(async move {
            create_order(
                conn,
                NewOrder {
                    user_id,
                    lines,
                    ..Default::default()
                },
            )
            .await
        })
    })
    .await
    .unwrap()
}

async fn pending_payment(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    method: &str,
    amount: &BigDecimal,
    meta_info: Value,
) -> PaymentEntity {
    diesel::insert_into(payments::table)
        .values(CreatePaymentEntity {
            key: generate_reference("pay"),
            amount: amount.clone(),
            narration: None,
            payment_method: method.into(),
            status: PaymentStatus::Pending.to_string(),
            meta_info,
            user_id,
        })
        .returning(PaymentEntity::as_returning())
        .get_result(conn)
        .await
        .unwrap()
}

async fn balance(conn: &mut AsyncPgConnection, user_id: i32) -> BigDecimal {
    wallets::table
        .filter(wallets::user_id.eq(user_id))
        .select(wallets::balance)
        .first(conn)
        .await
        .unwrap()
}

async fn report_completed(state: &AppState, reference: &str) -> PaymentOutcome {
    let conn = &mut state.db_pool.get().await.unwrap();
    let cache = &state.settings_cache;
    let reference = reference.to_string();
    conn.transaction::<_, AppError, _>(move |conn| {
        Box::pin(async move {
            apply_reported_status(conn, cache, &reference, PaymentStatus::Completed).await
        })
    })
    .await
    .unwrap()
}

/// A `charge.success` event signed the way Paystack signs it.
fn paystack_charge(reference: &str, event_id: u64) -> (HeaderMap, Vec<u8>) {
    let body = serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {"id": event_id, "reference": reference, "status": "success"},
    }))
    .unwrap();
    let mut mac = Hmac::<Sha512>::new_from_slice(PAYSTACK_KEY.as_bytes()).unwrap();
    mac.update(&body);
    let mut headers = HeaderMap::new();
    headers.insert(
        SIGNATURE_HEADER,
        HeaderValue::from_str(&hex::encode(mac.finalize().into_bytes())).unwrap(),
    );
    (headers, body)
}

fn event_id() -> u64 {
    (Uuid::new_v4().as_u128() >> 75) as u64
}

#[tokio::test]
async fn redelivered_webhook_credits_once() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let user_id = create_customer(conn, "NGN").await;
    let payment = pending_payment(
        conn,
        user_id,
        "paystack",
        &dec("500"),
        json!({"payment_type": "wallet_top_up"}),
    )
    .await;

    let manager = PaymentManager::new(&state);
    let (headers, body) = paystack_charge(&payment.key, event_id());
    let first = manager.handle_webhook(&headers, &body).await.unwrap();
    assert!(first.applied);
    assert_eq!(first.status, PaymentStatus::Completed);

    let second = manager.handle_webhook(&headers, &body).await.unwrap();
    assert!(!second.applied);
    assert_eq!(second.status, PaymentStatus::Completed);

    // A new event for a payment that is no longer pending changes nothing.
    let (headers, body) = paystack_charge(&payment.key, event_id());
    let late = manager.handle_webhook(&headers, &body).await.unwrap();
    assert!(!late.applied);

    assert_eq!(balance(conn, user_id).await, dec("500"));
    let events: i64 = processed_webhook_events::table
        .filter(processed_webhook_events::payment_key.eq(&payment.key))
        .count()
        .get_result(conn)
        .await
        .unwrap();
    assert_eq!(events, 2);
    let credits: i64 = transactions::table
        .filter(transactions::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .await
        .unwrap();
    assert_eq!(credits, 1);
}

#[tokio::test]
async fn webhook_for_another_gateways_payment_is_rejected() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let user_id = create_customer(conn, "NGN").await;
    let payment = pending_payment(
        conn,
        user_id,
        "flutterwave",
        &dec("300"),
        json!({"payment_type": "wallet_top_up"}),
    )
    .await;

    let (headers, body) = paystack_charge(&payment.key, event_id());
    let result = PaymentManager::new(&state).handle_webhook(&headers, &body).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let payment = fetch_payment(conn, &payment.key).await.unwrap();
    assert_eq!(payment.status(), Some(PaymentStatus::Pending));
    let events: i64 = processed_webhook_events::table
        .filter(processed_webhook_events::payment_key.eq(&payment.key))
        .count()
        .get_result(conn)
        .await
        .unwrap();
    assert_eq!(events, 0);
    assert_eq!(balance(conn, user_id).await, dec("0"));
}

#[tokio::test]
async fn second_payment_for_a_paid_order_goes_to_the_wallet() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let user_id = create_customer(conn, "NGN").await;
    let product_id = published_product(conn, user_id, "100", vec![]).await;
    let (order, _) = place_order(
        conn,
        user_id,
        vec![NewOrderLine {
            product_id,
            quantity: 1,
            unit_price: dec("100"),
        }],
    )
    .await;
    let meta = json!({"payment_type": "order_payment", "order_id": order.id});
    let first = pending_payment(conn, user_id, "paystack", &order.total_amount, meta.clone()).await;
    let second = pending_payment(conn, user_id, "paystack", &order.total_amount, meta).await;

    let outcome = report_completed(&state, &first.key).await;
    assert!(outcome.applied);
    assert_eq!(outcome.order_id, Some(order.id));

    let late = report_completed(&state, &second.key).await;
    assert!(late.applied);
    assert_eq!(late.status, PaymentStatus::Completed);
    assert_eq!(late.message, SETTLED_ORDER_MESSAGE);

    let order = fetch_order(conn, &order.id.to_string()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid.as_str());
    assert_eq!(order.payment_id, Some(first.id));
    assert_eq!(balance(conn, user_id).await, dec("100"));

    let retry = pay_pending_order(&state, user_id, &order.order_number).await;
    assert!(matches!(retry, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn fresh_pending_attempt_blocks_another_payment() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let user_id = create_customer(conn, "NGN").await;
    let product_id = published_product(conn, user_id, "40", vec![]).await;
    let (order, _) = place_order(
        conn,
        user_id,
        vec![NewOrderLine {
            product_id,
            quantity: 1,
            unit_price: dec("40"),
        }],
    )
    .await;
    let attempt = pending_payment(
        conn,
        user_id,
        "paystack",
        &order.total_amount,
        json!({"payment_type": "order_payment", "order_id": order.id}),
    )
    .await;

    match pay_pending_order(&state, user_id, &order.order_number).await {
        Err(AppError::Conflict(message)) => assert!(message.contains(&attempt.key)),
        other => panic!("expected a conflict, got {other:?}"),
    }
    let attempts: i64 = payments::table
        .filter(payments::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .await
        .unwrap();
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn unsupported_currency_is_refused_before_the_order_is_placed() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let user_id = create_customer(conn, "EUR").await;
    let product_id = published_product(conn, user_id, "12.50", vec![]).await;
    add_item(
        conn,
        user_id,
        CartItemInput {
            product_id,
            quantity: Some(2),
        },
    )
    .await
    .unwrap();

    let result = checkout(
        &state,
        user_id,
        CheckoutInput {
            payment_method: CheckoutMethod::Gateway,
            shipping_address: None,
            billing_address: None,
        },
    )
    .await;
    match result {
        Err(AppError::BadRequest(message)) => assert!(message.contains("EUR")),
        other => panic!("expected a bad request, got {other:?}"),
    }

    let orders: i64 = customer_orders::table
        .filter(customer_orders::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .await
        .unwrap();
    assert_eq!(orders, 0);
    assert_eq!(fetch_cart(conn, user_id).await.unwrap().items.len(), 1);
}

#[tokio::test]
async fn unreachable_gateway_leaves_the_order_awaiting_payment() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let user_id = create_customer(conn, "NGN").await;
    let product_id = published_product(conn, user_id, "25", vec![]).await;
    add_item(
        conn,
        user_id,
        CartItemInput {
            product_id,
            quantity: Some(2),
        },
    )
    .await
    .unwrap();

    let result = checkout(
        &state,
        user_id,
        CheckoutInput {
            payment_method: CheckoutMethod::Gateway,
            shipping_address: None,
            billing_address: None,
        },
    )
    .await
    .unwrap();

    assert!(result.authorization_url.is_none());
    assert_eq!(result.order.status, OrderStatus::Pending.as_str());
    assert_eq!(result.order.total_amount, dec("50"));
    assert!(result.message.contains(&result.order.order_number));
    assert!(fetch_cart(conn, user_id).await.unwrap().items.is_empty());

    let statuses: Vec<String> = payments::table
        .filter(payments::user_id.eq(user_id))
        .select(payments::status)
        .load(conn)
        .await
        .unwrap();
    assert_eq!(statuses, vec![PaymentStatus::Abandoned.to_string()]);
}

#[tokio::test]
async fn order_totals_follow_item_changes() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let user_id = create_customer(conn, "NGN").await;
    let shirt = published_product(conn, user_id, "10", vec![]).await;
    let socks = published_product(conn, user_id, "5.50", vec![]).await;
    let (order, _) = place_order(
        conn,
        user_id,
        vec![NewOrderLine {
            product_id: shirt,
            quantity: 2,
            unit_price: dec("10"),
        }],
    )
    .await;
    assert_eq!(order.total_amount, dec("20"));

    let order_id = order.id;
    let order = conn
        .transaction::<_, AppError, _>(move |conn| {
            Box::pin(async move {
                add_order_item(
                    conn,
                    order_id,
                    NewOrderLine {
                        product_id: socks,
                        quantity: 1,
                        unit_price: dec("5.50"),
                    },
                )
                .await?;
                add_order_item(
                    conn,
                    order_id,
                    NewOrderLine {
                        product_id: shirt,
                        quantity: 1,
                        unit_price: dec("10"),
                    },
                )
                .await
            })
        })
        .await
        .unwrap();
    assert_eq!(order.total_amount, dec("35.50"));

    let items = fetch_order_items(conn, order_id).await.unwrap();
    assert_eq!(items.len(), 2);
    let socks_line = items.iter().find(|item| item.product_id == socks).unwrap().id;
    let shirt_line = items.iter().find(|item| item.product_id == shirt).unwrap();
    assert_eq!(shirt_line.quantity, 3);

    let order = set_order_item_quantity(conn, order_id, socks_line, 0)
        .await
        .unwrap();
    assert_eq!(order.total_amount, dec("30"));
    assert_eq!(fetch_order_items(conn, order_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_a_category_reassigns_orphans_and_detaches_children() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let owner = create_customer(conn, "NGN").await;
    let category = |name: String, parent_id: Option<i32>| CategoryInput {
        name,
        description: None,
        parent_id,
        media_id: None,
    };
    let tag = unique();
    let shoes = create_category(conn, category(format!("Shoes {tag}"), None))
        .await
        .unwrap();
    let boots = create_category(conn, category(format!("Boots {tag}"), Some(shoes.id)))
        .await
        .unwrap();
    let sale = create_category(conn, category(format!("Sale {tag}"), None))
        .await
        .unwrap();
    let only_shoes = published_product(conn, owner, "60", vec![shoes.id]).await;
    let also_on_sale = published_product(conn, owner, "45", vec![shoes.id, sale.id]).await;

    let deletion = delete_category(conn, shoes.id).await.unwrap();
    assert_eq!(deletion.deleted.id, shoes.id);
    assert_eq!(deletion.reassigned_products, vec![only_shoes]);
    assert_eq!(deletion.detached_children, 1);

    let boots = fetch_category(conn, &boots.id.to_string()).await.unwrap();
    assert_eq!(boots.parent_id, None);

    let uncategorized: i32 = categories::table
        .filter(categories::slug.eq(UNCATEGORIZED_SLUG))
        .select(categories::id)
        .first(conn)
        .await
        .unwrap();
    let linked_to = |product_id: i32| {
        product_categories::table
            .filter(product_categories::product_id.eq(product_id))
            .select(product_categories::category_id)
    };
    let orphan_links: Vec<i32> = linked_to(only_shoes).load(conn).await.unwrap();
    assert_eq!(orphan_links, vec![uncategorized]);
    let sale_links: Vec<i32> = linked_to(also_on_sale).load(conn).await.unwrap();
    assert_eq!(sale_links, vec![sale.id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_get_distinct_sequential_numbers() {
    let Some(state) = test_state().await else {
        return;
    };
    let (user_id, product_id) = {
        let conn = &mut state.db_pool.get().await.unwrap();
        let user_id = create_customer(conn, "NGN").await;
        (user_id, published_product(conn, user_id, "1", vec![]).await)
    };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = state.db_pool.clone();
            tokio::spawn(async move {
                let conn = &mut pool.get().await.unwrap();
                place_order(
                    conn,
                    user_id,
                    vec![NewOrderLine {
                        product_id,
                        quantity: 1,
                        unit_price: dec("1"),
                    }],
                )
                .await
                .0
            })
        })
        .collect();
    let mut orders = Vec::new();
    for handle in handles {
        orders.push(handle.await.unwrap());
    }

    let numbers: HashSet<&str> = orders.iter().map(|order| order.order_number.as_str()).collect();
    assert_eq!(numbers.len(), orders.len());

    orders.sort_by_key(|order| order.id);
    let sequence: Vec<u64> = orders
        .iter()
        .map(|order| order.order_number.rsplit('-').next().unwrap().parse().unwrap())
        .collect();
    assert!(sequence.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn profile_details_and_picture_are_kept_per_user() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let user_id = create_customer(conn, "NGN").await;

    save_profile(
        conn,
        user_id,
        ProfileInput {
            firstname: Some("Ada".into()),
            phone: Some("0800".into()),
            country: Some("Nigeria".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    save_profile(
        conn,
        user_id,
        ProfileInput {
            firstname: Some(" Adaeze ".into()),
            phone: Some("  ".into()),
            country: Some("Ghana".into()),
            state: Some("Accra".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let media_dir = std::path::PathBuf::from(&state.config.media_dir);
    let media = save_media(conn, &media_dir, "Me.PNG", b"not really a png")
        .await
        .unwrap();
    set_profile_picture(conn, user_id, media.id).await.unwrap();

    let account = account_view(conn, &state.config.domain_name, user_id)
        .await
        .unwrap();
    let profile = account.profile.unwrap();
    assert_eq!(profile.firstname.as_deref(), Some("Adaeze"));
    assert_eq!(profile.phone, None);
    let address = account.address.unwrap();
    assert_eq!(address.country.as_deref(), Some("Ghana"));
    assert_eq!(address.state.as_deref(), Some("Accra"));
    assert_eq!(account.profile_picture.as_deref(), Some(media.media_path.as_str()));
    assert!(account.referral_link.ends_with(&account.user.username));

    delete_media(conn, &media_dir, media.id).await.unwrap();
    let account = account_view(conn, &state.config.domain_name, user_id)
        .await
        .unwrap();
    assert_eq!(account.profile_picture, None);
}

#[tokio::test]
async fn product_image_survives_updates_without_one() {
    let Some(state) = test_state().await else {
        return;
    };
    let conn = &mut state.db_pool.get().await.unwrap();
    let owner = create_customer(conn, "NGN").await;
    let media_dir = std::path::PathBuf::from(&state.config.media_dir);
    let media = save_media(conn, &media_dir, "front.jpg", b"jpeg bytes")
        .await
        .unwrap();
    assert!(media.media_path.starts_with("/uploads/"));

    let input = |media_id: Option<i32>| ProductInput {
        name: format!("Tee {}", unique()),
        description: None,
        selling_price: dec("15"),
        actual_price: None,
        pub_status: Some(PublishStatus::Published),
        category_ids: vec![],
        tags: None,
        sizes: Some(" S,M,L ".into()),
        colors: Some("red".into()),
        media_id,
    };
    let created = create_product(conn, owner, input(Some(media.id))).await.unwrap();
    assert_eq!(created.product.sizes.as_deref(), Some("S,M,L"));
    assert_eq!(created.media.as_ref().map(|media| media.id), Some(media.id));

    let updated = update_product(conn, created.product.id, input(None))
        .await
        .unwrap();
    assert_eq!(updated.product.media_id, Some(media.id));
    assert_eq!(updated.media.map(|media| media.media_path), Some(media.media_path));

    let missing = create_product(conn, owner, input(Some(i32::MAX))).await;
    assert!(matches!(missing, Err(AppError::BadRequest(_))));
}
