use bigdecimal::{BigDecimal, Signed};
use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    core::{
        app_error::AppError,
        app_state::SettingsCache,
        pagination::{PageQuery, Paginated},
    },
    enums::{GeneralSettingsKey, TransactionType},
    helpers::{
        money::format_money,
        payments::generate_reference,
        settings::{currency_format, general_setting},
    },
    models::{CreateTransactionEntity, CreateWalletEntity, TransactionEntity, WalletEntity},
    schema::{transactions, wallets},
};

#[derive(Serialize, ToSchema, Debug)]
pub struct WalletView {
    #[serde(flatten)]
    pub wallet: WalletEntity,
    pub formatted_balance: String,
}

/// Creates the wallet in the store currency on first use.
pub async fn get_or_create_wallet(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    user_id: i32,
) -> Result<WalletEntity, AppError> {
    let currency_code = general_setting(conn, cache, GeneralSettingsKey::Currency).await?;
    diesel::insert_into(wallets::table)
        .values(CreateWalletEntity {
            user_id,
            currency_code,
        })
        .on_conflict(wallets::user_id)
        .do_nothing()
        .execute(conn)
        .await?;

    Ok(wallets::table
        .filter(wallets::user_id.eq(user_id))
        .select(WalletEntity::as_select())
        .first(conn)
        .await?)
}

pub async fn wallet_view(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    user_id: i32,
) -> Result<WalletView, AppError> {
    let wallet = get_or_create_wallet(conn, cache, user_id).await?;
    let mut format = currency_format(conn, cache).await?;
    format.currency = wallet.currency_code.clone();
    Ok(WalletView {
        formatted_balance: format_money(&wallet.balance, &format),
        wallet,
    })
}

async fn record_transaction(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    amount: &BigDecimal,
    transaction_type: TransactionType,
    narration: Option<String>,
) -> Result<TransactionEntity, AppError> {
    Ok(diesel::insert_into(transactions::table)
        .values(CreateTransactionEntity {
            key: generate_reference("txn"),
            amount: amount.clone(),
            transaction_type: transaction_type.to_string(),
            narration,
            status: "completed".into(),
            user_id,
        })
        .returning(TransactionEntity::as_returning())
        .get_result(conn)
        .await?)
}

/// Adds to the balance and writes a `credit` ledger row. Call inside a
/// transaction.
pub async fn credit_wallet(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    user_id: i32,
    amount: &BigDecimal,
    narration: Option<String>,
) -> Result<WalletEntity, AppError> {
    if !amount.is_positive() {
        return Err(AppError::BadRequest("Credit amount must be positive".into()));
    }
    let wallet = get_or_create_wallet(conn, cache, user_id).await?;
    let wallet: WalletEntity = diesel::update(wallets::table.find(wallet.id))
        .set((
            wallets::balance.eq(wallets::balance + amount.clone()),
            wallets::updated_at.eq(Utc::now()),
        ))
        .returning(WalletEntity::as_returning())
        .get_result(conn)
        .await?;

    record_transaction(conn, user_id, amount, TransactionType::Credit, narration).await?;
    tracing::info!("Credited wallet of user {} with {}", user_id, amount);
    Ok(wallet)
}

/// Takes from the balance only when it covers `amount`. Call inside a
/// transaction.
pub async fn debit_wallet(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    user_id: i32,
    amount: &BigDecimal,
    transaction_type: TransactionType,
    narration: Option<String>,
) -> Result<WalletEntity, AppError> {
    if !amount.is_positive() {
        return Err(AppError::BadRequest("Debit amount must be positive".into()));
    }
    let wallet = get_or_create_wallet(conn, cache, user_id).await?;
    let updated: Vec<WalletEntity> = diesel::update(
        wallets::table
            .filter(wallets::id.eq(wallet.id))
            .filter(wallets::balance.ge(amount.clone())),
    )
    .set((
        wallets::balance.eq(wallets::balance - amount.clone()),
        wallets::updated_at.eq(Utc::now()),
    ))
    .returning(WalletEntity::as_returning())
    .get_results(conn)
    .await?;

    let wallet = updated
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("Insufficient wallet balance".into()))?;

    record_transaction(conn, user_id, amount, transaction_type, narration).await?;
    Ok(wallet)
}

pub async fn fetch_transactions(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    page: &PageQuery,
) -> Result<Paginated<TransactionEntity>, AppError> {
    let total: i64 = transactions::table
        .filter(transactions::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .await?;
    let items = transactions::table
        .filter(transactions::user_id.eq(user_id))
        .select(TransactionEntity::as_select())
        .order_by(transactions::created_at.desc())
        .limit(page.per_page())
        .offset(page.offset())
        .load(conn)
        .await?;
    Ok(Paginated::new(items, page, total))
}
