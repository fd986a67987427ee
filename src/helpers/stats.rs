use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper, dsl::sum};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    core::app_error::AppError,
    enums::PaymentStatus,
    helpers::{money::quantize, payments::WALLET_PAYMENT_METHOD},
    models::{OrderEntity, ProductEntity},
    schema::{app_users, categories, customer_orders, payments, products, tags, wallets},
};

const RECENT_LIMIT: i64 = 5;

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// `day`, `yesterday`, `month` or `year` (default).
    pub period: Option<String>,
}

/// Half-open `[start, end)` range of whole days for a reporting period.
pub fn period_range(period: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    match period {
        "day" => Some((today, today + Duration::days(1))),
        "yesterday" => Some((today - Duration::days(1), today)),
        "month" => {
            let start = today.with_day(1)?;
            let end = match start.month() {
                12 => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)?,
                month => NaiveDate::from_ymd_opt(start.year(), month + 1, 1)?,
            };
            Some((start, end))
        }
        "year" => Some((
            NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
            NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?,
        )),
        _ => None,
    }
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Serialize, ToSchema, Debug)]
pub struct AdminStats {
    pub period: String,
    pub total_products: i64,
    pub total_categories: i64,
    pub total_tags: i64,
    pub total_users: i64,
    #[schema(value_type = String)]
    pub total_wallet_balance: BigDecimal,
    /// Completed payments in the period, wallet payments excluded.
    #[schema(value_type = String)]
    pub total_payments: BigDecimal,
    pub recent_orders: Vec<OrderEntity>,
    pub recent_products: Vec<ProductEntity>,
}

pub async fn admin_stats(
    conn: &mut AsyncPgConnection,
    period: Option<&str>,
) -> Result<AdminStats, AppError> {
    let period = period.unwrap_or("year");
    let (start, end) = period_range(period, Utc::now().date_naive())
        .ok_or_else(|| AppError::BadRequest(format!("Invalid period {period:?}")))?;

    let total_products: i64 = products::table.count().get_result(conn).await?;
    let total_categories: i64 = categories::table.count().get_result(conn).await?;
    let total_tags: i64 = tags::table.count().get_result(conn).await?;
    let total_users: i64 = app_users::table.count().get_result(conn).await?;

    let total_wallet_balance: Option<BigDecimal> = wallets::table
        .select(sum(wallets::balance))
        .get_result(conn)
        .await?;
    let total_payments: Option<BigDecimal> = payments::table
        .filter(payments::created_at.ge(start_of(start)))
        .filter(payments::created_at.lt(start_of(end)))
        .filter(payments::payment_method.ne(WALLET_PAYMENT_METHOD))
        .filter(payments::status.eq(PaymentStatus::Completed.as_str()))
        .select(sum(payments::amount))
        .get_result(conn)
        .await?;

    let recent_orders = customer_orders::table
        .select(OrderEntity::as_select())
        .order_by(customer_orders::created_at.desc())
        .limit(RECENT_LIMIT)
        .load(conn)
        .await?;
    let recent_products = products::table
        .select(ProductEntity::as_select())
        .order_by(products::created_at.desc())
        .limit(RECENT_LIMIT)
        .load(conn)
        .await?;

    Ok(AdminStats {
        period: period.to_string(),
        total_products,
        total_categories,
        total_tags,
        total_users,
        total_wallet_balance: quantize(&total_wallet_balance.unwrap_or_default(), 2),
        total_payments: quantize(&total_payments.unwrap_or_default(), 2),
        recent_orders,
        recent_products,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn day_and_yesterday() {
        let today = date(2024, 3, 1);
        assert_eq!(period_range("day", today), Some((today, date(2024, 3, 2))));
        assert_eq!(period_range("yesterday", today), Some((date(2024, 2, 29), today)));
    }

    #[test]
    fn month_rolls_over_december() {
        assert_eq!(
            period_range("month", date(2024, 12, 17)),
            Some((date(2024, 12, 1), date(2025, 1, 1)))
        );
        assert_eq!(
            period_range("month", date(2024, 2, 10)),
            Some((date(2024, 2, 1), date(2024, 3, 1)))
        );
    }

    #[test]
    fn year_and_unknown_periods() {
        assert_eq!(
            period_range("year", date(2024, 7, 4)),
            Some((date(2024, 1, 1), date(2025, 1, 1)))
        );
        assert_eq!(period_range("week", date(2024, 7, 4)), None);
    }

    #[test]
    fn ranges_start_at_utc_midnight() {
        assert_eq!(start_of(date(2024, 7, 4)).to_rfc3339(), "2024-07-04T00:00:00+00:00");
    }
}
