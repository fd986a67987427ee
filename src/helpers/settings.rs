//! General and payment-method settings, read through the TTL cache.

use std::collections::HashMap;

use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl, upsert::excluded};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{
    api::GatewayCredentials,
    core::{aliases::DieselError, app_state::SettingsCache},
    enums::{
        CurrencyPosition, GatewayName, GeneralSettingsKey, PaymentMethod, PaymentMethodSettingKey,
    },
    helpers::money::{CurrencyFormat, parse_decimals},
    schema::{general_settings, payment_method_settings},
};

const GENERAL_GROUP: &str = "general";

fn method_group(method: PaymentMethod) -> String {
    format!("method:{method}")
}

pub fn default_general_setting(key: GeneralSettingsKey) -> &'static str {
    match key {
        GeneralSettingsKey::SiteTitle => "My E-commerce Site",
        GeneralSettingsKey::Timezone => "UTC",
        GeneralSettingsKey::Currency => "NGN",
        GeneralSettingsKey::NumberOfDecimals => "2",
        GeneralSettingsKey::CurrencyPosition => "left",
        GeneralSettingsKey::ThousandSeparator => ",",
        GeneralSettingsKey::DecimalSeparator => ".",
        _ => "",
    }
}

pub fn default_payment_method_settings(
    method: PaymentMethod,
) -> Vec<(PaymentMethodSettingKey, &'static str)> {
    use PaymentMethodSettingKey as Key;

    match method {
        PaymentMethod::Bacs => vec![
            (Key::Enabled, "false"),
            (Key::Title, "Direct Bank Transfer"),
            (
                Key::Description,
                "Make your payment directly into our bank account. Please use your Order ID as the payment reference. Your order will not be shipped until the funds have cleared in our account.",
            ),
            (Key::AccountName, ""),
            (Key::AccountNumber, ""),
            (Key::BankName, ""),
            (Key::SortCode, ""),
            (Key::Iban, ""),
            (Key::BicSwift, ""),
        ],
        PaymentMethod::Check => vec![
            (Key::Enabled, "false"),
            (Key::Title, "Check Payments"),
            (
                Key::Description,
                "Please send a check to Store Name, Store Street, Store Town, Store State / County, Store Postcode.",
            ),
        ],
        PaymentMethod::Cod => vec![
            (Key::Enabled, "false"),
            (Key::Title, "Cash on Delivery"),
            (Key::Description, "Pay with cash upon delivery."),
            (Key::EnableForShipping, ""),
            (Key::AcceptVirtualOrders, "false"),
        ],
        PaymentMethod::Gateway => vec![
            (Key::Enabled, "false"),
            (Key::Provider, ""),
            (Key::BitpayApiKey, ""),
            (Key::BitpayWebhookSecret, ""),
            (Key::FlutterwaveApiKey, ""),
            (Key::FlutterwaveSecretHash, ""),
            (Key::PaystackApiKey, ""),
        ],
    }
}

/// All general settings with defaults filled in for missing keys.
pub async fn load_general_settings(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
) -> Result<HashMap<String, String>, DieselError> {
    if let Some(settings) = cache.get(&GENERAL_GROUP.to_string()) {
        return Ok(settings);
    }

    let rows: Vec<(String, Option<String>)> = general_settings::table
        .select((general_settings::key, general_settings::value))
        .load(conn)
        .await?;

    let mut settings: HashMap<String, String> = GeneralSettingsKey::ALL
        .iter()
        .map(|key| (key.to_string(), default_general_setting(*key).to_string()))
        .collect();
    settings.extend(
        rows.into_iter()
            .map(|(key, value)| (key, value.unwrap_or_default())),
    );

    cache.insert(GENERAL_GROUP.to_string(), settings.clone());
    Ok(settings)
}

pub async fn general_setting(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    key: GeneralSettingsKey,
) -> Result<String, DieselError> {
    let settings = load_general_settings(conn, cache).await?;
    Ok(settings
        .get(key.as_str())
        .cloned()
        .unwrap_or_else(|| default_general_setting(key).to_string()))
}

pub async fn save_general_settings(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    values: &[(GeneralSettingsKey, String)],
) -> Result<(), DieselError> {
    if values.is_empty() {
        return Ok(());
    }
    let rows: Vec<_> = values
        .iter()
        .map(|(key, value)| {
            (
                general_settings::key.eq(key.as_str()),
                general_settings::value.eq(Some(value.as_str())),
                general_settings::updated_at.eq(Utc::now()),
            )
        })
        .collect();

    diesel::insert_into(general_settings::table)
        .values(&rows)
        .on_conflict(general_settings::key)
        .do_update()
        .set((
            general_settings::value.eq(excluded(general_settings::value)),
            general_settings::updated_at.eq(excluded(general_settings::updated_at)),
        ))
        .execute(conn)
        .await?;

    cache.invalidate(&GENERAL_GROUP.to_string());
    Ok(())
}

pub fn currency_format_from(settings: &HashMap<String, String>) -> CurrencyFormat {
    let get = |key: GeneralSettingsKey| {
        settings
            .get(key.as_str())
            .map(String::as_str)
            .unwrap_or(default_general_setting(key))
    };
    CurrencyFormat {
        currency: get(GeneralSettingsKey::Currency).to_string(),
        decimals: parse_decimals(get(GeneralSettingsKey::NumberOfDecimals)),
        position: get(GeneralSettingsKey::CurrencyPosition)
            .parse::<CurrencyPosition>()
            .ok(),
        thousand_separator: get(GeneralSettingsKey::ThousandSeparator).to_string(),
        decimal_separator: get(GeneralSettingsKey::DecimalSeparator).to_string(),
    }
}

pub async fn currency_format(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
) -> Result<CurrencyFormat, DieselError> {
    Ok(currency_format_from(&load_general_settings(conn, cache).await?))
}

pub async fn load_payment_method_settings(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    method: PaymentMethod,
) -> Result<HashMap<String, String>, DieselError> {
    let group = method_group(method);
    if let Some(settings) = cache.get(&group) {
        return Ok(settings);
    }

    let rows: Vec<(String, Option<String>)> = payment_method_settings::table
        .filter(payment_method_settings::method.eq(method.as_str()))
        .select((payment_method_settings::key, payment_method_settings::value))
        .load(conn)
        .await?;
    let settings: HashMap<String, String> = rows
        .into_iter()
        .map(|(key, value)| (key, value.unwrap_or_default()))
        .collect();

    cache.insert(group, settings.clone());
    Ok(settings)
}

pub async fn save_payment_method_settings(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    method: PaymentMethod,
    values: &[(PaymentMethodSettingKey, String)],
) -> Result<(), DieselError> {
    if values.is_empty() {
        return Ok(());
    }
    let rows: Vec<_> = values
        .iter()
        .map(|(key, value)| {
            (
                payment_method_settings::method.eq(method.as_str()),
                payment_method_settings::key.eq(key.as_str()),
                payment_method_settings::value.eq(Some(value.as_str())),
                payment_method_settings::updated_at.eq(Utc::now()),
            )
        })
        .collect();

    diesel::insert_into(payment_method_settings::table)
        .values(&rows)
        .on_conflict((payment_method_settings::method, payment_method_settings::key))
        .do_update()
        .set((
            payment_method_settings::value.eq(excluded(payment_method_settings::value)),
            payment_method_settings::updated_at.eq(excluded(payment_method_settings::updated_at)),
        ))
        .execute(conn)
        .await?;

    cache.invalidate(&method_group(method));
    Ok(())
}

pub fn is_enabled(settings: &HashMap<String, String>) -> bool {
    settings
        .get(PaymentMethodSettingKey::Enabled.as_str())
        .is_some_and(|value| matches!(value.as_str(), "true" | "1" | "on" | "yes"))
}

/// Derives the active gateway from the `gateway` method's settings: the
/// `provider` key names it and its `{provider}_*` keys become credentials.
pub fn active_gateway_from(
    settings: &HashMap<String, String>,
) -> Option<(GatewayName, GatewayCredentials)> {
    let provider: GatewayName = settings
        .get(PaymentMethodSettingKey::Provider.as_str())?
        .trim()
        .to_lowercase()
        .parse()
        .ok()?;
    gateway_credentials_from(settings, provider).map(|credentials| (provider, credentials))
}

/// Credentials stored for `provider`, active or not. `None` without an api key.
pub fn gateway_credentials_from(
    settings: &HashMap<String, String>,
    provider: GatewayName,
) -> Option<GatewayCredentials> {
    let prefix = format!("{provider}_");
    let credentials: HashMap<&str, &str> = settings
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(&prefix)
                .map(|stripped| (stripped, value.as_str()))
        })
        .collect();

    let non_empty = |key: &str| {
        credentials
            .get(key)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
    };

    Some(GatewayCredentials {
        api_key: non_empty("api_key")?,
        secret_hash: non_empty("secret_hash"),
        webhook_secret: non_empty("webhook_secret"),
    })
}

pub async fn active_gateway(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
) -> Result<Option<(GatewayName, GatewayCredentials)>, DieselError> {
    let settings = load_payment_method_settings(conn, cache, PaymentMethod::Gateway).await?;
    Ok(active_gateway_from(&settings))
}

pub async fn gateway_credentials(
    conn: &mut AsyncPgConnection,
    cache: &SettingsCache,
    provider: GatewayName,
) -> Result<Option<GatewayCredentials>, DieselError> {
    let settings = load_payment_method_settings(conn, cache, PaymentMethod::Gateway).await?;
    Ok(gateway_credentials_from(&settings, provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn derives_active_gateway_with_prefix_stripped() {
        let gateway = settings(&[
            ("provider", "Flutterwave"),
            ("flutterwave_api_key", "FLWSECK-1"),
            ("flutterwave_secret_hash", "hash"),
            ("paystack_api_key", "sk_live"),
        ]);
        let (provider, credentials) = active_gateway_from(&gateway).unwrap();
        assert_eq!(provider, GatewayName::Flutterwave);
        assert_eq!(credentials.api_key, "FLWSECK-1");
        assert_eq!(credentials.secret_hash.as_deref(), Some("hash"));
        assert_eq!(credentials.webhook_secret, None);
    }

    #[test]
    fn no_gateway_without_provider_or_key() {
        assert!(active_gateway_from(&settings(&[("provider", "")])).is_none());
        assert!(active_gateway_from(&settings(&[("provider", "stripe")])).is_none());
        assert!(
            active_gateway_from(&settings(&[("provider", "paystack"), ("paystack_api_key", "")]))
                .is_none()
        );
    }

    #[test]
    fn currency_format_uses_defaults() {
        let format = currency_format_from(&settings(&[("currency", "USD")]));
        assert_eq!(format.currency, "USD");
        assert_eq!(format.decimals, 2);
        assert_eq!(format.position, Some(CurrencyPosition::Left));
    }

    #[test]
    fn enabled_flag_parsing() {
        assert!(is_enabled(&settings(&[("enabled", "true")])));
        assert!(!is_enabled(&settings(&[("enabled", "false")])));
        assert!(!is_enabled(&settings(&[])));
    }

    #[test]
    fn every_method_has_defaults() {
        for method in PaymentMethod::ALL {
            let defaults = default_payment_method_settings(*method);
            assert!(defaults.iter().any(|(key, _)| *key == PaymentMethodSettingKey::Enabled));
        }
    }
}
