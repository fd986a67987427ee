//! Rows the shop needs before its first request, inserted at boot.

use anyhow::{Context, Result};
use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{
    core::{auth::hash_password, config::SuperAdminConfig},
    enums::{GeneralSettingsKey, PaymentMethod, UserRole},
    helpers::{
        nav_menus::MAIN_MENU_SLUG,
        settings::{default_general_setting, default_payment_method_settings},
    },
    models::{CreateAppUserEntity, CreateNavigationMenuEntity, CreateWalletEntity},
    schema::{app_users, general_settings, navigation_menus, payment_method_settings, wallets},
};

/// Missing general settings get their defaults; stored values are kept.
pub async fn initialize_settings(conn: &mut AsyncPgConnection) -> Result<usize> {
    let rows: Vec<_> = GeneralSettingsKey::ALL
        .iter()
        .map(|key| {
            (
                general_settings::key.eq(key.as_str()),
                general_settings::value.eq(Some(default_general_setting(*key))),
                general_settings::updated_at.eq(Utc::now()),
            )
        })
        .collect();
    diesel::insert_into(general_settings::table)
        .values(&rows)
        .on_conflict_do_nothing()
        .execute(conn)
        .await
        .context("Failed to seed general settings")
}

pub async fn initialize_payment_method_settings(conn: &mut AsyncPgConnection) -> Result<usize> {
    let mut inserted = 0;
    for method in PaymentMethod::ALL {
        let rows: Vec<_> = default_payment_method_settings(*method)
            .into_iter()
            .map(|(key, value)| {
                (
                    payment_method_settings::method.eq(method.as_str()),
                    payment_method_settings::key.eq(key.as_str()),
                    payment_method_settings::value.eq(Some(value)),
                    payment_method_settings::updated_at.eq(Utc::now()),
                )
            })
            .collect();
        inserted += diesel::insert_into(payment_method_settings::table)
            .values(&rows)
            .on_conflict_do_nothing()
            .execute(conn)
            .await
            .with_context(|| format!("Failed to seed {method} payment settings"))?;
    }
    Ok(inserted)
}

pub async fn initialize_main_menu(conn: &mut AsyncPgConnection) -> Result<usize> {
    diesel::insert_into(navigation_menus::table)
        .values(CreateNavigationMenuEntity {
            name: "Main Menu".into(),
            slug: MAIN_MENU_SLUG.into(),
            description: Some("Primary storefront navigation".into()),
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .await
        .context("Failed to seed the main navigation menu")
}

/// Creates the configured super admin unless a staff account exists.
pub async fn create_default_super_admin(
    conn: &mut AsyncPgConnection,
    admin: &SuperAdminConfig,
) -> Result<bool> {
    let staff_roles = [UserRole::Admin.as_str(), UserRole::SuperAdmin.as_str()];
    let existing: Option<i32> = app_users::table
        .filter(app_users::role.eq_any(staff_roles))
        .select(app_users::id)
        .first(conn)
        .await
        .optional()
        .context("Failed to look up staff accounts")?;
    if existing.is_some() {
        tracing::debug!("Admin user already exists");
        return Ok(false);
    }

    let user_id: i32 = diesel::insert_into(app_users::table)
        .values(CreateAppUserEntity {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash: hash_password(&admin.password)?,
            role: UserRole::SuperAdmin.to_string(),
        })
        .returning(app_users::id)
        .get_result(conn)
        .await
        .context("Failed to create the default super admin")?;

    let currency_code: Option<Option<String>> = general_settings::table
        .filter(general_settings::key.eq(GeneralSettingsKey::Currency.as_str()))
        .select(general_settings::value)
        .first(conn)
        .await
        .optional()?;
    diesel::insert_into(wallets::table)
        .values(CreateWalletEntity {
            user_id,
            currency_code: currency_code
                .flatten()
                .unwrap_or_else(|| default_general_setting(GeneralSettingsKey::Currency).into()),
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;

    tracing::info!("Admin user {} created with default credentials", admin.username);
    Ok(true)
}

/// Everything above, in dependency order.
pub async fn seed_defaults(
    conn: &mut AsyncPgConnection,
    super_admin: Option<&SuperAdminConfig>,
) -> Result<()> {
    let settings = initialize_settings(conn).await?;
    let methods = initialize_payment_method_settings(conn).await?;
    let menus = initialize_main_menu(conn).await?;
    tracing::info!(
        "Seeded {} general settings, {} payment method settings, {} menus",
        settings,
        methods,
        menus
    );
    if let Some(admin) = super_admin {
        create_default_super_admin(conn, admin).await?;
    }
    Ok(())
}
