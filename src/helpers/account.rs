//! Customer profile and address, kept one row each per user.

use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    core::app_error::AppError,
    helpers::media::{ensure_media, fetch_optional_media},
    models::{
        AddressEntity, AppUserEntity, ProfileEntity, UpsertAddressEntity, UpsertProfileEntity,
    },
    schema::{addresses, app_users, profiles},
};

#[derive(Deserialize, ToSchema, Debug, Clone, Default)]
pub struct ProfileInput {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct AccountView {
    pub user: AppUserEntity,
    pub profile: Option<ProfileEntity>,
    pub address: Option<AddressEntity>,
    /// Public path of the profile picture.
    pub profile_picture: Option<String>,
    pub referral_link: String,
}

/// Trimmed, with blanks stored as NULL.
pub fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn referral_link(domain_name: &str, username: &str) -> String {
    format!("{}/signup/{username}", domain_name.trim_end_matches('/'))
}

pub async fn account_view(
    conn: &mut AsyncPgConnection,
    domain_name: &str,
    user_id: i32,
) -> Result<AccountView, AppError> {
    let user: AppUserEntity = app_users::table
        .find(user_id)
        .select(AppUserEntity::as_select())
        .first(conn)
        .await?;
    let profile: Option<ProfileEntity> = profiles::table
        .filter(profiles::user_id.eq(user_id))
        .select(ProfileEntity::as_select())
        .first(conn)
        .await
        .optional()?;
    let address: Option<AddressEntity> = addresses::table
        .filter(addresses::user_id.eq(user_id))
        .select(AddressEntity::as_select())
        .first(conn)
        .await
        .optional()?;
    let picture_id = profile.as_ref().and_then(|profile| profile.profile_picture_id);
    let profile_picture = fetch_optional_media(conn, picture_id)
        .await?
        .map(|media| media.media_path);

    Ok(AccountView {
        referral_link: referral_link(domain_name, &user.username),
        user,
        profile,
        address,
        profile_picture,
    })
}

/// Replaces the profile and address fields in one transaction.
pub async fn save_profile(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    input: ProfileInput,
) -> Result<(), AppError> {
    let profile = UpsertProfileEntity {
        user_id,
        firstname: clean(input.firstname),
        lastname: clean(input.lastname),
        gender: clean(input.gender),
        phone: clean(input.phone),
        updated_at: Utc::now(),
    };
    let address = UpsertAddressEntity {
        user_id,
        country: clean(input.country),
        state: clean(input.state),
        updated_at: Utc::now(),
    };

    conn.transaction::<_, AppError, _>(move |conn| {
        Box::pin(async move {
            diesel::insert_into(profiles::table)
                .values(&profile)
                .on_conflict(profiles::user_id)
                .do_update()
                .set(&profile)
                .execute(conn)
                .await?;
            diesel::insert_into(addresses::table)
                .values(&address)
                .on_conflict(addresses::user_id)
                .do_update()
                .set(&address)
                .execute(conn)
                .await?;
            Ok(())
        })
    })
    .await?;
    tracing::info!("Saved profile of user {}", user_id);
    Ok(())
}

pub async fn set_profile_picture(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    media_id: i32,
) -> Result<(), AppError> {
    ensure_media(conn, Some(media_id)).await?;
    diesel::insert_into(profiles::table)
        .values((
            profiles::user_id.eq(user_id),
            profiles::profile_picture_id.eq(Some(media_id)),
        ))
        .on_conflict(profiles::user_id)
        .do_update()
        .set((
            profiles::profile_picture_id.eq(Some(media_id)),
            profiles::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blanks_become_null() {
        assert_eq!(clean(Some("  Ada ".into())).as_deref(), Some("Ada"));
        assert_eq!(clean(Some("   ".into())), None);
        assert_eq!(clean(None), None);
    }

    #[test]
    fn referral_links_use_the_username() {
        assert_eq!(
            referral_link("https://shop.test/", "ada"),
            "https://shop.test/signup/ada"
        );
    }
}
