//! Uploaded images. Files are written to the media directory and served
//! back under `/uploads`; the `media` row keeps the public path.

use std::path::Path;

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::{
    core::{
        app_error::AppError,
        pagination::{PageQuery, Paginated},
    },
    helpers::slug::slugify,
    models::{CreateMediaEntity, MediaEntity},
    schema::media,
};

pub const MEDIA_URL_PREFIX: &str = "/uploads";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];
const MAX_STEM_LEN: usize = 80;

/// Slugged stem plus lowercased extension, or `None` when the name does not
/// end in an image extension.
pub fn sanitize_filename(original: &str) -> Option<String> {
    let name = original.rsplit(['/', '\\']).next()?;
    let (stem, extension) = name.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }
    let mut stem = slugify(stem);
    stem.truncate(MAX_STEM_LEN);
    Some(format!("{}.{extension}", stem.trim_end_matches('-')))
}

/// Writes an upload to `media_dir` and records it.
pub async fn save_media(
    conn: &mut AsyncPgConnection,
    media_dir: &Path,
    original_name: &str,
    bytes: &[u8],
) -> Result<MediaEntity, AppError> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }
    let filename = sanitize_filename(original_name)
        .ok_or_else(|| AppError::BadRequest("Only image uploads are accepted".into()))?;
    let stored_name = format!("{}-{filename}", Uuid::new_v4().simple());

    tokio::fs::create_dir_all(media_dir)
        .await
        .context("Failed to create the media directory")?;
    let path = media_dir.join(&stored_name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let inserted = diesel::insert_into(media::table)
        .values(CreateMediaEntity {
            filename,
            media_path: format!("{MEDIA_URL_PREFIX}/{stored_name}"),
        })
        .returning(MediaEntity::as_returning())
        .get_result(conn)
        .await;
    match inserted {
        Ok(saved) => {
            tracing::info!("Saved media {} at {}", saved.id, saved.media_path);
            Ok(saved)
        }
        Err(err) => {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Could not remove {}: {}", path.display(), remove_err);
            }
            Err(err.into())
        }
    }
}

pub async fn fetch_media(conn: &mut AsyncPgConnection, id: i32) -> Result<MediaEntity, AppError> {
    Ok(media::table
        .find(id)
        .select(MediaEntity::as_select())
        .first(conn)
        .await?)
}

pub async fn fetch_optional_media(
    conn: &mut AsyncPgConnection,
    id: Option<i32>,
) -> Result<Option<MediaEntity>, AppError> {
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(media::table
        .find(id)
        .select(MediaEntity::as_select())
        .first(conn)
        .await
        .optional()?)
}

/// Rejects references to media that do not exist.
pub async fn ensure_media(conn: &mut AsyncPgConnection, id: Option<i32>) -> Result<(), AppError> {
    if let Some(id) = id {
        if fetch_optional_media(conn, Some(id)).await?.is_none() {
            return Err(AppError::BadRequest(format!("Media {id} does not exist")));
        }
    }
    Ok(())
}

pub async fn fetch_media_page(
    conn: &mut AsyncPgConnection,
    page: &PageQuery,
) -> Result<Paginated<MediaEntity>, AppError> {
    let total: i64 = media::table.count().get_result(conn).await?;
    let items = media::table
        .select(MediaEntity::as_select())
        .order_by(media::created_at.desc())
        .limit(page.per_page())
        .offset(page.offset())
        .load(conn)
        .await?;
    Ok(Paginated::new(items, page, total))
}

/// Deletes the row, then the file. References to it are cleared by the
/// foreign keys.
pub async fn delete_media(
    conn: &mut AsyncPgConnection,
    media_dir: &Path,
    id: i32,
) -> Result<MediaEntity, AppError> {
    let deleted: MediaEntity = diesel::delete(media::table.filter(media::id.eq(id)))
        .returning(MediaEntity::as_returning())
        .get_result(conn)
        .await?;

    if let Some(stored_name) = deleted
        .media_path
        .strip_prefix(MEDIA_URL_PREFIX)
        .map(|rest| rest.trim_start_matches('/'))
        .filter(|rest| !rest.is_empty() && !rest.contains(['/', '\\']))
    {
        let path = media_dir.join(stored_name);
        if let Err(err) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Could not remove {}: {}", path.display(), err);
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_image_names_safe() {
        assert_eq!(sanitize_filename("Summer Shirt.PNG").as_deref(), Some("summer-shirt.png"));
        assert_eq!(
            sanitize_filename("../../etc/banner.jpg").as_deref(),
            Some("banner.jpg")
        );
        assert_eq!(sanitize_filename(r"C:\photos\front.webp").as_deref(), Some("front.webp"));
    }

    #[test]
    fn rejects_non_images() {
        assert_eq!(sanitize_filename("invoice.pdf"), None);
        assert_eq!(sanitize_filename("no-extension"), None);
    }

    #[test]
    fn long_names_are_truncated() {
        let long = format!("{}.gif", "a".repeat(300));
        let name = sanitize_filename(&long).unwrap();
        assert_eq!(name.len(), MAX_STEM_LEN + ".gif".len());
    }
}
