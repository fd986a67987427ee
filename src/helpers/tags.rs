use diesel::{
    ExpressionMethods, OptionalExtension, PgTextExpressionMethods, QueryDsl, SelectableHelper,
    define_sql_function, sql_types::Text,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    core::app_error::AppError,
    helpers::slug::unique_tag_slug,
    models::{CreateTagEntity, TagEntity},
    schema::tags,
};

define_sql_function!(fn lower(x: Text) -> Text);

/// Splits a comma separated tag list, trimming blanks and dropping
/// case-insensitive repeats while keeping first spelling.
pub fn parse_tag_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !names.iter().any(|seen| seen.eq_ignore_ascii_case(name)) {
            names.push(name.to_string());
        }
    }
    names
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct TagInput {
    pub name: String,
    pub description: Option<String>,
}

pub async fn fetch_tags(
    conn: &mut AsyncPgConnection,
    search: Option<&str>,
) -> Result<Vec<TagEntity>, AppError> {
    let mut query = tags::table.select(TagEntity::as_select()).into_boxed();
    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        query = query.filter(tags::name.ilike(format!("%{term}%")));
    }
    Ok(query.order_by(tags::name.asc()).load(conn).await?)
}

/// By numeric id or by slug.
pub async fn fetch_tag(conn: &mut AsyncPgConnection, identifier: &str) -> Result<TagEntity, AppError> {
    let query = tags::table.select(TagEntity::as_select());
    let tag = match identifier.parse::<i32>() {
        Ok(id) => query.filter(tags::id.eq(id)).first(conn).await?,
        Err(_) => query.filter(tags::slug.eq(identifier)).first(conn).await?,
    };
    Ok(tag)
}

async fn find_by_name(
    conn: &mut AsyncPgConnection,
    name: &str,
) -> Result<Option<TagEntity>, AppError> {
    Ok(tags::table
        .select(TagEntity::as_select())
        .filter(lower(tags::name).eq(name.to_lowercase()))
        .first(conn)
        .await
        .optional()?)
}

pub async fn create_tag(conn: &mut AsyncPgConnection, input: TagInput) -> Result<TagEntity, AppError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Tag name is required".into()));
    }
    if find_by_name(conn, name).await?.is_some() {
        return Err(AppError::Conflict(format!("Tag {name} already exists")));
    }

    let slug = unique_tag_slug(conn, name, None).await?;
    Ok(diesel::insert_into(tags::table)
        .values(CreateTagEntity {
            name: name.to_string(),
            description: input.description,
            slug,
        })
        .returning(TagEntity::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn update_tag(
    conn: &mut AsyncPgConnection,
    id: i32,
    input: TagInput,
) -> Result<TagEntity, AppError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Tag name is required".into()));
    }
    if let Some(other) = find_by_name(conn, name).await? {
        if other.id != id {
            return Err(AppError::Conflict(format!("Tag {name} already exists")));
        }
    }

    let slug = unique_tag_slug(conn, name, Some(id)).await?;
    Ok(diesel::update(tags::table.find(id))
        .set(CreateTagEntity {
            name: name.to_string(),
            description: input.description,
            slug,
        })
        .returning(TagEntity::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn delete_tag(conn: &mut AsyncPgConnection, id: i32) -> Result<TagEntity, AppError> {
    Ok(diesel::delete(tags::table.find(id))
        .returning(TagEntity::as_returning())
        .get_result(conn)
        .await?)
}

/// Resolves a comma separated list to tag ids, creating missing tags.
pub async fn save_tags(conn: &mut AsyncPgConnection, raw: &str) -> Result<Vec<i32>, AppError> {
    let mut ids = Vec::new();
    for name in parse_tag_names(raw) {
        let id = match find_by_name(conn, &name).await? {
            Some(tag) => tag.id,
            None => {
                let slug = unique_tag_slug(conn, &name, None).await?;
                diesel::insert_into(tags::table)
                    .values(CreateTagEntity {
                        name,
                        description: None,
                        slug,
                    })
                    .returning(tags::id)
                    .get_result(conn)
                    .await?
            }
        };
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_names() {
        assert_eq!(
            parse_tag_names(" Summer, sale ,,SUMMER, New Arrivals "),
            vec!["Summer", "sale", "New Arrivals"]
        );
        assert!(parse_tag_names(" , ").is_empty());
    }
}
