use bigdecimal::{BigDecimal, Signed};
use chrono::Utc;
use diesel::{
    BoolExpressionMethods, ExpressionMethods, PgTextExpressionMethods, QueryDsl, SelectableHelper,
};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    core::{
        app_error::AppError,
        pagination::{PageQuery, Paginated},
    },
    enums::PublishStatus,
    helpers::{
        account::clean,
        categories::get_or_create_uncategorized,
        media::{ensure_media, fetch_optional_media},
        slug::unique_product_slug,
        tags::save_tags,
    },
    models::{
        CategoryEntity, CreateProductEntity, MediaEntity, ProductCategoryEntity, ProductEntity,
        ProductTagEntity, TagEntity, UpdateProductEntity,
    },
    schema::{categories, product_categories, product_tags, products, tags},
};

#[derive(Deserialize, IntoParams, Debug, Default, Clone)]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    pub search: Option<String>,
    /// Category id or slug.
    pub category: Option<String>,
    /// Tag id or slug.
    pub tag: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub selling_price: BigDecimal,
    #[schema(value_type = Option<String>)]
    pub actual_price: Option<BigDecimal>,
    pub pub_status: Option<PublishStatus>,
    #[serde(default)]
    pub category_ids: Vec<i32>,
    /// Comma separated tag names, created when missing.
    pub tags: Option<String>,
    /// Comma separated.
    pub sizes: Option<String>,
    /// Comma separated.
    pub colors: Option<String>,
    /// Uploaded image. Left out on update, the current image stays.
    pub media_id: Option<i32>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductEntity,
    pub categories: Vec<CategoryEntity>,
    pub tags: Vec<TagEntity>,
    pub media: Option<MediaEntity>,
}

fn validate(input: &ProductInput) -> Result<(), AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("Product name is required".into()));
    }
    if input.selling_price.is_negative() {
        return Err(AppError::BadRequest("Selling price cannot be negative".into()));
    }
    if input.actual_price.as_ref().is_some_and(|price| price.is_negative()) {
        return Err(AppError::BadRequest("Actual price cannot be negative".into()));
    }
    Ok(())
}

pub async fn fetch_products(
    conn: &mut AsyncPgConnection,
    filter: &ProductFilter,
    page: &PageQuery,
    published_only: bool,
) -> Result<Paginated<ProductEntity>, AppError> {
    let category_id = match filter.category.as_deref().filter(|c| !c.is_empty()) {
        Some(identifier) => Some(
            crate::helpers::categories::fetch_category(conn, identifier)
                .await?
                .id,
        ),
        None => None,
    };
    let tag_id = match filter.tag.as_deref().filter(|t| !t.is_empty()) {
        Some(identifier) => Some(crate::helpers::tags::fetch_tag(conn, identifier).await?.id),
        None => None,
    };

    let build = || {
        let mut query = products::table.into_boxed();
        if published_only {
            query = query.filter(products::pub_status.eq(PublishStatus::Published.as_str()));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{term}%");
            query = query.filter(
                products::name
                    .ilike(pattern.clone())
                    .or(products::description.ilike(pattern)),
            );
        }
        if let Some(category_id) = category_id {
            query = query.filter(
                products::id.eq_any(
                    product_categories::table
                        .filter(product_categories::category_id.eq(category_id))
                        .select(product_categories::product_id),
                ),
            );
        }
        if let Some(tag_id) = tag_id {
            query = query.filter(
                products::id.eq_any(
                    product_tags::table
                        .filter(product_tags::tag_id.eq(tag_id))
                        .select(product_tags::product_id),
                ),
            );
        }
        query
    };

    let total: i64 = build().count().get_result(conn).await?;
    let items = build()
        .select(ProductEntity::as_select())
        .order_by(products::created_at.desc())
        .limit(page.per_page())
        .offset(page.offset())
        .load(conn)
        .await?;
    Ok(Paginated::new(items, page, total))
}

/// By numeric id, uuid or slug.
pub async fn fetch_product(
    conn: &mut AsyncPgConnection,
    identifier: &str,
) -> Result<ProductEntity, AppError> {
    let query = products::table.select(ProductEntity::as_select());
    let product = if let Ok(id) = identifier.parse::<i32>() {
        query.filter(products::id.eq(id)).first(conn).await?
    } else if let Ok(uuid) = Uuid::parse_str(identifier) {
        query.filter(products::uuid.eq(uuid)).first(conn).await?
    } else {
        query.filter(products::slug.eq(identifier)).first(conn).await?
    };
    Ok(product)
}

pub async fn product_detail(
    conn: &mut AsyncPgConnection,
    product: ProductEntity,
) -> Result<ProductDetail, AppError> {
    let categories = categories::table
        .inner_join(product_categories::table)
        .filter(product_categories::product_id.eq(product.id))
        .select(CategoryEntity::as_select())
        .order_by(categories::name.asc())
        .load(conn)
        .await?;
    let tags = tags::table
        .inner_join(product_tags::table)
        .filter(product_tags::product_id.eq(product.id))
        .select(TagEntity::as_select())
        .order_by(tags::name.asc())
        .load(conn)
        .await?;
    let media = fetch_optional_media(conn, product.media_id).await?;
    Ok(ProductDetail {
        product,
        categories,
        tags,
        media,
    })
}

/// Replaces a product's category and tag links. No categories means
/// `uncategorized`.
async fn link_product(
    conn: &mut AsyncPgConnection,
    product_id: i32,
    category_ids: &[i32],
    raw_tags: Option<&str>,
) -> Result<(), AppError> {
    let mut category_ids = category_ids.to_vec();
    category_ids.sort_unstable();
    category_ids.dedup();
    if category_ids.is_empty() {
        category_ids.push(get_or_create_uncategorized(conn).await?);
    } else {
        let found: i64 = categories::table
            .filter(categories::id.eq_any(&category_ids))
            .count()
            .get_result(conn)
            .await?;
        if found != category_ids.len() as i64 {
            return Err(AppError::BadRequest("Unknown category".into()));
        }
    }

    diesel::delete(product_categories::table.filter(product_categories::product_id.eq(product_id)))
        .execute(conn)
        .await?;
    let links: Vec<ProductCategoryEntity> = category_ids
        .iter()
        .map(|category_id| ProductCategoryEntity {
            product_id,
            category_id: *category_id,
        })
        .collect();
    diesel::insert_into(product_categories::table)
        .values(&links)
        .execute(conn)
        .await?;

    if let Some(raw_tags) = raw_tags {
        let tag_ids = save_tags(conn, raw_tags).await?;
        diesel::delete(product_tags::table.filter(product_tags::product_id.eq(product_id)))
            .execute(conn)
            .await?;
        let links: Vec<ProductTagEntity> = tag_ids
            .into_iter()
            .map(|tag_id| ProductTagEntity { product_id, tag_id })
            .collect();
        if !links.is_empty() {
            diesel::insert_into(product_tags::table)
                .values(&links)
                .on_conflict_do_nothing()
                .execute(conn)
                .await?;
        }
    }
    Ok(())
}

pub async fn create_product(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    input: ProductInput,
) -> Result<ProductDetail, AppError> {
    validate(&input)?;
    conn.transaction(move |conn| {
        Box::pin(async move {
            ensure_media(conn, input.media_id).await?;
            let slug = unique_product_slug(conn, &input.name, None).await?;
            let product: ProductEntity = diesel::insert_into(products::table)
                .values(CreateProductEntity {
                    uuid: Uuid::new_v4(),
                    name: input.name.trim().to_string(),
                    slug,
                    description: input.description,
                    selling_price: input.selling_price,
                    actual_price: input.actual_price,
                    pub_status: input.pub_status.unwrap_or(PublishStatus::Published).to_string(),
                    user_id,
                    sizes: clean(input.sizes),
                    colors: clean(input.colors),
                    media_id: input.media_id,
                })
                .returning(ProductEntity::as_returning())
                .get_result(conn)
                .await?;

            link_product(conn, product.id, &input.category_ids, input.tags.as_deref()).await?;
            tracing::info!("Created product {} ({})", product.name, product.uuid);
            product_detail(conn, product).await
        })
    })
    .await
}

pub async fn update_product(
    conn: &mut AsyncPgConnection,
    id: i32,
    input: ProductInput,
) -> Result<ProductDetail, AppError> {
    validate(&input)?;
    conn.transaction(move |conn| {
        Box::pin(async move {
            let current_media: Option<i32> = products::table
                .find(id)
                .select(products::media_id)
                .first(conn)
                .await?;
            ensure_media(conn, input.media_id).await?;
            let slug = unique_product_slug(conn, &input.name, Some(id)).await?;
            let product: ProductEntity = diesel::update(products::table.find(id))
                .set(UpdateProductEntity {
                    name: input.name.trim().to_string(),
                    slug,
                    description: input.description,
                    selling_price: input.selling_price,
                    actual_price: input.actual_price,
                    pub_status: input.pub_status.unwrap_or(PublishStatus::Published).to_string(),
                    updated_at: Utc::now(),
                    sizes: clean(input.sizes),
                    colors: clean(input.colors),
                    media_id: input.media_id.or(current_media),
                })
                .returning(ProductEntity::as_returning())
                .get_result(conn)
                .await?;

            link_product(conn, product.id, &input.category_ids, input.tags.as_deref()).await?;
            product_detail(conn, product).await
        })
    })
    .await
}

pub async fn delete_product(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> Result<ProductEntity, AppError> {
    Ok(diesel::delete(products::table.find(id))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn input(price: &str) -> ProductInput {
        ProductInput {
            name: "Linen Shirt".into(),
            description: None,
            selling_price: BigDecimal::from_str(price).unwrap(),
            actual_price: None,
            pub_status: None,
            category_ids: vec![],
            tags: None,
            sizes: None,
            colors: None,
            media_id: None,
        }
    }

    #[test]
    fn rejects_negative_prices_and_blank_names() {
        assert!(validate(&input("19.99")).is_ok());
        assert!(matches!(validate(&input("-1")), Err(AppError::BadRequest(_))));
        let mut blank = input("1");
        blank.name = "  ".into();
        assert!(validate(&blank).is_err());
    }
}
