//! Category tree: lookups, create/update with duplicate and cycle checks,
//! and deletion that keeps every product categorized.

use std::collections::{HashMap, HashSet};

use diesel::{
    ExpressionMethods, OptionalExtension, PgTextExpressionMethods, QueryDsl, SelectableHelper,
};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    core::app_error::AppError,
    helpers::{media::ensure_media, slug::unique_category_slug},
    models::{CategoryEntity, CreateCategoryEntity, ProductCategoryEntity},
    schema::{categories, product_categories},
};

pub const UNCATEGORIZED_SLUG: &str = "uncategorized";
const UNCATEGORIZED_NAME: &str = "Uncategorized";

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct CategoryNode {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
    pub parent_id: Option<i32>,
    pub media_id: Option<i32>,
    #[schema(no_recursion)]
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    fn leaf(category: &CategoryEntity) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            description: category.description.clone(),
            slug: category.slug.clone(),
            parent_id: category.parent_id,
            media_id: category.media_id,
            children: Vec::new(),
        }
    }
}

/// Nests categories under their parents. Rows whose parent is missing are
/// treated as roots. Sibling order follows the input order.
pub fn build_category_tree(categories: &[CategoryEntity]) -> Vec<CategoryNode> {
    let known: HashSet<i32> = categories.iter().map(|c| c.id).collect();
    let mut children_of: HashMap<Option<i32>, Vec<&CategoryEntity>> = HashMap::new();
    for category in categories {
        let parent = category.parent_id.filter(|id| known.contains(id));
        children_of.entry(parent).or_default().push(category);
    }

    fn attach(
        node: &CategoryEntity,
        children_of: &HashMap<Option<i32>, Vec<&CategoryEntity>>,
        path: &mut HashSet<i32>,
    ) -> CategoryNode {
        let mut built = CategoryNode::leaf(node);
        if path.insert(node.id) {
            if let Some(children) = children_of.get(&Some(node.id)) {
                built.children = children
                    .iter()
                    .map(|child| attach(child, children_of, path))
                    .collect();
            }
            path.remove(&node.id);
        }
        built
    }

    let mut path = HashSet::new();
    children_of
        .get(&None)
        .map(|roots| {
            roots
                .iter()
                .map(|root| attach(root, &children_of, &mut path))
                .collect()
        })
        .unwrap_or_default()
}

/// True when making `new_parent` the parent of `id` would put `id` among its
/// own ancestors.
pub fn would_create_cycle(parents: &HashMap<i32, Option<i32>>, id: i32, new_parent: i32) -> bool {
    let mut current = Some(new_parent);
    let mut seen = HashSet::new();
    while let Some(ancestor) = current {
        if ancestor == id {
            return true;
        }
        if !seen.insert(ancestor) {
            return false;
        }
        current = parents.get(&ancestor).copied().flatten();
    }
    false
}

/// Products linked to `category_id` and to no other category.
pub fn sole_category_products(links: &[(i32, i32)], category_id: i32) -> Vec<i32> {
    let mut counts: HashMap<i32, (usize, bool)> = HashMap::new();
    for (product_id, linked_category) in links {
        let entry = counts.entry(*product_id).or_default();
        entry.0 += 1;
        entry.1 |= *linked_category == category_id;
    }
    let mut sole: Vec<i32> = counts
        .into_iter()
        .filter(|(_, (count, linked))| *linked && *count == 1)
        .map(|(product_id, _)| product_id)
        .collect();
    sole.sort_unstable();
    sole
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
    /// Uploaded image. Left out on update, the current image stays.
    pub media_id: Option<i32>,
}

pub async fn fetch_categories(
    conn: &mut AsyncPgConnection,
    parent_id: Option<i32>,
    parent_only: bool,
    search: Option<&str>,
) -> Result<Vec<CategoryEntity>, AppError> {
    let mut query = categories::table
        .select(CategoryEntity::as_select())
        .into_boxed();
    if let Some(parent_id) = parent_id {
        query = query.filter(categories::parent_id.eq(parent_id));
    } else if parent_only {
        query = query.filter(categories::parent_id.is_null());
    }
    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        query = query.filter(categories::name.ilike(format!("%{term}%")));
    }
    Ok(query
        .order_by(categories::id.desc())
        .load(conn)
        .await?)
}

pub async fn fetch_category_tree(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<CategoryNode>, AppError> {
    let all: Vec<CategoryEntity> = categories::table
        .select(CategoryEntity::as_select())
        .order_by(categories::name.asc())
        .load(conn)
        .await?;
    Ok(build_category_tree(&all))
}

/// By numeric id or by slug.
pub async fn fetch_category(
    conn: &mut AsyncPgConnection,
    identifier: &str,
) -> Result<CategoryEntity, AppError> {
    let query = categories::table.select(CategoryEntity::as_select());
    let category = match identifier.parse::<i32>() {
        Ok(id) => query.filter(categories::id.eq(id)).first(conn).await?,
        Err(_) => query.filter(categories::slug.eq(identifier)).first(conn).await?,
    };
    Ok(category)
}

async fn ensure_unique_name(
    conn: &mut AsyncPgConnection,
    input: &CategoryInput,
    exclude_id: Option<i32>,
) -> Result<(), AppError> {
    let mut query = categories::table
        .select(categories::id)
        .filter(categories::name.eq(input.name.trim()))
        .into_boxed();
    query = match input.parent_id {
        Some(parent_id) => query.filter(categories::parent_id.eq(parent_id)),
        None => query.filter(categories::parent_id.is_null()),
    };
    if let Some(id) = exclude_id {
        query = query.filter(categories::id.ne(id));
    }
    let duplicate: Option<i32> = query.first(conn).await.optional()?;
    if duplicate.is_some() {
        return Err(AppError::Conflict(
            "Category name already exists within the selected parent category.".into(),
        ));
    }
    Ok(())
}

fn validate(input: &CategoryInput) -> Result<(), AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("Category name is required".into()));
    }
    Ok(())
}

pub async fn create_category(
    conn: &mut AsyncPgConnection,
    input: CategoryInput,
) -> Result<CategoryEntity, AppError> {
    validate(&input)?;
    ensure_unique_name(conn, &input, None).await?;
    if let Some(parent_id) = input.parent_id {
        fetch_category(conn, &parent_id.to_string()).await?;
    }
    ensure_media(conn, input.media_id).await?;

    let slug = unique_category_slug(conn, &input.name, None).await?;
    let category = diesel::insert_into(categories::table)
        .values(CreateCategoryEntity {
            name: input.name.trim().to_string(),
            description: input.description,
            slug,
            parent_id: input.parent_id,
            media_id: input.media_id,
        })
        .returning(CategoryEntity::as_returning())
        .get_result(conn)
        .await?;
    tracing::info!("Created category {} ({})", category.name, category.slug);
    Ok(category)
}

pub async fn update_category(
    conn: &mut AsyncPgConnection,
    id: i32,
    input: CategoryInput,
) -> Result<CategoryEntity, AppError> {
    validate(&input)?;
    let current = fetch_category(conn, &id.to_string()).await?;
    ensure_unique_name(conn, &input, Some(id)).await?;
    ensure_media(conn, input.media_id).await?;

    if let Some(parent_id) = input.parent_id {
        let parents: HashMap<i32, Option<i32>> = categories::table
            .select((categories::id, categories::parent_id))
            .load::<(i32, Option<i32>)>(conn)
            .await?
            .into_iter()
            .collect();
        if !parents.contains_key(&parent_id) {
            return Err(AppError::BadRequest("Parent category does not exist".into()));
        }
        if would_create_cycle(&parents, id, parent_id) {
            return Err(AppError::BadRequest(
                "A category cannot be moved under itself or its descendants".into(),
            ));
        }
    }

    let slug = unique_category_slug(conn, &input.name, Some(id)).await?;
    Ok(diesel::update(categories::table.find(id))
        .set(CreateCategoryEntity {
            name: input.name.trim().to_string(),
            description: input.description,
            slug,
            parent_id: input.parent_id,
            media_id: input.media_id.or(current.media_id),
        })
        .returning(CategoryEntity::as_returning())
        .get_result(conn)
        .await?)
}

/// Id of the `uncategorized` sentinel, creating it on first use.
pub async fn get_or_create_uncategorized(conn: &mut AsyncPgConnection) -> Result<i32, AppError> {
    let existing: Option<i32> = categories::table
        .select(categories::id)
        .filter(categories::slug.eq(UNCATEGORIZED_SLUG))
        .first(conn)
        .await
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let id = diesel::insert_into(categories::table)
        .values(CreateCategoryEntity {
            name: UNCATEGORIZED_NAME.into(),
            description: None,
            slug: UNCATEGORIZED_SLUG.into(),
            parent_id: None,
            media_id: None,
        })
        .on_conflict(categories::slug)
        .do_update()
        .set(categories::name.eq(UNCATEGORIZED_NAME))
        .returning(categories::id)
        .get_result(conn)
        .await?;
    Ok(id)
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CategoryDeletion {
    pub deleted: CategoryEntity,
    pub reassigned_products: Vec<i32>,
    pub detached_children: usize,
}

/// Deletes a category in one transaction. Products left without any category
/// move to `uncategorized`; child categories become roots.
pub async fn delete_category(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> Result<CategoryDeletion, AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let category = fetch_category(conn, &id.to_string()).await?;
            if category.slug == UNCATEGORIZED_SLUG {
                return Err(AppError::BadRequest(
                    "The uncategorized category cannot be deleted".into(),
                ));
            }

            let linked_products: Vec<i32> = product_categories::table
                .filter(product_categories::category_id.eq(id))
                .select(product_categories::product_id)
                .load(conn)
                .await?;
            let links: Vec<(i32, i32)> = product_categories::table
                .filter(product_categories::product_id.eq_any(&linked_products))
                .select((product_categories::product_id, product_categories::category_id))
                .load(conn)
                .await?;
            let orphans = sole_category_products(&links, id);

            if !orphans.is_empty() {
                let uncategorized = get_or_create_uncategorized(conn).await?;
                let rows: Vec<ProductCategoryEntity> = orphans
                    .iter()
                    .map(|product_id| ProductCategoryEntity {
                        product_id: *product_id,
                        category_id: uncategorized,
                    })
                    .collect();
                diesel::insert_into(product_categories::table)
                    .values(&rows)
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;
            }

            let detached_children = diesel::update(
                categories::table.filter(categories::parent_id.eq(id)),
            )
            .set(categories::parent_id.eq(None::<i32>))
            .execute(conn)
            .await?;

            diesel::delete(product_categories::table.filter(product_categories::category_id.eq(id)))
                .execute(conn)
                .await?;
            diesel::delete(categories::table.find(id))
                .execute(conn)
                .await?;

            tracing::info!(
                "Deleted category {}: {} products reassigned, {} children detached",
                category.slug,
                orphans.len(),
                detached_children
            );

            Ok::<CategoryDeletion, AppError>(CategoryDeletion {
                deleted: category,
                reassigned_products: orphans,
                detached_children,
            })
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn category(id: i32, name: &str, parent_id: Option<i32>) -> CategoryEntity {
        CategoryEntity {
            id,
            name: name.into(),
            description: None,
            slug: name.to_lowercase(),
            parent_id,
            created_at: Utc::now(),
            media_id: None,
        }
    }

    #[test]
    fn builds_nested_tree() {
        let rows = vec![
            category(1, "Clothing", None),
            category(2, "Shirts", Some(1)),
            category(3, "Dress Shirts", Some(2)),
            category(4, "Books", None),
            category(5, "Orphan", Some(99)),
        ];
        let tree = build_category_tree(&rows);
        assert_eq!(
            tree.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![1, 4, 5]
        );
        assert_eq!(tree[0].children[0].id, 2);
        assert_eq!(tree[0].children[0].children[0].id, 3);
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn detects_ancestor_cycles() {
        let parents: HashMap<i32, Option<i32>> =
            [(1, None), (2, Some(1)), (3, Some(2)), (4, None)].into_iter().collect();
        assert!(would_create_cycle(&parents, 1, 3));
        assert!(would_create_cycle(&parents, 2, 2));
        assert!(!would_create_cycle(&parents, 3, 4));
        assert!(!would_create_cycle(&parents, 4, 1));
    }

    #[test]
    fn finds_products_left_without_category() {
        // product 10 only in 7; product 11 in 7 and 8; product 12 only in 8
        let links = vec![(10, 7), (11, 7), (11, 8), (12, 8)];
        assert_eq!(sole_category_products(&links, 7), vec![10]);
        assert_eq!(sole_category_products(&links, 8), vec![12]);
        assert!(sole_category_products(&links, 9).is_empty());
    }
}
