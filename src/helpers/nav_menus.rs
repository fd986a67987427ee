//! Navigation menus and their nested, ordered items.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    core::app_error::AppError,
    enums::NavItemType,
    helpers::{
        pages::find_page,
        slug::{pick_unique_slug, slugify, unique_menu_slug},
    },
    models::{
        CreateNavMenuItemEntity, CreateNavigationMenuEntity, NavMenuItemEntity,
        NavigationMenuEntity,
    },
    schema::{categories, nav_menu_items, navigation_menus, tags},
};

pub const MAIN_MENU_SLUG: &str = "main-menu";
pub const DEFAULT_ICON_CLASS: &str = "bx-pie-chart";

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct NavItemNode {
    pub id: i32,
    pub name: String,
    pub label: Option<String>,
    pub slug: String,
    pub url: Option<String>,
    pub order: i32,
    pub item_type: String,
    pub ref_id: Option<i32>,
    pub is_active: bool,
    pub icon_class: Option<String>,
    pub icon_path: Option<String>,
    pub parent_id: Option<i32>,
    #[schema(no_recursion)]
    pub children: Vec<NavItemNode>,
}

impl NavItemNode {
    fn leaf(item: &NavMenuItemEntity) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            label: item.label.clone(),
            slug: item.slug.clone(),
            url: item.url.clone(),
            order: item.sort_order,
            item_type: item.item_type.clone(),
            ref_id: item.ref_id,
            is_active: item.is_active,
            icon_class: item.icon_class.clone(),
            icon_path: item.icon_path.clone(),
            parent_id: item.parent_id,
            children: Vec::new(),
        }
    }
}

/// Nests items under their parents. Children are sorted by `order` and only
/// active ones are kept; roots are kept regardless unless `active_roots_only`.
pub fn build_nav_tree(items: &[NavMenuItemEntity], active_roots_only: bool) -> Vec<NavItemNode> {
    let mut children_of: HashMap<Option<i32>, Vec<&NavMenuItemEntity>> = HashMap::new();
    for item in items {
        children_of.entry(item.parent_id).or_default().push(item);
    }
    for siblings in children_of.values_mut() {
        siblings.sort_by_key(|item| (item.sort_order, item.id));
    }

    fn attach(
        item: &NavMenuItemEntity,
        children_of: &HashMap<Option<i32>, Vec<&NavMenuItemEntity>>,
        depth: usize,
    ) -> NavItemNode {
        let mut node = NavItemNode::leaf(item);
        if depth < children_of.len() {
            node.children = children_of
                .get(&Some(item.id))
                .map(|children| {
                    children
                        .iter()
                        .filter(|child| child.is_active)
                        .map(|child| attach(child, children_of, depth + 1))
                        .collect()
                })
                .unwrap_or_default();
        }
        node
    }

    children_of
        .get(&None)
        .map(|roots| {
            roots
                .iter()
                .filter(|root| !active_roots_only || root.is_active)
                .map(|root| attach(root, &children_of, 0))
                .collect()
        })
        .unwrap_or_default()
}

/// One item in a `save_items` request. `key` is a client-side id other items
/// reference through `parent_key`.
#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct NavItemInput {
    pub key: String,
    pub parent_key: Option<String>,
    pub name: String,
    pub label: Option<String>,
    pub item_type: NavItemType,
    pub ref_id: Option<i32>,
    pub url: Option<String>,
    pub order: Option<i32>,
    pub is_active: Option<bool>,
    pub icon_class: Option<String>,
    pub icon_path: Option<String>,
}

/// Slugs of the rows `category` and `tag` items point at.
#[derive(Debug, Default)]
pub struct RefSlugs {
    pub categories: HashMap<i32, String>,
    pub tags: HashMap<i32, String>,
}

/// URL stored on an item, resolved once when the item is saved.
pub fn resolve_url(input: &NavItemInput, refs: &RefSlugs) -> Result<String, AppError> {
    let missing = |what: &str| {
        AppError::BadRequest(format!("Nav item {:?} references an unknown {what}", input.name))
    };
    match input.item_type {
        NavItemType::Category => input
            .ref_id
            .and_then(|id| refs.categories.get(&id))
            .map(|slug| format!("/categories/{slug}"))
            .ok_or_else(|| missing("category")),
        NavItemType::Tag => input
            .ref_id
            .and_then(|id| refs.tags.get(&id))
            .map(|slug| format!("/tags/{slug}"))
            .ok_or_else(|| missing("tag")),
        NavItemType::Page => input
            .ref_id
            .and_then(find_page)
            .map(|page| page.path.to_string())
            .ok_or_else(|| missing("page")),
        NavItemType::Custom => input
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest(format!("Nav item {:?} needs a url", input.name))),
    }
}

/// Maps every input to the index of its parent input, rejecting duplicate
/// keys, unknown parents and cycles.
pub fn resolve_parents(inputs: &[NavItemInput]) -> Result<Vec<Option<usize>>, AppError> {
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for (index, input) in inputs.iter().enumerate() {
        if index_of.insert(input.key.as_str(), index).is_some() {
            return Err(AppError::BadRequest(format!("Duplicate nav item key {:?}", input.key)));
        }
    }

    let parents = inputs
        .iter()
        .map(|input| match input.parent_key.as_deref().filter(|k| !k.is_empty()) {
            None => Ok(None),
            Some(parent_key) => index_of.get(parent_key).copied().map(Some).ok_or_else(|| {
                AppError::BadRequest(format!("Unknown parent key {parent_key:?}"))
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    for start in 0..parents.len() {
        let mut seen = HashSet::from([start]);
        let mut current = parents[start];
        while let Some(parent) = current {
            if !seen.insert(parent) {
                return Err(AppError::BadRequest(format!(
                    "Nav item {:?} is nested under itself",
                    inputs[start].key
                )));
            }
            current = parents[parent];
        }
    }
    Ok(parents)
}

/// Item slugs unique within one menu.
pub fn item_slugs(inputs: &[NavItemInput]) -> Vec<String> {
    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let slug = pick_unique_slug(&slugify(&input.name), &taken);
            taken.insert(slug.clone());
            slug
        })
        .collect()
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct NavMenuInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct NavMenuDetail {
    #[serde(flatten)]
    pub menu: NavigationMenuEntity,
    pub items: Vec<NavItemNode>,
}

pub async fn fetch_menus(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<NavigationMenuEntity>, AppError> {
    Ok(navigation_menus::table
        .select(NavigationMenuEntity::as_select())
        .order_by(navigation_menus::created_at.asc())
        .load(conn)
        .await?)
}

/// By numeric id or by slug.
pub async fn fetch_menu(
    conn: &mut AsyncPgConnection,
    identifier: &str,
) -> Result<NavigationMenuEntity, AppError> {
    let query = navigation_menus::table.select(NavigationMenuEntity::as_select());
    let menu = match identifier.parse::<i32>() {
        Ok(id) => query.filter(navigation_menus::id.eq(id)).first(conn).await?,
        Err(_) => {
            query
                .filter(navigation_menus::slug.eq(identifier))
                .first(conn)
                .await?
        }
    };
    Ok(menu)
}

pub async fn menu_detail(
    conn: &mut AsyncPgConnection,
    menu: NavigationMenuEntity,
    active_roots_only: bool,
) -> Result<NavMenuDetail, AppError> {
    let items: Vec<NavMenuItemEntity> = nav_menu_items::table
        .filter(nav_menu_items::menu_id.eq(menu.id))
        .select(NavMenuItemEntity::as_select())
        .load(conn)
        .await?;
    Ok(NavMenuDetail {
        items: build_nav_tree(&items, active_roots_only),
        menu,
    })
}

pub async fn create_menu(
    conn: &mut AsyncPgConnection,
    input: NavMenuInput,
) -> Result<NavigationMenuEntity, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("Menu name is required".into()));
    }
    let slug = unique_menu_slug(conn, &input.name, None).await?;
    Ok(diesel::insert_into(navigation_menus::table)
        .values(CreateNavigationMenuEntity {
            name: input.name.trim().to_string(),
            slug,
            description: input.description,
        })
        .returning(NavigationMenuEntity::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn update_menu(
    conn: &mut AsyncPgConnection,
    id: i32,
    input: NavMenuInput,
) -> Result<NavigationMenuEntity, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("Menu name is required".into()));
    }
    let slug = unique_menu_slug(conn, &input.name, Some(id)).await?;
    Ok(diesel::update(navigation_menus::table.find(id))
        .set(CreateNavigationMenuEntity {
            name: input.name.trim().to_string(),
            slug,
            description: input.description,
        })
        .returning(NavigationMenuEntity::as_returning())
        .get_result(conn)
        .await?)
}

/// Items go with the menu through the cascading foreign key.
pub async fn delete_menu(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> Result<NavigationMenuEntity, AppError> {
    Ok(diesel::delete(navigation_menus::table.find(id))
        .returning(NavigationMenuEntity::as_returning())
        .get_result(conn)
        .await?)
}

async fn load_ref_slugs(
    conn: &mut AsyncPgConnection,
    inputs: &[NavItemInput],
) -> Result<RefSlugs, AppError> {
    let ids_of = |kind: NavItemType| -> Vec<i32> {
        inputs
            .iter()
            .filter(|input| input.item_type == kind)
            .filter_map(|input| input.ref_id)
            .collect()
    };
    let category_ids = ids_of(NavItemType::Category);
    let tag_ids = ids_of(NavItemType::Tag);

    let mut refs = RefSlugs::default();
    if !category_ids.is_empty() {
        refs.categories = categories::table
            .filter(categories::id.eq_any(&category_ids))
            .select((categories::id, categories::slug))
            .load::<(i32, String)>(conn)
            .await?
            .into_iter()
            .collect();
    }
    if !tag_ids.is_empty() {
        refs.tags = tags::table
            .filter(tags::id.eq_any(&tag_ids))
            .select((tags::id, tags::slug))
            .load::<(i32, String)>(conn)
            .await?
            .into_iter()
            .collect();
    }
    Ok(refs)
}

/// Replaces all items of a menu in one transaction: insert every item, then
/// wire `parent_id` from the client-side keys.
pub async fn save_items(
    conn: &mut AsyncPgConnection,
    menu_id: i32,
    inputs: Vec<NavItemInput>,
) -> Result<NavMenuDetail, AppError> {
    let parents = resolve_parents(&inputs)?;
    if inputs.iter().any(|input| input.name.trim().is_empty()) {
        return Err(AppError::BadRequest("Every nav item needs a name".into()));
    }

    conn.transaction(move |conn| {
        Box::pin(async move {
            let menu = fetch_menu(conn, &menu_id.to_string()).await?;
            let refs = load_ref_slugs(conn, &inputs).await?;
            let slugs = item_slugs(&inputs);

            let rows = inputs
                .iter()
                .zip(slugs)
                .enumerate()
                .map(|(position, (input, slug))| {
                    Ok(CreateNavMenuItemEntity {
                        menu_id,
                        name: input.name.trim().to_string(),
                        label: input
                            .label
                            .clone()
                            .filter(|label| !label.trim().is_empty())
                            .or_else(|| Some(input.name.trim().to_string())),
                        slug,
                        url: Some(resolve_url(input, &refs)?),
                        item_type: input.item_type.to_string(),
                        ref_id: input.ref_id,
                        sort_order: input.order.unwrap_or(position as i32),
                        is_active: input.is_active.unwrap_or(true),
                        icon_class: input
                            .icon_class
                            .clone()
                            .or_else(|| Some(DEFAULT_ICON_CLASS.to_string())),
                        icon_path: input.icon_path.clone(),
                    })
                })
                .collect::<Result<Vec<_>, AppError>>()?;

            diesel::delete(nav_menu_items::table.filter(nav_menu_items::menu_id.eq(menu_id)))
                .execute(conn)
                .await?;

            let mut ids = Vec::with_capacity(rows.len());
            for row in rows {
                let id: i32 = diesel::insert_into(nav_menu_items::table)
                    .values(row)
                    .returning(nav_menu_items::id)
                    .get_result(conn)
                    .await?;
                ids.push(id);
            }

            for (index, parent) in parents.iter().enumerate() {
                if let Some(parent) = parent {
                    diesel::update(nav_menu_items::table.find(ids[index]))
                        .set((
                            nav_menu_items::parent_id.eq(Some(ids[*parent])),
                            nav_menu_items::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                }
            }

            tracing::info!("Saved {} items for nav menu {}", ids.len(), menu.slug);
            menu_detail(conn, menu, false).await
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(key: &str, parent: Option<&str>, item_type: NavItemType) -> NavItemInput {
        NavItemInput {
            key: key.into(),
            parent_key: parent.map(str::to_string),
            name: format!("Item {key}"),
            label: None,
            item_type,
            ref_id: None,
            url: None,
            order: None,
            is_active: None,
            icon_class: None,
            icon_path: None,
        }
    }

    fn entity(id: i32, parent_id: Option<i32>, order: i32, active: bool) -> NavMenuItemEntity {
        NavMenuItemEntity {
            id,
            menu_id: 1,
            name: format!("n{id}"),
            label: None,
            slug: format!("n{id}"),
            url: None,
            item_type: "custom".into(),
            ref_id: None,
            sort_order: order,
            is_active: active,
            icon_class: None,
            icon_path: None,
            parent_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn resolves_urls_by_item_type() {
        let refs = RefSlugs {
            categories: HashMap::from([(4, "shoes".to_string())]),
            tags: HashMap::from([(9, "sale".to_string())]),
        };
        let mut category = input("a", None, NavItemType::Category);
        category.ref_id = Some(4);
        assert_eq!(resolve_url(&category, &refs).unwrap(), "/categories/shoes");

        let mut tag = input("b", None, NavItemType::Tag);
        tag.ref_id = Some(9);
        assert_eq!(resolve_url(&tag, &refs).unwrap(), "/tags/sale");

        let mut page = input("c", None, NavItemType::Page);
        page.ref_id = Some(2);
        assert_eq!(resolve_url(&page, &refs).unwrap(), "/orders");

        let mut custom = input("d", None, NavItemType::Custom);
        custom.url = Some(" https://example.com/help ".into());
        assert_eq!(resolve_url(&custom, &refs).unwrap(), "https://example.com/help");

        let mut dangling = input("e", None, NavItemType::Category);
        dangling.ref_id = Some(5);
        assert!(resolve_url(&dangling, &refs).is_err());
    }

    #[test]
    fn wires_parents_from_keys() {
        let inputs = vec![
            input("shop", None, NavItemType::Custom),
            input("men", Some("shop"), NavItemType::Custom),
            input("women", Some("shop"), NavItemType::Custom),
            input("shirts", Some("men"), NavItemType::Custom),
        ];
        assert_eq!(
            resolve_parents(&inputs).unwrap(),
            vec![None, Some(0), Some(0), Some(1)]
        );
    }

    #[test]
    fn rejects_bad_parent_references() {
        let unknown = vec![input("a", Some("zzz"), NavItemType::Custom)];
        assert!(resolve_parents(&unknown).is_err());

        let duplicate = vec![
            input("a", None, NavItemType::Custom),
            input("a", None, NavItemType::Custom),
        ];
        assert!(resolve_parents(&duplicate).is_err());

        let cycle = vec![
            input("a", Some("b"), NavItemType::Custom),
            input("b", Some("a"), NavItemType::Custom),
        ];
        assert!(resolve_parents(&cycle).is_err());
    }

    #[test]
    fn tree_sorts_children_and_hides_inactive_ones() {
        let items = vec![
            entity(1, None, 1, true),
            entity(2, None, 0, false),
            entity(3, Some(1), 2, true),
            entity(4, Some(1), 1, true),
            entity(5, Some(1), 0, false),
        ];
        let tree = build_nav_tree(&items, false);
        assert_eq!(tree.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(
            tree[1].children.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![4, 3]
        );

        let storefront = build_nav_tree(&items, true);
        assert_eq!(storefront.len(), 1);
        assert_eq!(storefront[0].order, 1);
    }

    #[test]
    fn item_slugs_are_unique_within_menu() {
        let mut a = input("a", None, NavItemType::Custom);
        a.name = "Shop".into();
        let mut b = input("b", None, NavItemType::Custom);
        b.name = "shop".into();
        assert_eq!(item_slugs(&[a, b]), vec!["shop", "shop-1"]);
    }
}
