use std::collections::HashSet;

use diesel::{ExpressionMethods, QueryDsl, TextExpressionMethods};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::core::aliases::DieselError;

/// Lowercase ASCII words joined by `-`. Falls back to `item` when nothing
/// slug-worthy is left.
pub fn slugify(text: &str) -> String {
    let slug = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() { "item".to_string() } else { slug }
}

/// `base`, then `base-1`, `base-2`, ... until one is not taken.
pub fn pick_unique_slug(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

macro_rules! unique_slug_for {
    ($fn_name:ident, $table:ident) => {
        /// Slug for `name` that no other row of the table uses, ignoring `exclude_id`.
        pub async fn $fn_name(
            conn: &mut AsyncPgConnection,
            name: &str,
            exclude_id: Option<i32>,
        ) -> Result<String, DieselError> {
            use crate::schema::$table;

            let base = slugify(name);
            let mut query = $table::table
                .select($table::slug)
                .filter($table::slug.like(format!("{base}%")))
                .into_boxed();
            if let Some(id) = exclude_id {
                query = query.filter($table::id.ne(id));
            }
            let taken: HashSet<String> = query.load::<String>(conn).await?.into_iter().collect();
            Ok(pick_unique_slug(&base, &taken))
        }
    };
}

unique_slug_for!(unique_category_slug, categories);
unique_slug_for!(unique_tag_slug, tags);
unique_slug_for!(unique_product_slug, products);
unique_slug_for!(unique_menu_slug, navigation_menus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_names() {
        assert_eq!(slugify("Men's Shoes & Bags"), "men-s-shoes-bags");
        assert_eq!(slugify("  Summer   2025 "), "summer-2025");
        assert_eq!(slugify("!!!"), "item");
    }

    #[test]
    fn appends_numeric_suffix_on_collision() {
        let taken: HashSet<String> = ["shoes", "shoes-1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(pick_unique_slug("shoes", &taken), "shoes-2");
        assert_eq!(pick_unique_slug("bags", &taken), "bags");
    }
}
