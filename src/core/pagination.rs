use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Deserialize, IntoParams, Debug, Default, Clone)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, query: &PageQuery, total: i64) -> Self {
        let per_page = query.per_page();
        Self {
            items,
            page: query.page(),
            per_page,
            total,
            pages: (total + per_page - 1) / per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_size() {
        let query = PageQuery {
            page: Some(0),
            per_page: Some(1_000),
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), MAX_PER_PAGE);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn computes_page_count() {
        let query = PageQuery {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(query.offset(), 20);
        let page = Paginated::new(vec![1, 2], &query, 21);
        assert_eq!(page.pages, 3);
        assert_eq!(Paginated::<i32>::new(vec![], &query, 0).pages, 0);
    }
}
