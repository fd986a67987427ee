use serde::Serialize;
use utoipa::ToSchema;

/// Storefront pages a nav item of type `page` can point at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct PredefinedPage {
    pub id: i32,
    pub name: &'static str,
    pub path: &'static str,
}

pub const PREDEFINED_PAGES: &[PredefinedPage] = &[
    PredefinedPage { id: 1, name: "Home", path: "/" },
    PredefinedPage { id: 2, name: "Orders", path: "/orders" },
    PredefinedPage { id: 3, name: "Add Balance", path: "/wallet/top-up" },
    PredefinedPage { id: 4, name: "Sign Out", path: "/logout" },
    PredefinedPage { id: 5, name: "Store", path: "/products" },
];

pub fn find_page(id: i32) -> Option<&'static PredefinedPage> {
    PREDEFINED_PAGES.iter().find(|page| page.id == id)
}
