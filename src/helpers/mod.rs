pub mod account;
pub mod cart;
pub mod categories;
pub mod checkout;
pub mod currencies;
pub mod defaults;
pub mod media;
pub mod money;
pub mod nav_menus;
pub mod orders;
pub mod pages;
pub mod payments;
pub mod products;
pub mod settings;
pub mod slug;
pub mod stats;
pub mod tags;
pub mod wallet;
