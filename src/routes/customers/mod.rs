//! Routes for signed-in shoppers.

pub mod account;
pub mod cart;
pub mod orders;
pub mod wallet;
