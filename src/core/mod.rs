//! Service plumbing shared by every route: state, errors, config, database,
//! authentication and the swagger document.

pub mod aliases;
pub mod app_error;
pub mod app_state;
pub mod auth;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod db;
pub mod middleware;
pub mod pagination;
pub mod swagger;
