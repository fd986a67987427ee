use std::{collections::HashMap, sync::Arc};

use reqwest::Client;

use super::{cache::TtlCache, config::AppConfig, db::DbPool};

/// Settings rows keyed by group (`general`, or a payment method name).
pub type SettingsCache = TtlCache<String, HashMap<String, String>>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub http_client: Client,
    pub config: Arc<AppConfig>,
    pub settings_cache: Arc<SettingsCache>,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: AppConfig) -> Self {
        Self {
            db_pool,
            http_client: Client::new(),
            settings_cache: Arc::new(TtlCache::new(config.settings_cache_ttl)),
            config: Arc::new(config),
        }
    }
}
