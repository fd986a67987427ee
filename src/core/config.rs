use std::{env, time::Duration};

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub secret: String,
    pub token_ttl: Duration,
}

/// Base URLs of the payment providers. Overridable so tests can point the
/// processors at a local stub.
#[derive(Clone, Debug)]
pub struct GatewayUrls {
    pub paystack: String,
    pub flutterwave: String,
    pub bitpay: String,
}

impl Default for GatewayUrls {
    fn default() -> Self {
        Self {
            paystack: "https://api.paystack.co".into(),
            flutterwave: "https://api.flutterwave.com/v3".into(),
            bitpay: "https://bitpay.com".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SuperAdminConfig {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub gateways: GatewayUrls,
    pub settings_cache_ttl: Duration,
    /// Public origin of the shop, used to build gateway callback URLs.
    pub domain_name: String,
    /// Where uploaded images are written; served under `/uploads`.
    pub media_dir: String,
    pub super_admin: Option<SuperAdminConfig>,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|err| anyhow::anyhow!("{key} is invalid: {err}")),
        Err(_) => Ok(default),
    }
}

/// Reads the service configuration from the environment.
pub fn load() -> Result<AppConfig> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let auth_secret = env::var("AUTH_SECRET").context("AUTH_SECRET must be set")?;

    let defaults = GatewayUrls::default();
    let gateways = GatewayUrls {
        paystack: var_or("PAYSTACK_BASE_URL", &defaults.paystack),
        flutterwave: var_or("FLUTTERWAVE_BASE_URL", &defaults.flutterwave),
        bitpay: var_or("BITPAY_BASE_URL", &defaults.bitpay),
    };

    let super_admin = match (
        env::var("DEFAULT_SUPER_ADMIN_USERNAME"),
        env::var("DEFAULT_SUPER_ADMIN_PASSWORD"),
    ) {
        (Ok(username), Ok(password)) => Some(SuperAdminConfig {
            email: var_or("DEFAULT_SUPER_ADMIN_EMAIL", &format!("{username}@localhost")),
            username,
            password,
        }),
        _ => None,
    };

    Ok(AppConfig {
        server: ServerConfig {
            host: var_or("SERVER_HOST", "0.0.0.0"),
            port: parse_var("SERVER_PORT", 3000)?,
        },
        database: DatabaseConfig { url: database_url },
        auth: AuthConfig {
            secret: auth_secret,
            token_ttl: Duration::from_secs(parse_var("AUTH_TOKEN_TTL_SECS", 60 * 60 * 24)?),
        },
        gateways,
        settings_cache_ttl: Duration::from_secs(parse_var("SETTINGS_CACHE_TTL_SECS", 300)?),
        domain_name: var_or("APP_DOMAIN_NAME", "http://localhost:3000"),
        media_dir: var_or("MEDIA_DIR", "uploads"),
        super_admin,
    })
}
