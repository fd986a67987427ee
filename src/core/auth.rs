//! Password hashing and stateless session tokens.
//!
//! A token is `user_id.role.expires_at.signature` where the signature is the
//! hex HMAC-SHA256 of the first three fields under the configured secret.

use anyhow::anyhow;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use utoipa::ToSchema;

use crate::enums::UserRole;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct AuthUser {
    pub id: i32,
    pub role: UserRole,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("Password hashing failed: {err}"))?;
    Ok(hash.to_string())
}

/// A stored hash that cannot be parsed never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::warn!("Unparseable password hash: {}", err);
            false
        }
    }
}

fn mac_for(secret: &str, payload: &str) -> Result<HmacSha256, TokenError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::BadSignature)?;
    mac.update(payload.as_bytes());
    Ok(mac)
}

pub fn issue_token(secret: &str, user: &AuthUser, expires_at: i64) -> Result<String, TokenError> {
    let payload = format!("{}.{}.{}", user.id, user.role, expires_at);
    let signature = hex::encode(mac_for(secret, &payload)?.finalize().into_bytes());
    Ok(format!("{payload}.{signature}"))
}

pub fn verify_token(secret: &str, token: &str, now: i64) -> Result<AuthUser, TokenError> {
    let mut parts = token.rsplitn(2, '.');
    let signature = parts.next().ok_or(TokenError::Malformed)?;
    let payload = parts.next().ok_or(TokenError::Malformed)?;

    let expected = hex::decode(signature).map_err(|_| TokenError::Malformed)?;
    mac_for(secret, payload)?
        .verify_slice(&expected)
        .map_err(|_| TokenError::BadSignature)?;

    let fields: Vec<&str> = payload.split('.').collect();
    let [id, role, expires_at] = fields.as_slice() else {
        return Err(TokenError::Malformed);
    };
    let id: i32 = id.parse().map_err(|_| TokenError::Malformed)?;
    let role: UserRole = role.parse().map_err(|_| TokenError::Malformed)?;
    let expires_at: i64 = expires_at.parse().map_err(|_| TokenError::Malformed)?;

    if expires_at <= now {
        return Err(TokenError::Expired);
    }

    Ok(AuthUser { id, role })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn admin() -> AuthUser {
        AuthUser {
            id: 3,
            role: UserRole::Admin,
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let token = issue_token(SECRET, &admin(), 1_000).unwrap();
        assert_eq!(verify_token(SECRET, &token, 999), Ok(admin()));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = issue_token(SECRET, &admin(), 1_000).unwrap();
        assert_eq!(verify_token(SECRET, &token, 1_000), Err(TokenError::Expired));
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let token = issue_token(SECRET, &admin(), 1_000).unwrap();
        let forged = token.replacen("admin", "super_admin", 1);
        assert_eq!(
            verify_token(SECRET, &forged, 0),
            Err(TokenError::BadSignature)
        );
        assert_eq!(
            verify_token("other-secret", &token, 0),
            Err(TokenError::BadSignature)
        );
        assert_eq!(verify_token(SECRET, "garbage", 0), Err(TokenError::Malformed));
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }
}
