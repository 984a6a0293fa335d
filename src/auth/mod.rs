//! Password hashing and admin authentication.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::User;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email and wrong password both end up here
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

lazy_static! {
    /// Verified against when the email is unknown, so both failure paths cost one hash
    static ref DUMMY_HASH: String =
        hash_password("dummy-password-for-timing").unwrap_or_default();
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Look up a user by email and check the password. Returns the user id.
pub async fn authenticate(db: &SqlitePool, email: &str, password: &str) -> Result<i64, AuthError> {
    let user = User::find_by_email(db, email.trim()).await?;

    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user.id),
        Some(user) => {
            tracing::info!(user_id = user.id, "Login rejected: wrong password");
            Err(AuthError::InvalidCredentials)
        }
        None => {
            let _ = verify_password(password, &DUMMY_HASH);
            tracing::info!("Login rejected: unknown email");
            Err(AuthError::InvalidCredentials)
        }
    }
}
