//! Password hashing and verification using Argon2id
//!
//! Accounts never hold a clear password. `InMemoryUserDirectory::create`
//! stores the PHC string from [`hash_password`] (seeded users and AUTH
//! REGISTER both go through it), and AUTH LOGIN checks the submitted
//! password with [`verify_password`].
//!
//! A wrong password is `Ok(false)` and becomes the "Incorrect password"
//! reply. A stored hash that cannot be parsed, or an Argon2 failure, is an
//! `Auth` error; dispatch reports it as "Failed to process command".

use argon2::{
    password_hash::{
        rand_core::OsRng, Error as HashError, PasswordHash, PasswordHasher, PasswordVerifier,
        SaltString,
    },
    Argon2,
};

use crate::types::{Result, SwitchboardError};

/// Hash a password with a fresh random salt
///
/// The returned PHC string carries algorithm, parameters and salt, so a
/// later change of defaults does not invalidate stored hashes.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SwitchboardError::Auth(format!("Failed to hash password: {e}")))
}

/// Check a password against a stored PHC hash
///
/// Parameters are read from the hash itself, not from `Argon2::default()`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| SwitchboardError::Auth(format!("Invalid password hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(e) => Err(SwitchboardError::Auth(format!("Failed to verify password: {e}"))),
    }
}
