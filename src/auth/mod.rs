//! Accounts and credentials
//!
//! - Password hashing with Argon2
//! - The user directory port used by the AUTH command

pub mod directory;
pub mod password;

pub use directory::{InMemoryUserDirectory, NewUser, Role, UserDirectory, UserRecord};
pub use password::{hash_password, verify_password};
