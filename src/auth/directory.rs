//! User directory
//!
//! [`UserDirectory`] is the persistence port the AUTH command talks to.
//! [`InMemoryUserDirectory`] backs it with a concurrent map, which is what
//! the server binary and the tests use.

use std::fmt;
use std::str::FromStr;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::password::hash_password;
use crate::session::Principal;
use crate::types::{Result, SwitchboardError};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Consultant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Consultant => "CONSULTANT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SwitchboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "CONSULTANT" => Ok(Role::Consultant),
            _ => Err(SwitchboardError::handler("Invalid role. Use USER or CONSULTANT")),
        }
    }
}

/// Stored account
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub profile_photo_url: Option<String>,
}

impl UserRecord {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.to_string(),
            profile_photo_url: self.profile_photo_url.clone(),
        }
    }
}

/// Registration input, password still in clear
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up an account by email (case-insensitive)
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Create an account; fails if the email is taken
    async fn create(&self, user: NewUser) -> Result<UserRecord>;
}

/// In-process directory keyed by normalized email
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserRecord>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Parse `email:password:name:role` entries separated by commas
    pub fn parse_seed(entries: &str) -> Result<Vec<NewUser>> {
        entries.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let parts: Vec<&str> = entry.splitn(4, ':').collect();
                match parts.as_slice() {
                    [email, password, name, role] => Ok(NewUser {
                        name: name.to_string(),
                        email: email.to_string(),
                        password: password.to_string(),
                        role: role
                            .parse()
                            .map_err(|_| SwitchboardError::Config(format!("bad role in seed entry for {}", email)))?,
                    }),
                    _ => Err(SwitchboardError::Config(format!(
                        "seed entry must be email:password:name:role, got {:?}",
                        entry
                    ))),
                }
            })
            .collect()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.get(&normalize(email)).map(|u| u.clone()))
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord> {
        let key = normalize(&user.email);
        let password_hash = hash_password(&user.password)?;

        match self.users.entry(key) {
            Entry::Occupied(_) => Err(SwitchboardError::handler("Email already registered")),
            Entry::Vacant(slot) => {
                let record = UserRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: user.name,
                    email: user.email.trim().to_string(),
                    password_hash,
                    role: user.role,
                    profile_photo_url: None,
                };
                slot.insert(record.clone());
                info!(user_id = %record.id, role = %record.role, "Registered user");
                Ok(record)
            }
        }
    }
}
