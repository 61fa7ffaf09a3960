use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{impl_record, RecordMeta};

/// Flat role column; each user holds exactly one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Accountant,
    Owner,
    Tenant,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Manager,
        Role::Accountant,
        Role::Owner,
        Role::Tenant,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Accountant => "accountant",
            Role::Owner => "owner",
            Role::Tenant => "tenant",
        }
    }

    /// Residents only see records linked to themselves.
    pub const fn is_resident(self) -> bool {
        matches!(self, Role::Owner | Role::Tenant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub password_hash: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Bearer token issued at login. Only the SHA-256 digest is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub user_id: u64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl_record!(
    User => "user",
    AccessToken => "access token",
);
