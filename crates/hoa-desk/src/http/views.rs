//! JSON shapes that differ from the stored records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Document, Role, User};
use crate::services::LoginSession;
use crate::store::RecordMeta;

/// A user without credentials.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            meta: user.meta,
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

impl From<LoginSession> for SessionView {
    fn from(session: LoginSession) -> Self {
        Self {
            token: session.token,
            token_type: session.token_type,
            expires_at: session.expires_at,
            user: session.user.into(),
        }
    }
}

/// A document plus its public URL.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    pub url: String,
}
