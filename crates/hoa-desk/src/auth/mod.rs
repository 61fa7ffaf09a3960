//! Credentials, bearer tokens and the role policy.

pub mod password;
mod policy;
pub mod token;

use serde::Serialize;

use crate::domain::Role;

pub use policy::{allows, authorize, Action, AuthorizationError, Resource};

/// The user behind an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn authorize(&self, resource: Resource, action: Action) -> Result<(), AuthorizationError> {
        authorize(self.role, resource, action)
    }

    /// For residents, the user id their visibility is restricted to.
    pub fn resident_scope(&self) -> Option<u64> {
        self.role.is_resident().then_some(self.id)
    }

    /// Residents may only see records linked to them.
    pub fn ensure_visible(
        &self,
        resource: Resource,
        linked_users: &[Option<u64>],
    ) -> Result<(), AuthorizationError> {
        match self.resident_scope() {
            Some(id) if !linked_users.contains(&Some(id)) => Err(AuthorizationError {
                role: self.role.label(),
                action: Action::View.label(),
                resource: resource.label(),
            }),
            _ => Ok(()),
        }
    }
}
