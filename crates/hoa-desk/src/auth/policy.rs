use crate::domain::Role;

/// Protected resource families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Buildings,
    Units,
    UnitOwners,
    Leases,
    Vehicles,
    Fees,
    Invoices,
    Payments,
    Penalties,
    Users,
    Documents,
    Templates,
    Operations,
    Exports,
}

impl Resource {
    pub const fn label(self) -> &'static str {
        match self {
            Resource::Buildings => "buildings",
            Resource::Units => "units",
            Resource::UnitOwners => "unit owners",
            Resource::Leases => "leases",
            Resource::Vehicles => "vehicles",
            Resource::Fees => "fees",
            Resource::Invoices => "invoices",
            Resource::Payments => "payments",
            Resource::Penalties => "penalties",
            Resource::Users => "users",
            Resource::Documents => "documents",
            Resource::Templates => "document templates",
            Resource::Operations => "billing operations",
            Resource::Exports => "exports",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    /// Run an operation or export.
    Run,
}

impl Action {
    pub const fn label(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Run => "run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("This action is unauthorized: {role} may not {action} {resource}.")]
pub struct AuthorizationError {
    pub role: &'static str,
    pub action: &'static str,
    pub resource: &'static str,
}

/// Whether `role` may perform `action` on `resource`.
pub fn allows(role: Role, resource: Resource, action: Action) -> bool {
    use Resource::*;

    match role {
        Role::Admin => true,
        Role::Manager => resource != Users || action == Action::View,
        Role::Accountant => match (resource, action) {
            (_, Action::View) => true,
            (Fees | Invoices | Payments | Penalties, _) => true,
            (Documents, Action::Create) => true,
            (Operations | Exports, Action::Run) => true,
            _ => false,
        },
        Role::Owner | Role::Tenant => {
            action == Action::View
                && matches!(resource, Invoices | Payments | Leases | Vehicles | Documents)
        }
    }
}

pub fn authorize(role: Role, resource: Resource, action: Action) -> Result<(), AuthorizationError> {
    if allows(role, resource, action) {
        Ok(())
    } else {
        Err(AuthorizationError {
            role: role.label(),
            action: action.label(),
            resource: resource.label(),
        })
    }
}
