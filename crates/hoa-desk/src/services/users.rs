use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{clean, matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::{generate_token, token_digest};
use crate::auth::AuthUser;
use crate::domain::{AccessToken, Role, User};
use crate::store::Database;
use crate::validation::ValidationErrors;

const MIN_PASSWORD_LEN: usize = 8;

/// How stale `last_used_at` may get before a request refreshes it.
const TOKEN_TOUCH_INTERVAL: i64 = 60;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub password: String,
    pub is_active: Option<bool>,
}

/// Profile changes; the password is only replaced when given.
#[derive(Debug, Clone, Deserialize)]
pub struct UserChanges {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// A freshly issued bearer token. The plain token is only ever returned here.
#[derive(Debug, Clone, Serialize)]
pub struct LoginSession {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminBootstrap {
    Created(User),
    Existing(User),
}

#[derive(Clone)]
pub struct UserService {
    context: ServiceContext,
}

impl UserService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    pub fn list(&self, filter: &UserFilter) -> Result<Page<User>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let rows = self.context.store().read(|db| {
            db.users
                .active()
                .filter(|user| filter.role.map_or(true, |role| user.role == role))
                .filter(|user| filter.is_active.map_or(true, |active| user.is_active == active))
                .filter(|user| {
                    matches_search(
                        filter.search.as_deref(),
                        &[user.name.as_str(), user.email.as_str()],
                    )
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<User, ServiceError> {
        self.context.store().read(|db| require(&db.users, id).cloned())?
    }

    pub fn create(&self, input: NewUser) -> Result<User, ServiceError> {
        let mut errors = ValidationErrors::new();
        check_password(&mut errors, &input.password);
        // Hash outside the store lock.
        let password_hash = if errors.is_empty() {
            hash_password(&input.password)?
        } else {
            String::new()
        };

        let now = self.context.now();
        let user = self.context.store().transaction(|db| {
            let profile = validate_profile(db, errors, &input.name, &input.email, input.phone, None)?;
            Ok::<_, ServiceError>(db.users.insert(now, |meta| User {
                meta,
                name: profile.name,
                email: profile.email,
                phone: profile.phone,
                role: input.role,
                password_hash,
                is_active: input.is_active.unwrap_or(true),
                last_login_at: None,
            }))
        })?;
        info!(user_id = user.meta.id, role = user.role.label(), "user created");
        Ok(user)
    }

    pub fn update(&self, id: u64, changes: UserChanges) -> Result<User, ServiceError> {
        let mut errors = ValidationErrors::new();
        let password_hash = match changes.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => {
                check_password(&mut errors, password);
                if errors.is_empty() {
                    Some(hash_password(password)?)
                } else {
                    None
                }
            }
            None => None,
        };

        let now = self.context.now();
        let (user, revoked) = self.context.store().transaction(|db| {
            require(&db.users, id)?;
            let profile = validate_profile(
                db,
                errors,
                &changes.name,
                &changes.email,
                changes.phone,
                Some(id),
            )?;
            let user = db
                .users
                .update(id, now, |user| {
                    user.name = profile.name;
                    user.email = profile.email;
                    user.phone = profile.phone;
                    user.role = changes.role;
                    if let Some(active) = changes.is_active {
                        user.is_active = active;
                    }
                    if let Some(hash) = password_hash {
                        user.password_hash = hash;
                    }
                })
                .ok_or_else(|| ServiceError::not_found::<User>(id))?;
            let revoked = if user.is_active {
                0
            } else {
                revoke_tokens(db, id, now)
            };
            Ok::<_, ServiceError>((user, revoked))
        })?;
        info!(user_id = id, revoked_tokens = revoked, "user updated");
        Ok(user)
    }

    /// Soft delete another user and revoke their tokens.
    pub fn delete(&self, id: u64, acting_user: u64) -> Result<User, ServiceError> {
        if id == acting_user {
            return Err(ServiceError::invalid("user", "You cannot delete your own account."));
        }
        let now = self.context.now();
        let user = self.context.store().transaction(|db| {
            require(&db.users, id)?;
            if db
                .leases
                .active()
                .any(|lease| lease.tenant_id == id && lease.is_active())
            {
                return Err(ServiceError::invalid(
                    "user",
                    "The user cannot be deleted while they hold an active lease.",
                ));
            }
            let user = db
                .users
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<User>(id))?;
            revoke_tokens(db, id, now);
            Ok(user)
        })?;
        info!(user_id = id, "user deleted");
        Ok(user)
    }

    /// Exchange credentials for a bearer token.
    pub fn login(&self, request: &LoginRequest) -> Result<LoginSession, ServiceError> {
        let mut errors = ValidationErrors::new();
        errors.required("email", &request.email);
        errors.required("password", &request.password);
        errors.into_result()?;

        let email = request.email.trim().to_lowercase();
        let candidate = self.context.store().read(|db| {
            db.users
                .active()
                .find(|user| user.email == email)
                .cloned()
        })?;
        let user = match candidate {
            Some(user) if user.is_active => user,
            _ => return Err(ServiceError::InvalidCredentials),
        };
        if !verify_password(&request.password, &user.password_hash)? {
            warn!(user_id = user.meta.id, "login rejected");
            return Err(ServiceError::InvalidCredentials);
        }

        let (token, digest) = generate_token();
        let now = self.context.now();
        let expires_at = now
            .checked_add_signed(self.context.token_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let user = self.context.store().transaction(|db| {
            db.access_tokens.insert(now, |meta| AccessToken {
                meta,
                user_id: user.meta.id,
                token_hash: digest,
                expires_at,
                last_used_at: None,
            });
            db.users
                .update(user.meta.id, now, |user| user.last_login_at = Some(now))
                .ok_or(ServiceError::InvalidCredentials)
        })?;
        info!(user_id = user.meta.id, "user logged in");

        Ok(LoginSession {
            token,
            token_type: "Bearer",
            expires_at,
            user,
        })
    }

    /// Revoke the presented token. Unknown tokens are ignored.
    pub fn logout(&self, token: &str) -> Result<(), ServiceError> {
        let digest = token_digest(token);
        let now = self.context.now();
        self.context.store().transaction::<_, ServiceError>(|db| {
            let id = db
                .access_tokens
                .active()
                .find(|stored| stored.token_hash == digest)
                .map(|stored| stored.meta.id);
            if let Some(id) = id {
                db.access_tokens.soft_delete(id, now);
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Resolve a bearer token to its user, `None` when expired or revoked.
    pub fn authenticate_token(&self, token: &str) -> Result<Option<AuthUser>, ServiceError> {
        let digest = token_digest(token);
        let now = self.context.now();
        let found = self.context.store().read(|db| {
            let stored = db
                .access_tokens
                .active()
                .find(|stored| stored.token_hash == digest && stored.expires_at > now)?;
            let user = db.users.find(stored.user_id).filter(|user| user.is_active)?;
            Some((
                stored.meta.id,
                stored.last_used_at,
                AuthUser {
                    id: user.meta.id,
                    name: user.name.clone(),
                    email: user.email.clone(),
                    role: user.role,
                },
            ))
        })?;

        let Some((token_id, last_used_at, user)) = found else {
            return Ok(None);
        };
        let stale = last_used_at
            .map_or(true, |last| now - last >= Duration::seconds(TOKEN_TOUCH_INTERVAL));
        if stale {
            self.context.store().transaction::<_, ServiceError>(|db| {
                db.access_tokens
                    .update(token_id, now, |stored| stored.last_used_at = Some(now));
                Ok(())
            })?;
        }
        Ok(Some(user))
    }

    /// Create the first administrator unless an active one already exists.
    pub fn ensure_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AdminBootstrap, ServiceError> {
        let existing = self.context.store().read(|db| {
            db.users
                .active()
                .find(|user| user.role == Role::Admin && user.is_active)
                .cloned()
        })?;
        if let Some(admin) = existing {
            return Ok(AdminBootstrap::Existing(admin));
        }

        let admin = self.create(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            role: Role::Admin,
            password: password.to_string(),
            is_active: Some(true),
        })?;
        Ok(AdminBootstrap::Created(admin))
    }
}

fn check_password(errors: &mut ValidationErrors, password: &str) {
    errors.required("password", password);
    if !password.is_empty() && password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("The password must be at least {MIN_PASSWORD_LEN} characters."),
        );
    }
    errors.max_len("password", password, 255);
}

struct Profile {
    name: String,
    email: String,
    phone: Option<String>,
}

/// Name, email and phone checks shared by create and update; `errors` may
/// already hold password messages.
fn validate_profile(
    db: &Database,
    mut errors: ValidationErrors,
    name: &str,
    email: &str,
    phone: Option<String>,
    current: Option<u64>,
) -> Result<Profile, ValidationErrors> {
    let name = name.trim().to_string();
    let email = email.trim().to_lowercase();
    let phone = clean(phone);

    errors.required_max("name", &name, 255);
    errors.required_max("email", &email, 255);
    if !email.is_empty() {
        errors.email("email", &email);
    }
    errors.optional_max("phone", phone.as_deref(), 30);

    let others = || {
        db.users
            .with_trashed()
            .filter(move |user| Some(user.meta.id) != current)
    };
    if !email.is_empty() && others().any(|user| user.email == email) {
        errors.taken("email");
    }
    if let Some(phone) = phone.as_deref() {
        if others().any(|user| user.phone.as_deref() == Some(phone)) {
            errors.taken("phone");
        }
    }
    errors.into_result()?;

    Ok(Profile { name, email, phone })
}

/// Soft-delete every live token of the user. Returns how many were revoked.
fn revoke_tokens(db: &mut Database, user_id: u64, now: DateTime<Utc>) -> usize {
    let ids: Vec<u64> = db
        .access_tokens
        .active()
        .filter(|token| token.user_id == user_id)
        .map(|token| token.meta.id)
        .collect();
    for id in &ids {
        db.access_tokens.soft_delete(*id, now);
    }
    ids.len()
}
