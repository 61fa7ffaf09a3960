//! Business operations over the [`Store`].
//!
//! Each service validates its input, runs the mutation inside a single
//! [`Store::transaction`] and logs what changed. Handlers never touch the
//! database directly.

mod buildings;
mod documents;
mod fees;
mod invoices;
mod leases;
mod numbering;
mod occupancy;
mod owners;
mod templates;
mod units;
mod users;
mod vehicles;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

use crate::auth::password::PasswordError;
use crate::config::{BillingConfig, MAX_TOKEN_TTL_HOURS};
use crate::storage::{FileStorage, StorageError};
use crate::store::{Record, Store, StoreError, Table};
use crate::templating::TemplateError;
use crate::validation::ValidationErrors;

pub use buildings::{BuildingFilter, BuildingInput, BuildingService};
pub use documents::{DocumentChanges, DocumentFilter, DocumentService, DocumentUpload};
pub use fees::{FeeFilter, FeeInput, FeeRunSummary, FeeService};
pub use invoices::{
    InvoiceChanges, InvoiceFilter, InvoiceService, LatePenaltySummary, NewInvoice, NewPayment,
    NewPenalty,
};
pub use leases::{LeaseChanges, LeaseFilter, LeaseService, NewLease, TerminateLease};
pub use numbering::next_invoice_number;
pub use owners::{OwnerFilter, UnitOwnerInput, UnitOwnerService};
pub use templates::{
    GenerateDocument, TemplateChanges, TemplateFilter, TemplateService, TemplateUpload,
};
pub use units::{UnitFilter, UnitInput, UnitService};
pub use users::{AdminBootstrap, LoginRequest, LoginSession, NewUser, UserChanges, UserFilter, UserService};
pub use vehicles::{VehicleFilter, VehicleInput, VehicleService};

/// Errors returned by every service operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("These credentials do not match our records.")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl ServiceError {
    pub fn not_found<T: Record>(id: u64) -> Self {
        Self::NotFound {
            entity: T::ENTITY,
            id,
        }
    }

    /// A single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }
}

/// Look up a live row or fail with [`ServiceError::NotFound`].
pub(crate) fn require<T: Record>(table: &Table<T>, id: u64) -> Result<&T, ServiceError> {
    table.find(id).ok_or_else(|| ServiceError::not_found::<T>(id))
}

/// Trim optional text, treating blanks as absent.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Case-insensitive substring match used by `search` filters.
pub(crate) fn matches_search(needle: Option<&str>, haystacks: &[&str]) -> bool {
    match needle.map(str::trim).filter(|needle| !needle.is_empty()) {
        None => true,
        Some(needle) => {
            let needle = needle.to_lowercase();
            haystacks
                .iter()
                .any(|haystack| haystack.to_lowercase().contains(&needle))
        }
    }
}

pub const DEFAULT_PER_PAGE: usize = 15;
pub const MAX_PER_PAGE: usize = 100;

/// Requested page; out-of-range values are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    pub fn new(page: Option<usize>, per_page: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus the numbers a paginator needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: usize,
    pub per_page: usize,
    pub total: usize,
    pub last_page: usize,
}

impl<T> Page<T> {
    pub fn paginate(rows: impl IntoIterator<Item = T>, request: PageRequest) -> Self {
        let rows: Vec<T> = rows.into_iter().collect();
        let total = rows.len();
        let last_page = total.div_ceil(request.per_page).max(1);
        let items = rows
            .into_iter()
            .skip(request.page.saturating_sub(1).saturating_mul(request.per_page))
            .take(request.per_page)
            .collect();
        Self {
            items,
            current_page: request.page,
            per_page: request.per_page,
            total,
            last_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            per_page: self.per_page,
            total: self.total,
            last_page: self.last_page,
        }
    }
}

/// Optional `today` override accepted by the billing and lease runs.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RunDate {
    pub today: Option<NaiveDate>,
}

/// Shared handles every service needs.
#[derive(Clone)]
pub struct ServiceContext {
    store: Store,
    clock: Arc<dyn Clock + Send + Sync>,
    storage: Arc<dyn FileStorage>,
    billing: BillingConfig,
    token_ttl: Duration,
}

impl ServiceContext {
    pub fn new(store: Store, clock: Arc<dyn Clock + Send + Sync>, storage: Arc<dyn FileStorage>) -> Self {
        Self {
            store,
            clock,
            storage,
            billing: BillingConfig::default(),
            token_ttl: Duration::hours(168),
        }
    }

    pub fn with_billing(mut self, billing: BillingConfig) -> Self {
        self.billing = billing;
        self
    }

    pub fn with_token_ttl_hours(mut self, hours: i64) -> Self {
        self.token_ttl = Duration::hours(hours.clamp(1, MAX_TOKEN_TTL_HOURS));
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.storage
    }

    pub fn billing(&self) -> &BillingConfig {
        &self.billing
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.utc().date_naive()
    }
}

/// Every service, sharing one context.
#[derive(Clone)]
pub struct Services {
    pub buildings: BuildingService,
    pub units: UnitService,
    pub leases: LeaseService,
    pub owners: UnitOwnerService,
    pub vehicles: VehicleService,
    pub fees: FeeService,
    pub invoices: InvoiceService,
    pub users: UserService,
    pub documents: DocumentService,
    pub templates: TemplateService,
    context: ServiceContext,
}

impl Services {
    pub fn new(context: ServiceContext) -> Self {
        Self {
            buildings: BuildingService::new(context.clone()),
            units: UnitService::new(context.clone()),
            leases: LeaseService::new(context.clone()),
            owners: UnitOwnerService::new(context.clone()),
            vehicles: VehicleService::new(context.clone()),
            fees: FeeService::new(context.clone()),
            invoices: InvoiceService::new(context.clone()),
            users: UserService::new(context.clone()),
            documents: DocumentService::new(context.clone()),
            templates: TemplateService::new(context.clone()),
            context,
        }
    }

    pub fn context(&self) -> &ServiceContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_requests_are_clamped() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, per_page: 15 });
        assert_eq!(PageRequest::new(Some(0), Some(500)), PageRequest { page: 1, per_page: 100 });
        assert_eq!(PageRequest::new(Some(3), Some(0)).per_page, 1);
    }

    #[test]
    fn paginates_and_reports_last_page() {
        let page = Page::paginate(1..=31, PageRequest::new(Some(3), Some(10)));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25, 26, 27, 28, 29, 30]);
        assert_eq!(page.total, 31);
        assert_eq!(page.last_page, 4);

        let empty = Page::paginate(Vec::<u8>::new(), PageRequest::default());
        assert_eq!(empty.last_page, 1);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn pages_far_past_the_end_are_empty() {
        let page = Page::paginate(1..=31, PageRequest::new(Some(usize::MAX), Some(100)));
        assert!(page.items.is_empty());
        assert_eq!(page.current_page, usize::MAX);
        assert_eq!(page.total, 31);
        assert_eq!(page.last_page, 1);
    }

    #[test]
    fn search_is_case_insensitive_and_optional() {
        assert!(matches_search(None, &["anything"]));
        assert!(matches_search(Some("  "), &["anything"]));
        assert!(matches_search(Some("cedar"), &["Cedar Court", "1 Harbour Road"]));
        assert!(!matches_search(Some("pine"), &["Cedar Court"]));
    }
}
