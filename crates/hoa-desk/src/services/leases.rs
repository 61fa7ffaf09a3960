use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::occupancy::{active_lease_id, settle_unit};
use super::{clean, matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::{Lease, LeaseStatus, Role, UnitStatus};
use crate::money::Money;
use crate::store::Database;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaseFilter {
    pub status: Option<LeaseStatus>,
    pub unit_id: Option<u64>,
    pub tenant_id: Option<u64>,
    /// Matches the unit number or the tenant's name.
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLease {
    pub unit_id: u64,
    pub tenant_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Money,
    #[serde(default)]
    pub deposit_amount: Money,
    pub document_id: Option<u64>,
    pub notes: Option<String>,
}

/// Terms that may change while the lease is active.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaseChanges {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Money,
    #[serde(default)]
    pub deposit_amount: Money,
    pub document_id: Option<u64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerminateLease {
    pub terminated_on: Option<NaiveDate>,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct LeaseService {
    context: ServiceContext,
}

impl LeaseService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// `scope` restricts the listing to one tenant's leases.
    pub fn list(&self, filter: &LeaseFilter, scope: Option<u64>) -> Result<Page<Lease>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let rows = self.context.store().read(|db| {
            db.leases
                .active()
                .filter(|lease| scope.map_or(true, |user| lease.tenant_id == user))
                .filter(|lease| filter.status.map_or(true, |status| lease.status == status))
                .filter(|lease| filter.unit_id.map_or(true, |id| lease.unit_id == id))
                .filter(|lease| filter.tenant_id.map_or(true, |id| lease.tenant_id == id))
                .filter(|lease| {
                    let unit = db
                        .units
                        .find_with_trashed(lease.unit_id)
                        .map(|unit| unit.unit_number.as_str())
                        .unwrap_or_default();
                    let tenant = db
                        .users
                        .find_with_trashed(lease.tenant_id)
                        .map(|user| user.name.as_str())
                        .unwrap_or_default();
                    matches_search(filter.search.as_deref(), &[unit, tenant])
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<Lease, ServiceError> {
        self.context.store().read(|db| require(&db.leases, id).cloned())?
    }

    /// Start a lease. The unit must be free and becomes `rented`.
    pub fn create(&self, input: NewLease) -> Result<Lease, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let lease = self.context.store().transaction(|db| {
            let input = validate_new(db, input)?;
            let lease = db.leases.insert(now, |meta| Lease {
                meta,
                unit_id: input.unit_id,
                tenant_id: input.tenant_id,
                start_date: input.start_date,
                end_date: input.end_date,
                monthly_rent: input.monthly_rent,
                deposit_amount: input.deposit_amount,
                status: LeaseStatus::Active,
                terminated_on: None,
                termination_reason: None,
                document_id: input.document_id,
                notes: input.notes,
            });
            settle_unit(db, lease.unit_id, today, now);
            Ok::<_, ServiceError>(lease)
        })?;
        info!(
            lease_id = lease.meta.id,
            unit_id = lease.unit_id,
            tenant_id = lease.tenant_id,
            "lease created"
        );
        Ok(lease)
    }

    pub fn update(&self, id: u64, changes: LeaseChanges) -> Result<Lease, ServiceError> {
        let now = self.context.now();
        let lease = self.context.store().transaction(|db| {
            let lease = require(&db.leases, id)?;
            if !lease.is_active() {
                return Err(ServiceError::invalid(
                    "lease",
                    format!("Only active leases can be changed; this lease is {}.", lease.status.label()),
                ));
            }
            let mut errors = ValidationErrors::new();
            check_terms(
                db,
                &mut errors,
                changes.start_date,
                changes.end_date,
                changes.monthly_rent,
                changes.deposit_amount,
                changes.document_id,
            );
            errors.into_result()?;

            db.leases
                .update(id, now, |lease| {
                    lease.start_date = changes.start_date;
                    lease.end_date = changes.end_date;
                    lease.monthly_rent = changes.monthly_rent;
                    lease.deposit_amount = changes.deposit_amount;
                    lease.document_id = changes.document_id;
                    lease.notes = clean(changes.notes);
                })
                .ok_or_else(|| ServiceError::not_found::<Lease>(id))
        })?;
        info!(lease_id = id, "lease updated");
        Ok(lease)
    }

    /// End an active lease early and release its unit.
    pub fn terminate(&self, id: u64, request: TerminateLease) -> Result<Lease, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let lease = self.context.store().transaction(|db| {
            let lease = require(&db.leases, id)?;
            if !lease.is_active() {
                return Err(ServiceError::invalid(
                    "lease",
                    format!("Only active leases can be terminated; this lease is {}.", lease.status.label()),
                ));
            }
            let terminated_on = request.terminated_on.unwrap_or(today);
            if terminated_on < lease.start_date {
                return Err(ServiceError::invalid(
                    "terminated_on",
                    "The terminated on date must not be before the lease start date.",
                ));
            }

            let lease = db
                .leases
                .update(id, now, |lease| {
                    lease.status = LeaseStatus::Terminated;
                    lease.terminated_on = Some(terminated_on);
                    lease.termination_reason = clean(request.reason);
                })
                .ok_or_else(|| ServiceError::not_found::<Lease>(id))?;
            settle_unit(db, lease.unit_id, today, now);
            Ok(lease)
        })?;
        info!(lease_id = id, unit_id = lease.unit_id, "lease terminated");
        Ok(lease)
    }

    /// Mark every active lease that ended before `today` as expired.
    pub fn expire_due(&self, today: NaiveDate) -> Result<Vec<Lease>, ServiceError> {
        let now = self.context.now();
        let expired = self.context.store().transaction::<_, ServiceError>(|db| {
            let due: Vec<u64> = db
                .leases
                .active()
                .filter(|lease| lease.is_active() && lease.end_date < today)
                .map(|lease| lease.meta.id)
                .collect();

            let mut expired = Vec::with_capacity(due.len());
            for id in due {
                if let Some(lease) = db
                    .leases
                    .update(id, now, |lease| lease.status = LeaseStatus::Expired)
                {
                    settle_unit(db, lease.unit_id, today, now);
                    expired.push(lease);
                }
            }
            Ok(expired)
        })?;
        info!(count = expired.len(), %today, "expired leases");
        Ok(expired)
    }

    /// Soft delete. Deleting an active lease releases its unit.
    pub fn delete(&self, id: u64) -> Result<Lease, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let lease = self.context.store().transaction(|db| {
            require(&db.leases, id)?;
            let lease = db
                .leases
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<Lease>(id))?;
            settle_unit(db, lease.unit_id, today, now);
            Ok::<_, ServiceError>(lease)
        })?;
        info!(lease_id = id, "lease deleted");
        Ok(lease)
    }
}

fn validate_new(db: &Database, input: NewLease) -> Result<NewLease, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    match db.units.find(input.unit_id) {
        None => errors.missing_reference("unit_id"),
        Some(unit) => {
            if active_lease_id(db, unit.meta.id).is_some() {
                errors.add("unit_id", "The unit already has an active lease.");
            } else if unit.status == UnitStatus::OwnerOccupied {
                errors.add("unit_id", "The unit is occupied by its owner.");
            }
        }
    }

    match db.users.find(input.tenant_id) {
        Some(user) if user.role == Role::Tenant => {}
        Some(_) => errors.add("tenant_id", "The selected tenant must have the tenant role."),
        None => errors.missing_reference("tenant_id"),
    }

    check_terms(
        db,
        &mut errors,
        input.start_date,
        input.end_date,
        input.monthly_rent,
        input.deposit_amount,
        input.document_id,
    );
    errors.into_result()?;

    Ok(NewLease {
        notes: clean(input.notes),
        ..input
    })
}

fn check_terms(
    db: &Database,
    errors: &mut ValidationErrors,
    start_date: NaiveDate,
    end_date: NaiveDate,
    monthly_rent: Money,
    deposit_amount: Money,
    document_id: Option<u64>,
) {
    if end_date <= start_date {
        errors.add("end_date", "The end date must be a date after start date.");
    }
    errors.positive_amount("monthly_rent", monthly_rent);
    errors.non_negative_amount("deposit_amount", deposit_amount);
    if document_id.is_some_and(|id| !db.documents.contains(id)) {
        errors.missing_reference("document_id");
    }
}
