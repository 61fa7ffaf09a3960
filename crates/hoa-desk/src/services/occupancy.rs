//! Unit status derived from leases and resident owners.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::UnitStatus;
use crate::store::Database;

pub(crate) fn active_lease_id(db: &Database, unit_id: u64) -> Option<u64> {
    db.leases
        .active()
        .find(|lease| lease.unit_id == unit_id && lease.is_active())
        .map(|lease| lease.meta.id)
}

pub(crate) fn has_resident_owner(db: &Database, unit_id: u64, today: NaiveDate) -> bool {
    db.unit_owners
        .active()
        .any(|owner| owner.unit_id == unit_id && owner.is_resident && owner.is_current(today))
}

/// Status the unit should have given its leases and owners.
pub(crate) fn expected_status(db: &Database, unit_id: u64, today: NaiveDate) -> UnitStatus {
    if active_lease_id(db, unit_id).is_some() {
        UnitStatus::Rented
    } else if has_resident_owner(db, unit_id, today) {
        UnitStatus::OwnerOccupied
    } else {
        UnitStatus::Vacant
    }
}

/// Recompute and store the unit's status. Returns the new status.
pub(crate) fn settle_unit(
    db: &mut Database,
    unit_id: u64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Option<UnitStatus> {
    let status = expected_status(db, unit_id, today);
    let current = db.units.find(unit_id)?.status;
    if current != status {
        db.units.update(unit_id, now, |unit| unit.status = status);
    }
    Some(status)
}

/// Who an invoice for the unit is addressed to: the active tenant, otherwise
/// the resident owner, otherwise the earliest current owner.
pub(crate) fn billing_contact(db: &Database, unit_id: u64, today: NaiveDate) -> Option<u64> {
    if let Some(lease) = db
        .leases
        .active()
        .find(|lease| lease.unit_id == unit_id && lease.is_active())
    {
        return Some(lease.tenant_id);
    }

    let mut owners: Vec<_> = db
        .unit_owners
        .active()
        .filter(|owner| owner.unit_id == unit_id && owner.is_current(today))
        .collect();
    owners.sort_by_key(|owner| (!owner.is_resident, owner.ownership_start, owner.meta.id));
    owners.first().map(|owner| owner.owner_id)
}
