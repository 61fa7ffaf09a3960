//! Fixtures shared by the service tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use mockable::Clock;
use tempfile::TempDir;

use super::{ServiceContext, Services};
use crate::domain::{Building, Role, Unit, User};
use crate::money::Money;
use crate::storage::LocalDisk;
use crate::store::Store;

/// Clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(crate) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(crate) fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0)
        .single()
        .expect("valid time")
}

/// A service graph over an in-memory store and a temporary public disk.
pub(crate) struct Harness {
    pub services: Services,
    pub store: Store,
    pub clock: Arc<FixedClock>,
    pub disk: LocalDisk,
    _dir: TempDir,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::at(noon(2026, 3, 10))
    }

    pub(crate) fn at(now: DateTime<Utc>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let disk = LocalDisk::new(dir.path(), "/storage");
        let store = Store::in_memory();
        let clock = Arc::new(FixedClock::at(now));
        let context = ServiceContext::new(store.clone(), clock.clone(), Arc::new(disk.clone()));
        Self {
            services: Services::new(context),
            store,
            clock,
            disk,
            _dir: dir,
        }
    }

    pub(crate) fn building(&self, name: &str) -> Building {
        let now = self.clock.utc();
        self.store
            .transaction::<_, crate::store::StoreError>(|db| {
                Ok(db.buildings.insert(now, |meta| Building {
                    meta,
                    name: name.to_string(),
                    address: "1 Harbour Road".to_string(),
                    city: Some("Mombasa".to_string()),
                    total_floors: Some(6),
                    description: None,
                }))
            })
            .expect("seed building")
    }

    pub(crate) fn unit(&self, building_id: u64, number: &str) -> Unit {
        let now = self.clock.utc();
        self.store
            .transaction::<_, crate::store::StoreError>(|db| {
                Ok(db.units.insert(now, |meta| Unit {
                    meta,
                    building_id,
                    unit_number: number.to_string(),
                    floor: Some(1),
                    area_sqm: Some(84.5),
                    bedrooms: Some(2),
                    status: Default::default(),
                    notes: None,
                }))
            })
            .expect("seed unit")
    }

    /// A user inserted directly, skipping password hashing.
    pub(crate) fn user(&self, name: &str, role: Role) -> User {
        let now = self.clock.utc();
        let email = format!("{}@cedar.example", name.to_lowercase().replace(' ', "."));
        self.store
            .transaction::<_, crate::store::StoreError>(|db| {
                Ok(db.users.insert(now, |meta| User {
                    meta,
                    name: name.to_string(),
                    email,
                    phone: None,
                    role,
                    password_hash: String::new(),
                    is_active: true,
                    last_login_at: None,
                }))
            })
            .expect("seed user")
    }

    pub(crate) fn unit_status(&self, unit_id: u64) -> crate::domain::UnitStatus {
        self.store
            .read(|db| db.units.find_with_trashed(unit_id).map(|unit| unit.status))
            .expect("read")
            .expect("unit exists")
    }
}

pub(crate) fn money(units: i64) -> Money {
    Money::from_units(units)
}
