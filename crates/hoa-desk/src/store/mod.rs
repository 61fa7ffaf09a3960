//! Transactional in-process database.
//!
//! Every mutation runs inside [`Store::transaction`], which holds the store
//! lock for its whole duration and works on a copy of the [`Database`]. The
//! copy replaces the committed state only when the closure succeeds and the
//! snapshot (if configured) has been written, so a failed transaction leaves
//! nothing behind. Holding the lock for the whole transaction is what
//! serializes invoice-number allocation.
//!
//! A file-backed store also holds an exclusive lock on `<snapshot>.lock`
//! for as long as it is open, so a second process cannot load the same
//! snapshot and commit over it.

mod table;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    AccessToken, Building, Document, DocumentTemplate, Fee, Invoice, InvoicePenalty, Lease,
    Payment, Unit, UnitOwner, User, Vehicle,
};

pub(crate) use table::impl_record;
pub use table::{Record, RecordMeta, Table};

/// All tables. Cloned at the start of each transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub buildings: Table<Building>,
    pub units: Table<Unit>,
    pub leases: Table<Lease>,
    pub unit_owners: Table<UnitOwner>,
    pub vehicles: Table<Vehicle>,
    pub fees: Table<Fee>,
    pub invoices: Table<Invoice>,
    pub payments: Table<Payment>,
    pub penalties: Table<InvoicePenalty>,
    pub users: Table<User>,
    pub access_tokens: Table<AccessToken>,
    pub documents: Table<Document>,
    pub templates: Table<DocumentTemplate>,
}

/// Persistence failures (the repository layer's error).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store lock poisoned by a panicked transaction")]
    Poisoned,
    #[error("failed to read database snapshot {path}: {source}")]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("database snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to persist database snapshot: {0}")]
    Persist(String),
    #[error("database snapshot {path} is in use by another process; stop the server or run the job through /v1/operations")]
    Locked { path: PathBuf },
    #[error("failed to lock database snapshot {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct Store {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    database: Mutex<Database>,
    snapshot: Option<PathBuf>,
    // Released when the last handle is dropped.
    _lock: Option<fs::File>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self::with_database(Database::default(), None, None)
    }

    /// Open a store backed by a JSON snapshot, loading it when present.
    ///
    /// Fails with [`StoreError::Locked`] while another store has the same
    /// snapshot open.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let lock = acquire_lock(&path)?;
        let database = if path.exists() {
            let raw = fs::read(&path).map_err(|source| StoreError::Load {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            Database::default()
        };
        Ok(Self::with_database(database, Some(path), Some(lock)))
    }

    fn with_database(database: Database, snapshot: Option<PathBuf>, lock: Option<fs::File>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                database: Mutex::new(database),
                snapshot,
                _lock: lock,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        self.inner.database.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn read<T>(&self, read: impl FnOnce(&Database) -> T) -> Result<T, StoreError> {
        let guard = self.lock()?;
        Ok(read(&guard))
    }

    /// Run `work` against a working copy and commit it only on success.
    pub fn transaction<T, E>(&self, work: impl FnOnce(&mut Database) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.lock()?;
        let mut working = guard.clone();

        match work(&mut working) {
            Ok(value) => {
                if let Some(path) = &self.inner.snapshot {
                    write_snapshot(path, &working)?;
                }
                *guard = working;
                Ok(value)
            }
            Err(err) => {
                debug!("transaction rolled back");
                Err(err)
            }
        }
    }
}

fn acquire_lock(snapshot: &Path) -> Result<fs::File, StoreError> {
    let path = snapshot.with_extension("lock");
    let lock_error = |source| StoreError::Lock {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(lock_error)?;
    }
    let file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(lock_error)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(err) if err.kind() == fs2::lock_contended_error().kind() => Err(StoreError::Locked {
            path: snapshot.to_path_buf(),
        }),
        Err(source) => Err(lock_error(source)),
    }
}

fn write_snapshot(path: &Path, database: &Database) -> Result<(), StoreError> {
    let encoded =
        serde_json::to_vec(database).map_err(|err| StoreError::Persist(err.to_string()))?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| StoreError::Persist(err.to_string()))?;
    }

    let staging = path.with_extension("json.tmp");
    let mut file =
        fs::File::create(&staging).map_err(|err| StoreError::Persist(err.to_string()))?;
    file.write_all(&encoded)
        .and_then(|()| file.sync_all())
        .map_err(|err| StoreError::Persist(err.to_string()))?;
    fs::rename(&staging, path).map_err(|err| StoreError::Persist(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Building;
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).single().expect("valid time")
    }

    fn building(meta: RecordMeta, name: &str) -> Building {
        Building {
            meta,
            name: name.to_string(),
            address: "1 Harbour Road".to_string(),
            city: None,
            total_floors: Some(4),
            description: None,
        }
    }

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Store(#[from] StoreError),
        #[error("abort")]
        Abort,
    }

    #[test]
    fn commits_successful_transactions() {
        let store = Store::in_memory();
        let created = store
            .transaction::<_, StoreError>(|db| {
                Ok(db.buildings.insert(now(), |meta| building(meta, "Cedar Court")))
            })
            .expect("commit");

        let found = store
            .read(|db| db.buildings.find(created.meta.id).cloned())
            .expect("read");
        assert_eq!(found.map(|b| b.name), Some("Cedar Court".to_string()));
    }

    #[test]
    fn failed_transaction_leaves_database_unchanged() {
        let store = Store::in_memory();
        let result = store.transaction(|db| {
            db.buildings.insert(now(), |meta| building(meta, "Cedar Court"));
            Err::<(), _>(TestError::Abort)
        });
        assert!(matches!(result, Err(TestError::Abort)));

        let count = store.read(|db| db.buildings.active().count()).expect("read");
        assert_eq!(count, 0);
    }

    #[test]
    fn soft_deleted_rows_are_hidden_but_keep_their_id() {
        let mut table: Table<Building> = Table::default();
        let first = table.insert(now(), |meta| building(meta, "A"));
        table.soft_delete(first.meta.id, now()).expect("deleted");
        let second = table.insert(now(), |meta| building(meta, "B"));

        assert!(table.find(first.meta.id).is_none());
        assert!(table.find_with_trashed(first.meta.id).is_some());
        assert_eq!(second.meta.id, 2);
        assert_eq!(table.active().count(), 1);
        assert!(table.update(first.meta.id, now(), |_| {}).is_none());
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data/hoa.json");

        let store = Store::open(&path).expect("open empty");
        store
            .transaction::<_, StoreError>(|db| {
                db.buildings.insert(now(), |meta| building(meta, "Cedar Court"));
                Ok(())
            })
            .expect("commit");
        drop(store);

        let reopened = Store::open(&path).expect("reopen");
        let names: Vec<String> = reopened
            .read(|db| db.buildings.active().map(|b| b.name.clone()).collect())
            .expect("read");
        assert_eq!(names, vec!["Cedar Court".to_string()]);
    }

    #[test]
    fn a_snapshot_is_opened_by_one_store_at_a_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hoa.json");

        let first = Store::open(&path).expect("open");
        assert!(matches!(Store::open(&path), Err(StoreError::Locked { .. })));

        let shared = first.clone();
        drop(first);
        assert!(matches!(Store::open(&path), Err(StoreError::Locked { .. })));

        drop(shared);
        Store::open(&path).expect("reopen after release");
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hoa.json");
        fs::write(&path, b"{not json").expect("write");
        assert!(matches!(Store::open(&path), Err(StoreError::Corrupt { .. })));
    }
}
