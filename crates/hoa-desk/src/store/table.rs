use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity, timestamps and the soft-delete flag shared by every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    pub fn new(id: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A row stored in a [`Table`].
pub trait Record: Clone {
    const ENTITY: &'static str;

    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> u64 {
        self.meta().id
    }
}

/// Rows keyed by id. Ids are never reused, soft-deleted rows stay in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table<T> {
    next_id: u64,
    rows: BTreeMap<u64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Record> Table<T> {
    /// Allocate the next id and store the row produced by `build`.
    pub fn insert(&mut self, now: DateTime<Utc>, build: impl FnOnce(RecordMeta) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(RecordMeta::new(id, now));
        self.rows.insert(id, row.clone());
        row
    }

    pub fn find(&self, id: u64) -> Option<&T> {
        self.rows.get(&id).filter(|row| !row.meta().is_deleted())
    }

    pub fn find_with_trashed(&self, id: u64) -> Option<&T> {
        self.rows.get(&id)
    }

    pub fn find_mut(&mut self, id: u64) -> Option<&mut T> {
        self.rows
            .get_mut(&id)
            .filter(|row| !row.meta().is_deleted())
    }

    pub fn contains(&self, id: u64) -> bool {
        self.find(id).is_some()
    }

    /// Apply `change` to a live row and bump `updated_at`.
    pub fn update(
        &mut self,
        id: u64,
        now: DateTime<Utc>,
        change: impl FnOnce(&mut T),
    ) -> Option<T> {
        let row = self.find_mut(id)?;
        change(row);
        row.meta_mut().updated_at = now;
        Some(row.clone())
    }

    pub fn soft_delete(&mut self, id: u64, now: DateTime<Utc>) -> Option<T> {
        let row = self.find_mut(id)?;
        let meta = row.meta_mut();
        meta.deleted_at = Some(now);
        meta.updated_at = now;
        Some(row.clone())
    }

    /// Live rows in id order.
    pub fn active(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.rows.values().filter(|row| !row.meta().is_deleted())
    }

    pub fn with_trashed(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.rows.values()
    }
}

/// Implements [`Record`] for structs holding `meta: RecordMeta`.
macro_rules! impl_record {
    ($($ty:ty => $entity:literal),+ $(,)?) => {
        $(
            impl $crate::store::Record for $ty {
                const ENTITY: &'static str = $entity;

                fn meta(&self) -> &$crate::store::RecordMeta {
                    &self.meta
                }

                fn meta_mut(&mut self) -> &mut $crate::store::RecordMeta {
                    &mut self.meta
                }
            }
        )+
    };
}

pub(crate) use impl_record;
