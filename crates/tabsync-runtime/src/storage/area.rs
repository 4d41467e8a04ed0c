//! In-memory storage area.

use std::cell::RefCell;
use std::collections::BTreeMap;

use tabsync_core::StorageScope;

use super::Store;
use crate::error::StoreError;

/// Injected failures, one slot per operation class.
#[derive(Debug, Default)]
struct FaultPlan {
    read: Option<StoreError>,
    write: Option<StoreError>,
    delete: Option<StoreError>,
}

/// One key/value area (the local area of an origin, or one session).
///
/// Keys iterate in sorted order.
#[derive(Debug)]
pub struct StorageArea {
    scope: StorageScope,
    entries: RefCell<BTreeMap<String, String>>,
    faults: RefCell<FaultPlan>,
}

impl StorageArea {
    #[must_use]
    pub fn new(scope: StorageScope) -> Self {
        Self {
            scope,
            entries: RefCell::new(BTreeMap::new()),
            faults: RefCell::new(FaultPlan::default()),
        }
    }

    #[must_use]
    pub fn scope(&self) -> StorageScope {
        self.scope
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(err) = self.faults.borrow().read.clone() {
            return Err(err);
        }
        Ok(self.entries.borrow().get(key).cloned())
    }

    /// Store `value` under `key`. Returns the previous value.
    pub fn set_item(&self, key: &str, value: &str) -> Result<Option<String>, StoreError> {
        if let Some(err) = self.faults.borrow().write.clone() {
            return Err(match err {
                StoreError::QuotaExceeded { .. } => StoreError::QuotaExceeded {
                    key: key.to_string(),
                },
                other => other,
            });
        }
        Ok(self
            .entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string()))
    }

    /// Delete `key`. Returns the removed value.
    pub fn remove_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(err) = self.faults.borrow().delete.clone() {
            return Err(err);
        }
        Ok(self.entries.borrow_mut().remove(key))
    }

    /// Delete every key. Returns `true` if the area held anything.
    pub fn clear(&self) -> Result<bool, StoreError> {
        if let Some(err) = self.faults.borrow().delete.clone() {
            return Err(err);
        }
        let mut entries = self.entries.borrow_mut();
        let had_entries = !entries.is_empty();
        entries.clear();
        Ok(had_entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Make subsequent reads fail with `err` (`None` restores reads).
    pub fn fail_reads(&self, err: Option<StoreError>) {
        self.faults.borrow_mut().read = err;
    }

    /// Make subsequent writes fail with `err` (`None` restores writes).
    pub fn fail_writes(&self, err: Option<StoreError>) {
        self.faults.borrow_mut().write = err;
    }

    /// Make subsequent deletes and clears fail with `err`.
    pub fn fail_deletes(&self, err: Option<StoreError>) {
        self.faults.borrow_mut().delete = err;
    }

    /// Remove every injected failure.
    pub fn heal(&self) {
        *self.faults.borrow_mut() = FaultPlan::default();
    }
}

impl Store for StorageArea {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_item(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_item(key, value).map(drop)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.remove_item(key).map(drop)
    }
}
