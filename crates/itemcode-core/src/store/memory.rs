//! In-memory code store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{CodeRecord, CodeStore, ItemId, StoreError, StoreStats};
use crate::code::IdentityCode;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    records: BTreeMap<IdentityCode, CodeRecord>,
}

/// Map-backed [`CodeStore`] with the same uniqueness and id semantics as
/// the `SQLite` backend. The whole map sits behind one mutex, so every
/// operation is atomic.
#[derive(Debug, Default)]
pub struct InMemoryCodeStore {
    inner: Mutex<Inner>,
}

impl InMemoryCodeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl CodeStore for InMemoryCodeStore {
    fn insert(&self, code: &IdentityCode, item_id: ItemId) -> Result<CodeRecord, StoreError> {
        let mut inner = self.lock()?;
        if inner.records.contains_key(code) {
            return Err(StoreError::DuplicateCode { code: code.clone() });
        }

        inner.next_id += 1;
        let record = CodeRecord {
            id: inner.next_id,
            code: code.clone(),
            item_id,
            verify_count: 0,
        };
        inner.records.insert(code.clone(), record.clone());
        Ok(record)
    }

    fn find(&self, code: &str) -> Result<Option<CodeRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.records.get(code).cloned())
    }

    fn codes_for_item(&self, item_id: ItemId) -> Result<Vec<IdentityCode>, StoreError> {
        let inner = self.lock()?;
        let mut owned: Vec<&CodeRecord> = inner
            .records
            .values()
            .filter(|r| r.item_id == item_id)
            .collect();
        owned.sort_by_key(|r| r.id);
        Ok(owned.into_iter().map(|r| r.code.clone()).collect())
    }

    fn record_verification(&self, code: &str) -> Result<Option<CodeRecord>, StoreError> {
        let mut inner = self.lock()?;
        let Some(record) = inner.records.get_mut(code) else {
            return Ok(None);
        };
        record.verify_count += 1;
        Ok(Some(record.clone()))
    }

    fn delete_codes(&self, codes: &[IdentityCode]) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        Ok(codes
            .iter()
            .filter(|code| inner.records.remove(*code).is_some())
            .count())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.lock()?;
        let mut items: Vec<ItemId> = inner.records.values().map(|r| r.item_id).collect();
        items.sort_unstable();
        items.dedup();

        Ok(StoreStats {
            record_count: inner.records.len() as u64,
            item_count: items.len() as u64,
            total_verifications: inner.records.values().map(|r| r.verify_count).sum(),
            max_id: inner.records.values().map(|r| r.id).max().unwrap_or(0),
        })
    }
}
