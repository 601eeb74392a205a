//! In-memory record store.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use visitrack_protocol::VisitRecord;

/// Record store keeping insertion order.
///
/// The store maintains:
/// - All records in registration order
/// - An index from record ID to position
/// - Access codes issued for records
#[derive(Debug, Default)]
pub struct RecordStore {
    records: RwLock<Vec<VisitRecord>>,
    index: RwLock<HashMap<String, usize>>,
    codes: RwLock<HashMap<String, String>>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Inserts a new record.
    pub fn insert(&self, record: VisitRecord) -> ServerResult<()> {
        let mut records = self.records.write();
        let mut index = self.index.write();
        if index.contains_key(&record.id) {
            return Err(ServerError::Duplicate(record.id));
        }
        index.insert(record.id.clone(), records.len());
        records.push(record);
        Ok(())
    }

    /// Returns a copy of a record.
    pub fn get(&self, record_id: &str) -> Option<VisitRecord> {
        let position = *self.index.read().get(record_id)?;
        self.records.read().get(position).cloned()
    }

    /// Runs `f` on a record under the write lock.
    ///
    /// The record is only replaced when `f` succeeds.
    pub fn update<T, F>(&self, record_id: &str, f: F) -> ServerResult<(VisitRecord, T)>
    where
        F: FnOnce(&mut VisitRecord) -> ServerResult<T>,
    {
        let position = *self
            .index
            .read()
            .get(record_id)
            .ok_or_else(|| ServerError::NotFound(record_id.to_string()))?;
        let mut records = self.records.write();
        let stored = records
            .get_mut(position)
            .ok_or_else(|| ServerError::Internal(format!("dangling index for {record_id}")))?;

        let mut next = stored.clone();
        let value = f(&mut next)?;
        *stored = next.clone();
        Ok((next, value))
    }

    /// Copies every record, in registration order.
    pub fn snapshot(&self) -> Vec<VisitRecord> {
        self.records.read().clone()
    }

    /// Binds an access code to a record.
    pub fn bind_code(&self, code: impl Into<String>, record_id: &str) -> ServerResult<()> {
        if !self.index.read().contains_key(record_id) {
            return Err(ServerError::NotFound(record_id.to_string()));
        }
        self.codes.write().insert(code.into(), record_id.to_string());
        Ok(())
    }

    /// Resolves an access code.
    pub fn resolve_code(&self, code: &str) -> Option<String> {
        self.codes.read().get(code).cloned()
    }
}
