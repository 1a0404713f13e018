//! Persisted prescription store.
//!
//! Detection only ever reads through `get_all_records`; uploads write through
//! `save_record`, which also enforces the retention cap.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use super::repository::*;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::config::MAX_STORED_PRESCRIPTIONS;
use crate::models::PrescriptionRecord;

/// Saved prescriptions, most recent first, capped at a fixed count.
pub trait PrescriptionStore: Send + Sync {
    /// All records, most recent first.
    fn get_all_records(&self) -> Result<Vec<PrescriptionRecord>, DatabaseError>;

    fn most_recent(&self) -> Result<Option<PrescriptionRecord>, DatabaseError>;

    /// Insert a record and evict the oldest ones beyond the cap.
    fn save_record(&self, record: &PrescriptionRecord) -> Result<(), DatabaseError>;

    /// Remove one record. Unknown ids are ignored.
    fn delete_record(&self, id: &str) -> Result<(), DatabaseError>;

    fn clear(&self) -> Result<(), DatabaseError>;
}

// ──────────────────────────────────────────────
// SQLite
// ──────────────────────────────────────────────

pub struct SqlitePrescriptionStore {
    conn: Mutex<Connection>,
    max_records: usize,
}

impl SqlitePrescriptionStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    /// Wrap an already-migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            max_records: MAX_STORED_PRESCRIPTIONS,
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl PrescriptionStore for SqlitePrescriptionStore {
    fn get_all_records(&self) -> Result<Vec<PrescriptionRecord>, DatabaseError> {
        get_all_prescriptions(&*self.lock()?)
    }

    fn most_recent(&self) -> Result<Option<PrescriptionRecord>, DatabaseError> {
        get_most_recent_prescription(&*self.lock()?)
    }

    fn save_record(&self, record: &PrescriptionRecord) -> Result<(), DatabaseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        insert_prescription(&tx, record)?;
        let evicted = evict_old_prescriptions(&tx, self.max_records)?;
        tx.commit()?;

        if evicted > 0 {
            tracing::debug!(evicted, max = self.max_records, "Evicted old prescriptions");
        }
        Ok(())
    }

    fn delete_record(&self, id: &str) -> Result<(), DatabaseError> {
        if !delete_prescription(&*self.lock()?, id)? {
            tracing::debug!(id, "Delete ignored, no such prescription");
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), DatabaseError> {
        clear_prescriptions(&*self.lock()?)
    }
}

// ──────────────────────────────────────────────
// In-memory (tests, ephemeral sessions)
// ──────────────────────────────────────────────

/// Vec-backed store with the same ordering and retention rules.
pub struct InMemoryPrescriptionStore {
    records: Mutex<Vec<PrescriptionRecord>>,
    max_records: usize,
}

impl InMemoryPrescriptionStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            max_records: MAX_STORED_PRESCRIPTIONS,
        }
    }

    /// Seed with records in any order; they are kept most recent first.
    pub fn with_records(mut records: Vec<PrescriptionRecord>) -> Self {
        sort_most_recent_first(&mut records);
        records.truncate(MAX_STORED_PRESCRIPTIONS);
        Self {
            records: Mutex::new(records),
            max_records: MAX_STORED_PRESCRIPTIONS,
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<PrescriptionRecord>>, DatabaseError> {
        self.records.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

/// Newest first. The sort is stable, so equal timestamps keep their order.
fn sort_most_recent_first(records: &mut [PrescriptionRecord]) {
    records.sort_by(|a, b| b.timestamp_millis.cmp(&a.timestamp_millis));
}

impl Default for InMemoryPrescriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PrescriptionStore for InMemoryPrescriptionStore {
    fn get_all_records(&self) -> Result<Vec<PrescriptionRecord>, DatabaseError> {
        Ok(self.lock()?.clone())
    }

    fn most_recent(&self) -> Result<Option<PrescriptionRecord>, DatabaseError> {
        Ok(self.lock()?.first().cloned())
    }

    fn save_record(&self, record: &PrescriptionRecord) -> Result<(), DatabaseError> {
        let mut records = self.lock()?;
        records.insert(0, record.clone());
        sort_most_recent_first(&mut records);
        let evicted = records.len().saturating_sub(self.max_records);
        records.truncate(self.max_records);

        if evicted > 0 {
            tracing::debug!(evicted, max = self.max_records, "Evicted old prescriptions");
        }
        Ok(())
    }

    fn delete_record(&self, id: &str) -> Result<(), DatabaseError> {
        self.lock()?.retain(|r| r.id != id);
        Ok(())
    }

    fn clear(&self) -> Result<(), DatabaseError> {
        self.lock()?.clear();
        Ok(())
    }
}
