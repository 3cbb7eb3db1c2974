use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::result::OperationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: String,
    pub operation_name: String,
    pub parameters: Value,
    pub result: OperationResult,
}

/// Append-only, in-memory record of dispatched operations, oldest first.
#[derive(Debug, Default)]
pub struct OperationHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl OperationHistory {
    pub fn append(&self, entry: HistoryEntry) {
        self.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.lock();
        let start = entries.len().saturating_sub(limit);
        entries[start..].to_vec()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        lock_unpoisoned(&self.entries)
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
