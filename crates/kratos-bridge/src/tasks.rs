use std::sync::Mutex;

use kratos_core::{current_unix_timestamp_ms, next_sequence_id};
use serde::{Deserialize, Serialize};

use crate::history::lock_unpoisoned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Processing,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: String,
    pub input_message: String,
    pub selected_operations: Vec<String>,
    pub start_time_unix_ms: u64,
    pub end_time_unix_ms: Option<u64>,
    pub status: TaskStatus,
}

/// Bookkeeping for top-level invocations. Cancellation is advisory: it never
/// interrupts an operation that is already running.
#[derive(Debug, Default)]
pub struct TaskLedger {
    records: Mutex<Vec<TaskRecord>>,
}

impl TaskLedger {
    pub fn begin(&self, input_message: &str, selected_operations: Vec<String>) -> String {
        let task_id = next_sequence_id("task");
        lock_unpoisoned(&self.records).push(TaskRecord {
            task_id: task_id.clone(),
            input_message: input_message.to_string(),
            selected_operations,
            start_time_unix_ms: current_unix_timestamp_ms(),
            end_time_unix_ms: None,
            status: TaskStatus::Processing,
        });
        task_id
    }

    /// Moves a processing task to `Completed`. Tasks cancelled in the meantime
    /// keep their status.
    pub fn complete(&self, task_id: &str) -> bool {
        self.finish(task_id, TaskStatus::Completed)
    }

    pub fn cancel(&self, task_id: &str) -> bool {
        self.finish(task_id, TaskStatus::Cancelled)
    }

    /// Cancels every processing task and returns how many were affected.
    pub fn cancel_all(&self) -> usize {
        let now = current_unix_timestamp_ms();
        let mut records = lock_unpoisoned(&self.records);
        let mut cancelled = 0;
        for record in records
            .iter_mut()
            .filter(|record| record.status == TaskStatus::Processing)
        {
            record.status = TaskStatus::Cancelled;
            record.end_time_unix_ms = Some(now);
            cancelled += 1;
        }
        cancelled
    }

    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        lock_unpoisoned(&self.records)
            .iter()
            .find(|record| record.task_id == task_id)
            .cloned()
    }

    pub fn running_count(&self) -> usize {
        lock_unpoisoned(&self.records)
            .iter()
            .filter(|record| record.status == TaskStatus::Processing)
            .count()
    }

    pub fn snapshot(&self) -> Vec<TaskRecord> {
        lock_unpoisoned(&self.records).clone()
    }

    fn finish(&self, task_id: &str, status: TaskStatus) -> bool {
        let mut records = lock_unpoisoned(&self.records);
        let Some(record) = records
            .iter_mut()
            .find(|record| record.task_id == task_id)
        else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        record.end_time_unix_ms = Some(current_unix_timestamp_ms());
        true
    }
}
