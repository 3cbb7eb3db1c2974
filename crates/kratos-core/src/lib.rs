//! Foundational utilities shared across Kratos crates.
//!
//! Provides wall-clock helpers, process-unique identifiers, and the rotated
//! NDJSON audit file used to mirror the operation history.

pub mod audit_log;
pub mod ids;
pub mod time_utils;

pub use audit_log::{append_line_with_rotation, JsonlAuditFile, LogRotationPolicy};
pub use ids::next_sequence_id;
pub use time_utils::{current_rfc3339_timestamp, current_unix_timestamp_ms};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_rfc3339_timestamps_are_utc() {
        let timestamp = current_rfc3339_timestamp();
        assert!(timestamp.ends_with('Z'));
        assert_eq!(timestamp.len(), "2024-05-01T12:00:00.000Z".len());
    }

    #[test]
    fn unit_sequence_ids_are_unique_and_prefixed() {
        let first = next_sequence_id("task");
        let second = next_sequence_id("task");
        assert!(first.starts_with("task-"));
        assert_ne!(first, second);
    }

    #[test]
    fn unit_unix_ms_is_monotonic_enough_for_ids() {
        let before = current_unix_timestamp_ms();
        let after = current_unix_timestamp_ms();
        assert!(after >= before);
    }
}
