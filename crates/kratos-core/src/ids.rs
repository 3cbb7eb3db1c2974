use std::sync::atomic::{AtomicU64, Ordering};

use crate::time_utils::current_unix_timestamp_ms;

static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Builds a process-unique identifier of the form `<prefix>-<unix_ms>-<seq>`.
///
/// The sequence is shared by every prefix so two ids minted in the same
/// millisecond never collide.
pub fn next_sequence_id(prefix: &str) -> String {
    let now = current_unix_timestamp_ms();
    let suffix = SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{now}-{suffix:04}")
}
