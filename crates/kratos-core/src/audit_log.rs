//! Append-only NDJSON audit files with size-based rotation.
//!
//! The active file is `<path>`; rotated generations are `<path>.1` (newest)
//! through `<path>.<max_files - 1>` (oldest). Anything older is dropped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;

const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;
const MAX_BYTES_ENV: &str = "KRATOS_LOG_ROTATION_MAX_BYTES";
const MAX_FILES_ENV: &str = "KRATOS_LOG_ROTATION_MAX_FILES";

/// Size-based rotation settings for NDJSON audit trails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for LogRotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl LogRotationPolicy {
    /// Reads `KRATOS_LOG_ROTATION_MAX_BYTES` / `KRATOS_LOG_ROTATION_MAX_FILES`,
    /// falling back per field on missing, unparsable or zero values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_bytes: positive_env(MAX_BYTES_ENV).unwrap_or(defaults.max_bytes),
            max_files: positive_env::<usize>(MAX_FILES_ENV).unwrap_or(defaults.max_files),
        }
    }
}

fn positive_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
}

/// One NDJSON audit file shared by concurrent writers.
#[derive(Debug)]
pub struct JsonlAuditFile {
    path: PathBuf,
    policy: LogRotationPolicy,
    write_lock: Mutex<()>,
}

impl JsonlAuditFile {
    pub fn new(path: impl Into<PathBuf>, policy: LogRotationPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes `record` as a single line and appends it.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record).context("failed to encode audit record")?;
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        append_line_with_rotation(&self.path, &line, self.policy)
    }
}

/// Appends `line` to `path`, rotating first when it would push the active
/// file past `policy.max_bytes`.
pub fn append_line_with_rotation(path: &Path, line: &str, policy: LogRotationPolicy) -> Result<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let current_len = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(_) => 0,
    };
    let incoming_len = u64::try_from(line.len()).unwrap_or(u64::MAX).saturating_add(1);
    if current_len > 0 && current_len.saturating_add(incoming_len) > policy.max_bytes {
        rotate(path, policy.max_files)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("failed to append {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

fn generation_path(path: &Path, generation: usize) -> PathBuf {
    PathBuf::from(format!("{}.{generation}", path.display()))
}

fn rotate(path: &Path, max_files: usize) -> Result<()> {
    let retained = max_files.saturating_sub(1);
    if retained == 0 {
        return std::fs::remove_file(path)
            .with_context(|| format!("failed to truncate {}", path.display()));
    }

    let oldest = generation_path(path, retained);
    if oldest.exists() {
        std::fs::remove_file(&oldest)
            .with_context(|| format!("failed to drop {}", oldest.display()))?;
    }
    for generation in (1..retained).rev() {
        let from = generation_path(path, generation);
        if from.exists() {
            let to = generation_path(path, generation + 1);
            std::fs::rename(&from, &to)
                .with_context(|| format!("failed to shift {} to {}", from.display(), to.display()))?;
        }
    }
    let first = generation_path(path, 1);
    std::fs::rename(path, &first)
        .with_context(|| format!("failed to rotate {} to {}", path.display(), first.display()))
}
