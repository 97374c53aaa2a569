//! The transfer report accumulated over one run.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Everything a run produced, mutated by each step that can fail and
/// finalized exactly once. The final `file_count`/`directory_count` always
/// reflect the target side after the last verification pass.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub success: bool,
    pub source_path: String,
    pub target_path: String,
    pub total_size_bytes: u64,
    pub transferred_size_bytes: u64,
    pub file_count: u64,
    pub directory_count: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransferReport {
    pub fn new(source_path: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            success: false,
            source_path: source_path.into(),
            target_path: target_path.into(),
            total_size_bytes: 0,
            transferred_size_bytes: 0,
            file_count: 0,
            directory_count: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record an error on the report and in the log.
    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{message}");
        self.errors.push(message);
    }

    /// Finalize the report. The first call wins; the report is never
    /// mutated afterward.
    pub fn complete(&mut self, success: bool) {
        if self.finished_at.is_some() {
            return;
        }
        self.success = success;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Elapsed run time; falls back to "so far" while unfinished.
    pub fn duration(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }

    /// Average transfer rate in bytes per second.
    pub fn average_rate(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.transferred_size_bytes as f64 / secs
        } else {
            0.0
        }
    }
}
