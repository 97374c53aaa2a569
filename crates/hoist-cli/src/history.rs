//! Local transfer history.
//!
//! Every finished run appends one record to a capped JSONL file under the
//! user's config directory. This is the report sink: the core produces the
//! report object, persistence and formatting happen here.

use std::collections::VecDeque;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use eyre::{Context, Result};
use hoist_core::TransferReport;
use serde::{Deserialize, Serialize};

const MAX_HISTORY_BYTES: u64 = 1_000_000;

/// One finished run, flattened for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub timestamp: String,
    pub success: bool,
    pub source_path: String,
    pub target_path: String,
    pub duration_seconds: f64,
    pub total_size_bytes: u64,
    pub transferred_size_bytes: u64,
    pub rate_bytes_per_sec: f64,
    pub file_count: u64,
    pub directory_count: u64,
    pub errors: Vec<String>,
}

impl TransferRecord {
    pub fn from_report(report: &TransferReport) -> Self {
        Self {
            timestamp: report.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            success: report.success,
            source_path: report.source_path.clone(),
            target_path: report.target_path.clone(),
            duration_seconds: report.duration().as_secs_f64(),
            total_size_bytes: report.total_size_bytes,
            transferred_size_bytes: report.transferred_size_bytes,
            rate_bytes_per_sec: report.average_rate(),
            file_count: report.file_count,
            directory_count: report.directory_count,
            errors: report.errors.clone(),
        }
    }
}

/// Append a record to the history store.
pub fn append_record(record: &TransferRecord) -> Result<()> {
    let path = history_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create history directory {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .wrap_err_with(|| format!("failed to open history file {}", path.display()))?;

    let line = serde_json::to_string(record).wrap_err("serialize transfer record")?;
    writeln!(file, "{line}").wrap_err("write transfer record")?;
    drop(file);

    enforce_size_cap(&path, MAX_HISTORY_BYTES)?;
    Ok(())
}

/// Read the most recent records, oldest first. `limit` of zero means all.
pub fn read_recent(limit: usize) -> Result<Vec<TransferRecord>> {
    let path = history_path()?;
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(&path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for line in reader.lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<TransferRecord>(&line) {
            records.push(record);
        }
    }

    if limit == 0 || records.len() <= limit {
        return Ok(records);
    }
    let start = records.len().saturating_sub(limit);
    Ok(records[start..].to_vec())
}

pub fn config_dir() -> Result<PathBuf> {
    if let Some(proj) = ProjectDirs::from("com", "Hoist", "Hoist") {
        return Ok(proj.config_dir().to_path_buf());
    }
    let home = env::var_os("HOME")
        .ok_or_else(|| eyre::eyre!("cannot determine HOME directory for transfer history"))?;
    Ok(Path::new(&home).join(".config").join("hoist"))
}

pub fn history_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("transfers.jsonl"))
}

/// Drop the oldest lines once the file outgrows the cap, keeping the
/// newest records.
fn enforce_size_cap(path: &Path, max_bytes: u64) -> Result<()> {
    let metadata = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    if metadata.len() <= max_bytes {
        return Ok(());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines: VecDeque<String> = reader
        .lines()
        .collect::<std::result::Result<Vec<String>, _>>()
        .wrap_err("read transfer history for rotation")?
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect();

    let mut total_size: usize = lines.iter().map(|l| l.len() + 1).sum();
    let mut trimmed = false;
    while lines.len() > 1 && total_size > max_bytes as usize {
        if let Some(front) = lines.pop_front() {
            total_size -= front.len() + 1;
            trimmed = true;
        }
    }
    if !trimmed {
        return Ok(());
    }

    let mut out = String::with_capacity(total_size);
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    fs::write(path, out).wrap_err("rewrite trimmed transfer history")?;
    Ok(())
}
