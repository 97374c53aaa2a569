//! Advisory directory measurement.
//!
//! Probing is best-effort: a sub-probe that fails degrades its field to
//! zero instead of aborting, because authoritative counts come from the
//! verifier after the transfer, not from here.

use std::time::Duration;

use crate::command::quote;
use crate::session::RemoteShell;

/// Aggregate measurements for one path on one host at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectorySnapshot {
    pub total_size_bytes: u64,
    pub file_count: u64,
    pub dir_count: u64,
}

/// Measure `path` with summing and counting commands rather than
/// enumerating every entry in memory.
pub fn probe(session: &mut dyn RemoteShell, path: &str, timeout: Duration) -> DirectorySnapshot {
    log::info!("{}: probing {path}", session.label());

    let snapshot = DirectorySnapshot {
        total_size_bytes: numeric_probe(
            session,
            &format!("du -sb {} 2>/dev/null | cut -f1", quote(path)),
            timeout,
            "total size",
        ),
        file_count: numeric_probe(
            session,
            &format!("find {} -type f 2>/dev/null | wc -l", quote(path)),
            timeout,
            "file count",
        ),
        dir_count: numeric_probe(
            session,
            &format!("find {} -type d 2>/dev/null | wc -l", quote(path)),
            timeout,
            "directory count",
        ),
    };

    log::info!(
        "{}: {path}: {} bytes, {} files, {} directories",
        session.label(),
        snapshot.total_size_bytes,
        snapshot.file_count,
        snapshot.dir_count
    );
    snapshot
}

fn numeric_probe(
    session: &mut dyn RemoteShell,
    command: &str,
    timeout: Duration,
    what: &str,
) -> u64 {
    let parsed = match session.execute(command, timeout) {
        Ok(output) if output.success() => output.stdout.trim().parse::<u64>().ok(),
        Ok(_) => None,
        Err(err) => {
            log::warn!("{}: probe command failed: {err}", session.label());
            None
        }
    };
    match parsed {
        Some(value) => value,
        None => {
            log::warn!(
                "{}: could not determine {what}; recording zero",
                session.label()
            );
            0
        }
    }
}
