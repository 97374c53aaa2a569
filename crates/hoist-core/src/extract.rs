//! Artifact extraction on the target host.
//!
//! There is no partial-extraction rollback: a failed unpack leaves the
//! destination as-is, and file-level reconciliation is the recovery
//! engine's job, not a re-extract of the whole artifact.

use std::time::Duration;

use crate::command::{mkdir_p, quote};
use crate::errors::{StepError, StepResult};
use crate::session::RemoteShell;

/// Unpack `archive_path` into `destination_parent`, creating the parent
/// first (idempotent).
pub fn extract(
    target: &mut dyn RemoteShell,
    archive_path: &str,
    destination_parent: &str,
    timeout: Duration,
) -> StepResult<()> {
    let output = target.execute(&mkdir_p(destination_parent), timeout)?;
    if !output.success() {
        return Err(StepError::extract(format!(
            "could not create {destination_parent}: {}",
            output.stderr.trim()
        )));
    }

    let command = format!(
        "tar -xzf {} -C {}",
        quote(archive_path),
        quote(destination_parent)
    );
    log::info!(
        "{}: extracting {archive_path} into {destination_parent}",
        target.label()
    );

    let output = target.execute(&command, timeout)?;
    if !output.success() {
        return Err(StepError::extract(format!(
            "tar exited with {} extracting {archive_path}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }
    Ok(())
}
