//! Post-transfer verification.
//!
//! Verification always re-measures both sides rather than trusting the
//! pre-transfer probe: counts can legitimately change between probe and
//! verify. A target deficit triggers recovery; a surplus is only a
//! warning, since pre-existing unrelated files at the destination are
//! normal.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::command::quote;
use crate::errors::{StepError, StepResult};
use crate::session::RemoteShell;

/// Relative paths present on the source but absent from the target.
pub type MissingFileSet = BTreeSet<String>;

/// File and directory counts for one side. The directory count excludes
/// the transferred root itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideCounts {
    pub file_count: u64,
    pub dir_count: u64,
}

/// How the two sides compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Match,
    /// The target is missing this many files.
    Deficit(u64),
    /// The target has this many extra files.
    Surplus(u64),
}

/// Both measurements plus their comparison.
#[derive(Debug, Clone, Copy)]
pub struct Verification {
    pub source: SideCounts,
    pub target: SideCounts,
    pub outcome: VerifyOutcome,
}

/// Count files and directories under `path`. A failed count degrades to
/// zero; the set-difference pass catches a side that is truly unreachable.
pub fn count_side(session: &mut dyn RemoteShell, path: &str, timeout: Duration) -> SideCounts {
    let file_count = counted(session, &format!("find {} -type f | wc -l", quote(path)), timeout);
    let dir_count = counted(session, &format!("find {} -type d | wc -l", quote(path)), timeout);
    SideCounts {
        file_count,
        // The root directory itself is not part of the payload.
        dir_count: dir_count.saturating_sub(1),
    }
}

fn counted(session: &mut dyn RemoteShell, command: &str, timeout: Duration) -> u64 {
    match session.execute(command, timeout) {
        Ok(output) if output.success() => output.stdout.trim().parse().unwrap_or(0),
        Ok(output) => {
            log::warn!(
                "{}: count command exited with {}; recording zero",
                session.label(),
                output.exit_code
            );
            0
        }
        Err(err) => {
            log::warn!("{}: count command failed: {err}", session.label());
            0
        }
    }
}

pub fn compare_counts(source: &SideCounts, target: &SideCounts) -> VerifyOutcome {
    if target.file_count < source.file_count {
        VerifyOutcome::Deficit(source.file_count - target.file_count)
    } else if target.file_count > source.file_count {
        VerifyOutcome::Surplus(target.file_count - source.file_count)
    } else {
        VerifyOutcome::Match
    }
}

/// Measure both sides and compare them.
pub fn verify(
    source: &mut dyn RemoteShell,
    target: &mut dyn RemoteShell,
    source_path: &str,
    target_path: &str,
    timeout: Duration,
) -> Verification {
    let source_counts = count_side(source, source_path, timeout);
    let target_counts = count_side(target, target_path, timeout);

    log::info!(
        "verify: source {} file(s) / {} dir(s), target {} file(s) / {} dir(s)",
        source_counts.file_count,
        source_counts.dir_count,
        target_counts.file_count,
        target_counts.dir_count
    );

    Verification {
        source: source_counts,
        target: target_counts,
        outcome: compare_counts(&source_counts, &target_counts),
    }
}

/// Enumerate file paths under `path`, relative to it.
pub fn list_relative_files(
    session: &mut dyn RemoteShell,
    path: &str,
    timeout: Duration,
) -> StepResult<BTreeSet<String>> {
    let command = format!("find {} -type f -printf '%P\\n' | sort", quote(path));
    let output = session.execute(&command, timeout)?;
    if !output.success() {
        return Err(StepError::verify(format!(
            "{}: file enumeration exited with {}: {}",
            session.label(),
            output.exit_code,
            output.stderr.trim()
        )));
    }
    Ok(output
        .stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// The exact set of relative paths present on the source but not the
/// target.
pub fn missing_files(
    source: &mut dyn RemoteShell,
    target: &mut dyn RemoteShell,
    source_path: &str,
    target_path: &str,
    timeout: Duration,
) -> StepResult<MissingFileSet> {
    let source_files = list_relative_files(source, source_path, timeout)?;
    let target_files = list_relative_files(target, target_path, timeout)?;
    Ok(source_files
        .difference(&target_files)
        .cloned()
        .collect())
}
