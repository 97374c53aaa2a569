//! Archive creation on the source host.
//!
//! The transferred path is resolved into `(parent, leaf)` so the archive's
//! internal root is the leaf directory name, never the full path: the
//! extractor can then unpack straight into the destination parent without
//! stripping synthetic components. Packing is deterministic, so a failure
//! is surfaced immediately instead of retried.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::command::{in_dir, quote};
use crate::errors::{StepError, StepResult};
use crate::session::RemoteShell;

/// A compressed artifact staged on exactly one host's filesystem.
#[derive(Debug, Clone)]
pub struct ArchiveDescriptor {
    /// Absolute path of the artifact on the host that currently holds it.
    pub remote_path: String,
    /// Absolute directory the archiving command ran from.
    pub source_base_path: String,
    /// Directory name at the archive's internal root; empty for file-list
    /// archives whose entries are already relative.
    pub contained_root: String,
    /// Artifact size when it could be measured.
    pub byte_size: Option<u64>,
}

impl ArchiveDescriptor {
    /// The artifact's file name, shared by both hosts' staging dirs.
    pub fn file_name(&self) -> &str {
        self.remote_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.remote_path)
    }
}

/// Replace characters that are unsafe across the two hosts' differing
/// shell quoting rules.
pub fn sanitize_archive_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() || c == '\\' { '_' } else { c })
        .collect()
}

/// `{leaf}_{stamp}.tar.gz`, shell-safe.
pub fn archive_name_for(path: &str, stamp: &str) -> String {
    let (_, leaf) = split_parent_leaf(path);
    sanitize_archive_name(&format!("{leaf}_{stamp}.tar.gz"))
}

/// Split a relative path into its parent (if any) and final segment.
pub fn split_parent_leaf(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('/') {
        Some((parent, leaf)) if !parent.is_empty() => (Some(parent), leaf),
        _ => (None, path),
    }
}

/// The tar invocation for the primary archive.
///
/// Multi-segment paths archive only the leaf from inside the parent;
/// single-segment paths archive from the home directory.
pub fn tar_pack_command(home: &str, path: &str, archive_path: &str) -> String {
    let (parent, leaf) = split_parent_leaf(path);
    let base_dir = match parent {
        Some(parent) => format!("{home}/{parent}"),
        None => home.to_string(),
    };
    in_dir(
        &base_dir,
        &format!(
            "tar czf {} --exclude-backups --warning=no-file-changed {}",
            quote(archive_path),
            quote(leaf)
        ),
    )
}

/// The tar invocation for a file-list (recovery) archive.
pub fn tar_list_pack_command(base_dir: &str, archive_path: &str, list_path: &str) -> String {
    in_dir(
        base_dir,
        &format!("tar czf {} -T {}", quote(archive_path), quote(list_path)),
    )
}

/// Write `paths` to a file on the remote host, one per line, via a quoted
/// heredoc so the shell performs no expansion on the content.
pub fn write_file_list_command(list_path: &str, paths: &BTreeSet<String>) -> String {
    let mut body = String::new();
    for path in paths {
        body.push_str(path);
        body.push('\n');
    }
    format!(
        "cat > {} << 'HOIST_LIST'\n{body}HOIST_LIST",
        quote(list_path)
    )
}

/// Create the primary archive for `path` on the source host.
pub fn pack_directory(
    session: &mut dyn RemoteShell,
    home: &str,
    path: &str,
    archive_path: &str,
    timeout: Duration,
) -> StepResult<ArchiveDescriptor> {
    let command = tar_pack_command(home, path, archive_path);
    log::info!("{}: creating archive {archive_path}", session.label());

    let output = session.execute(&command, timeout)?;
    if !output.success() {
        return Err(StepError::pack(format!(
            "tar exited with {} creating {archive_path}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }

    let byte_size = stat_artifact(session, archive_path, timeout)?;
    let (parent, leaf) = split_parent_leaf(path);
    let source_base_path = match parent {
        Some(parent) => format!("{home}/{parent}"),
        None => home.to_string(),
    };

    Ok(ArchiveDescriptor {
        remote_path: archive_path.to_string(),
        source_base_path,
        contained_root: leaf.to_string(),
        byte_size,
    })
}

/// Create a recovery archive containing exactly the listed paths.
///
/// Membership is selected by the explicit list, never by globbing, so
/// unrelated concurrent writes cannot be swept in.
pub fn pack_file_list(
    session: &mut dyn RemoteShell,
    base_dir: &str,
    archive_path: &str,
    list_path: &str,
    paths: &BTreeSet<String>,
    timeout: Duration,
) -> StepResult<ArchiveDescriptor> {
    let write_list = write_file_list_command(list_path, paths);
    let output = session.execute(&write_list, timeout)?;
    if !output.success() {
        return Err(StepError::recovery(format!(
            "writing file list {list_path} exited with {}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }

    let command = tar_list_pack_command(base_dir, archive_path, list_path);
    log::info!(
        "{}: creating recovery archive {archive_path} ({} path(s))",
        session.label(),
        paths.len()
    );

    let output = session.execute(&command, timeout)?;
    if !output.success() {
        return Err(StepError::recovery(format!(
            "tar exited with {} creating {archive_path}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }

    let byte_size = stat_artifact(session, archive_path, timeout)?;

    Ok(ArchiveDescriptor {
        remote_path: archive_path.to_string(),
        source_base_path: base_dir.to_string(),
        contained_root: String::new(),
        byte_size,
    })
}

/// Confirm the artifact exists and measure it. A missing artifact after a
/// zero-exit tar is still a pack failure.
fn stat_artifact(
    session: &mut dyn RemoteShell,
    archive_path: &str,
    timeout: Duration,
) -> StepResult<Option<u64>> {
    let output = session.execute(&format!("stat -c %s {}", quote(archive_path)), timeout)?;
    if !output.success() {
        return Err(StepError::pack(format!(
            "archive {archive_path} was not created: {}",
            output.stderr.trim()
        )));
    }
    let size = output.stdout.trim().parse::<u64>().ok();
    if size.is_none() {
        log::warn!(
            "{}: could not read size of {archive_path}",
            session.label()
        );
    }
    Ok(size)
}
