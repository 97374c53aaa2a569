//! Single-pass recovery of files a verification found missing.
//!
//! A second, minimal archive is built from an explicit list of the missing
//! relative paths and moved with the same retrieval and extraction
//! contracts as the primary transfer. The pass runs at most once per run;
//! a deficit that survives it is reported, never re-attempted.

use std::time::Duration;

use crate::archive::{pack_file_list, ArchiveDescriptor};
use crate::errors::StepResult;
use crate::extract::extract;
use crate::progress::ProgressObserver;
use crate::retrieve::{retrieve, FtpSource, RetrievalOptions};
use crate::session::RemoteShell;
use crate::verify::MissingFileSet;

/// Where the recovery artifacts live and where the payload belongs.
#[derive(Debug, Clone)]
pub struct RecoveryRequest<'a> {
    /// Absolute transferred path on the source; the file list is relative
    /// to this directory.
    pub source_base: &'a str,
    /// Absolute transferred path on the target; list-relative entries are
    /// extracted here.
    pub target_base: &'a str,
    /// Absolute path of the recovery archive on the source.
    pub archive_path: &'a str,
    /// Absolute path of the file list on the source.
    pub list_path: &'a str,
    /// Absolute staging directory on the target.
    pub staging_abs: &'a str,
    /// Staging directory name as it appears in the fetch URL.
    pub staging_dir: &'a str,
}

/// Per-step time bounds for the recovery pass.
#[derive(Debug, Clone)]
pub struct RecoveryTimeouts {
    pub archive: Duration,
    pub extract: Duration,
    pub retrieval: RetrievalOptions,
}

const LISTED_PREVIEW: usize = 10;

/// Build, move, and extract the recovery archive. The caller re-verifies
/// afterward; this function does not loop.
pub fn run_recovery(
    source: &mut dyn RemoteShell,
    target: &mut dyn RemoteShell,
    ftp: &FtpSource,
    request: &RecoveryRequest<'_>,
    missing: &MissingFileSet,
    timeouts: &RecoveryTimeouts,
    observer: &mut dyn ProgressObserver,
) -> StepResult<ArchiveDescriptor> {
    log::info!("recovering {} missing file(s)", missing.len());
    for path in missing.iter().take(LISTED_PREVIEW) {
        log::info!("  missing: {path}");
    }
    if missing.len() > LISTED_PREVIEW {
        log::info!("  ... and {} more", missing.len() - LISTED_PREVIEW);
    }

    let descriptor = pack_file_list(
        source,
        request.source_base,
        request.archive_path,
        request.list_path,
        missing,
        timeouts.archive,
    )?;

    retrieve(
        target,
        ftp,
        &descriptor,
        request.staging_abs,
        request.staging_dir,
        &timeouts.retrieval,
        observer,
    )?;

    let target_artifact = format!("{}/{}", request.staging_abs, descriptor.file_name());
    extract(target, &target_artifact, request.target_base, timeouts.extract)?;

    log::info!("recovery archive extracted");
    Ok(descriptor)
}
