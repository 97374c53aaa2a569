//! The end-to-end transfer state machine.
//!
//! Steps run strictly in sequence; any fatal error short-circuits straight
//! to cleanup, which always runs and never flips a successful run to
//! failed. The run always yields a complete [`TransferReport`] — failures
//! are entries in its error list, not panics or early returns.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::archive;
use crate::command;
use crate::errors::{StepError, StepResult};
use crate::extract::extract;
use crate::probe;
use crate::progress::ProgressObserver;
use crate::recover::{run_recovery, RecoveryRequest, RecoveryTimeouts};
use crate::retrieve::{retrieve, FtpSource, RetrievalOptions};
use crate::session::{remote_home, HostSpec, RemoteShell, SshSession};
use crate::verify::{self, VerifyOutcome};

use super::options::TransferOptions;
use super::report::TransferReport;

/// The orchestrator's linear states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Init,
    Probing,
    Archiving,
    Retrieving,
    Extracting,
    Verifying,
    Recovering,
    CleaningUp,
    Completed,
    Failed,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferState::Init => "init",
            TransferState::Probing => "probing",
            TransferState::Archiving => "archiving",
            TransferState::Retrieving => "retrieving",
            TransferState::Extracting => "extracting",
            TransferState::Verifying => "verifying",
            TransferState::Recovering => "recovering",
            TransferState::CleaningUp => "cleaning-up",
            TransferState::Completed => "completed",
            TransferState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Target,
}

/// Artifacts staged during the run, removed best-effort at the end.
#[derive(Default)]
struct CleanupLedger {
    entries: Vec<(Side, String)>,
}

impl CleanupLedger {
    fn stage(&mut self, side: Side, path: String) {
        self.entries.push((side, path));
    }
}

/// Sequences probe → archive → retrieve → extract → verify → recover? →
/// cleanup for exactly one path.
pub struct TransferOrchestrator {
    options: TransferOptions,
    cancel: Arc<AtomicBool>,
}

impl TransferOrchestrator {
    pub fn new(options: TransferOptions) -> Self {
        Self {
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Shared flag for cooperative cancellation: setting it makes the run
    /// stop issuing new remote commands and proceed to cleanup. A command
    /// already dispatched runs to its own completion.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Connect both hosts and run the pipeline. Sessions live exactly as
    /// long as the run and are closed on every path out.
    pub fn run(
        &self,
        source_spec: &HostSpec,
        target_spec: &HostSpec,
        path: &str,
        observer: &mut dyn ProgressObserver,
    ) -> TransferReport {
        let mut source = match SshSession::connect(source_spec, self.options.connect_timeout) {
            Ok(session) => session,
            Err(err) => return Self::aborted_before_start(path, err),
        };
        let mut target = match SshSession::connect(target_spec, self.options.connect_timeout) {
            Ok(session) => session,
            Err(err) => return Self::aborted_before_start(path, err),
        };

        let ftp = FtpSource {
            host: source_spec.host.clone(),
            port: self.options.ftp_port,
            username: source_spec.username.clone(),
            password: source_spec.password.clone(),
        };

        self.run_with_sessions(&mut source, &mut target, &ftp, path, observer)
    }

    fn aborted_before_start(path: &str, err: StepError) -> TransferReport {
        let mut report = TransferReport::new(path, path);
        report.add_error(err.to_string());
        report.complete(false);
        report
    }

    /// Run the pipeline over already-connected sessions. This is the whole
    /// state machine; `run` only adds connection setup around it.
    pub fn run_with_sessions(
        &self,
        source: &mut dyn RemoteShell,
        target: &mut dyn RemoteShell,
        ftp: &FtpSource,
        path: &str,
        observer: &mut dyn ProgressObserver,
    ) -> TransferReport {
        log::info!("--- transfer start: {path} ---");
        self.enter(TransferState::Init);

        let mut report = TransferReport::new(path, path);
        let mut ledger = CleanupLedger::default();

        let success =
            match self.drive(source, target, ftp, path, observer, &mut report, &mut ledger) {
                Ok(success) => success,
                Err(err) => {
                    report.add_error(err.to_string());
                    false
                }
            };

        self.enter(TransferState::CleaningUp);
        if self.options.cleanup_temp_files {
            self.cleanup(source, target, &ledger);
        } else {
            log::info!("leaving staged artifacts in place");
        }

        if success {
            report.transferred_size_bytes = report.total_size_bytes;
        }

        let final_state = if success {
            TransferState::Completed
        } else {
            TransferState::Failed
        };
        self.enter(final_state);
        report.complete(success);

        log::info!(
            "--- transfer complete: {path} ({}) ---",
            if success { "success" } else { "failed" }
        );
        report
    }

    fn drive(
        &self,
        source: &mut dyn RemoteShell,
        target: &mut dyn RemoteShell,
        ftp: &FtpSource,
        path: &str,
        observer: &mut dyn ProgressObserver,
        report: &mut TransferReport,
        ledger: &mut CleanupLedger,
    ) -> StepResult<bool> {
        let opts = &self.options;

        self.check_cancel()?;
        self.enter(TransferState::Probing);
        let source_home = remote_home(source, opts.probe_timeout)?;
        let target_home = remote_home(target, opts.probe_timeout)?;
        let source_abs = format!("{source_home}/{path}");
        let target_abs = format!("{target_home}/{path}");

        let snapshot = probe::probe(source, &source_abs, opts.probe_timeout);
        report.total_size_bytes = snapshot.total_size_bytes;
        report.file_count = snapshot.file_count;
        report.directory_count = snapshot.dir_count;
        if snapshot.file_count == 0 {
            log::warn!("source directory appears to be empty");
        }

        self.check_cancel()?;
        self.enter(TransferState::Archiving);
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let staging_src_abs = format!("{source_home}/{}", opts.staging_dir);
        let staging_tgt_abs = format!("{target_home}/{}", opts.staging_dir);

        let output = source.execute(&command::mkdir_p(&staging_src_abs), opts.probe_timeout)?;
        if !output.success() {
            return Err(StepError::pack(format!(
                "could not create staging directory {staging_src_abs}: {}",
                output.stderr.trim()
            )));
        }

        let archive_name = archive::archive_name_for(path, &stamp);
        let archive_path = format!("{staging_src_abs}/{archive_name}");
        ledger.stage(Side::Source, archive_path.clone());
        let descriptor =
            archive::pack_directory(source, &source_home, path, &archive_path, opts.archive_timeout)?;
        match descriptor.byte_size {
            Some(size) => log::info!("archive created: {archive_name} ({size} bytes)"),
            None => log::info!("archive created: {archive_name}"),
        }

        self.check_cancel()?;
        self.enter(TransferState::Retrieving);
        let output = target.execute(&command::mkdir_p(&staging_tgt_abs), opts.probe_timeout)?;
        if !output.success() {
            return Err(StepError::retrieval(format!(
                "could not create staging directory {staging_tgt_abs}: {}",
                output.stderr.trim()
            )));
        }
        let target_artifact = format!("{staging_tgt_abs}/{archive_name}");
        ledger.stage(Side::Target, target_artifact.clone());

        let retrieval = RetrievalOptions {
            tool_timeout_secs: opts.retrieve_tool_timeout_secs,
            tries: opts.retrieve_tries,
            command_timeout: opts.retrieve_timeout,
        };
        retrieve(
            target,
            ftp,
            &descriptor,
            &staging_tgt_abs,
            &opts.staging_dir,
            &retrieval,
            observer,
        )?;

        self.check_cancel()?;
        self.enter(TransferState::Extracting);
        let destination_parent = match archive::split_parent_leaf(path).0 {
            Some(parent) => format!("{target_home}/{parent}"),
            None => target_home.clone(),
        };
        extract(target, &target_artifact, &destination_parent, opts.extract_timeout)?;

        self.check_cancel()?;
        self.enter(TransferState::Verifying);
        let verification = verify::verify(source, target, &source_abs, &target_abs, opts.probe_timeout);
        report.file_count = verification.target.file_count;
        report.directory_count = verification.target.dir_count;

        let deficit = match verification.outcome {
            VerifyOutcome::Match => {
                log::info!("file count verification successful; all files transferred");
                return Ok(true);
            }
            VerifyOutcome::Surplus(extra) => {
                log::warn!("target has {extra} extra file(s); not treated as an error");
                return Ok(true);
            }
            VerifyOutcome::Deficit(missing) => missing,
        };

        log::warn!("transfer incomplete: {deficit} file(s) missing");
        self.check_cancel()?;
        let missing =
            verify::missing_files(source, target, &source_abs, &target_abs, opts.probe_timeout)?;
        if missing.is_empty() {
            report.add_error(format!(
                "verification found a deficit of {deficit} file(s) but no missing paths could be identified"
            ));
            return Ok(false);
        }

        self.enter(TransferState::Recovering);
        let recovery_name = archive::sanitize_archive_name(&format!("recovery_{stamp}.tar.gz"));
        let recovery_path = format!("{staging_src_abs}/{recovery_name}");
        let list_path = format!("{staging_src_abs}/missing_{stamp}.txt");
        ledger.stage(Side::Source, recovery_path.clone());
        ledger.stage(Side::Source, list_path.clone());
        ledger.stage(Side::Target, format!("{staging_tgt_abs}/{recovery_name}"));

        let request = RecoveryRequest {
            source_base: &source_abs,
            target_base: &target_abs,
            archive_path: &recovery_path,
            list_path: &list_path,
            staging_abs: &staging_tgt_abs,
            staging_dir: &opts.staging_dir,
        };
        let timeouts = RecoveryTimeouts {
            archive: opts.recovery_archive_timeout,
            extract: opts.extract_timeout,
            retrieval: RetrievalOptions {
                tool_timeout_secs: opts.recovery_tool_timeout_secs,
                tries: opts.recovery_tries,
                command_timeout: opts.recovery_retrieve_timeout,
            },
        };
        run_recovery(source, target, ftp, &request, &missing, &timeouts, observer)?;

        // One re-verification; residual deficits are recorded, never
        // re-attempted.
        let second = verify::verify(source, target, &source_abs, &target_abs, opts.probe_timeout);
        report.file_count = second.target.file_count;
        report.directory_count = second.target.dir_count;
        match second.outcome {
            VerifyOutcome::Deficit(residual) => {
                report.add_error(format!("{residual} file(s) still missing after recovery"));
                Ok(false)
            }
            _ => {
                log::info!("all missing files recovered");
                Ok(true)
            }
        }
    }

    fn cleanup(
        &self,
        source: &mut dyn RemoteShell,
        target: &mut dyn RemoteShell,
        ledger: &CleanupLedger,
    ) {
        for (side, path) in &ledger.entries {
            let session: &mut dyn RemoteShell = match side {
                Side::Source => &mut *source,
                Side::Target => &mut *target,
            };
            match session.execute(
                &command::remove_files(&[path.as_str()]),
                self.options.probe_timeout,
            ) {
                Ok(output) if output.success() => log::debug!("cleanup: removed {path}"),
                Ok(output) => log::warn!(
                    "cleanup: rm exited with {} for {path}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
                Err(err) => log::warn!("cleanup: {err}"),
            }
        }
    }

    fn check_cancel(&self) -> StepResult<()> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(StepError::cancelled(
                "interrupt observed; skipping to cleanup",
            ))
        } else {
            Ok(())
        }
    }

    fn enter(&self, state: TransferState) {
        log::debug!("state -> {state}");
    }
}
