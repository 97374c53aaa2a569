//! End-to-end state-machine tests over scripted sessions.

mod common;

use std::cell::Cell;
use std::sync::atomic::Ordering;

use common::{failed, ok, ScriptedSession};
use hoist_core::progress::{NullProgress, ProgressObserver, ProgressSample};
use hoist_core::retrieve::FtpSource;
use hoist_core::session::CommandOutput;
use hoist_core::{TransferOptions, TransferOrchestrator};

fn ftp() -> FtpSource {
    FtpSource {
        host: "src.example.net".into(),
        port: 21,
        username: "acct".into(),
        password: "hunter2".into(),
    }
}

fn orchestrator() -> TransferOrchestrator {
    TransferOrchestrator::new(TransferOptions::default())
}

fn source_session(files: u64, dirs_raw: u64, size: u64, listing: Vec<String>) -> ScriptedSession {
    let listing: String = listing.iter().map(|l| format!("{l}\n")).collect();
    ScriptedSession::new("src", move |cmd| {
        if cmd == "pwd" {
            ok("/home/src\n")
        } else if cmd.starts_with("du -sb") {
            ok(&format!("{size}\n"))
        } else if cmd.contains("-printf") {
            ok(&listing)
        } else if cmd.contains("-type f") {
            ok(&format!("{files}\n"))
        } else if cmd.contains("-type d") {
            ok(&format!("{dirs_raw}\n"))
        } else if cmd.starts_with("stat -c") {
            ok("2048\n")
        } else {
            ok("")
        }
    })
}

struct TargetConfig {
    files_after_extract: u64,
    files_after_recovery: u64,
    dirs_raw: u64,
    listing: Vec<String>,
    wget: CommandOutput,
    rm_fails: bool,
}

fn target_session(cfg: TargetConfig) -> ScriptedSession {
    let extracted = Cell::new(false);
    let recovered = Cell::new(false);
    let listing: String = cfg.listing.iter().map(|l| format!("{l}\n")).collect();
    ScriptedSession::new("tgt", move |cmd| {
        if cmd == "pwd" {
            ok("/home/tgt\n")
        } else if cmd.contains("wget") {
            cfg.wget.clone()
        } else if cmd.contains("tar -xzf") {
            if cmd.contains("recovery_") {
                recovered.set(true);
            } else {
                extracted.set(true);
            }
            ok("")
        } else if cmd.contains("-printf") {
            ok(&listing)
        } else if cmd.contains("-type f") {
            let count = if recovered.get() {
                cfg.files_after_recovery
            } else if extracted.get() {
                cfg.files_after_extract
            } else {
                0
            };
            ok(&format!("{count}\n"))
        } else if cmd.contains("-type d") {
            ok(&format!("{}\n", cfg.dirs_raw))
        } else if cmd.starts_with("rm -f") {
            if cfg.rm_fails {
                failed(1, "rm: cannot remove: No such file or directory")
            } else {
                ok("")
            }
        } else {
            ok("")
        }
    })
}

fn wget_progress() -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: String::new(),
        stderr: "archive.tar.gz    45%[===========>        ] 12.3M  892KB/s   eta 15s\r\
                 archive.tar.gz   100%[===================>] 27.3M  1.1MB/s    in 25s\n"
            .to_string(),
    }
}

struct Collect(Vec<ProgressSample>);

impl ProgressObserver for Collect {
    fn on_sample(&mut self, sample: &ProgressSample) {
        self.0.push(sample.clone());
    }
}

#[test]
fn transfer_succeeds_and_reports_target_counts() {
    let mut src = source_session(
        3,
        3,
        4096,
        vec!["a.txt".into(), "b/c.txt".into(), "d.txt".into()],
    );
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 3,
        files_after_recovery: 3,
        dirs_raw: 3,
        listing: vec!["a.txt".into(), "b/c.txt".into(), "d.txt".into()],
        wget: wget_progress(),
        rm_fails: false,
    });

    let report = orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "mail/example.com/account",
        &mut NullProgress,
    );

    assert!(report.success, "errors: {:?}", report.errors);
    assert!(report.errors.is_empty());
    assert_eq!(report.file_count, 3);
    assert_eq!(report.directory_count, 2);
    assert_eq!(report.total_size_bytes, 4096);
    assert_eq!(report.transferred_size_bytes, 4096);
    assert!(report.is_finished());

    assert!(src.ran("tar czf"));
    assert!(tgt.ran("wget"));
    assert!(tgt.ran("tar -xzf"));
    // Cleanup removed the staged artifact on both hosts.
    assert!(src.ran("rm -f"));
    assert!(tgt.ran("rm -f"));
    // No recovery machinery in a clean run.
    assert!(!src.ran("recovery_"));
    assert!(!src.ran("-printf"));
}

#[test]
fn nested_path_archives_leaf_and_extracts_into_parent() {
    let mut src = source_session(1, 1, 10, vec!["x".into()]);
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 1,
        files_after_recovery: 1,
        dirs_raw: 1,
        listing: vec!["x".into()],
        wget: wget_progress(),
        rm_fails: false,
    });

    orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "mail/example.com/account",
        &mut NullProgress,
    );

    let tar = src
        .commands
        .iter()
        .find(|c| c.contains("tar czf"))
        .expect("tar command ran");
    assert!(tar.starts_with("cd /home/src/mail/example.com && "));
    assert!(tar.ends_with(" account"));

    let extract = tgt
        .commands
        .iter()
        .find(|c| c.contains("tar -xzf"))
        .expect("extract command ran");
    assert!(extract.ends_with("-C /home/tgt/mail/example.com"));
}

#[test]
fn failed_retrieval_aborts_without_recovery() {
    let mut src = source_session(3, 3, 4096, vec!["a".into(), "b".into(), "c".into()]);
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 3,
        files_after_recovery: 3,
        dirs_raw: 3,
        listing: vec![],
        wget: failed(
            4,
            "Connecting to src.example.net:21... failed: Connection refused.\n",
        ),
        rm_fails: false,
    });

    let report = orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "public_html",
        &mut NullProgress,
    );

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("retrieval error"));
    assert!(report.errors[0].contains("Connection refused"));
    // Credentials never leak into the report.
    assert!(!report.errors[0].contains("hunter2"));
    assert!(report.errors[0].contains(":***@"));

    // Recovery was never entered and nothing was extracted.
    assert!(!tgt.ran("tar -xzf"));
    assert!(!src.ran("HOIST_LIST"));
    assert!(!src.ran("recovery_"));
    // Cleanup still removed staged artifacts on both hosts.
    assert!(src.ran("rm -f"));
    assert!(tgt.ran("rm -f"));
}

#[test]
fn deficit_triggers_single_recovery_and_succeeds() {
    let source_listing: Vec<String> = (0..10).map(|i| format!("f{i}")).collect();
    let target_listing: Vec<String> = (0..10)
        .filter(|i| *i != 3 && *i != 7)
        .map(|i| format!("f{i}"))
        .collect();

    let mut src = source_session(10, 2, 65536, source_listing);
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 8,
        files_after_recovery: 10,
        dirs_raw: 2,
        listing: target_listing,
        wget: wget_progress(),
        rm_fails: false,
    });

    let report = orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "public_html",
        &mut NullProgress,
    );

    assert!(report.success, "errors: {:?}", report.errors);
    assert!(report.errors.is_empty());
    // Target counts after the post-recovery verification.
    assert_eq!(report.file_count, 10);

    // The recovery archive was driven by an explicit file list holding
    // exactly the missing paths.
    let file_list = src
        .commands
        .iter()
        .find(|c| c.contains("HOIST_LIST"))
        .expect("file list was written");
    assert!(file_list.contains("f3\n"));
    assert!(file_list.contains("f7\n"));
    assert!(!file_list.contains("f0"));

    assert!(src.ran("-T"));
    assert!(tgt.ran("recovery_"));
}

#[test]
fn residual_deficit_after_recovery_fails_the_run() {
    let source_listing: Vec<String> = (0..10).map(|i| format!("f{i}")).collect();
    let target_listing: Vec<String> = (0..8).map(|i| format!("f{i}")).collect();

    let mut src = source_session(10, 2, 65536, source_listing);
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 8,
        files_after_recovery: 9,
        dirs_raw: 2,
        listing: target_listing,
        wget: wget_progress(),
        rm_fails: false,
    });

    let report = orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "public_html",
        &mut NullProgress,
    );

    assert!(!report.success);
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("1 file(s) still missing after recovery")));
    // Counts reflect the target side after the last verification pass.
    assert_eq!(report.file_count, 9);

    // Exactly one recovery pass: one list-driven tar, two wget pulls.
    let recovery_tars = src
        .commands
        .iter()
        .filter(|c| c.contains("tar czf") && c.contains("-T"))
        .count();
    assert_eq!(recovery_tars, 1);
    let pulls = tgt.commands.iter().filter(|c| c.contains("wget")).count();
    assert_eq!(pulls, 2);
}

#[test]
fn deficit_with_no_identifiable_missing_paths_fails() {
    let listing: Vec<String> = (0..10).map(|i| format!("f{i}")).collect();

    let mut src = source_session(10, 2, 65536, listing.clone());
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 8,
        files_after_recovery: 8,
        dirs_raw: 2,
        listing,
        wget: wget_progress(),
        rm_fails: false,
    });

    let report = orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "public_html",
        &mut NullProgress,
    );

    assert!(!report.success);
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("no missing paths could be identified")));
    assert!(!src.ran("HOIST_LIST"));
}

#[test]
fn cleanup_failure_never_flips_success() {
    let mut src = source_session(2, 1, 100, vec!["a".into(), "b".into()]);
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 2,
        files_after_recovery: 2,
        dirs_raw: 1,
        listing: vec!["a".into(), "b".into()],
        wget: wget_progress(),
        rm_fails: true,
    });

    let report = orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "public_html",
        &mut NullProgress,
    );

    assert!(report.success);
    assert!(report.errors.is_empty());
    assert!(tgt.ran("rm -f"));
}

#[test]
fn pack_failure_aborts_before_retrieval() {
    let mut src = ScriptedSession::new("src", |cmd| {
        if cmd == "pwd" {
            ok("/home/src\n")
        } else if cmd.starts_with("du -sb") {
            ok("4096\n")
        } else if cmd.contains("-type f") {
            ok("3\n")
        } else if cmd.contains("-type d") {
            ok("2\n")
        } else if cmd.contains("tar czf") {
            failed(2, "tar: public_html: No such file or directory")
        } else {
            ok("")
        }
    });
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 0,
        files_after_recovery: 0,
        dirs_raw: 1,
        listing: vec![],
        wget: wget_progress(),
        rm_fails: false,
    });

    let report = orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "public_html",
        &mut NullProgress,
    );

    assert!(!report.success);
    assert!(report.errors[0].contains("pack error"));
    assert!(!tgt.ran("wget"));
    // The staged (never created) archive is still swept on the source.
    assert!(src.ran("rm -f"));
}

#[test]
fn cancellation_skips_straight_to_cleanup() {
    let mut src = source_session(1, 1, 10, vec!["a".into()]);
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 1,
        files_after_recovery: 1,
        dirs_raw: 1,
        listing: vec!["a".into()],
        wget: wget_progress(),
        rm_fails: false,
    });

    let orch = orchestrator();
    orch.cancel_flag().store(true, Ordering::Relaxed);
    let report =
        orch.run_with_sessions(&mut src, &mut tgt, &ftp(), "public_html", &mut NullProgress);

    assert!(!report.success);
    assert!(report.errors[0].contains("cancelled"));
    // No remote commands were issued after the interrupt.
    assert!(src.commands.is_empty());
    assert!(tgt.commands.is_empty());
}

#[test]
fn progress_samples_reach_the_observer() {
    let mut src = source_session(2, 1, 100, vec!["a".into(), "b".into()]);
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 2,
        files_after_recovery: 2,
        dirs_raw: 1,
        listing: vec!["a".into(), "b".into()],
        wget: wget_progress(),
        rm_fails: false,
    });

    let mut observer = Collect(Vec::new());
    let report =
        orchestrator().run_with_sessions(&mut src, &mut tgt, &ftp(), "public_html", &mut observer);

    assert!(report.success);
    assert_eq!(observer.0.len(), 2);
    assert!((observer.0[0].fraction_complete - 0.45).abs() < f64::EPSILON);
    assert!((observer.0[1].fraction_complete - 1.0).abs() < f64::EPSILON);
    assert_eq!(observer.0[1].size, "27.3M");
}

#[test]
fn empty_source_still_transfers_cleanly() {
    let mut src = source_session(0, 1, 0, vec![]);
    let mut tgt = target_session(TargetConfig {
        files_after_extract: 0,
        files_after_recovery: 0,
        dirs_raw: 1,
        listing: vec![],
        wget: wget_progress(),
        rm_fails: false,
    });

    let report = orchestrator().run_with_sessions(
        &mut src,
        &mut tgt,
        &ftp(),
        "public_html",
        &mut NullProgress,
    );

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.file_count, 0);
}
