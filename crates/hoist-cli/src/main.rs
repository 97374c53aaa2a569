mod config;
mod display;
mod history;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use eyre::{bail, Result};
use hoist_core::progress::NullProgress;
use hoist_core::session::{remote_home, SshSession};
use hoist_core::verify::{self, VerifyOutcome};
use hoist_core::{TransferOptions, TransferOrchestrator, TransferReport};

use config::Config;
use display::RetrievalBar;
use history::TransferRecord;

#[derive(Parser)]
#[command(name = "hoist")]
#[command(about = "Move a directory tree between hosts via SSH staging and an FTP pull")]
struct Cli {
    /// Configuration file with host and transfer settings
    #[arg(long, global = true, default_value = "hoist.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer a directory tree from the source host to the target host
    Transfer(TransferArgs),
    /// Compare both sides of a path without transferring anything
    Check(CheckArgs),
    /// Show recent transfer reports captured locally
    History(HistoryArgs),
}

#[derive(Args)]
struct TransferArgs {
    /// Path to transfer, relative to both home directories
    path: Option<String>,
    /// Show an interactive progress indicator
    #[arg(long)]
    progress: bool,
    /// Keep staged archives on both hosts after the run
    #[arg(long)]
    keep_temp_files: bool,
    /// Verbose logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Args)]
struct CheckArgs {
    /// Path to inspect, relative to both home directories
    path: Option<String>,
    /// Verbose logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Args)]
struct HistoryArgs {
    /// Number of recent records to display (0 = all)
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(&cli);

    match &cli.command {
        Commands::Transfer(args) => run_transfer(&cli.config, args),
        Commands::Check(args) => run_check(&cli.config, args),
        Commands::History(args) => run_history(args),
    }
}

fn init_logging(cli: &Cli) {
    let verbose = match &cli.command {
        Commands::Transfer(args) => args.verbose,
        Commands::Check(args) => args.verbose,
        Commands::History(_) => false,
    };
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| if verbose { "debug" } else { "info" }.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run_transfer(config_path: &Path, args: &TransferArgs) -> Result<()> {
    let config = Config::load(config_path)?;
    let path = resolve_path(args.path.as_deref(), &config)?;

    let mut options = TransferOptions::default();
    options.cleanup_temp_files =
        !args.keep_temp_files && config.transfer.cleanup_temp_files.unwrap_or(true);
    if let Some(dir) = &config.transfer.staging_dir {
        options.staging_dir = dir.clone();
    }
    if let Some(port) = config.transfer.ftp_port {
        options.ftp_port = port;
    }

    let source = config.source_spec()?;
    let target = config.target_spec()?;

    println!("Source: {}", source.label());
    println!("Target: {}", target.label());
    println!("Path:   {path}");

    let orchestrator = TransferOrchestrator::new(options);
    let report = if args.progress {
        let mut bar = RetrievalBar::new();
        orchestrator.run(&source, &target, &path, &mut bar)
    } else {
        orchestrator.run(&source, &target, &path, &mut NullProgress)
    };

    let record = TransferRecord::from_report(&report);
    if let Err(err) = history::append_record(&record) {
        eprintln!("[warn] failed to record transfer history: {err:#}");
    }

    print_report(&report);
    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

fn run_check(config_path: &Path, args: &CheckArgs) -> Result<()> {
    let config = Config::load(config_path)?;
    let path = resolve_path(args.path.as_deref(), &config)?;
    let options = TransferOptions::default();

    let mut source = SshSession::connect(&config.source_spec()?, options.connect_timeout)?;
    let mut target = SshSession::connect(&config.target_spec()?, options.connect_timeout)?;

    let source_home = remote_home(&mut source, options.probe_timeout)?;
    let target_home = remote_home(&mut target, options.probe_timeout)?;
    let source_abs = format!("{source_home}/{path}");
    let target_abs = format!("{target_home}/{path}");

    let verification = verify::verify(
        &mut source,
        &mut target,
        &source_abs,
        &target_abs,
        options.probe_timeout,
    );

    println!(
        "Source: {} file(s), {} dir(s)",
        verification.source.file_count, verification.source.dir_count
    );
    println!(
        "Target: {} file(s), {} dir(s)",
        verification.target.file_count, verification.target.dir_count
    );

    match verification.outcome {
        VerifyOutcome::Match => println!("Counts match."),
        VerifyOutcome::Surplus(extra) => {
            println!("Target has {extra} extra file(s); not an error.")
        }
        VerifyOutcome::Deficit(missing_count) => {
            println!("Target is missing {missing_count} file(s).");
            let missing = verify::missing_files(
                &mut source,
                &mut target,
                &source_abs,
                &target_abs,
                options.probe_timeout,
            )?;
            for path in missing.iter().take(10) {
                println!("  missing: {path}");
            }
            if missing.len() > 10 {
                println!("  ... and {} more", missing.len() - 10);
            }
            std::process::exit(1);
        }
    }
    Ok(())
}

fn run_history(args: &HistoryArgs) -> Result<()> {
    let records = history::read_recent(args.limit)?;
    let path = history::history_path()?;

    println!(
        "Transfer history (showing up to {} entries): {}",
        args.limit,
        records.len()
    );
    println!("History file: {}", path.display());

    for record in &records {
        println!(
            "{} {} {} | {} file(s), {} in {:.1}s{}",
            record.timestamp,
            if record.success { "OK    " } else { "FAILED" },
            record.source_path,
            record.file_count,
            format_bytes(record.total_size_bytes),
            record.duration_seconds,
            if record.errors.is_empty() {
                String::new()
            } else {
                format!(" | {} error(s)", record.errors.len())
            }
        );
    }
    Ok(())
}

/// Pick the path from the CLI or the config, and insist it stays inside
/// the home directory on both hosts.
fn resolve_path(arg: Option<&str>, config: &Config) -> Result<String> {
    let path = match arg {
        Some(path) => path.to_string(),
        None => match &config.transfer.path {
            Some(path) => path.clone(),
            None => bail!("no path given: pass one or set transfer.path in the config"),
        },
    };
    if path.is_empty() {
        bail!("path must not be empty");
    }
    if path.starts_with('/') {
        bail!("path must be relative to the home directory, not absolute");
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
        bail!("path must not contain empty or parent segments");
    }
    Ok(path)
}

fn print_report(report: &TransferReport) {
    if report.success {
        println!(
            "Transfer complete: {} file(s), {} dir(s), {} in {:.2?}",
            report.file_count,
            report.directory_count,
            format_bytes(report.transferred_size_bytes),
            report.duration()
        );
        println!(
            "• Average rate: {}/s",
            format_bytes(report.average_rate() as u64)
        );
    } else {
        println!("Transfer FAILED after {:.2?}", report.duration());
        for error in &report.errors {
            println!("  - {error}");
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes == 0 {
        return "0 B".to_owned();
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
