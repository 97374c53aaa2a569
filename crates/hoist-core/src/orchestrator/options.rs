//! Options for executing one transfer run.

use std::time::Duration;

/// Knobs consumed, not owned, by the orchestrator: connection endpoints
/// arrive separately; everything here shapes how the pipeline behaves.
#[derive(Clone, Debug)]
pub struct TransferOptions {
    /// Remove staged artifacts from both hosts after the run.
    pub cleanup_temp_files: bool,
    /// Staging directory under each host's home for artifacts.
    pub staging_dir: String,
    /// FTP port on the source host for the bulk-transfer channel.
    pub ftp_port: u16,
    pub connect_timeout: Duration,
    /// Short bound for probes, counting, and other small commands.
    pub probe_timeout: Duration,
    pub archive_timeout: Duration,
    pub retrieve_timeout: Duration,
    pub extract_timeout: Duration,
    pub recovery_archive_timeout: Duration,
    pub recovery_retrieve_timeout: Duration,
    /// `--timeout` handed to the retrieval tool for the primary pull.
    pub retrieve_tool_timeout_secs: u32,
    /// `--tries` handed to the retrieval tool for the primary pull.
    pub retrieve_tries: u32,
    pub recovery_tool_timeout_secs: u32,
    pub recovery_tries: u32,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            cleanup_temp_files: true,
            staging_dir: "tmp_trans".to_string(),
            ftp_port: 21,
            connect_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(60),
            archive_timeout: Duration::from_secs(600),
            retrieve_timeout: Duration::from_secs(1800),
            extract_timeout: Duration::from_secs(600),
            recovery_archive_timeout: Duration::from_secs(300),
            recovery_retrieve_timeout: Duration::from_secs(600),
            retrieve_tool_timeout_secs: 300,
            retrieve_tries: 3,
            recovery_tool_timeout_secs: 180,
            recovery_tries: 2,
        }
    }
}
