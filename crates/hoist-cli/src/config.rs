//! Configuration file loading.
//!
//! Connection details live in a TOML file; passwords may be left out of
//! the file and supplied through `HOIST_SOURCE_PASSWORD` /
//! `HOIST_TARGET_PASSWORD` instead.

use std::env;
use std::path::Path;

use eyre::{eyre, Context, Result};
use hoist_core::HostSpec;
use serde::Deserialize;

pub const SOURCE_PASSWORD_ENV: &str = "HOIST_SOURCE_PASSWORD";
pub const TARGET_PASSWORD_ENV: &str = "HOIST_TARGET_PASSWORD";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: HostEntry,
    pub target: HostEntry,
    #[serde(default)]
    pub transfer: TransferEntry,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HostEntry {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    /// Optional here; the environment is consulted when absent.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TransferEntry {
    /// Path to transfer, relative to both home directories.
    pub path: Option<String>,
    /// Remove staged archives after the run (default true).
    pub cleanup_temp_files: Option<bool>,
    /// Staging directory name under each host's home.
    pub staging_dir: Option<String>,
    /// FTP port on the source host.
    pub ftp_port: Option<u16>,
}

fn default_ssh_port() -> u16 {
    22
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content).wrap_err("failed to parse config file")?;
        Ok(config)
    }

    pub fn source_spec(&self) -> Result<HostSpec> {
        host_spec(&self.source, SOURCE_PASSWORD_ENV)
    }

    pub fn target_spec(&self) -> Result<HostSpec> {
        host_spec(&self.target, TARGET_PASSWORD_ENV)
    }
}

fn host_spec(entry: &HostEntry, env_var: &str) -> Result<HostSpec> {
    let password = entry
        .password
        .clone()
        .or_else(|| env::var(env_var).ok())
        .ok_or_else(|| {
            eyre!(
                "no password for {}: set it in the config file or export {env_var}",
                entry.host
            )
        })?;

    Ok(HostSpec {
        host: entry.host.clone(),
        port: entry.port,
        username: entry.username.clone(),
        password,
    })
}
