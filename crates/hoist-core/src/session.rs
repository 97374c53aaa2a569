//! SSH sessions and the remote-shell boundary.
//!
//! The pipeline never talks to `ssh2` directly: every component runs
//! commands through the [`RemoteShell`] trait, so the whole orchestration
//! can be exercised against a scripted fake with no live hosts.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use eyre::{eyre, Context, Result};

use crate::errors::{StepError, StepResult};

/// How often the streaming executor polls a command's output.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Identity of one host: where to connect and how to authenticate.
#[derive(Debug, Clone)]
pub struct HostSpec {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl HostSpec {
    /// `user@host:port`, safe to log (no credentials).
    pub fn label(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Captured result of one remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Receiver for incremental output during a streaming execution.
pub trait OutputObserver {
    fn stdout_chunk(&mut self, _text: &str) {}
    fn stderr_chunk(&mut self, _text: &str) {}
}

/// Discards streamed output; buffered execution uses this internally.
pub struct SilentOutput;

impl OutputObserver for SilentOutput {}

/// The "run a shell command on one host" boundary.
///
/// A non-zero exit code is a domain outcome, not an `Err`: many commands
/// encode recoverable conditions in their exit status and callers must
/// inspect it. `Err` means the command could not be run at all, or hit its
/// timeout.
pub trait RemoteShell {
    /// Short host label for log lines.
    fn label(&self) -> &str;

    /// Run a command to completion, buffering all output.
    fn execute(&mut self, command: &str, timeout: Duration) -> StepResult<CommandOutput>;

    /// Run a command, handing output chunks to `observer` as they arrive.
    /// The full output is still buffered into the returned value.
    fn execute_streaming(
        &mut self,
        command: &str,
        timeout: Duration,
        observer: &mut dyn OutputObserver,
    ) -> StepResult<CommandOutput>;
}

/// Resolve the remote user's home directory via `pwd` in the login dir.
pub fn remote_home(session: &mut dyn RemoteShell, timeout: Duration) -> StepResult<String> {
    let output = session.execute("pwd", timeout)?;
    let home = output.stdout.trim();
    if !output.success() || home.is_empty() {
        return Err(StepError::command(format!(
            "{}: could not resolve home directory (exit {})",
            session.label(),
            output.exit_code
        )));
    }
    Ok(home.to_string())
}

/// A live `ssh2` session to one host.
pub struct SshSession {
    label: String,
    session: ssh2::Session,
}

impl SshSession {
    /// Connect with exponential backoff: a fixed attempt cap, doubling the
    /// delay between attempts, before surfacing a connection error.
    pub fn connect(spec: &HostSpec, timeout: Duration) -> StepResult<Self> {
        let mut delay = CONNECT_BASE_DELAY;
        let mut last_err = eyre!("no connection attempt made");

        for attempt in 1..=CONNECT_ATTEMPTS {
            match Self::try_connect(spec, timeout) {
                Ok(session) => {
                    log::debug!("connected to {} on attempt {attempt}", spec.label());
                    return Ok(Self {
                        label: spec.label(),
                        session,
                    });
                }
                Err(err) => {
                    log::warn!(
                        "connection attempt {attempt}/{CONNECT_ATTEMPTS} to {} failed: {err:#}",
                        spec.label()
                    );
                    last_err = err;
                }
            }
            if attempt < CONNECT_ATTEMPTS {
                thread::sleep(delay);
                delay *= 2;
            }
        }

        Err(StepError::connection(format!(
            "failed to reach {} after {CONNECT_ATTEMPTS} attempts: {last_err:#}",
            spec.label()
        )))
    }

    fn try_connect(spec: &HostSpec, timeout: Duration) -> Result<ssh2::Session> {
        let addr = spec
            .addr()
            .to_socket_addrs()
            .with_context(|| format!("resolving {}", spec.addr()))?
            .next()
            .ok_or_else(|| eyre!("no address resolved for {}", spec.addr()))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .with_context(|| format!("tcp connect to {}", spec.addr()))?;

        let mut session = ssh2::Session::new().context("creating ssh session")?;
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session.handshake().context("ssh handshake")?;
        session
            .userauth_password(&spec.username, &spec.password)
            .context("password authentication")?;
        if !session.authenticated() {
            return Err(eyre!("authentication rejected for {}", spec.label()));
        }
        Ok(session)
    }

    /// One poll loop serves both buffered and streaming execution: exec the
    /// command, switch the session to non-blocking, and alternate short
    /// read attempts with fixed sleeps until the channel reports EOF. The
    /// exit status is read after the loop, never skipped.
    fn run_polled(
        &mut self,
        command: &str,
        timeout: Duration,
        observer: &mut dyn OutputObserver,
    ) -> StepResult<CommandOutput> {
        log::debug!("{}: running `{command}`", self.label);

        let mut channel = self
            .session
            .channel_session()
            .map_err(|err| StepError::command(format!("{}: opening channel: {err}", self.label)))?;
        channel
            .exec(command)
            .map_err(|err| StepError::command(format!("{}: exec failed: {err}", self.label)))?;

        self.session.set_blocking(false);

        let mut stdout_text = String::new();
        let mut stderr_text = String::new();
        let mut stderr_stream = channel.stderr();
        let started = Instant::now();
        let mut timed_out = false;

        loop {
            let mut progressed = false;
            let mut buf = [0u8; 8192];

            match channel.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    observer.stdout_chunk(&text);
                    stdout_text.push_str(&text);
                    progressed = true;
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    self.session.set_blocking(true);
                    return Err(StepError::command(format!(
                        "{}: stdout read failed: {err}",
                        self.label
                    )));
                }
            }

            match stderr_stream.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    observer.stderr_chunk(&text);
                    stderr_text.push_str(&text);
                    progressed = true;
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    self.session.set_blocking(true);
                    return Err(StepError::command(format!(
                        "{}: stderr read failed: {err}",
                        self.label
                    )));
                }
            }

            if channel.eof() {
                break;
            }
            if started.elapsed() > timeout {
                timed_out = true;
                break;
            }
            if !progressed {
                thread::sleep(POLL_INTERVAL);
            }
        }

        self.session.set_blocking(true);

        if timed_out {
            let _ = channel.close();
            return Err(StepError::command(format!(
                "{}: command timed out after {timeout:?}",
                self.label
            )));
        }

        let _ = channel.close();
        let _ = channel.wait_close();
        let exit_code = channel.exit_status().unwrap_or(-1);

        if exit_code != 0 {
            log::debug!("{}: exit {exit_code} from `{command}`", self.label);
        }

        Ok(CommandOutput {
            exit_code,
            stdout: stdout_text,
            stderr: stderr_text,
        })
    }
}

impl RemoteShell for SshSession {
    fn label(&self) -> &str {
        &self.label
    }

    fn execute(&mut self, command: &str, timeout: Duration) -> StepResult<CommandOutput> {
        self.run_polled(command, timeout, &mut SilentOutput)
    }

    fn execute_streaming(
        &mut self,
        command: &str,
        timeout: Duration,
        observer: &mut dyn OutputObserver,
    ) -> StepResult<CommandOutput> {
        self.run_polled(command, timeout, observer)
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(err) = self.session.disconnect(None, "closing", None) {
            log::debug!("{}: disconnect: {err}", self.label);
        }
    }
}
