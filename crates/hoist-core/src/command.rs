//! Structured construction of the shell commands we run on remote hosts.
//!
//! Paths and other user-controlled values are never spliced into command
//! text raw: every dynamic argument goes through [`quote`] so differing
//! shell quoting rules on the two hosts cannot change what a command does.

use std::borrow::Cow;

/// Shell-escape a single argument for POSIX shells.
pub fn quote(arg: &str) -> String {
    shell_escape::escape(Cow::Borrowed(arg)).into_owned()
}

/// `mkdir -p` for one directory, created idempotently.
pub fn mkdir_p(path: &str) -> String {
    format!("mkdir -p {}", quote(path))
}

/// `rm -f` over a set of paths. Missing files are not an error.
pub fn remove_files(paths: &[&str]) -> String {
    let mut cmd = String::from("rm -f");
    for path in paths {
        cmd.push(' ');
        cmd.push_str(&quote(path));
    }
    cmd
}

/// Run `command` with `dir` as the working directory.
///
/// The inner command is trusted text assembled by this crate; only the
/// directory is escaped here.
pub fn in_dir(dir: &str, command: &str) -> String {
    format!("cd {} && {}", quote(dir), command)
}
