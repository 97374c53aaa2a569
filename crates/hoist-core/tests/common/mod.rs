//! A scripted stand-in for a live SSH session.
//!
//! Each test builds a handler that answers the commands the pipeline is
//! expected to issue; every command is recorded so tests can assert on
//! what actually ran.

use std::time::Duration;

use hoist_core::session::{CommandOutput, OutputObserver, RemoteShell};
use hoist_core::StepResult;

pub struct ScriptedSession {
    label: String,
    handler: Box<dyn FnMut(&str) -> CommandOutput>,
    pub commands: Vec<String>,
}

impl ScriptedSession {
    pub fn new(label: &str, handler: impl FnMut(&str) -> CommandOutput + 'static) -> Self {
        Self {
            label: label.to_string(),
            handler: Box::new(handler),
            commands: Vec::new(),
        }
    }

    /// Did any executed command contain `needle`?
    pub fn ran(&self, needle: &str) -> bool {
        self.commands.iter().any(|cmd| cmd.contains(needle))
    }
}

impl RemoteShell for ScriptedSession {
    fn label(&self) -> &str {
        &self.label
    }

    fn execute(&mut self, command: &str, _timeout: Duration) -> StepResult<CommandOutput> {
        self.commands.push(command.to_string());
        Ok((self.handler)(command))
    }

    fn execute_streaming(
        &mut self,
        command: &str,
        _timeout: Duration,
        observer: &mut dyn OutputObserver,
    ) -> StepResult<CommandOutput> {
        self.commands.push(command.to_string());
        let output = (self.handler)(command);
        if !output.stdout.is_empty() {
            observer.stdout_chunk(&output.stdout);
        }
        if !output.stderr.is_empty() {
            observer.stderr_chunk(&output.stderr);
        }
        Ok(output)
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failed(exit_code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}
