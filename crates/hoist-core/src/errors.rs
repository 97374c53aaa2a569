//! Error taxonomy for the transfer pipeline.
//!
//! Every fatal condition a pipeline step can hit is tagged with the step
//! that produced it. Non-fatal conditions (degraded probes, cleanup
//! failures, verification surpluses) are not errors: they are logged and,
//! where relevant, recorded on the transfer report directly.

use std::fmt;

/// Which pipeline step a fatal error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Connection attempts to a host exhausted their retries.
    Connection,
    /// A remote command could not be executed or timed out.
    Command,
    /// Archive creation on the source host failed.
    Pack,
    /// The target host could not fetch the artifact.
    Retrieval,
    /// Unpacking the artifact on the target host failed.
    Extract,
    /// Post-transfer measurement could not be taken.
    Verify,
    /// The recovery pass itself failed.
    Recovery,
    /// A cooperative cancellation request was observed.
    Cancelled,
}

impl StepKind {
    fn label(self) -> &'static str {
        match self {
            StepKind::Connection => "connection",
            StepKind::Command => "command",
            StepKind::Pack => "pack",
            StepKind::Retrieval => "retrieval",
            StepKind::Extract => "extract",
            StepKind::Verify => "verify",
            StepKind::Recovery => "recovery",
            StepKind::Cancelled => "cancelled",
        }
    }
}

/// A fatal pipeline error: the step that failed plus a human explanation.
#[derive(Debug, Clone)]
pub struct StepError {
    pub kind: StepKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: StepKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(StepKind::Connection, message)
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self::new(StepKind::Command, message)
    }

    pub fn pack(message: impl Into<String>) -> Self {
        Self::new(StepKind::Pack, message)
    }

    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::new(StepKind::Retrieval, message)
    }

    pub fn extract(message: impl Into<String>) -> Self {
        Self::new(StepKind::Extract, message)
    }

    pub fn verify(message: impl Into<String>) -> Self {
        Self::new(StepKind::Verify, message)
    }

    pub fn recovery(message: impl Into<String>) -> Self {
        Self::new(StepKind::Recovery, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StepKind::Cancelled, message)
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind.label(), self.message)
    }
}

impl std::error::Error for StepError {}

/// Result type for pipeline steps.
pub type StepResult<T> = std::result::Result<T, StepError>;
