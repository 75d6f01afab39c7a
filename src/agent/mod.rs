pub mod command;
pub mod supervisor;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Credential;

pub use command::AgentCommand;
pub use supervisor::AgentSupervisor;

/// Everything needed to launch the agent for one run.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub workspace: PathBuf,
    pub instructions: PathBuf,
    pub credential: Credential,
    /// Interrupts the agent when cancelled; the run still waits for exit.
    pub cancel: CancellationToken,
    /// Optional upper bound after which the same interrupt is raised.
    pub cancel_after: Option<Duration>,
}

/// Why a run did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitInfo {
    Code(i32),
    Signal(i32),
    LaunchFailed(String),
    WaitFailed(String),
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitInfo::Code(code) => write!(f, "exited with code {code}"),
            ExitInfo::Signal(sig) => write!(f, "terminated by signal {sig}"),
            ExitInfo::LaunchFailed(e) => write!(f, "failed to launch: {e}"),
            ExitInfo::WaitFailed(e) => write!(f, "failed to wait for exit: {e}"),
        }
    }
}

/// Outcome of an agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Process exited with status 0.
    Success,
    /// Non-zero exit, death by signal, or the process never started.
    Failure(ExitInfo),
    /// Interrupted on request before it exited on its own.
    Cancelled,
}

/// A finished agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub workspace: PathBuf,
    /// Command line with the credential redacted.
    pub command: String,
    pub outcome: AgentOutcome,
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent to completion. Never returns while the process is alive.
    async fn run(&self, request: AgentRequest) -> AgentRun;
}
