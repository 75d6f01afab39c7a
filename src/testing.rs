//! Fakes for the checkout and agent seams, shared by unit tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::{AgentOutcome, AgentRequest, AgentRun, AgentRunner};
use crate::config::{AgentConfig, AppConfig, Credential, GitHubConfig, ServerConfig, WorkspaceConfig};
use crate::error::{AppError, Result};
use crate::workspace::Checkout;

pub const TEST_SECRET: &str = "secret";

pub fn test_config(base: &Path) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        github: GitHubConfig {
            webhook_secret: TEST_SECRET.to_string(),
            token: "tok".to_string(),
            ..GitHubConfig::default()
        },
        workspace: WorkspaceConfig {
            base_dir: Some(base.to_path_buf()),
            prefix: "run-".to_string(),
        },
        agent: AgentConfig::default(),
    }
}

/// Records calls and drops a README into the target unless told to fail.
/// `occupy` names an entry to leave behind as a directory.
#[derive(Default)]
pub struct FakeCheckout {
    pub fail: bool,
    pub occupy: Option<&'static str>,
    pub calls: Mutex<Vec<(String, PathBuf, Option<Credential>)>>,
}

#[async_trait]
impl Checkout for FakeCheckout {
    async fn checkout(&self, url: &str, dir: &Path, credential: Option<&Credential>) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), dir.to_path_buf(), credential.cloned()));
        if self.fail {
            return Err(AppError::Checkout(format!("unreachable: {url}")));
        }
        std::fs::write(dir.join("README.md"), "checked out")?;
        if let Some(name) = self.occupy {
            std::fs::create_dir(dir.join(name))?;
        }
        Ok(())
    }
}

/// What the agent could see when it was launched.
#[derive(Debug, Clone)]
pub struct Seen {
    pub workspace: PathBuf,
    pub instructions: String,
    pub has_checkout: bool,
    pub cancelled: bool,
}

/// Returns a fixed outcome, or `Cancelled` when the run's token is cancelled.
pub struct FakeAgent {
    pub outcome: AgentOutcome,
    pub seen: Mutex<Vec<Seen>>,
}

impl FakeAgent {
    pub fn new(outcome: AgentOutcome) -> Self {
        Self {
            outcome,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentRunner for FakeAgent {
    async fn run(&self, request: AgentRequest) -> AgentRun {
        let cancelled = request.cancel.is_cancelled();
        self.seen.lock().unwrap().push(Seen {
            workspace: request.workspace.clone(),
            instructions: std::fs::read_to_string(&request.instructions).unwrap_or_default(),
            has_checkout: request.workspace.join("README.md").exists(),
            cancelled,
        });
        AgentRun {
            workspace: request.workspace,
            command: "fake-agent".to_string(),
            outcome: if cancelled {
                AgentOutcome::Cancelled
            } else {
                self.outcome.clone()
            },
        }
    }
}

/// Panics as soon as it is asked to run.
pub struct PanickingAgent;

#[async_trait]
impl AgentRunner for PanickingAgent {
    async fn run(&self, request: AgentRequest) -> AgentRun {
        panic!("agent runner blew up in {}", request.workspace.display());
    }
}
