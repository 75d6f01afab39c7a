use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::{AgentOutcome, AgentRequest, AgentRunner};
use crate::config::{AppConfig, Credential};
use crate::error::AppError;
use crate::workflow::filter::{EventFilter, LabelMatch};
use crate::workflow::types::{IssueEvent, PipelineOutcome, RunReport, Stage};
use crate::workspace::{write_instructions, Checkout, Workspace, WorkspaceManager, WorkspaceState};

type StageResult = std::result::Result<(), (Stage, String)>;

/// Drives one issue event through filter, workspace, checkout, instructions
/// and agent, releasing the workspace on every path that acquired one.
pub struct Orchestrator {
    filter: EventFilter,
    workspaces: WorkspaceManager,
    checkout: Arc<dyn Checkout>,
    agent: Arc<dyn AgentRunner>,
    credential: Credential,
    checkout_credential: Option<Credential>,
    instructions_file: String,
    cancel_after: Option<Duration>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        checkout: Arc<dyn Checkout>,
        agent: Arc<dyn AgentRunner>,
    ) -> Self {
        Self {
            filter: EventFilter::new(
                config.github.trigger_label.clone(),
                LabelMatch::from_case_sensitive(config.github.label_case_sensitive),
            ),
            workspaces: WorkspaceManager::new(&config.workspace),
            checkout,
            agent,
            credential: config.credential(),
            checkout_credential: config.checkout_credential(),
            instructions_file: config.agent.instructions_file.clone(),
            cancel_after: config.agent.cancel_after_secs.map(Duration::from_secs),
            shutdown: CancellationToken::new(),
        }
    }

    /// Parent of every run's cancellation token. Cancelling it interrupts
    /// all running agents.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub async fn process(&self, event: &IssueEvent) -> RunReport {
        let mut stages = vec![Stage::Filtering];

        if !self.filter.should_process(event) {
            tracing::info!(
                repo = %event.repo_full_name,
                issue = event.issue_number,
                action = ?event.action,
                label = %self.filter.required_label(),
                "Event does not qualify, skipping"
            );
            stages.push(Stage::Done);
            return RunReport {
                outcome: PipelineOutcome::FilteredOut,
                stages,
            };
        }

        tracing::info!(
            repo = %event.repo_full_name,
            issue = event.issue_number,
            clone_url = %event.clone_url,
            "Processing issue"
        );

        stages.push(Stage::Acquiring);
        let result = match self.workspaces.acquire().await {
            Ok(mut workspace) => {
                let result = self.run_stages(event, &mut workspace, &mut stages).await;
                stages.push(Stage::Cleaning);
                self.workspaces.release(&mut workspace).await;
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to acquire workspace");
                // Nothing to release.
                stages.push(Stage::Cleaning);
                Err((Stage::Acquiring, e.to_string()))
            }
        };
        stages.push(Stage::Done);

        let outcome = match result {
            Ok(()) => PipelineOutcome::Succeeded,
            Err((stage, reason)) => PipelineOutcome::Failed { stage, reason },
        };

        match &outcome {
            PipelineOutcome::Failed { stage, reason } => tracing::error!(
                repo = %event.repo_full_name,
                issue = event.issue_number,
                stage = %stage,
                reason = %reason,
                "Pipeline failed"
            ),
            _ => tracing::info!(
                repo = %event.repo_full_name,
                issue = event.issue_number,
                "Pipeline completed"
            ),
        }

        RunReport { outcome, stages }
    }

    async fn run_stages(
        &self,
        event: &IssueEvent,
        workspace: &mut Workspace,
        stages: &mut Vec<Stage>,
    ) -> StageResult {
        stages.push(Stage::CheckingOut);
        self.checkout
            .checkout(
                &event.clone_url,
                workspace.path(),
                self.checkout_credential.as_ref(),
            )
            .await
            .map_err(|e| (Stage::CheckingOut, e.to_string()))?;
        workspace.advance(WorkspaceState::Populated);

        stages.push(Stage::WritingInstructions);
        let instructions =
            write_instructions(workspace, &self.instructions_file, &event.issue_body)
                .await
                .map_err(|e| (Stage::WritingInstructions, e.to_string()))?;

        stages.push(Stage::Running);
        workspace.advance(WorkspaceState::Running);
        let run = self
            .agent
            .run(AgentRequest {
                workspace: workspace.path().to_path_buf(),
                instructions,
                credential: self.credential.clone(),
                cancel: self.shutdown.child_token(),
                cancel_after: self.cancel_after,
            })
            .await;

        match run.outcome {
            AgentOutcome::Success => Ok(()),
            AgentOutcome::Failure(info) => {
                Err((Stage::Running, AppError::Agent(info.to_string()).to_string()))
            }
            AgentOutcome::Cancelled => Err((
                Stage::Running,
                AppError::Agent("interrupted before completion".to_string()).to_string(),
            )),
        }
    }
}
