use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::workflow::types::{IssueAction, IssueEvent};

/// Top-level webhook event parsed from the payload based on X-GitHub-Event header.
#[derive(Debug)]
pub enum WebhookEvent {
    Issues(IssuesPayloadEvent),
    Ping,
    /// Any other event type; the endpoint does not accept it.
    Unsupported(String),
}

#[derive(Debug, Deserialize)]
pub struct IssuesPayloadEvent {
    pub action: String,
    pub issue: IssuePayload,
    pub repository: RepositoryPayload,
}

#[derive(Debug, Deserialize)]
pub struct IssuePayload {
    pub number: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<LabelPayload>,
}

#[derive(Debug, Deserialize)]
pub struct LabelPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryPayload {
    pub full_name: String,
    #[serde(default)]
    pub clone_url: String,
}

impl WebhookEvent {
    pub fn parse(event_type: &str, payload: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        match event_type {
            "issues" => {
                let event: IssuesPayloadEvent = serde_json::from_slice(payload)?;
                Ok(WebhookEvent::Issues(event))
            }
            "ping" => Ok(WebhookEvent::Ping),
            other => Ok(WebhookEvent::Unsupported(other.to_string())),
        }
    }
}

impl TryFrom<IssuesPayloadEvent> for IssueEvent {
    type Error = AppError;

    fn try_from(payload: IssuesPayloadEvent) -> Result<Self> {
        let action = IssueAction::parse(&payload.action);
        if action == IssueAction::Opened && payload.repository.clone_url.trim().is_empty() {
            return Err(AppError::Validation(
                "opened issue event without a repository clone URL".to_string(),
            ));
        }

        Ok(IssueEvent {
            action,
            repo_full_name: payload.repository.full_name,
            clone_url: payload.repository.clone_url,
            issue_number: payload.issue.number,
            issue_body: payload.issue.body.unwrap_or_default(),
            labels: payload.issue.labels.into_iter().map(|l| l.name).collect(),
        })
    }
}
