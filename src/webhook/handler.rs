use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::server::AppState;
use crate::webhook::events::WebhookEvent;
use crate::webhook::signature::verify_signature;
use crate::workflow::IssueEvent;

/// Status only: diagnostics go to the log, never into the response body.
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // Extract required headers
    let signature = match headers.get("x-hub-signature-256").and_then(|v| v.to_str().ok()) {
        Some(sig) => sig.to_string(),
        None => {
            tracing::warn!("Missing X-Hub-Signature-256 header");
            return StatusCode::BAD_REQUEST;
        }
    };

    let event_type = match headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        Some(et) => et.to_string(),
        None => {
            tracing::warn!("Missing X-GitHub-Event header");
            return StatusCode::BAD_REQUEST;
        }
    };

    // Verify signature
    if let Err(e) = verify_signature(state.config.webhook_secret(), &body, &signature) {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        return e.status_code();
    }

    // Parse event
    let event = match WebhookEvent::parse(&event_type, &body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, event_type = %event_type, "Failed to parse webhook event");
            return StatusCode::BAD_REQUEST;
        }
    };

    tracing::info!(event_type = %event_type, "Received webhook event");

    match event {
        WebhookEvent::Issues(payload) => match IssueEvent::try_from(payload) {
            Ok(issue_event) => handle_issue_event(&state, issue_event).await,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting issue event");
                e.status_code()
            }
        },
        WebhookEvent::Ping => {
            tracing::info!("Received ping event");
            StatusCode::OK
        }
        WebhookEvent::Unsupported(event_type) => {
            tracing::warn!(event_type = %event_type, "Rejecting unsupported event");
            StatusCode::BAD_REQUEST
        }
    }
}

/// Run the pipeline on its own task and wait for it, so a dropped connection
/// cannot abandon a run between acquiring and releasing its workspace.
async fn handle_issue_event(state: &AppState, event: IssueEvent) -> StatusCode {
    let orchestrator = Arc::clone(&state.orchestrator);
    let run = tokio::spawn(async move { orchestrator.process(&event).await });

    match run.await {
        Ok(report) if report.outcome.is_failure() => StatusCode::INTERNAL_SERVER_ERROR,
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::error!(error = %e, "Pipeline task panicked");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
