use std::path::PathBuf;

use crate::error::Result;
use crate::workspace::manager::{Workspace, WorkspaceState};

/// Write the issue body verbatim into `file_name` at the workspace root.
///
/// No validation or trimming: an empty body yields an empty file. An existing
/// file is overwritten.
pub async fn write_instructions(
    workspace: &mut Workspace,
    file_name: &str,
    body: &str,
) -> Result<PathBuf> {
    let path = workspace.path().join(file_name);
    tokio::fs::write(&path, body.as_bytes()).await?;

    tracing::info!(
        file = %path.display(),
        bytes = body.len(),
        "Instructions written"
    );

    workspace.advance(WorkspaceState::InstructionsWritten);
    Ok(path)
}
