use std::cell::Cell;
use std::path::Path;

use async_trait::async_trait;
use git2::{build::RepoBuilder, Cred, FetchOptions, RemoteCallbacks};

use crate::config::Credential;
use crate::error::{AppError, Result};

/// Populates an empty directory with the contents of a remote repository.
#[async_trait]
pub trait Checkout: Send + Sync {
    async fn checkout(&self, url: &str, dir: &Path, credential: Option<&Credential>) -> Result<()>;
}

/// Full (non-shallow) clone through libgit2.
#[derive(Debug, Default, Clone)]
pub struct GitCheckout;

#[async_trait]
impl Checkout for GitCheckout {
    async fn checkout(&self, url: &str, dir: &Path, credential: Option<&Credential>) -> Result<()> {
        clone(url, dir, credential.map(|c| c.token.as_str())).await
    }
}

/// Reject anything that would make a clone land on top of existing files.
fn ensure_empty(dir: &Path) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| AppError::Checkout(format!("Cannot read {}: {e}", dir.display())))?;
    if entries.next().is_some() {
        return Err(AppError::Checkout(format!(
            "Target directory is not empty: {}",
            dir.display()
        )));
    }
    Ok(())
}

fn validate_url(url: &str, authenticated: bool) -> Result<()> {
    if url.is_empty() {
        return Err(AppError::Checkout("Empty clone URL".to_string()));
    }
    if url.starts_with('-') {
        return Err(AppError::Checkout(format!("Invalid clone URL: {url}")));
    }
    // Never send the token over a plaintext transport.
    if authenticated && !url.starts_with("https://") {
        return Err(AppError::Checkout(format!(
            "Expected HTTPS clone URL for authenticated checkout, got: {url}"
        )));
    }
    Ok(())
}

/// Build `FetchOptions` that authenticate via credential callback.
/// The token is captured by the closure and never written to disk.
fn make_fetch_options(token: Option<&str>) -> FetchOptions<'_> {
    let mut callbacks = RemoteCallbacks::new();

    if let Some(token) = token {
        // libgit2 keeps asking while the remote keeps rejecting; answer once.
        let attempts = Cell::new(0u32);
        callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
            attempts.set(attempts.get() + 1);
            if attempts.get() > 1 {
                return Err(git2::Error::from_str("authentication rejected by remote"));
            }
            // Only the token is checked; the username is a placeholder.
            Cred::userpass_plaintext("x-access-token", token)
        });
    }

    callbacks.transfer_progress(|progress| {
        tracing::debug!(
            received = progress.received_objects(),
            total = progress.total_objects(),
            bytes = progress.received_bytes(),
            "Clone progress"
        );
        true
    });

    let mut opts = FetchOptions::new();
    opts.remote_callbacks(callbacks);
    opts
}

/// Clone a repository into the empty target directory.
///
/// The remote URL stored in `.git/config` will be the **plain** URL
/// (no credentials). Authentication is handled via credential callback only.
pub async fn clone(url: &str, target: &Path, token: Option<&str>) -> Result<()> {
    validate_url(url, token.is_some())?;
    ensure_empty(target)?;

    let url = url.to_string();
    let target = target.to_path_buf();
    let token = token.map(str::to_string);

    tracing::info!(url = %url, target = %target.display(), authenticated = token.is_some(), "Cloning repository");

    tokio::task::spawn_blocking(move || {
        let fetch_opts = make_fetch_options(token.as_deref());
        RepoBuilder::new()
            .fetch_options(fetch_opts)
            .clone(&url, &target)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Checkout(format!("Clone task panicked: {e}")))?
}
