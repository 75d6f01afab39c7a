use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hyphae::config::AppConfig;
use hyphae::server::{create_router, AppState};
use hyphae::shutdown::shutdown_signal;
use hyphae::workspace::{Checkout, GitCheckout, WorkspaceManager};

#[derive(Parser)]
#[command(name = "hyphae", about = "Hands labelled GitHub issues to a coding agent")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the webhook endpoint (default)
    Serve,
    /// Clone a repository into a fresh workspace once, then remove it
    Clone {
        /// Repository URL
        #[arg(env = "GITHUB_URL")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Clone { url } => clone_once(&config, &url).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        label = %config.github.trigger_label,
        "Starting Hyphae server"
    );

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    let state = Arc::new(AppState::new(config));
    let agents = state.orchestrator.shutdown_token();
    let app = create_router(Arc::clone(&state));

    tracing::info!("Listening on {}", listener.local_addr()?);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(agents))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Direct clone mode: check the repository out into a workspace, report
/// where it landed, and remove it again.
async fn clone_once(config: &AppConfig, url: &str) -> anyhow::Result<()> {
    let workspaces = WorkspaceManager::new(&config.workspace);
    let mut workspace = workspaces.acquire().await?;

    let credential = config.clone_credential(url);
    if credential.is_none() {
        tracing::info!(url = %url, "Cloning without credentials");
    }
    let result = GitCheckout
        .checkout(url, workspace.path(), credential.as_ref())
        .await;

    match &result {
        Ok(()) => tracing::info!(
            url = %url,
            workspace = %workspace.path().display(),
            "Repository cloned; the workspace is removed on exit"
        ),
        Err(e) => tracing::error!(url = %url, error = %e, "Clone failed"),
    }

    workspaces.release(&mut workspace).await;
    result?;
    Ok(())
}
