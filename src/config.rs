use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_trigger_label")]
    pub trigger_label: String,
    /// Labels are compared byte-for-byte unless this is turned off, in which
    /// case ASCII case is ignored.
    #[serde(default = "default_true")]
    pub label_case_sensitive: bool,
    /// Clone with the token. Turn off for public repositories.
    #[serde(default = "default_true")]
    pub authenticated_checkout: bool,
}

// Manual Debug impl to avoid leaking the webhook secret and token
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("webhook_secret", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("trigger_label", &self.trigger_label)
            .field("label_case_sensitive", &self.label_case_sensitive)
            .field("authenticated_checkout", &self.authenticated_checkout)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Parent of all run directories. Falls back to the system temp dir.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default = "default_workspace_prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_agent_program")]
    pub program: String,
    /// Arguments placed between the program and the agent's own flags.
    #[serde(default)]
    pub program_args: Vec<String>,
    #[serde(default = "default_extension_command")]
    pub extension_command: String,
    #[serde(default = "default_extension_token_var")]
    pub extension_token_var: String,
    #[serde(default = "default_builtin")]
    pub builtin: String,
    #[serde(default = "default_instructions_file")]
    pub instructions_file: String,
    #[serde(default)]
    pub cancel_after_secs: Option<u64>,
}

/// Access token used for checkout and handed to the agent's forge extension.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            token: String::new(),
            trigger_label: default_trigger_label(),
            label_case_sensitive: true,
            authenticated_checkout: true,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            prefix: default_workspace_prefix(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_agent_program(),
            program_args: Vec::new(),
            extension_command: default_extension_command(),
            extension_token_var: default_extension_token_var(),
            builtin: default_builtin(),
            instructions_file: default_instructions_file(),
            cancel_after_secs: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_trigger_label() -> String {
    "AI".to_string()
}

fn default_workspace_prefix() -> String {
    "hyphae-".to_string()
}

fn default_agent_program() -> String {
    "goose".to_string()
}

fn default_extension_command() -> String {
    "npx -y @modelcontextprotocol/server-github".to_string()
}

fn default_extension_token_var() -> String {
    "GITHUB_PERSONAL_ACCESS_TOKEN".to_string()
}

fn default_builtin() -> String {
    "developer".to_string()
}

fn default_instructions_file() -> String {
    "instructions.txt".to_string()
}

/// Plain variables honoured on top of the `HYPHAE_` ones.
const PLAIN_OVERRIDES: &[(&str, &str)] = &[
    ("WEBHOOK_SECRET", "github.webhook_secret"),
    ("GITHUB_TOKEN", "github.token"),
    ("PORT", "server.port"),
];

impl AppConfig {
    /// Load from file and process environment, without validating.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_from(config_path, &env)
    }

    /// Load using an explicit environment map instead of the process environment.
    pub fn load_from(config_path: Option<&str>, env: &HashMap<String, String>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("hyphae").required(false));
        }

        // Environment variable overrides with HYPHAE_ prefix
        let prefixed: HashMap<String, String> = env
            .iter()
            .filter(|(k, _)| k.starts_with("HYPHAE_"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        builder = builder.add_source(
            config::Environment::with_prefix("HYPHAE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(prefixed)),
        );

        for (var, key) in PLAIN_OVERRIDES {
            let value = env.get(*var).filter(|v| !v.is_empty()).cloned();
            builder = builder
                .set_override_option(*key, value)
                .map_err(|e| AppError::Config(e.to_string()))?;
        }

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Check everything the webhook server needs before it binds a socket.
    pub fn validate(&self) -> Result<()> {
        if self.github.webhook_secret.trim().is_empty() {
            return Err(AppError::Config(
                "webhook secret is not set (WEBHOOK_SECRET or github.webhook_secret)".to_string(),
            ));
        }
        if self.github.token.trim().is_empty() {
            return Err(AppError::Config(
                "access token is not set (GITHUB_TOKEN or github.token)".to_string(),
            ));
        }
        if self.github.trigger_label.is_empty() {
            return Err(AppError::Config("trigger label must not be empty".to_string()));
        }
        if self.agent.program.trim().is_empty() {
            return Err(AppError::Config("agent program must not be empty".to_string()));
        }
        validate_file_name(&self.agent.instructions_file)
    }

    pub fn webhook_secret(&self) -> &str {
        &self.github.webhook_secret
    }

    pub fn credential(&self) -> Credential {
        Credential::new(self.github.token.clone())
    }

    /// Credential for cloning, absent for public-repository setups.
    pub fn checkout_credential(&self) -> Option<Credential> {
        (self.github.authenticated_checkout && !self.github.token.is_empty())
            .then(|| self.credential())
    }

    /// Credential for a one-off clone of `url`. The token only travels over
    /// HTTPS, so any other URL is cloned anonymously.
    pub fn clone_credential(&self, url: &str) -> Option<Credential> {
        if url.starts_with("https://") {
            self.checkout_credential()
        } else {
            None
        }
    }
}

/// The instructions file must land directly in the workspace root.
fn validate_file_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(AppError::Config(format!(
            "instructions file must be a plain file name, got: {name:?}"
        ))),
    }
}
