use std::ffi::OsString;
use std::fmt;
use std::path::Path;

use crate::config::{AgentConfig, Credential};

const REDACTED: &str = "[REDACTED]";

/// The argv handed to the agent. Executed directly, never through a shell,
/// so the issue body and token cannot be interpreted as shell syntax.
pub struct AgentCommand {
    program: String,
    args: Vec<OsString>,
    secret: String,
}

impl AgentCommand {
    pub fn new(config: &AgentConfig, instructions: &Path, credential: &Credential) -> Self {
        let extension = format!(
            "{}={} {}",
            config.extension_token_var, credential.token, config.extension_command
        );

        let mut args: Vec<OsString> = config.program_args.iter().map(OsString::from).collect();
        args.extend([
            OsString::from("run"),
            OsString::from("--with-extension"),
            OsString::from(extension),
            OsString::from("--with-builtin"),
            OsString::from(&config.builtin),
            OsString::from("-i"),
            instructions.as_os_str().to_os_string(),
        ]);

        Self {
            program: config.program.clone(),
            args,
            secret: credential.token.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

impl fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if self.secret.is_empty() {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {:?}", arg.replace(&self.secret, REDACTED))?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AgentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentCommand({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_invocation() {
        let cmd = AgentCommand::new(
            &AgentConfig::default(),
            Path::new("/work/instructions.txt"),
            &Credential::new("ghp_123"),
        );

        assert_eq!(cmd.program(), "goose");
        let args: Vec<_> = cmd.args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "run",
                "--with-extension",
                "GITHUB_PERSONAL_ACCESS_TOKEN=ghp_123 npx -y @modelcontextprotocol/server-github",
                "--with-builtin",
                "developer",
                "-i",
                "/work/instructions.txt",
            ]
        );
    }

    #[test]
    fn test_program_args_come_first() {
        let config = AgentConfig {
            program: "sh".to_string(),
            program_args: vec!["-c".to_string(), "exit 0".to_string(), "agent".to_string()],
            ..AgentConfig::default()
        };
        let cmd = AgentCommand::new(&config, Path::new("i.txt"), &Credential::new("t"));
        let args: Vec<_> = cmd.args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..4], &["-c", "exit 0", "agent", "run"]);
    }

    #[test]
    fn test_display_redacts_token() {
        let cmd = AgentCommand::new(
            &AgentConfig::default(),
            Path::new("instructions.txt"),
            &Credential::new("ghp_supersecret"),
        );
        let shown = format!("{cmd} {cmd:?}");
        assert!(!shown.contains("ghp_supersecret"));
        assert!(shown.contains("GITHUB_PERSONAL_ACCESS_TOKEN=[REDACTED]"));
    }
}
