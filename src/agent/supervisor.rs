use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::agent::{AgentCommand, AgentOutcome, AgentRequest, AgentRun, AgentRunner, ExitInfo};
use crate::config::AgentConfig;

/// Runs the external agent as a child process bound to the workspace.
///
/// Output is not captured: stdout and stderr are inherited so operators see
/// the agent live in the service's own streams.
pub struct AgentSupervisor {
    config: AgentConfig,
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    Interrupt(&'static str),
}

impl AgentSupervisor {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn spawn(&self, command: &AgentCommand, request: &AgentRequest) -> std::io::Result<Child> {
        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .current_dir(&request.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Own process group, so an interrupt reaches the agent's helpers too.
        #[cfg(unix)]
        cmd.process_group(0);

        // Backstop for a run future dropped before the agent exits: the
        // workspace goes with it, so the agent must not outlive it.
        cmd.kill_on_drop(true);

        cmd.spawn()
    }
}

#[async_trait]
impl AgentRunner for AgentSupervisor {
    async fn run(&self, request: AgentRequest) -> AgentRun {
        let command = AgentCommand::new(&self.config, &request.instructions, &request.credential);
        let shown = command.to_string();
        let finish = |outcome: AgentOutcome| AgentRun {
            workspace: request.workspace.clone(),
            command: shown.clone(),
            outcome,
        };

        tracing::info!(
            workspace = %request.workspace.display(),
            command = %shown,
            "Launching agent"
        );

        let mut child = match self.spawn(&command, &request) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(error = %e, program = %command.program(), "Failed to launch agent");
                return finish(AgentOutcome::Failure(ExitInfo::LaunchFailed(e.to_string())));
            }
        };

        tracing::info!(pid = ?child.id(), "Agent running");

        let deadline = async {
            match request.cancel_after {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Exit is checked first so a natural exit is never reported as an
        // interrupt that happened to become ready in the same poll.
        let waited = tokio::select! {
            biased;
            status = child.wait() => Waited::Exited(status),
            _ = request.cancel.cancelled() => Waited::Interrupt("cancellation requested"),
            _ = deadline => Waited::Interrupt("time limit reached"),
        };

        let outcome = match waited {
            Waited::Exited(status) => classify(status),
            Waited::Interrupt(reason) => stop(&mut child, reason).await,
        };

        match &outcome {
            AgentOutcome::Success => tracing::info!("Agent finished successfully"),
            AgentOutcome::Failure(info) => tracing::error!(exit = %info, "Agent failed"),
            AgentOutcome::Cancelled => tracing::warn!("Agent cancelled"),
        }

        finish(outcome)
    }
}

/// Interrupt the agent and wait for it to exit. An agent that already exited
/// on its own keeps its real outcome.
async fn stop(child: &mut Child, reason: &str) -> AgentOutcome {
    if let Ok(Some(status)) = child.try_wait() {
        tracing::debug!(status = %status, reason, "Agent exited before the interrupt");
        return classify(Ok(status));
    }

    tracing::warn!(pid = ?child.id(), reason, "Interrupting agent");
    interrupt(child);
    match child.wait().await {
        Ok(status) => {
            tracing::info!(status = %status, "Agent exited after interrupt");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for interrupted agent");
        }
    }
    AgentOutcome::Cancelled
}

fn classify(status: std::io::Result<ExitStatus>) -> AgentOutcome {
    let status = match status {
        Ok(status) => status,
        Err(e) => return AgentOutcome::Failure(ExitInfo::WaitFailed(e.to_string())),
    };
    if status.success() {
        return AgentOutcome::Success;
    }
    if let Some(code) = status.code() {
        return AgentOutcome::Failure(ExitInfo::Code(code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return AgentOutcome::Failure(ExitInfo::Signal(sig));
        }
    }
    AgentOutcome::Failure(ExitInfo::WaitFailed(format!("unrecognised exit status: {status}")))
}

/// Ask the agent to stop. Graceful on unix (SIGINT to the group); a hard
/// kill is used only when the signal cannot be delivered.
#[cfg(unix)]
fn interrupt(child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };
    let Ok(pid) = i32::try_from(pid) else {
        tracing::warn!(pid, "Agent pid out of range, killing instead");
        let _ = child.start_kill();
        return;
    };

    match killpg(Pid::from_raw(pid), Signal::SIGINT) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            tracing::warn!(pid, error = %e, "SIGINT failed, killing agent");
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    use crate::config::Credential;

    fn shell_agent(script: &str) -> AgentSupervisor {
        AgentSupervisor::new(&AgentConfig {
            program: "sh".to_string(),
            program_args: vec!["-c".to_string(), script.to_string(), "agent".to_string()],
            ..AgentConfig::default()
        })
    }

    fn request(dir: &Path) -> AgentRequest {
        let instructions = dir.join("instructions.txt");
        std::fs::write(&instructions, "do X").unwrap();
        AgentRequest {
            workspace: dir.to_path_buf(),
            instructions,
            credential: Credential::new("tok"),
            cancel: CancellationToken::new(),
            cancel_after: None,
        }
    }

    #[tokio::test]
    async fn test_exit_zero_is_success() {
        let tmp = tempfile::tempdir().unwrap();
        let run = shell_agent("exit 0").run(request(tmp.path())).await;
        assert_eq!(run.outcome, AgentOutcome::Success);
        assert_eq!(run.workspace, tmp.path());
    }

    #[tokio::test]
    async fn test_exit_one_is_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let run = shell_agent("exit 1").run(request(tmp.path())).await;
        assert_eq!(run.outcome, AgentOutcome::Failure(ExitInfo::Code(1)));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = AgentSupervisor::new(&AgentConfig {
            program: tmp.path().join("no-such-agent").display().to_string(),
            ..AgentConfig::default()
        });
        let run = supervisor.run(request(tmp.path())).await;
        assert!(matches!(
            run.outcome,
            AgentOutcome::Failure(ExitInfo::LaunchFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_arguments_and_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        // $1.. are the agent flags; files are written relative to the cwd.
        let script = r#"
            [ "$1" = run ] || exit 10
            [ "$2" = --with-extension ] || exit 11
            [ "$3" = "GITHUB_PERSONAL_ACCESS_TOKEN=tok npx -y @modelcontextprotocol/server-github" ] || exit 12
            [ "$4" = --with-builtin ] || exit 13
            [ "$5" = developer ] || exit 14
            [ "$6" = -i ] || exit 15
            [ "$(cat "$7")" = "do X" ] || exit 16
            echo ran > marker.txt
        "#;
        let run = shell_agent(script).run(request(tmp.path())).await;
        assert_eq!(run.outcome, AgentOutcome::Success);
        assert!(tmp.path().join("marker.txt").exists());
        assert!(!run.command.contains("=tok "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_time_limit_interrupts_and_waits() {
        let tmp = tempfile::tempdir().unwrap();
        let mut req = request(tmp.path());
        req.cancel_after = Some(Duration::from_millis(200));

        let started = Instant::now();
        let run = shell_agent("exec sleep 30").run(req).await;
        assert_eq!(run.outcome, AgentOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_token_interrupts() {
        let tmp = tempfile::tempdir().unwrap();
        let req = request(tmp.path());
        let cancel = req.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let run = shell_agent("exec sleep 30").run(req).await;
        assert_eq!(run.outcome, AgentOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_waits_for_graceful_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let mut req = request(tmp.path());
        req.cancel_after = Some(Duration::from_millis(300));

        // The trap writes a file on SIGINT before exiting; the run must not
        // return until that has happened.
        let script = r#"
            trap 'echo bye > stopped.txt; exit 0' INT
            while :; do sleep 0.05; done
        "#;
        let run = shell_agent(script).run(req).await;
        assert_eq!(run.outcome, AgentOutcome::Cancelled);
        assert!(tmp.path().join("stopped.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_before_interrupt_keeps_real_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let mut child = Command::new("sh")
            .args(["-c", "exit 3"])
            .current_dir(tmp.path())
            .spawn()
            .unwrap();
        // Exited but not yet reaped when the interrupt arrives.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let outcome = stop(&mut child, "cancellation requested").await;
        assert_eq!(outcome, AgentOutcome::Failure(ExitInfo::Code(3)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_of_running_agent_is_cancelled() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let started = Instant::now();
        let outcome = stop(&mut child, "time limit reached").await;
        assert_eq!(outcome, AgentOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_run_kills_agent() {
        let tmp = tempfile::tempdir().unwrap();
        let pid_file = tmp.path().join("pid.txt");
        let abandoned = tokio::time::timeout(
            Duration::from_millis(500),
            shell_agent("echo $$ > pid.txt; exec sleep 30").run(request(tmp.path())),
        )
        .await;
        assert!(abandoned.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let stat = format!("/proc/{}/stat", pid.trim());
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            // Gone, or a zombie waiting to be reaped.
            let alive = match std::fs::read_to_string(&stat) {
                Ok(line) => line
                    .rsplit_once(')')
                    .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                    .unwrap_or(false),
                Err(_) => false,
            };
            if !alive {
                break;
            }
            assert!(Instant::now() < deadline, "agent outlived its run");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_exit_codes() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(classify(Ok(ExitStatus::from_raw(0))), AgentOutcome::Success);
        assert_eq!(
            classify(Ok(ExitStatus::from_raw(2 << 8))),
            AgentOutcome::Failure(ExitInfo::Code(2))
        );
        assert_eq!(
            classify(Ok(ExitStatus::from_raw(9))),
            AgentOutcome::Failure(ExitInfo::Signal(9))
        );
    }
}
