use std::collections::BTreeSet;
use std::fmt;

/// What happened to the issue. Only `Opened` can trigger a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueAction {
    Opened,
    Other(String),
}

impl IssueAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "opened" => IssueAction::Opened,
            other => IssueAction::Other(other.to_string()),
        }
    }
}

/// A validated issue event, built once per delivery at the webhook boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueEvent {
    pub action: IssueAction,
    pub repo_full_name: String,
    pub clone_url: String,
    pub issue_number: u64,
    pub issue_body: String,
    pub labels: BTreeSet<String>,
}

/// States a single run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Filtering,
    Acquiring,
    CheckingOut,
    WritingInstructions,
    Running,
    Cleaning,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Filtering => "filtering",
            Stage::Acquiring => "acquiring",
            Stage::CheckingOut => "checking_out",
            Stage::WritingInstructions => "writing_instructions",
            Stage::Running => "running",
            Stage::Cleaning => "cleaning",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The agent exited cleanly.
    Succeeded,
    /// The event did not qualify; nothing was created.
    FilteredOut,
    /// A stage failed and the rest of the pipeline was skipped.
    Failed { stage: Stage, reason: String },
}

impl PipelineOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineOutcome::Failed { .. })
    }
}

/// Outcome plus the ordered list of stages the run entered.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: PipelineOutcome,
    pub stages: Vec<Stage>,
}

impl RunReport {
    pub fn entered(&self, stage: Stage) -> usize {
        self.stages.iter().filter(|s| **s == stage).count()
    }
}
