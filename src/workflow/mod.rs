pub mod filter;
pub mod issue;
pub mod types;

pub use filter::{should_process, EventFilter, LabelMatch};
pub use issue::Orchestrator;
pub use types::{IssueAction, IssueEvent, PipelineOutcome, RunReport, Stage};
