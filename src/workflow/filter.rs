use crate::workflow::types::{IssueAction, IssueEvent};

/// How the trigger label is compared against the issue's labels.
///
/// `Exact` is the default: `"AI"` and `"ai"` are different labels. Folding
/// ASCII case is an explicit opt-in, never applied silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelMatch {
    #[default]
    Exact,
    IgnoreAsciiCase,
}

impl LabelMatch {
    pub fn from_case_sensitive(case_sensitive: bool) -> Self {
        if case_sensitive {
            LabelMatch::Exact
        } else {
            LabelMatch::IgnoreAsciiCase
        }
    }

    fn matches(self, candidate: &str, required: &str) -> bool {
        match self {
            LabelMatch::Exact => candidate == required,
            LabelMatch::IgnoreAsciiCase => candidate.eq_ignore_ascii_case(required),
        }
    }
}

/// The trigger rule: a newly opened issue carrying the required label.
#[derive(Debug, Clone)]
pub struct EventFilter {
    required_label: String,
    matching: LabelMatch,
}

impl EventFilter {
    pub fn new(required_label: impl Into<String>, matching: LabelMatch) -> Self {
        Self {
            required_label: required_label.into(),
            matching,
        }
    }

    pub fn required_label(&self) -> &str {
        &self.required_label
    }

    pub fn should_process(&self, event: &IssueEvent) -> bool {
        if event.action != IssueAction::Opened {
            return false;
        }
        match self.matching {
            LabelMatch::Exact => event.labels.contains(&self.required_label),
            m => event
                .labels
                .iter()
                .any(|label| m.matches(label, &self.required_label)),
        }
    }
}

/// Exact-match form of [`EventFilter::should_process`].
pub fn should_process(event: &IssueEvent, required_label: &str) -> bool {
    EventFilter::new(required_label, LabelMatch::Exact).should_process(event)
}
