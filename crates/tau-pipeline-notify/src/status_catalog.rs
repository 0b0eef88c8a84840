//! Symbol and label table for notification outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named outcome rendered into a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Merged,
    Closed,
    Aborted,
    Errored,
    Failed,
    Approved,
    NotApproved,
    NeedsOkToTest,
    Hold,
    Pending,
    Running,
    Succeeded,
    Lgtm,
    Unknown,
}

impl Outcome {
    pub const ALL: [Outcome; 14] = [
        Self::Merged,
        Self::Closed,
        Self::Aborted,
        Self::Errored,
        Self::Failed,
        Self::Approved,
        Self::NotApproved,
        Self::NeedsOkToTest,
        Self::Hold,
        Self::Pending,
        Self::Running,
        Self::Succeeded,
        Self::Lgtm,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
            Self::Errored => "errored",
            Self::Failed => "failed",
            Self::Approved => "approved",
            Self::NotApproved => "not_approved",
            Self::NeedsOkToTest => "needs_ok_to_test",
            Self::Hold => "hold",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Lgtm => "lgtm",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true for pull request states that end the review thread.
    pub fn is_terminal_review_state(self) -> bool {
        matches!(self, Self::Merged | Self::Closed)
    }

    fn default_status(self) -> Status {
        let (symbol, label) = match self {
            Self::Merged => (":purple_heart:", "merged"),
            Self::Closed => (":closed_book:", "closed and not merged"),
            Self::Aborted => (":red_circle:", "build aborted"),
            Self::Errored => (":red_circle:", "build errored"),
            Self::Failed => (":red_circle:", "build failed"),
            Self::Approved => (":+1:", "approved"),
            Self::NotApproved => (":wave:", "not approved"),
            Self::NeedsOkToTest => (":wave:", "needs /ok-to-test"),
            Self::Hold => (":octagonal_sign:", "hold"),
            Self::Pending => (":question:", "build pending"),
            Self::Running => (":white_circle:", "build running"),
            Self::Succeeded => (":white_check_mark:", "build succeeded"),
            Self::Lgtm => (":+1:", "lgtm"),
            Self::Unknown => (":grey_question:", ""),
        };
        Status::new(symbol, label)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Symbol and label shown for an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub symbol: String,
    #[serde(default)]
    pub label: String,
}

impl Status {
    pub fn new(symbol: &str, label: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            label: label.to_string(),
        }
    }

    /// `"<symbol> <label>"`, trimmed when the label is empty.
    pub fn render(&self) -> String {
        format!("{} {}", self.symbol, self.label).trim().to_string()
    }
}

/// Partial caller-supplied replacements keyed by outcome.
pub type StatusOverrides = BTreeMap<Outcome, Status>;

/// Picks the override when one is configured, the default otherwise.
pub fn resolve_status(override_status: Option<&Status>, default_status: &Status) -> Status {
    override_status.unwrap_or(default_status).clone()
}

/// Total lookup table with an entry for every `Outcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCatalog {
    entries: Vec<Status>,
}

impl StatusCatalog {
    pub fn new(overrides: &StatusOverrides) -> Self {
        let entries = Outcome::ALL
            .iter()
            .map(|outcome| resolve_status(overrides.get(outcome), &outcome.default_status()))
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, outcome: Outcome) -> &Status {
        &self.entries[outcome.index()]
    }
}

impl Default for StatusCatalog {
    fn default() -> Self {
        Self::new(&StatusOverrides::new())
    }
}
