use chrono::{DateTime, Duration, Utc};

use crate::identity_store::MessageReference;
use crate::status_catalog::Outcome;

/// Pipeline messages are no longer created once their last update is older than this.
pub const PIPELINE_CREATE_WINDOW_HOURS: i64 = 24;

/// What to do with the chat message for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAction {
    /// Edit the existing message in place.
    Update(MessageReference),
    Create,
    Suppress,
}

impl PostAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::Create => "create",
            Self::Suppress => "suppress",
        }
    }
}

pub fn decide(existing: Option<MessageReference>, create_if_missing: bool) -> PostAction {
    match existing {
        Some(reference) => PostAction::Update(reference),
        None if create_if_missing => PostAction::Create,
        None => PostAction::Suppress,
    }
}

/// False when the activity has no timestamps or was last touched more than
/// [`PIPELINE_CREATE_WINDOW_HOURS`] before `now`.
pub fn pipeline_create_if_missing(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let cutoff = now - Duration::hours(PIPELINE_CREATE_WINDOW_HOURS);
    matches!(last_updated, Some(updated) if updated >= cutoff)
}

/// A merged or closed pull request never gets a fresh review thread.
pub fn review_create_if_missing(build_outcome: Outcome) -> bool {
    !build_outcome.is_terminal_review_state()
}
