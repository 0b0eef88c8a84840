//! Review and build outcome derivation.

use crate::activity::{ActivityStatus, PipelineActivity};
use crate::collaborators::PullRequest;
use crate::status_catalog::Outcome;

pub const LABEL_LGTM: &str = "lgtm";
pub const LABEL_APPROVED: &str = "approved";
pub const LABEL_HOLD: &str = "do-not-merge/hold";
pub const LABEL_NEEDS_OK_TO_TEST: &str = "needs-ok-to-test";

/// Review state from pull request labels. Later rules override earlier ones:
/// approval, then hold, then needs-ok-to-test.
pub fn review_outcome(pull_request: &PullRequest, lgtm_repo: bool) -> Outcome {
    let mut outcome = Outcome::NotApproved;
    if lgtm_repo {
        if pull_request.has_label(LABEL_LGTM) {
            outcome = Outcome::Lgtm;
        }
    } else if pull_request.has_label(LABEL_APPROVED) {
        outcome = Outcome::Approved;
    }
    if pull_request.has_label(LABEL_HOLD) {
        outcome = Outcome::Hold;
    }
    if pull_request.has_label(LABEL_NEEDS_OK_TO_TEST) {
        outcome = Outcome::NeedsOkToTest;
    }
    outcome
}

/// Build state shown on the review thread: the pull request's terminal state
/// first, then the activity status.
pub fn build_outcome(pull_request: Option<&PullRequest>, activity: &PipelineActivity) -> Outcome {
    if let Some(pull_request) = pull_request {
        if pull_request.merged {
            return Outcome::Merged;
        }
        if pull_request.closed {
            return Outcome::Closed;
        }
    }
    activity_outcome(activity.status)
}

pub fn activity_outcome(status: Option<ActivityStatus>) -> Outcome {
    match status {
        Some(ActivityStatus::Pending) => Outcome::Pending,
        Some(ActivityStatus::Running) => Outcome::Running,
        Some(ActivityStatus::Succeeded) => Outcome::Succeeded,
        Some(ActivityStatus::Failed) => Outcome::Failed,
        Some(ActivityStatus::Error) => Outcome::Errored,
        Some(ActivityStatus::Aborted) => Outcome::Aborted,
        Some(ActivityStatus::NotExecuted) | None => Outcome::Unknown,
    }
}
