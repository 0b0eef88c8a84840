//! Pipeline activity records and the values derived from them.
//!
//! A `PipelineActivity` is owned by the resource store. This crate only reads
//! it and adds identity annotations through `ActivityStore::patch_annotation`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::PullRequest;
use crate::error::{NotifyError, NotifyResult};

const DEFAULT_BRANCH: &str = "master";
const PULL_REQUEST_BRANCH_PREFIX: &str = "pr-";

/// Build status reported by the pipeline engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Error,
    Aborted,
    NotExecuted,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Aborted => "aborted",
            Self::NotExecuted => "not_executed",
        }
    }
}

/// One stage or promotion step of a pipeline run, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityStep {
    Stage {
        name: String,
        #[serde(default)]
        status: Option<ActivityStatus>,
    },
    Promote {
        environment: String,
        #[serde(default)]
        status: Option<ActivityStatus>,
    },
}

impl ActivityStep {
    pub fn status(&self) -> Option<ActivityStatus> {
        match self {
            Self::Stage { status, .. } | Self::Promote { status, .. } => *status,
        }
    }
}

/// A single build attempt as stored by the resource store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineActivity {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub git_owner: String,
    #[serde(default)]
    pub git_repository: String,
    #[serde(default)]
    pub git_url: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub pipeline: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub build_url: String,
    #[serde(default)]
    pub status: Option<ActivityStatus>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<ActivityStep>,
}

impl PipelineActivity {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub(crate) fn ensure_named(&self) -> NotifyResult<()> {
        if self.name.trim().is_empty() {
            return Err(NotifyError::EmptyActivityName);
        }
        Ok(())
    }
}

/// Repository coordinates derived from an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDetails {
    pub owner: String,
    pub repository: String,
    pub branch: String,
    pub pipeline: String,
    pub build: String,
}

impl PipelineDetails {
    /// Fills gaps in owner/repository/branch from the `owner/repo/branch`
    /// pipeline path when the activity does not carry them directly.
    pub fn from_activity(activity: &PipelineActivity) -> Self {
        let mut owner = activity.git_owner.clone();
        let mut repository = activity.git_repository.clone();
        let mut branch = String::new();
        let mut pipeline = activity.pipeline.clone();

        let segments = pipeline.split('/').collect::<Vec<_>>();
        if segments.len() > 2 {
            if owner.is_empty() {
                owner = segments[0].to_string();
            }
            if repository.is_empty() {
                repository = segments[1].to_string();
            }
            branch = segments[2].to_string();
        }
        if branch.is_empty() {
            branch = activity.branch.trim().to_string();
        }
        if branch.is_empty() {
            branch = DEFAULT_BRANCH.to_string();
        }
        if pipeline.is_empty() && !owner.is_empty() && !repository.is_empty() {
            pipeline = format!("{owner}/{repository}/{branch}");
        }

        Self {
            owner,
            repository,
            branch,
            pipeline,
            build: activity.build.clone(),
        }
    }

    pub fn repository_path(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

/// Returns the pull request number for `pr-<n>` branches (case-insensitive),
/// `None` for any other branch.
pub fn pull_request_number(activity: &PipelineActivity) -> NotifyResult<Option<u64>> {
    let details = PipelineDetails::from_activity(activity);
    let branch = details.branch.to_ascii_lowercase();
    let Some(raw) = branch.strip_prefix(PULL_REQUEST_BRANCH_PREFIX) else {
        return Ok(None);
    };
    let number = raw
        .parse::<u64>()
        .map_err(|_| NotifyError::InvalidPullRequestNumber {
            activity: activity.name.clone(),
            branch: details.branch.clone(),
        })?;
    Ok((number > 0).then_some(number))
}

/// Parses the activity build number. Non-numeric values are a hard error.
pub fn build_number(activity: &PipelineActivity) -> NotifyResult<u64> {
    activity
        .build
        .trim()
        .parse::<u64>()
        .map_err(|_| NotifyError::InvalidBuildNumber {
            activity: activity.name.clone(),
            value: activity.build.clone(),
        })
}

/// Overall status of a run: `Succeeded` is final, otherwise the status of the
/// last step that reports one wins over the activity's own status.
pub fn effective_status(activity: &PipelineActivity) -> Option<ActivityStatus> {
    if activity.status == Some(ActivityStatus::Succeeded) {
        return activity.status;
    }
    activity
        .steps
        .iter()
        .fold(activity.status, |current, step| step.status().or(current))
}

/// Latest of the pull request update time and the activity start/completion times.
pub fn last_updated(
    pull_request: Option<&PullRequest>,
    activity: &PipelineActivity,
) -> Option<DateTime<Utc>> {
    [
        pull_request.and_then(|pr| pr.updated_at),
        activity.started_at,
        activity.completed_at,
    ]
    .into_iter()
    .flatten()
    .max()
}

/// `owner/name` coordinates of a hosted git repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepoRef {
    pub owner: String,
    pub name: String,
}

impl GitRepoRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Extracts `owner/name` from https (`https://host/owner/name.git`) and
/// scp-style (`git@host:owner/name.git`) clone URLs.
pub fn parse_git_url(raw: &str) -> Option<GitRepoRef> {
    let trimmed = raw.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let path = if let Some((_, rest)) = trimmed.split_once("://") {
        rest.split_once('/').map(|(_, path)| path)?
    } else {
        trimmed.split_once(':').map(|(_, path)| path)?
    };
    let mut segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    if segments.len() < 2 {
        return None;
    }
    let name = segments.pop()?.to_string();
    Some(GitRepoRef {
        owner: segments.join("/"),
        name,
    })
}
