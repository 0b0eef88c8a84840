//! Canonical activity selection for pull request review threads.
//!
//! One pull request owns many activities, one per build. The oldest build
//! carries the durable identity of the review thread; the newest decides
//! whether an incoming event is stale.

use crate::activity::{build_number, PipelineActivity};
use crate::error::NotifyResult;

/// Activities of one pull request ordered by build number, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalActivities {
    all: Vec<PipelineActivity>,
}

impl CanonicalActivities {
    /// Canonical entity for durable annotation writes.
    pub fn oldest(&self) -> Option<&PipelineActivity> {
        self.all.first()
    }

    /// Comparison entity for staleness.
    pub fn newest(&self) -> Option<&PipelineActivity> {
        self.all.last()
    }

    pub fn all(&self) -> &[PipelineActivity] {
        &self.all
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Sorts by build number. Equal build numbers keep their input order; an
/// unparseable build number fails the whole set.
pub fn canonicalize(activities: Vec<PipelineActivity>) -> NotifyResult<CanonicalActivities> {
    let mut keyed = activities
        .into_iter()
        .map(|activity| Ok((build_number(&activity)?, activity)))
        .collect::<NotifyResult<Vec<_>>>()?;
    keyed.sort_by_key(|(build, _)| *build);
    Ok(CanonicalActivities {
        all: keyed.into_iter().map(|(_, activity)| activity).collect(),
    })
}

/// True unless `incoming` is an older build than `newest`.
pub fn should_process(
    incoming: &PipelineActivity,
    newest: Option<&PipelineActivity>,
) -> NotifyResult<bool> {
    let incoming_build = build_number(incoming)?;
    let Some(newest) = newest else {
        return Ok(true);
    };
    Ok(incoming_build >= build_number(newest)?)
}
