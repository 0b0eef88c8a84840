use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::activity::{pull_request_number, PipelineActivity, PipelineDetails};
use crate::collaborators::ActivityStore;

/// In-memory implementation for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryActivityStore {
    activities: RwLock<BTreeMap<String, PipelineActivity>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, activity: PipelineActivity) {
        self.activities
            .write()
            .await
            .insert(activity.name.clone(), activity);
    }

    pub async fn get(&self, name: &str) -> Option<PipelineActivity> {
        self.activities.read().await.get(name).cloned()
    }
}

/// True when `activity` was built for `owner/repository` pull request `number`.
pub(crate) fn activity_matches_pull_request(
    activity: &PipelineActivity,
    owner: &str,
    repository: &str,
    number: u64,
) -> bool {
    let details = PipelineDetails::from_activity(activity);
    details.owner.eq_ignore_ascii_case(owner)
        && details.repository.eq_ignore_ascii_case(repository)
        && matches!(pull_request_number(activity), Ok(Some(found)) if found == number)
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn get_activity(&self, name: &str) -> Result<Option<PipelineActivity>> {
        Ok(self.get(name).await)
    }

    async fn find_activities(
        &self,
        owner: &str,
        repository: &str,
        pull_request: u64,
    ) -> Result<Vec<PipelineActivity>> {
        Ok(self
            .activities
            .read()
            .await
            .values()
            .filter(|activity| {
                activity_matches_pull_request(activity, owner, repository, pull_request)
            })
            .cloned()
            .collect())
    }

    async fn patch_annotation(&self, activity_name: &str, key: &str, value: &str) -> Result<()> {
        let mut activities = self.activities.write().await;
        let activity = activities
            .get_mut(activity_name)
            .ok_or_else(|| anyhow!("pipeline activity '{activity_name}' not found"))?;
        activity
            .annotations
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryActivityStore;
    use crate::activity::test_support::{pr_activity, release_activity};
    use crate::collaborators::ActivityStore;

    #[tokio::test]
    async fn functional_find_activities_matches_owner_repository_and_pull_request() {
        let store = InMemoryActivityStore::new();
        store.insert(pr_activity("pr7-1", 7, "1")).await;
        store.insert(pr_activity("pr7-2", 7, "2")).await;
        store.insert(pr_activity("pr8-1", 8, "1")).await;
        store.insert(release_activity("main-4", "4")).await;

        let found = store
            .find_activities("Acme", "widgets", 7)
            .await
            .expect("find");
        let names = found.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["pr7-1", "pr7-2"]);
    }

    #[tokio::test]
    async fn unit_patch_annotation_requires_existing_activity() {
        let store = InMemoryActivityStore::new();
        let error = store
            .patch_annotation("missing", "k", "v")
            .await
            .expect_err("missing activity");
        assert_eq!(error.to_string(), "pipeline activity 'missing' not found");

        store.insert(pr_activity("a1", 1, "1")).await;
        store.patch_annotation("a1", "k", "v").await.expect("patch");
        let activity = store.get("a1").await.expect("activity");
        assert_eq!(activity.annotation("k"), Some("v"));
    }
}
