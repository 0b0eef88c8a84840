//! Contracts for the systems the coordinator talks to.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::PipelineActivity;
use crate::composer::NotificationContent;
use crate::identity_store::MessageReference;

/// A user on the git hosting side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitUser {
    pub login: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Pull request metadata used for filtering, outcome derivation and routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    pub author: GitUser,
    #[serde(default)]
    pub reviewers: Vec<GitUser>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label == name)
    }

    /// Labels of this pull request that appear in `ignored`.
    pub fn matching_labels<'a>(&'a self, ignored: &[String]) -> Vec<&'a str> {
        self.labels
            .iter()
            .filter(|label| ignored.contains(label))
            .map(String::as_str)
            .collect()
    }
}

/// A user on the chat side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Store holding pipeline activity records.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get_activity(&self, name: &str) -> Result<Option<PipelineActivity>>;

    /// All activities built for `owner/repository` pull request `pull_request`.
    async fn find_activities(
        &self,
        owner: &str,
        repository: &str,
        pull_request: u64,
    ) -> Result<Vec<PipelineActivity>>;

    async fn patch_annotation(&self, activity_name: &str, key: &str, value: &str) -> Result<()>;
}

/// Chat backend that creates and edits messages.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post(
        &self,
        channel_id: &str,
        content: &NotificationContent,
    ) -> Result<MessageReference>;

    async fn update(
        &self,
        reference: &MessageReference,
        content: &NotificationContent,
    ) -> Result<MessageReference>;

    /// Opens (or reuses) the direct-message channel with `user_id`.
    async fn open_direct_channel(&self, user_id: &str) -> Result<String>;
}

/// Git hosting API.
#[async_trait]
pub trait GitHost: Send + Sync {
    async fn find_pull_request(&self, repo_full_name: &str, number: u64) -> Result<PullRequest>;
}

/// Maps git identities onto chat identities. Unknown users resolve to `None`.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, user: &GitUser) -> Result<Option<ChatUser>>;
}
