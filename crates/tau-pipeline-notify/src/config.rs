//! Notification routing configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::status_catalog::StatusOverrides;

pub const NOTIFY_CONFIG_SCHEMA_VERSION: u32 = 1;

/// Which pipeline runs get a channel status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineNotifyMode {
    #[default]
    All,
    Release,
    PullRequest,
    None,
}

impl PipelineNotifyMode {
    pub fn allows(self, pull_request: Option<u64>) -> bool {
        match self {
            Self::All => true,
            Self::Release => pull_request.is_none(),
            Self::PullRequest => pull_request.is_some(),
            Self::None => false,
        }
    }
}

/// Chat settings for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub disable: bool,
    #[serde(default)]
    pub direct_message: bool,
    #[serde(default)]
    pub notify_reviewers: bool,
    #[serde(default)]
    pub ignore_labels: Vec<String>,
    #[serde(default)]
    pub pipeline: PipelineNotifyMode,
    /// Review state follows the `lgtm` label instead of `approved`.
    #[serde(default)]
    pub lgtm_repo: bool,
}

impl ChannelConfig {
    pub fn is_active(&self) -> bool {
        !self.disable && !self.channel.trim().is_empty()
    }

    /// Channel name with exactly one leading `#`.
    pub fn channel_name(&self) -> String {
        let channel = self.channel.trim();
        if channel.starts_with('#') {
            channel.to_string()
        } else {
            format!("#{channel}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub repository: String,
    pub slack: ChannelConfig,
}

/// Resolves chat settings for a repository.
pub trait ConfigSource: Send + Sync {
    fn channel_config(&self, owner: &str, repository: &str) -> Option<ChannelConfig>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub default: Option<ChannelConfig>,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub statuses: StatusOverrides,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            schema_version: NOTIFY_CONFIG_SCHEMA_VERSION,
            default: None,
            repositories: Vec::new(),
            statuses: StatusOverrides::new(),
        }
    }
}

impl NotifyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read notify config {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed to load notify config {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed =
            serde_json::from_str::<Self>(raw).context("failed to parse notify config json")?;
        if parsed.schema_version != NOTIFY_CONFIG_SCHEMA_VERSION {
            bail!(
                "unsupported notify config schema_version {} (expected {})",
                parsed.schema_version,
                NOTIFY_CONFIG_SCHEMA_VERSION
            );
        }
        for repository in &parsed.repositories {
            if repository.owner.trim().is_empty() || repository.repository.trim().is_empty() {
                bail!("notify config repository entries require owner and repository");
            }
        }
        Ok(parsed)
    }
}

impl ConfigSource for NotifyConfig {
    fn channel_config(&self, owner: &str, repository: &str) -> Option<ChannelConfig> {
        self.repositories
            .iter()
            .find(|entry| {
                entry.owner.eq_ignore_ascii_case(owner)
                    && entry.repository.eq_ignore_ascii_case(repository)
            })
            .map(|entry| entry.slack.clone())
            .or_else(|| self.default.clone())
    }
}
