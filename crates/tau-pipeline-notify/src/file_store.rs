//! JSON-file backed activity store used by the CLI.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::activity::PipelineActivity;
use crate::collaborators::ActivityStore;
use crate::memory_store::activity_matches_pull_request;

pub const ACTIVITY_STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActivityStoreFile {
    schema_version: u32,
    #[serde(default)]
    activities: Vec<PipelineActivity>,
}

impl Default for ActivityStoreFile {
    fn default() -> Self {
        Self {
            schema_version: ACTIVITY_STORE_SCHEMA_VERSION,
            activities: Vec::new(),
        }
    }
}

/// Activity records persisted as one JSON document; every annotation patch
/// rewrites the file through a temp file and rename.
pub struct FileActivityStore {
    path: PathBuf,
    state: Mutex<ActivityStoreFile>,
}

impl FileActivityStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read activity store {}", path.display()))?;
            serde_json::from_str::<ActivityStoreFile>(&raw)
                .with_context(|| format!("failed to parse activity store {}", path.display()))?
        } else {
            ActivityStoreFile::default()
        };
        if state.schema_version != ACTIVITY_STORE_SCHEMA_VERSION {
            bail!(
                "unsupported activity store schema: expected {}, found {}",
                ACTIVITY_STORE_SCHEMA_VERSION,
                state.schema_version
            );
        }
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts or replaces an activity and saves the file.
    pub async fn upsert(&self, activity: PipelineActivity) -> Result<()> {
        let mut state = self.state.lock().await;
        match state
            .activities
            .iter_mut()
            .find(|existing| existing.name == activity.name)
        {
            Some(existing) => *existing = activity,
            None => state.activities.push(activity),
        }
        save_state(&self.path, &state)
    }
}

fn save_state(path: &Path, state: &ActivityStoreFile) -> Result<()> {
    let mut payload =
        serde_json::to_string_pretty(state).context("failed to serialize activity store")?;
    payload.push('\n');
    write_text_atomic(path, &payload)
        .with_context(|| format!("failed to write activity store {}", path.display()))
}

fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("activities.json");
    let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", std::process::id()));
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })
}

#[async_trait]
impl ActivityStore for FileActivityStore {
    async fn get_activity(&self, name: &str) -> Result<Option<PipelineActivity>> {
        let state = self.state.lock().await;
        Ok(state
            .activities
            .iter()
            .find(|activity| activity.name == name)
            .cloned())
    }

    async fn find_activities(
        &self,
        owner: &str,
        repository: &str,
        pull_request: u64,
    ) -> Result<Vec<PipelineActivity>> {
        let state = self.state.lock().await;
        Ok(state
            .activities
            .iter()
            .filter(|activity| {
                activity_matches_pull_request(activity, owner, repository, pull_request)
            })
            .cloned()
            .collect())
    }

    async fn patch_annotation(&self, activity_name: &str, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let activity = state
            .activities
            .iter_mut()
            .find(|activity| activity.name == activity_name)
            .ok_or_else(|| anyhow!("pipeline activity '{activity_name}' not found"))?;
        let previous = activity
            .annotations
            .insert(key.to_string(), value.to_string());
        if let Err(error) = save_state(&self.path, &state) {
            if let Some(activity) = state
                .activities
                .iter_mut()
                .find(|activity| activity.name == activity_name)
            {
                match previous {
                    Some(previous) => activity.annotations.insert(key.to_string(), previous),
                    None => activity.annotations.remove(key),
                };
            }
            return Err(error);
        }
        Ok(())
    }
}
