//! Two-tier message identity store.
//!
//! The durable tier is an annotation on the canonical pipeline activity,
//! `<prefix>-<kind>/<channel>` = `<channel-id>/<timestamp>`. The volatile tier is
//! a process-wide [`MessageCache`] that covers the window between a successful
//! post and the annotation write-back. A well-formed annotation always wins.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::activity::PipelineActivity;
use crate::collaborators::ActivityStore;
use crate::error::TargetFailure;

/// Annotation prefix shared with previously deployed notifiers.
pub const SLACK_ANNOTATION_PREFIX: &str = "bot.slack.apps.jenkins-x.io";

/// Discriminates the two notification families so they never share a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Pipeline,
    PullRequestReview,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::PullRequestReview => "pr",
        }
    }
}

/// Location of a message that was already posted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageReference {
    pub channel_id: String,
    pub timestamp: String,
}

impl MessageReference {
    pub fn new(channel_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn to_annotation_value(&self) -> String {
        format!("{}/{}", self.channel_id, self.timestamp)
    }

    /// Splits on the first `/`. Both halves must be non-empty.
    pub fn parse_annotation_value(raw: &str) -> Option<Self> {
        let (channel_id, timestamp) = raw.split_once('/')?;
        if channel_id.is_empty() || timestamp.is_empty() {
            return None;
        }
        Some(Self::new(channel_id, timestamp))
    }
}

/// Builds `<prefix>-<kind>/<channel without one leading '#'>`.
pub fn annotation_key(prefix: &str, channel: &str, kind: MessageKind) -> String {
    let channel = channel.strip_prefix('#').unwrap_or(channel);
    format!("{prefix}-{}/{channel}", kind.as_str())
}

/// State of the durable identity slot on one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationSlot {
    Absent,
    Present(MessageReference),
    Malformed(String),
}

pub fn read_annotation(activity: &PipelineActivity, key: &str) -> AnnotationSlot {
    match activity.annotation(key) {
        None => AnnotationSlot::Absent,
        Some(raw) if raw.is_empty() => AnnotationSlot::Absent,
        Some(raw) => match MessageReference::parse_annotation_value(raw) {
            Some(reference) => AnnotationSlot::Present(reference),
            None => AnnotationSlot::Malformed(raw.to_string()),
        },
    }
}

/// Cache key: target channel, logical entity and message kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub channel: String,
    pub entity: String,
    pub kind: MessageKind,
}

impl IdentityKey {
    pub fn new(channel: &str, entity: &str, kind: MessageKind) -> Self {
        Self {
            channel: channel.to_string(),
            entity: entity.to_string(),
            kind,
        }
    }
}

/// Process-lifetime cache of posted message references.
#[derive(Debug, Default)]
pub struct MessageCache {
    entries: RwLock<HashMap<IdentityKey, MessageReference>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &IdentityKey) -> Option<MessageReference> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: IdentityKey, reference: MessageReference) {
        self.entries.write().await.insert(key, reference);
    }
}

/// Per-target results of an annotation write-back.
#[derive(Debug, Default)]
pub struct WriteBackReport {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    pub failures: Vec<TargetFailure>,
}

impl WriteBackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Durable annotations plus the volatile cache.
#[derive(Debug)]
pub struct IdentityStore {
    prefix: String,
    cache: Arc<MessageCache>,
}

impl IdentityStore {
    pub fn new(cache: Arc<MessageCache>) -> Self {
        Self::with_prefix(SLACK_ANNOTATION_PREFIX, cache)
    }

    pub fn with_prefix(prefix: &str, cache: Arc<MessageCache>) -> Self {
        Self {
            prefix: prefix.to_string(),
            cache,
        }
    }

    pub fn key_for(&self, channel: &str, kind: MessageKind) -> String {
        annotation_key(&self.prefix, channel, kind)
    }

    /// Annotation on `entity` first, then the cache, then nothing.
    pub async fn lookup(
        &self,
        channel: &str,
        entity: &PipelineActivity,
        kind: MessageKind,
    ) -> Option<MessageReference> {
        let key = self.key_for(channel, kind);
        match read_annotation(entity, &key) {
            AnnotationSlot::Present(reference) => {
                tracing::debug!(
                    activity = %entity.name,
                    annotation = %key,
                    channel_id = %reference.channel_id,
                    timestamp = %reference.timestamp,
                    "message reference found on annotation"
                );
                return Some(reference);
            }
            AnnotationSlot::Malformed(raw) => {
                tracing::warn!(
                    activity = %entity.name,
                    annotation = %key,
                    value = %raw,
                    "ignoring malformed message reference annotation"
                );
            }
            AnnotationSlot::Absent => {
                tracing::debug!(
                    activity = %entity.name,
                    annotation = %key,
                    "no message reference annotation"
                );
            }
        }
        self.cache
            .get(&IdentityKey::new(channel, &entity.name, kind))
            .await
    }

    /// Overwrites the cached reference. Call right after every successful post.
    pub async fn record(
        &self,
        channel: &str,
        entity_name: &str,
        kind: MessageKind,
        reference: MessageReference,
    ) {
        self.cache
            .set(IdentityKey::new(channel, entity_name, kind), reference)
            .await;
    }

    /// Writes `key=value` onto every target not already carrying it. A failed
    /// target does not stop the remaining ones.
    pub async fn write_back(
        &self,
        store: &dyn ActivityStore,
        key: &str,
        value: &str,
        targets: &[PipelineActivity],
    ) -> WriteBackReport {
        let mut report = WriteBackReport::default();
        for target in targets {
            if target.annotation(key) == Some(value) {
                report.unchanged.push(target.name.clone());
                continue;
            }
            match store.patch_annotation(&target.name, key, value).await {
                Ok(()) => report.written.push(target.name.clone()),
                Err(error) => {
                    tracing::warn!(
                        activity = %target.name,
                        annotation = %key,
                        error = %format!("{error:#}"),
                        "failed to write message reference annotation"
                    );
                    report
                        .failures
                        .push(TargetFailure::new(&target.name, "annotate activity", error));
                }
            }
        }
        report
    }
}
