//! Reconciles one pipeline activity event into chat messages.
//!
//! Each event is routed to one or more targets (a channel, or a user's direct
//! messages). For every target the coordinator looks up the existing message
//! identity, decides between update, create and suppress, performs the chat
//! call, caches the resulting reference and writes it back onto the durable
//! annotation targets. Failures of individual targets are collected and
//! reported together once every target has been attempted.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::activity::{
    build_number, last_updated, parse_git_url, pull_request_number, PipelineActivity,
    PipelineDetails,
};
use crate::canonicalize::{canonicalize, should_process};
use crate::collaborators::{
    ActivityStore, ChatTransport, ChatUser, GitHost, GitUser, PullRequest, UserResolver,
};
use crate::composer::{ComposeContext, DefaultComposer, MessageComposer, NotificationContent};
use crate::config::{ChannelConfig, ConfigSource};
use crate::error::{NotifyError, NotifyResult, TargetFailure};
use crate::identity_store::{IdentityStore, MessageCache, MessageKind, MessageReference};
use crate::outcomes::build_outcome;
use crate::posting::{decide, pipeline_create_if_missing, review_create_if_missing, PostAction};
use crate::status_catalog::StatusCatalog;

/// Which notification families to reconcile for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKinds {
    Pipeline,
    Review,
    All,
}

impl NotifyKinds {
    fn includes(self, kind: MessageKind) -> bool {
        match self {
            Self::All => true,
            Self::Pipeline => kind == MessageKind::Pipeline,
            Self::Review => kind == MessageKind::PullRequestReview,
        }
    }
}

/// Where one message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Channel name including its leading `#`.
    Channel(String),
    /// Chat user id; the direct channel is opened only when posting fresh.
    DirectMessage(String),
}

impl DeliveryTarget {
    /// Identifier used in the annotation key and the cache key.
    pub fn key(&self) -> &str {
        match self {
            Self::Channel(channel) => channel,
            Self::DirectMessage(user_id) => user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAction {
    Created(MessageReference),
    Updated(MessageReference),
    Suppressed,
    Skipped(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub target: String,
    pub action: TargetAction,
}

impl TargetOutcome {
    fn new(target: impl Into<String>, action: TargetAction) -> Self {
        Self {
            target: target.into(),
            action,
        }
    }
}

/// Result of reconciling one notification kind for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No active chat configuration for the repository.
    NotConfigured,
    /// Review notifications only exist for pull request builds.
    NotPullRequest,
    /// The pull request carries one of the configured ignore labels.
    IgnoredLabels(Vec<String>),
    /// A newer build of the same pull request has already been seen.
    Stale { build: u64, newest: u64 },
    Processed(Vec<TargetOutcome>),
}

/// External systems the coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<dyn ConfigSource>,
    pub store: Arc<dyn ActivityStore>,
    pub transport: Arc<dyn ChatTransport>,
    pub git_host: Arc<dyn GitHost>,
    pub users: Arc<dyn UserResolver>,
}

#[derive(Default)]
struct DeliveryReport {
    outcomes: Vec<TargetOutcome>,
    failures: Vec<TargetFailure>,
}

impl DeliveryReport {
    fn finish(self, activity: &PipelineActivity) -> NotifyResult<NotifyOutcome> {
        if self.failures.is_empty() {
            return Ok(NotifyOutcome::Processed(self.outcomes));
        }
        Err(NotifyError::Targets {
            activity: activity.name.clone(),
            failures: self.failures,
        })
    }
}

/// One message, the entity that owns its identity and the activities that
/// receive its annotation.
struct Delivery<'a> {
    kind: MessageKind,
    entity: &'a PipelineActivity,
    annotate: &'a [PipelineActivity],
    content: &'a NotificationContent,
    create_if_missing: bool,
}

pub struct NotificationCoordinator {
    collaborators: Collaborators,
    composer: Arc<dyn MessageComposer>,
    catalog: StatusCatalog,
    identity: IdentityStore,
    clock: fn() -> DateTime<Utc>,
}

impl NotificationCoordinator {
    /// `cache` should be shared by every coordinator in the process.
    pub fn new(collaborators: Collaborators, cache: Arc<MessageCache>) -> Self {
        Self {
            collaborators,
            composer: Arc::new(DefaultComposer),
            catalog: StatusCatalog::default(),
            identity: IdentityStore::new(cache),
            clock: Utc::now,
        }
    }

    pub fn with_composer(mut self, composer: Arc<dyn MessageComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_catalog(mut self, catalog: StatusCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_identity_store(mut self, identity: IdentityStore) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the selected notification kinds in order, pipeline first.
    pub async fn notify(
        &self,
        activity: &PipelineActivity,
        kinds: NotifyKinds,
    ) -> Vec<(MessageKind, NotifyResult<NotifyOutcome>)> {
        let mut results = Vec::with_capacity(2);
        if kinds.includes(MessageKind::Pipeline) {
            results.push((MessageKind::Pipeline, self.pipeline_message(activity).await));
        }
        if kinds.includes(MessageKind::PullRequestReview) {
            results.push((
                MessageKind::PullRequestReview,
                self.review_request_message(activity).await,
            ));
        }
        results
    }

    /// Posts or updates the status message of one pipeline run.
    pub async fn pipeline_message(
        &self,
        activity: &PipelineActivity,
    ) -> NotifyResult<NotifyOutcome> {
        activity.ensure_named()?;
        let details = PipelineDetails::from_activity(activity);
        let Some(config) = self.active_config(&details) else {
            tracing::debug!(activity = %activity.name, "no active chat config, skipping pipeline message");
            return Ok(NotifyOutcome::NotConfigured);
        };
        let number = pull_request_number(activity)?;
        let pull_request = match number {
            Some(number) => Some(self.fetch_pull_request(activity, number).await?),
            None => None,
        };
        if let Some(ignored) = ignored_labels(pull_request.as_ref(), &config) {
            tracing::info!(
                activity = %activity.name,
                labels = %ignored.join(","),
                "pull request carries ignored labels, skipping pipeline message"
            );
            return Ok(NotifyOutcome::IgnoredLabels(ignored));
        }

        let content = self.compose(
            MessageKind::Pipeline,
            activity,
            pull_request.as_ref(),
            None,
            &[],
            &config,
        )?;
        let create_if_missing =
            pipeline_create_if_missing(last_updated(None, activity), (self.clock)());
        let delivery = Delivery {
            kind: MessageKind::Pipeline,
            entity: activity,
            annotate: std::slice::from_ref(activity),
            content: &content,
            create_if_missing,
        };

        let mut report = DeliveryReport::default();
        if config.pipeline.allows(number) {
            self.deliver(
                &DeliveryTarget::Channel(config.channel_name()),
                &delivery,
                &mut report,
            )
            .await;
        } else {
            report.outcomes.push(TargetOutcome::new(
                config.channel_name(),
                TargetAction::Skipped("pipeline mode excludes this run"),
            ));
        }

        if config.direct_message {
            if let Some(pull_request) = &pull_request {
                match self.resolve_user(&pull_request.author).await {
                    Ok(Some(author)) => {
                        let target = DeliveryTarget::DirectMessage(author.id);
                        self.deliver(&target, &delivery, &mut report).await;
                    }
                    Ok(None) => report.outcomes.push(TargetOutcome::new(
                        pull_request.author.login.clone(),
                        TargetAction::Skipped("author has no chat account"),
                    )),
                    Err(error) => report.failures.push(TargetFailure::new(
                        pull_request.author.login.clone(),
                        "resolve user",
                        error.into(),
                    )),
                }
            }
        }
        report.finish(activity)
    }

    /// Posts or updates the review request thread of a pull request. The
    /// thread identity lives on the oldest build; older events than the newest
    /// known build are dropped.
    pub async fn review_request_message(
        &self,
        activity: &PipelineActivity,
    ) -> NotifyResult<NotifyOutcome> {
        activity.ensure_named()?;
        let Some(number) = pull_request_number(activity)? else {
            return Ok(NotifyOutcome::NotPullRequest);
        };
        let details = PipelineDetails::from_activity(activity);
        let Some(config) = self.active_config(&details) else {
            tracing::debug!(activity = %activity.name, "no active chat config, skipping review message");
            return Ok(NotifyOutcome::NotConfigured);
        };
        let pull_request = self.fetch_pull_request(activity, number).await?;
        if let Some(ignored) = ignored_labels(Some(&pull_request), &config) {
            tracing::info!(
                activity = %activity.name,
                labels = %ignored.join(","),
                "pull request carries ignored labels, skipping review message"
            );
            return Ok(NotifyOutcome::IgnoredLabels(ignored));
        }

        let siblings = self
            .collaborators
            .store
            .find_activities(&details.owner, &details.repository, number)
            .await
            .map_err(|error| NotifyError::collaborator("find activities", &activity.name, error))?;
        let canonical = canonicalize(siblings)?;
        if !should_process(activity, canonical.newest())? {
            let build = build_number(activity)?;
            let newest = match canonical.newest() {
                Some(newest) => build_number(newest)?,
                None => build,
            };
            tracing::info!(
                activity = %activity.name,
                build,
                newest,
                "newer build already seen, skipping stale review message"
            );
            return Ok(NotifyOutcome::Stale { build, newest });
        }
        let entity = canonical.oldest().unwrap_or(activity);
        let annotate = if canonical.is_empty() {
            std::slice::from_ref(activity)
        } else {
            canonical.all()
        };

        let mut report = DeliveryReport::default();
        let author = self.resolve_user(&pull_request.author).await?;
        let mut reviewers = Vec::new();
        if config.notify_reviewers {
            for reviewer in &pull_request.reviewers {
                match self.resolve_user(reviewer).await {
                    Ok(Some(user)) => reviewers.push(user),
                    Ok(None) => report.outcomes.push(TargetOutcome::new(
                        reviewer.login.clone(),
                        TargetAction::Skipped("reviewer has no chat account"),
                    )),
                    Err(error) => report.failures.push(TargetFailure::new(
                        reviewer.login.clone(),
                        "resolve user",
                        error.into(),
                    )),
                }
            }
        }

        let content = self.compose(
            MessageKind::PullRequestReview,
            activity,
            Some(&pull_request),
            author.as_ref(),
            &reviewers,
            &config,
        )?;
        let delivery = Delivery {
            kind: MessageKind::PullRequestReview,
            entity,
            annotate,
            content: &content,
            create_if_missing: review_create_if_missing(build_outcome(Some(&pull_request), activity)),
        };

        self.deliver(
            &DeliveryTarget::Channel(config.channel_name()),
            &delivery,
            &mut report,
        )
        .await;
        if config.direct_message && config.notify_reviewers {
            for reviewer in &reviewers {
                self.deliver(
                    &DeliveryTarget::DirectMessage(reviewer.id.clone()),
                    &delivery,
                    &mut report,
                )
                .await;
            }
        }
        report.finish(activity)
    }

    fn active_config(&self, details: &PipelineDetails) -> Option<ChannelConfig> {
        self.collaborators
            .config
            .channel_config(&details.owner, &details.repository)
            .filter(ChannelConfig::is_active)
    }

    async fn fetch_pull_request(
        &self,
        activity: &PipelineActivity,
        number: u64,
    ) -> NotifyResult<PullRequest> {
        if activity.git_url.trim().is_empty() {
            return Err(NotifyError::InvalidActivity {
                activity: activity.name.clone(),
                reason: "pull request build has no git url".to_string(),
            });
        }
        let repo = parse_git_url(&activity.git_url).ok_or_else(|| NotifyError::InvalidActivity {
            activity: activity.name.clone(),
            reason: format!("cannot parse git url '{}'", activity.git_url),
        })?;
        let full_name = repo.full_name();
        self.collaborators
            .git_host
            .find_pull_request(&full_name, number)
            .await
            .map_err(|error| {
                NotifyError::collaborator("find pull request", format!("{full_name}#{number}"), error)
            })
    }

    async fn resolve_user(&self, user: &GitUser) -> NotifyResult<Option<ChatUser>> {
        if user.login.trim().is_empty() {
            return Err(NotifyError::InvalidInput(
                "git user login cannot be empty".to_string(),
            ));
        }
        self.collaborators
            .users
            .resolve(user)
            .await
            .map_err(|error| NotifyError::collaborator("resolve user", &user.login, error))
    }

    fn compose(
        &self,
        kind: MessageKind,
        activity: &PipelineActivity,
        pull_request: Option<&PullRequest>,
        author: Option<&ChatUser>,
        mentions: &[ChatUser],
        config: &ChannelConfig,
    ) -> NotifyResult<NotificationContent> {
        self.composer.compose(&ComposeContext {
            kind,
            activity,
            pull_request,
            author,
            mentions,
            catalog: &self.catalog,
            lgtm_repo: config.lgtm_repo,
        })
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        delivery: &Delivery<'_>,
        report: &mut DeliveryReport,
    ) {
        let target_key = target.key();
        let existing = self
            .identity
            .lookup(target_key, delivery.entity, delivery.kind)
            .await;
        let action = decide(existing, delivery.create_if_missing);
        tracing::debug!(
            activity = %delivery.entity.name,
            target = %target_key,
            kind = delivery.kind.as_str(),
            action = action.as_str(),
            "resolved posting action"
        );

        let (reference, outcome) = match action {
            PostAction::Suppress => {
                tracing::info!(
                    activity = %delivery.entity.name,
                    target = %target_key,
                    kind = delivery.kind.as_str(),
                    "no existing message and creation not allowed, suppressing"
                );
                report
                    .outcomes
                    .push(TargetOutcome::new(target_key, TargetAction::Suppressed));
                return;
            }
            PostAction::Update(existing) => {
                match self
                    .collaborators
                    .transport
                    .update(&existing, delivery.content)
                    .await
                {
                    Ok(reference) => (reference.clone(), TargetAction::Updated(reference)),
                    Err(error) => {
                        report
                            .failures
                            .push(TargetFailure::new(target_key, "update message", error));
                        return;
                    }
                }
            }
            PostAction::Create => {
                let channel_id = match target {
                    DeliveryTarget::Channel(channel) => channel.clone(),
                    DeliveryTarget::DirectMessage(user_id) => {
                        match self
                            .collaborators
                            .transport
                            .open_direct_channel(user_id)
                            .await
                        {
                            Ok(channel_id) => channel_id,
                            Err(error) => {
                                report.failures.push(TargetFailure::new(
                                    target_key,
                                    "open direct channel",
                                    error,
                                ));
                                return;
                            }
                        }
                    }
                };
                match self
                    .collaborators
                    .transport
                    .post(&channel_id, delivery.content)
                    .await
                {
                    Ok(reference) => (reference.clone(), TargetAction::Created(reference)),
                    Err(error) => {
                        report
                            .failures
                            .push(TargetFailure::new(target_key, "post message", error));
                        return;
                    }
                }
            }
        };

        tracing::info!(
            activity = %delivery.entity.name,
            target = %target_key,
            kind = delivery.kind.as_str(),
            channel_id = %reference.channel_id,
            timestamp = %reference.timestamp,
            "chat message delivered"
        );
        self.identity
            .record(
                target_key,
                &delivery.entity.name,
                delivery.kind,
                reference.clone(),
            )
            .await;
        let key = self.identity.key_for(target_key, delivery.kind);
        let written = self
            .identity
            .write_back(
                self.collaborators.store.as_ref(),
                &key,
                &reference.to_annotation_value(),
                delivery.annotate,
            )
            .await;
        report.failures.extend(written.failures);
        report
            .outcomes
            .push(TargetOutcome::new(target_key, outcome));
    }
}

fn ignored_labels(pull_request: Option<&PullRequest>, config: &ChannelConfig) -> Option<Vec<String>> {
    let matching = pull_request?.matching_labels(&config.ignore_labels);
    if matching.is_empty() {
        return None;
    }
    Some(matching.into_iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::sync::Mutex;

    use super::{
        Collaborators, NotificationCoordinator, NotifyKinds, NotifyOutcome, TargetAction,
    };
    use crate::activity::test_support::{pr_activity, release_activity};
    use crate::activity::PipelineActivity;
    use crate::collaborators::{ChatTransport, ChatUser, GitHost, GitUser, PullRequest, UserResolver};
    use crate::composer::NotificationContent;
    use crate::config::{ChannelConfig, NotifyConfig, PipelineNotifyMode};
    use crate::error::NotifyError;
    use crate::identity_store::{MessageCache, MessageKind, MessageReference};
    use crate::memory_store::InMemoryActivityStore;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Post(String),
        Update(MessageReference),
        Open(String),
    }

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<Call>>,
        failing_users: HashSet<String>,
    }

    impl RecordingTransport {
        fn failing_for(user_id: &str) -> Self {
            Self {
                failing_users: HashSet::from([user_id.to_string()]),
                ..Self::default()
            }
        }

        async fn calls(&self) -> Vec<Call> {
            self.calls.lock().await.clone()
        }

        async fn posts(&self) -> usize {
            self.calls()
                .await
                .iter()
                .filter(|call| matches!(call, Call::Post(_)))
                .count()
        }

        async fn updates(&self) -> usize {
            self.calls()
                .await
                .iter()
                .filter(|call| matches!(call, Call::Update(_)))
                .count()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn post(
            &self,
            channel_id: &str,
            _content: &NotificationContent,
        ) -> Result<MessageReference> {
            let mut calls = self.calls.lock().await;
            calls.push(Call::Post(channel_id.to_string()));
            let resolved = match channel_id.strip_prefix('#') {
                Some(name) => format!("C-{name}"),
                None => channel_id.to_string(),
            };
            Ok(MessageReference::new(resolved, format!("1700000000.{:06}", calls.len())))
        }

        async fn update(
            &self,
            reference: &MessageReference,
            _content: &NotificationContent,
        ) -> Result<MessageReference> {
            self.calls.lock().await.push(Call::Update(reference.clone()));
            Ok(reference.clone())
        }

        async fn open_direct_channel(&self, user_id: &str) -> Result<String> {
            self.calls.lock().await.push(Call::Open(user_id.to_string()));
            if self.failing_users.contains(user_id) {
                bail!("cannot_dm_bot");
            }
            Ok(format!("D-{user_id}"))
        }
    }

    struct FixedGitHost {
        pull_request: PullRequest,
    }

    #[async_trait]
    impl GitHost for FixedGitHost {
        async fn find_pull_request(&self, repo_full_name: &str, number: u64) -> Result<PullRequest> {
            if repo_full_name != "acme/widgets" || number != self.pull_request.number {
                return Err(anyhow!("pull request {repo_full_name}#{number} not found"));
            }
            Ok(self.pull_request.clone())
        }
    }

    #[derive(Default)]
    struct MapResolver {
        users: HashMap<String, ChatUser>,
    }

    #[async_trait]
    impl UserResolver for MapResolver {
        async fn resolve(&self, user: &GitUser) -> Result<Option<ChatUser>> {
            Ok(self.users.get(&user.login).cloned())
        }
    }

    fn git_user(login: &str) -> GitUser {
        GitUser {
            login: login.to_string(),
            ..GitUser::default()
        }
    }

    fn chat_user(id: &str) -> ChatUser {
        ChatUser {
            id: id.to_string(),
            name: id.to_lowercase(),
        }
    }

    fn open_pull_request(number: u64) -> PullRequest {
        PullRequest {
            number,
            title: "Add gears".to_string(),
            author: git_user("octo"),
            reviewers: vec![git_user("alice"), git_user("bob")],
            updated_at: Some(Utc::now()),
            ..PullRequest::default()
        }
    }

    fn channel_config(configure: impl FnOnce(&mut ChannelConfig)) -> NotifyConfig {
        let mut channel = ChannelConfig {
            channel: "builds".to_string(),
            ..ChannelConfig::default()
        };
        configure(&mut channel);
        NotifyConfig {
            default: Some(channel),
            ..NotifyConfig::default()
        }
    }

    fn fresh(mut activity: PipelineActivity) -> PipelineActivity {
        activity.started_at = Some(Utc::now() - Duration::minutes(5));
        activity
    }

    struct Harness {
        store: Arc<InMemoryActivityStore>,
        transport: Arc<RecordingTransport>,
        cache: Arc<MessageCache>,
        collaborators: Collaborators,
    }

    impl Harness {
        fn new(config: NotifyConfig, pull_request: PullRequest, transport: RecordingTransport) -> Self {
            let store = Arc::new(InMemoryActivityStore::new());
            let transport = Arc::new(transport);
            let users = MapResolver {
                users: HashMap::from([
                    ("octo".to_string(), chat_user("U-OCTO")),
                    ("alice".to_string(), chat_user("U-ALICE")),
                    ("bob".to_string(), chat_user("U-BOB")),
                ]),
            };
            let collaborators = Collaborators {
                config: Arc::new(config),
                store: store.clone(),
                transport: transport.clone(),
                git_host: Arc::new(FixedGitHost { pull_request }),
                users: Arc::new(users),
            };
            Self {
                store,
                transport,
                cache: Arc::new(MessageCache::new()),
                collaborators,
            }
        }

        fn coordinator(&self) -> NotificationCoordinator {
            NotificationCoordinator::new(self.collaborators.clone(), self.cache.clone())
        }
    }

    #[tokio::test]
    async fn functional_pipeline_message_posts_once_then_updates() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let activity = fresh(release_activity("main-4", "4"));
        harness.store.insert(activity.clone()).await;
        let coordinator = harness.coordinator();

        let first = coordinator.pipeline_message(&activity).await.expect("first");
        let NotifyOutcome::Processed(outcomes) = first else {
            panic!("expected processed outcome");
        };
        assert!(matches!(outcomes[0].action, TargetAction::Created(_)));

        // The caller still holds the pre-annotation copy; the cache bridges the gap.
        coordinator.pipeline_message(&activity).await.expect("second");
        assert_eq!(harness.transport.posts().await, 1);
        assert_eq!(harness.transport.updates().await, 1);

        let stored = harness.store.get("main-4").await.expect("stored");
        assert_eq!(
            stored.annotation("bot.slack.apps.jenkins-x.io-pipeline/builds"),
            Some("C-builds/1700000000.000001")
        );
    }

    #[tokio::test]
    async fn integration_annotation_survives_cache_loss() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let activity = fresh(release_activity("main-4", "4"));
        harness.store.insert(activity.clone()).await;
        harness
            .coordinator()
            .pipeline_message(&activity)
            .await
            .expect("first");

        let restarted = NotificationCoordinator::new(
            harness.collaborators.clone(),
            Arc::new(MessageCache::new()),
        );
        let reloaded = harness.store.get("main-4").await.expect("stored");
        restarted.pipeline_message(&reloaded).await.expect("second");
        assert_eq!(
            harness.transport.calls().await.last(),
            Some(&Call::Update(MessageReference::new(
                "C-builds",
                "1700000000.000001"
            )))
        );
    }

    #[tokio::test]
    async fn regression_old_pipeline_without_message_is_suppressed() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let mut activity = release_activity("main-1", "1");
        activity.started_at = Some(Utc::now() - Duration::hours(30));
        harness.store.insert(activity.clone()).await;

        let outcome = harness
            .coordinator()
            .pipeline_message(&activity)
            .await
            .expect("outcome");
        let NotifyOutcome::Processed(outcomes) = outcome else {
            panic!("expected processed outcome");
        };
        assert_eq!(outcomes[0].action, TargetAction::Suppressed);
        assert!(harness.transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn functional_ignored_label_skips_without_error() {
        let mut pull_request = open_pull_request(7);
        pull_request.labels = vec!["wip".to_string(), "approved".to_string()];
        let harness = Harness::new(
            channel_config(|channel| channel.ignore_labels = vec!["wip".to_string()]),
            pull_request,
            RecordingTransport::default(),
        );
        let activity = fresh(pr_activity("pr7-1", 7, "1"));

        let outcome = harness
            .coordinator()
            .pipeline_message(&activity)
            .await
            .expect("outcome");
        assert_eq!(outcome, NotifyOutcome::IgnoredLabels(vec!["wip".to_string()]));
        assert!(harness.transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn unit_disabled_or_missing_config_is_a_no_op() {
        let harness = Harness::new(
            channel_config(|channel| channel.disable = true),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let activity = fresh(release_activity("main-1", "1"));
        let outcome = harness
            .coordinator()
            .pipeline_message(&activity)
            .await
            .expect("outcome");
        assert_eq!(outcome, NotifyOutcome::NotConfigured);

        let review = harness
            .coordinator()
            .review_request_message(&activity)
            .await
            .expect("review");
        assert_eq!(review, NotifyOutcome::NotPullRequest);
    }

    #[tokio::test]
    async fn unit_empty_activity_name_is_rejected() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let activity = PipelineActivity::default();
        let error = harness
            .coordinator()
            .pipeline_message(&activity)
            .await
            .expect_err("empty name");
        assert!(matches!(error, NotifyError::EmptyActivityName));
    }

    #[tokio::test]
    async fn functional_release_mode_skips_pull_request_pipelines() {
        let harness = Harness::new(
            channel_config(|channel| channel.pipeline = PipelineNotifyMode::Release),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let activity = fresh(pr_activity("pr7-1", 7, "1"));
        let outcome = harness
            .coordinator()
            .pipeline_message(&activity)
            .await
            .expect("outcome");
        let NotifyOutcome::Processed(outcomes) = outcome else {
            panic!("expected processed outcome");
        };
        assert!(matches!(outcomes[0].action, TargetAction::Skipped(_)));
        assert!(harness.transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn functional_review_thread_is_annotated_on_every_build() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        for build in ["1", "2", "3"] {
            harness
                .store
                .insert(pr_activity(&format!("pr7-{build}"), 7, build))
                .await;
        }
        let coordinator = harness.coordinator();
        let incoming = pr_activity("pr7-3", 7, "3");
        coordinator
            .review_request_message(&incoming)
            .await
            .expect("first review");

        let key = "bot.slack.apps.jenkins-x.io-pr/builds";
        for build in ["1", "2", "3"] {
            let stored = harness
                .store
                .get(&format!("pr7-{build}"))
                .await
                .expect("stored");
            assert_eq!(stored.annotation(key), Some("C-builds/1700000000.000001"));
        }

        let next = pr_activity("pr7-4", 7, "4");
        harness.store.insert(next.clone()).await;
        let restarted = NotificationCoordinator::new(
            harness.collaborators.clone(),
            Arc::new(MessageCache::new()),
        );
        restarted
            .review_request_message(&next)
            .await
            .expect("second review");
        assert_eq!(harness.transport.posts().await, 1);
        assert_eq!(harness.transport.updates().await, 1);
        let newest = harness.store.get("pr7-4").await.expect("stored");
        assert_eq!(newest.annotation(key), Some("C-builds/1700000000.000001"));
    }

    #[tokio::test]
    async fn regression_stale_review_event_is_skipped() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        for build in ["1", "2", "3"] {
            harness
                .store
                .insert(pr_activity(&format!("pr7-{build}"), 7, build))
                .await;
        }
        let outcome = harness
            .coordinator()
            .review_request_message(&pr_activity("pr7-2", 7, "2"))
            .await
            .expect("outcome");
        assert_eq!(outcome, NotifyOutcome::Stale { build: 2, newest: 3 });
        assert!(harness.transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn regression_merged_pull_request_without_thread_is_suppressed() {
        let mut pull_request = open_pull_request(7);
        pull_request.merged = true;
        let harness = Harness::new(channel_config(|_| {}), pull_request, RecordingTransport::default());
        let activity = pr_activity("pr7-1", 7, "1");
        harness.store.insert(activity.clone()).await;

        let outcome = harness
            .coordinator()
            .review_request_message(&activity)
            .await
            .expect("outcome");
        let NotifyOutcome::Processed(outcomes) = outcome else {
            panic!("expected processed outcome");
        };
        assert_eq!(outcomes[0].action, TargetAction::Suppressed);
        assert!(harness.transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn functional_direct_message_failure_does_not_block_other_reviewers() {
        let harness = Harness::new(
            channel_config(|channel| {
                channel.direct_message = true;
                channel.notify_reviewers = true;
            }),
            open_pull_request(7),
            RecordingTransport::failing_for("U-ALICE"),
        );
        let activity = pr_activity("pr7-1", 7, "1");
        harness.store.insert(activity.clone()).await;

        let error = harness
            .coordinator()
            .review_request_message(&activity)
            .await
            .expect_err("alice fails");
        let NotifyError::Targets { failures, .. } = error else {
            panic!("expected aggregated target failure");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].target, "U-ALICE");
        assert_eq!(failures[0].operation, "open direct channel");

        let calls = harness.transport.calls().await;
        assert!(calls.contains(&Call::Post("#builds".to_string())));
        assert!(calls.contains(&Call::Post("D-U-BOB".to_string())));
        let stored = harness.store.get("pr7-1").await.expect("stored");
        assert!(stored
            .annotation("bot.slack.apps.jenkins-x.io-pr/U-BOB")
            .is_some());
        assert!(stored
            .annotation("bot.slack.apps.jenkins-x.io-pr/U-ALICE")
            .is_none());
    }

    #[tokio::test]
    async fn functional_notify_all_keeps_pipeline_and_review_threads_apart() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let activity = fresh(pr_activity("pr7-1", 7, "1"));
        harness.store.insert(activity.clone()).await;

        let results = harness.coordinator().notify(&activity, NotifyKinds::All).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, MessageKind::Pipeline);
        assert!(results.iter().all(|(_, result)| result.is_ok()));
        assert_eq!(harness.transport.posts().await, 2);

        let stored = harness.store.get("pr7-1").await.expect("stored");
        assert_eq!(
            stored.annotation("bot.slack.apps.jenkins-x.io-pipeline/builds"),
            Some("C-builds/1700000000.000001")
        );
        assert_eq!(
            stored.annotation("bot.slack.apps.jenkins-x.io-pr/builds"),
            Some("C-builds/1700000000.000002")
        );
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn regression_pipeline_create_window_closes_after_twenty_four_hours() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let coordinator = harness.coordinator().with_clock(fixed_now);

        let mut edge = release_activity("main-1", "1");
        edge.started_at = Some(fixed_now() - Duration::hours(24));
        let mut expired = release_activity("main-2", "2");
        expired.started_at = Some(fixed_now() - Duration::hours(24) - Duration::seconds(1));
        harness.store.insert(edge.clone()).await;
        harness.store.insert(expired.clone()).await;

        let NotifyOutcome::Processed(outcomes) =
            coordinator.pipeline_message(&edge).await.expect("edge")
        else {
            panic!("expected processed outcome");
        };
        assert!(matches!(outcomes[0].action, TargetAction::Created(_)));

        let NotifyOutcome::Processed(outcomes) =
            coordinator.pipeline_message(&expired).await.expect("expired")
        else {
            panic!("expected processed outcome");
        };
        assert_eq!(outcomes[0].action, TargetAction::Suppressed);
        assert_eq!(harness.transport.posts().await, 1);
    }

    #[tokio::test]
    async fn regression_second_review_run_updates_direct_messages_in_place() {
        let harness = Harness::new(
            channel_config(|channel| {
                channel.direct_message = true;
                channel.notify_reviewers = true;
            }),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let activity = pr_activity("pr7-1", 7, "1");
        harness.store.insert(activity.clone()).await;
        harness
            .coordinator()
            .review_request_message(&activity)
            .await
            .expect("first review");

        let stored = harness.store.get("pr7-1").await.expect("stored");
        let alice = stored
            .annotation("bot.slack.apps.jenkins-x.io-pr/U-ALICE")
            .and_then(MessageReference::parse_annotation_value)
            .expect("alice annotated");
        let bob = stored
            .annotation("bot.slack.apps.jenkins-x.io-pr/U-BOB")
            .and_then(MessageReference::parse_annotation_value)
            .expect("bob annotated");
        assert_eq!(alice.channel_id, "D-U-ALICE");
        assert_eq!(bob.channel_id, "D-U-BOB");

        let restarted = NotificationCoordinator::new(
            harness.collaborators.clone(),
            Arc::new(MessageCache::new()),
        );
        restarted
            .review_request_message(&stored)
            .await
            .expect("second review");

        let calls = harness.transport.calls().await;
        assert!(calls.contains(&Call::Update(alice)));
        assert!(calls.contains(&Call::Update(bob)));
        let opens = calls
            .iter()
            .filter(|call| matches!(call, Call::Open(_)))
            .count();
        assert_eq!(opens, 2);
        assert_eq!(harness.transport.posts().await, 3);
        assert_eq!(harness.transport.updates().await, 3);
    }

    #[tokio::test]
    async fn regression_malformed_annotation_is_replaced_by_fresh_post() {
        let harness = Harness::new(
            channel_config(|_| {}),
            open_pull_request(7),
            RecordingTransport::default(),
        );
        let mut activity = fresh(release_activity("main-4", "4"));
        activity.annotations.insert(
            "bot.slack.apps.jenkins-x.io-pipeline/builds".to_string(),
            "garbage".to_string(),
        );
        harness.store.insert(activity.clone()).await;

        harness
            .coordinator()
            .pipeline_message(&activity)
            .await
            .expect("outcome");
        assert_eq!(
            harness.transport.calls().await,
            vec![Call::Post("#builds".to_string())]
        );
        let stored = harness.store.get("main-4").await.expect("stored");
        assert_eq!(
            stored.annotation("bot.slack.apps.jenkins-x.io-pipeline/builds"),
            Some("C-builds/1700000000.000001")
        );
    }
}
