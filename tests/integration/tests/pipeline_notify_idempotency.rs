use std::sync::Arc;

use chrono::{Duration, Utc};
use httpmock::prelude::*;
use serde_json::json;
use tau_pipeline_github::GithubApiClient;
use tau_pipeline_notify::activity::ActivityStatus;
use tau_pipeline_notify::memory_store::InMemoryActivityStore;
use tau_pipeline_notify::{
    Collaborators, MessageCache, NotificationCoordinator, NotifyConfig, NotifyOutcome,
    PipelineActivity,
};
use tau_pipeline_slack::{SlackApiClient, SlackEmailUserResolver};

const PR_KEY: &str = "bot.slack.apps.jenkins-x.io-pr/builds";
const PIPELINE_KEY: &str = "bot.slack.apps.jenkins-x.io-pipeline/builds";

fn activity(name: &str, branch: &str, build: &str) -> PipelineActivity {
    PipelineActivity {
        name: name.to_string(),
        git_owner: "acme".to_string(),
        git_repository: "widgets".to_string(),
        git_url: "https://github.com/acme/widgets.git".to_string(),
        pipeline: format!("acme/widgets/{branch}"),
        build: build.to_string(),
        status: Some(ActivityStatus::Running),
        started_at: Some(Utc::now() - Duration::minutes(2)),
        ..PipelineActivity::default()
    }
}

struct Servers {
    slack: MockServer,
    github: MockServer,
}

impl Servers {
    fn start() -> Self {
        let github = MockServer::start();
        github.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/pulls/7");
            then.status(200).json_body(json!({
                "number": 7,
                "title": "Add gears",
                "html_url": "https://github.com/acme/widgets/pull/7",
                "state": "open",
                "updated_at": "2024-05-01T10:00:00Z",
                "user": { "login": "octo" },
                "requested_reviewers": [],
                "labels": [{ "name": "approved" }]
            }));
        });
        github.mock(|when, then| {
            when.method(GET).path("/users/octo");
            then.status(200)
                .json_body(json!({ "login": "octo", "email": "octo@example.com" }));
        });
        let slack = MockServer::start();
        slack.mock(|when, then| {
            when.method(GET).path("/users.lookupByEmail");
            then.status(200)
                .json_body(json!({ "ok": true, "user": { "id": "U-OCTO", "name": "octo" } }));
        });
        Self { slack, github }
    }

    fn collaborators(&self, store: Arc<InMemoryActivityStore>) -> Collaborators {
        let slack = SlackApiClient::new(self.slack.base_url(), "xoxb-test".to_string(), 2_000, 2, 1)
            .expect("slack client");
        let github = GithubApiClient::new(self.github.base_url(), None, 2_000, 2, 1)
            .expect("github client");
        let config = NotifyConfig::from_json_str(
            r#"{ "schema_version": 1, "default": { "channel": "builds" } }"#,
        )
        .expect("config");
        Collaborators {
            config: Arc::new(config),
            store,
            transport: Arc::new(slack.clone()),
            git_host: Arc::new(github),
            users: Arc::new(SlackEmailUserResolver::new(slack)),
        }
    }
}

#[tokio::test]
async fn integration_review_thread_is_created_once_and_updated_across_restarts() {
    let servers = Servers::start();
    let post = servers.slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("\"channel\":\"#builds\"")
            .body_includes("review Pull Request #7 (Add gears)")
            .body_includes("<@U-OCTO>");
        then.status(200)
            .json_body(json!({ "ok": true, "channel": "C1", "ts": "1700000000.000100" }));
    });
    let update = servers.slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.update")
            .body_includes("\"channel\":\"C1\"")
            .body_includes("\"ts\":\"1700000000.000100\"");
        then.status(200)
            .json_body(json!({ "ok": true, "channel": "C1", "ts": "1700000000.000100" }));
    });

    let store = Arc::new(InMemoryActivityStore::new());
    store.insert(activity("pr7-1", "PR-7", "1")).await;
    store.insert(activity("pr7-2", "PR-7", "2")).await;

    let first = NotificationCoordinator::new(
        servers.collaborators(store.clone()),
        Arc::new(MessageCache::new()),
    );
    let outcome = first
        .review_request_message(&activity("pr7-2", "PR-7", "2"))
        .await
        .expect("first review");
    assert!(matches!(outcome, NotifyOutcome::Processed(_)));
    for name in ["pr7-1", "pr7-2"] {
        let stored = store.get(name).await.expect("stored");
        assert_eq!(stored.annotation(PR_KEY), Some("C1/1700000000.000100"));
    }

    // A fresh process only has the durable annotations to go on.
    store.insert(activity("pr7-3", "PR-7", "3")).await;
    let restarted = NotificationCoordinator::new(
        servers.collaborators(store.clone()),
        Arc::new(MessageCache::new()),
    );
    restarted
        .review_request_message(&activity("pr7-3", "PR-7", "3"))
        .await
        .expect("second review");

    let stale = restarted
        .review_request_message(&activity("pr7-1", "PR-7", "1"))
        .await
        .expect("stale review");
    assert_eq!(stale, NotifyOutcome::Stale { build: 1, newest: 3 });

    assert_eq!(post.calls(), 1);
    assert_eq!(update.calls(), 1);
    let newest = store.get("pr7-3").await.expect("stored");
    assert_eq!(newest.annotation(PR_KEY), Some("C1/1700000000.000100"));
}

#[tokio::test]
async fn integration_pipeline_message_uses_cache_before_annotation_is_visible() {
    let servers = Servers::start();
    let post = servers.slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("Release Pipeline acme/widgets (Build #4)");
        then.status(200)
            .json_body(json!({ "ok": true, "channel": "C1", "ts": "1700000000.000200" }));
    });
    let update = servers.slack.mock(|when, then| {
        when.method(POST).path("/chat.update");
        then.status(200)
            .json_body(json!({ "ok": true, "channel": "C1", "ts": "1700000000.000200" }));
    });

    let store = Arc::new(InMemoryActivityStore::new());
    let release = activity("main-4", "master", "4");
    store.insert(release.clone()).await;
    let coordinator = NotificationCoordinator::new(
        servers.collaborators(store.clone()),
        Arc::new(MessageCache::new()),
    );

    coordinator.pipeline_message(&release).await.expect("first");
    coordinator.pipeline_message(&release).await.expect("second");
    assert_eq!(post.calls(), 1);
    assert_eq!(update.calls(), 1);
    let stored = store.get("main-4").await.expect("stored");
    assert_eq!(stored.annotation(PIPELINE_KEY), Some("C1/1700000000.000200"));
}
