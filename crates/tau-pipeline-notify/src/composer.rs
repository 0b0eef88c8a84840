//! Message content handed to the chat transport.
//!
//! `DefaultComposer` renders plain text fields; richer layouts plug in through
//! [`MessageComposer`].

use serde::Serialize;

use crate::activity::{
    effective_status, last_updated, pull_request_number, ActivityStatus, PipelineActivity,
    PipelineDetails,
};
use crate::collaborators::{ChatUser, PullRequest};
use crate::error::NotifyResult;
use crate::identity_store::MessageKind;
use crate::outcomes::{activity_outcome, build_outcome, review_outcome};
use crate::status_catalog::StatusCatalog;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationContent {
    pub title: String,
    pub text: String,
    pub color: Option<String>,
    /// Target of the title, rendered as a link by transports that support it.
    pub link: Option<String>,
    pub fields: Vec<String>,
    pub fallback: String,
    pub callback_id: String,
    /// Unix seconds of the last known update.
    pub timestamp: Option<i64>,
}

/// Everything a composer may read for one notification.
#[derive(Debug, Clone, Copy)]
pub struct ComposeContext<'a> {
    pub kind: MessageKind,
    pub activity: &'a PipelineActivity,
    pub pull_request: Option<&'a PullRequest>,
    pub author: Option<&'a ChatUser>,
    pub mentions: &'a [ChatUser],
    pub catalog: &'a StatusCatalog,
    pub lgtm_repo: bool,
}

pub trait MessageComposer: Send + Sync {
    fn compose(&self, context: &ComposeContext<'_>) -> NotifyResult<NotificationContent>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComposer;

impl MessageComposer for DefaultComposer {
    fn compose(&self, context: &ComposeContext<'_>) -> NotifyResult<NotificationContent> {
        match context.kind {
            MessageKind::Pipeline => compose_pipeline(context),
            MessageKind::PullRequestReview => Ok(compose_review(context)),
        }
    }
}

fn compose_pipeline(context: &ComposeContext<'_>) -> NotifyResult<NotificationContent> {
    let activity = context.activity;
    let details = PipelineDetails::from_activity(activity);
    let status = effective_status(activity);
    let symbol = &context.catalog.lookup(activity_outcome(status)).symbol;
    let pull_request = pull_request_number(activity)?;

    let label = if details.pipeline.ends_with("/master") {
        "Release Pipeline"
    } else if pull_request.is_some() {
        "Pull Request Pipeline"
    } else {
        "Pipeline"
    };
    let mut title = format!("{symbol} {label} {}", details.repository_path());
    if let Some(number) = pull_request {
        title.push_str(&format!(" #{number}"));
    }
    title.push_str(&format!(" (Build #{})", details.build));

    let fallback = [
        ("Repo", activity.git_url.as_str()),
        ("Build", activity.build_url.as_str()),
    ]
    .into_iter()
    .filter(|(_, url)| !url.is_empty())
    .map(|(name, url)| format!("{name}: {url}"))
    .collect::<Vec<_>>()
    .join(", ");

    let link = context
        .pull_request
        .map(|pr| pr.link.as_str())
        .into_iter()
        .chain([activity.build_url.as_str()])
        .find(|url| !url.is_empty())
        .map(str::to_string);

    Ok(NotificationContent {
        title,
        text: String::new(),
        color: status_color(status).map(str::to_string),
        link,
        fields: Vec::new(),
        fallback,
        callback_id: format!("pipelineactivity:{}", activity.name),
        timestamp: last_updated(None, activity).map(|updated| updated.timestamp()),
    })
}

fn compose_review(context: &ComposeContext<'_>) -> NotificationContent {
    let activity = context.activity;
    let details = PipelineDetails::from_activity(activity);
    let mentions = context
        .mentions
        .iter()
        .map(|user| format!("<@{}>", user.id))
        .collect::<Vec<_>>();
    let please = if mentions.is_empty() { "Please" } else { "please" };

    let pr_name = match context.pull_request {
        Some(pr) if pr.title.is_empty() => format!("Pull Request #{}", pr.number),
        Some(pr) => format!("Pull Request #{} ({})", pr.number, pr.title),
        None => "Pull Request".to_string(),
    };
    let pr_link = context
        .pull_request
        .map(|pr| pr.link.as_str())
        .filter(|link| !link.is_empty());
    let (author, plain_author) = match (context.author, context.pull_request) {
        (Some(user), _) => (format!("<@{}>", user.id), format!("<@{}>", user.id)),
        (None, Some(pr)) => (
            slack_link(pr.author.url.as_deref(), &pr.author.login),
            pr.author.login.clone(),
        ),
        (None, None) => (String::new(), String::new()),
    };

    let sentence = |name: &str, author: &str| {
        format!(
            "{} {please} review {name} created on {} by {author}",
            mentions.join(" "),
            details.repository_path()
        )
        .trim()
        .to_string()
    };
    let text = sentence(&slack_link(pr_link, &pr_name), &author);
    let fallback = sentence(&pr_name, &plain_author);

    let mut fields = Vec::with_capacity(2);
    if let Some(pr) = context.pull_request {
        fields.push(
            context
                .catalog
                .lookup(review_outcome(pr, context.lgtm_repo))
                .render(),
        );
    }
    fields.push(
        context
            .catalog
            .lookup(build_outcome(context.pull_request, activity))
            .render(),
    );

    NotificationContent {
        title: String::new(),
        fallback,
        text,
        color: status_color(effective_status(activity)).map(str::to_string),
        link: pr_link.map(str::to_string),
        fields,
        callback_id: format!("preview:{}", activity.name),
        timestamp: last_updated(context.pull_request, activity).map(|updated| updated.timestamp()),
    }
}

/// `<url|label>` in chat markup, or the bare label without a url.
fn slack_link(url: Option<&str>, label: &str) -> String {
    match url.filter(|url| !url.is_empty()) {
        Some(url) => format!("<{url}|{label}>"),
        None => label.to_string(),
    }
}

fn status_color(status: Option<ActivityStatus>) -> Option<&'static str> {
    match status? {
        ActivityStatus::Failed | ActivityStatus::Error => Some("danger"),
        ActivityStatus::Succeeded => Some("good"),
        ActivityStatus::Running => Some("#3AA3E3"),
        _ => None,
    }
}
