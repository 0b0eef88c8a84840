use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tau_pipeline_notify::identity_store::SLACK_ANNOTATION_PREFIX;
use tau_pipeline_notify::NotifyKinds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum CliNotifyKind {
    Pipeline,
    Review,
    All,
}

impl From<CliNotifyKind> for NotifyKinds {
    fn from(value: CliNotifyKind) -> Self {
        match value {
            CliNotifyKind::Pipeline => NotifyKinds::Pipeline,
            CliNotifyKind::Review => NotifyKinds::Review,
            CliNotifyKind::All => NotifyKinds::All,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "tau-pipeline-notify",
    about = "Post or update chat notifications for one pipeline activity",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "TAU_NOTIFY_CONFIG",
        help = "Notification config JSON (schema_version 1)"
    )]
    pub(crate) config: PathBuf,

    #[arg(
        long,
        env = "TAU_NOTIFY_ACTIVITIES",
        help = "Activity store JSON file; message annotations are written back to it"
    )]
    pub(crate) activities: PathBuf,

    #[arg(long, help = "Name of the pipeline activity to reconcile")]
    pub(crate) activity: String,

    #[arg(long, value_enum, default_value_t = CliNotifyKind::All)]
    pub(crate) kind: CliNotifyKind,

    #[arg(
        long = "slack-api-base",
        env = "SLACK_API_BASE",
        default_value = tau_pipeline_slack::SLACK_API_BASE
    )]
    pub(crate) slack_api_base: String,

    #[arg(
        long = "slack-bot-token",
        env = "SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token (xoxb-...)"
    )]
    pub(crate) slack_bot_token: String,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_BASE",
        default_value = tau_pipeline_github::GITHUB_API_BASE
    )]
    pub(crate) github_api_base: String,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "Optional GitHub token; anonymous requests are rate limited"
    )]
    pub(crate) github_token: Option<String>,

    #[arg(
        long = "annotation-prefix",
        env = "TAU_NOTIFY_ANNOTATION_PREFIX",
        default_value = SLACK_ANNOTATION_PREFIX
    )]
    pub(crate) annotation_prefix: String,

    #[arg(long = "request-timeout-ms", default_value_t = 10_000)]
    pub(crate) request_timeout_ms: u64,

    #[arg(long = "retry-max-attempts", default_value_t = 3)]
    pub(crate) retry_max_attempts: usize,

    #[arg(long = "retry-base-delay-ms", default_value_t = 500)]
    pub(crate) retry_base_delay_ms: u64,
}
