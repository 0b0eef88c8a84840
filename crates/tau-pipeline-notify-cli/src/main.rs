mod cli_args;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tau_pipeline_github::GithubApiClient;
use tau_pipeline_notify::file_store::FileActivityStore;
use tau_pipeline_notify::status_catalog::StatusCatalog;
use tau_pipeline_notify::{
    ActivityStore, Collaborators, IdentityStore, MessageCache, NotificationCoordinator,
    NotifyConfig, NotifyOutcome,
};
use tau_pipeline_slack::{SlackApiClient, SlackEmailUserResolver};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "pipeline notification failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = NotifyConfig::load(&cli.config)?;
    let store = Arc::new(FileActivityStore::load(cli.activities.clone())?);
    let activity = store
        .get_activity(&cli.activity)
        .await?
        .ok_or_else(|| {
            anyhow!(
                "pipeline activity '{}' not found in {}",
                cli.activity,
                store.path().display()
            )
        })?;

    let slack = SlackApiClient::new(
        cli.slack_api_base.clone(),
        cli.slack_bot_token.clone(),
        cli.request_timeout_ms,
        cli.retry_max_attempts,
        cli.retry_base_delay_ms,
    )
    .context("failed to configure slack client")?;
    let github = GithubApiClient::new(
        cli.github_api_base.clone(),
        cli.github_token.clone(),
        cli.request_timeout_ms,
        cli.retry_max_attempts,
        cli.retry_base_delay_ms,
    )
    .context("failed to configure github client")?;

    let catalog = StatusCatalog::new(&config.statuses);
    let cache = Arc::new(MessageCache::new());
    let collaborators = Collaborators {
        config: Arc::new(config),
        store,
        transport: Arc::new(slack.clone()),
        git_host: Arc::new(github),
        users: Arc::new(SlackEmailUserResolver::new(slack)),
    };
    let coordinator = NotificationCoordinator::new(collaborators, cache.clone())
        .with_catalog(catalog)
        .with_identity_store(IdentityStore::with_prefix(&cli.annotation_prefix, cache));

    let mut failed = 0_usize;
    for (kind, result) in coordinator.notify(&activity, cli.kind.into()).await {
        match result {
            Ok(NotifyOutcome::Processed(targets)) => {
                for target in targets {
                    tracing::info!(
                        activity = %activity.name,
                        kind = kind.as_str(),
                        target = %target.target,
                        action = ?target.action,
                        "notification target reconciled"
                    );
                }
            }
            Ok(outcome) => {
                tracing::info!(
                    activity = %activity.name,
                    kind = kind.as_str(),
                    outcome = ?outcome,
                    "notification skipped"
                );
            }
            Err(error) => {
                failed += 1;
                tracing::error!(
                    activity = %activity.name,
                    kind = kind.as_str(),
                    error = %error,
                    "notification failed"
                );
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!(
            "{failed} notification kind(s) failed for '{}'",
            activity.name
        ));
    }
    Ok(())
}
