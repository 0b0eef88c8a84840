use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tau_pipeline_notify::{GitHost, GitUser, PullRequest};

use crate::github_transport_helpers::{
    is_retryable_github_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize)]
struct GithubAccount {
    login: String,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubProfile {
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubLabel {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: String,
    state: String,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    user: GithubAccount,
    #[serde(default)]
    requested_reviewers: Vec<GithubAccount>,
    #[serde(default)]
    labels: Vec<GithubLabel>,
}

#[derive(Clone)]
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubApiClient {
    pub fn new(
        api_base: String,
        token: Option<String>,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("tau-pipeline-notify"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = token.as_deref().map(str::trim).filter(|token| !token.is_empty()) {
            let auth_header = format!("Bearer {token}");
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_header)
                    .context("invalid github authorization header")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    /// Fetches one pull request and the public profiles of its author and
    /// requested reviewers.
    pub async fn get_pull_request(&self, repo_full_name: &str, number: u64) -> Result<PullRequest> {
        let url = format!("{}/repos/{repo_full_name}/pulls/{number}", self.api_base);
        let raw: GithubPullRequest = self
            .request_json("get pull request", || self.http.get(&url))
            .await?;

        let author = self.get_user(&raw.user).await;
        let mut reviewers = Vec::with_capacity(raw.requested_reviewers.len());
        for reviewer in &raw.requested_reviewers {
            reviewers.push(self.get_user(reviewer).await);
        }
        Ok(PullRequest {
            number: raw.number,
            title: raw.title,
            link: raw.html_url,
            author,
            reviewers,
            labels: raw.labels.into_iter().map(|label| label.name).collect(),
            merged: raw.merged || raw.merged_at.is_some(),
            closed: raw.state.eq_ignore_ascii_case("closed"),
            updated_at: raw.updated_at,
        })
    }

    /// Profile enrichment is best-effort: a failed lookup keeps the login and
    /// profile link from the pull request payload.
    async fn get_user(&self, account: &GithubAccount) -> GitUser {
        let url = format!("{}/users/{}", self.api_base, account.login);
        let profile = self
            .request_json::<GithubProfile, _>("get user", || self.http.get(&url))
            .await;
        match profile {
            Ok(profile) => GitUser {
                login: profile.login,
                name: profile.name.unwrap_or_default(),
                email: profile.email.filter(|email| !email.trim().is_empty()),
                url: profile.html_url.or_else(|| account.html_url.clone()),
            },
            Err(error) => {
                tracing::warn!(
                    login = %account.login,
                    error = %format!("{error:#}"),
                    "github user lookup failed, continuing without profile"
                );
                GitUser {
                    login: account.login.clone(),
                    url: account.html_url.clone(),
                    ..GitUser::default()
                }
            }
        }
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header("x-tau-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_github_status(status.as_u16())
                    {
                        tracing::debug!(
                            operation,
                            attempt,
                            status = status.as_u16(),
                            "retrying github api request"
                        );
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }
}

#[async_trait]
impl GitHost for GithubApiClient {
    async fn find_pull_request(&self, repo_full_name: &str, number: u64) -> Result<PullRequest> {
        self.get_pull_request(repo_full_name, number).await
    }
}
