//! Slack Web API client for pipeline notification messages.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tau_pipeline_notify::{ChatTransport, ChatUser, MessageReference, NotificationContent};

use crate::slack_transport_helpers::{
    is_retryable_slack_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackConversationsOpenResponse {
    ok: bool,
    channel: Option<SlackChannel>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChannel {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackLookupByEmailResponse {
    ok: bool,
    user: Option<SlackUser>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
}

fn slack_error(method: &str, error: Option<String>) -> anyhow::Error {
    anyhow!(
        "slack {method} failed: {}",
        error.unwrap_or_else(|| "unknown error".to_string())
    )
}

/// Renders content as a single legacy attachment, the layout existing
/// notification threads were posted with.
fn attachment_payload(content: &NotificationContent) -> Value {
    let fields = content
        .fields
        .iter()
        .map(|field| json!({ "title": "", "value": field, "short": true }))
        .collect::<Vec<_>>();
    let mut attachment = json!({
        "fallback": content.fallback,
        "callback_id": content.callback_id,
        "fields": fields,
    });
    if !content.title.is_empty() {
        attachment["title"] = Value::String(content.title.clone());
        if let Some(link) = &content.link {
            attachment["title_link"] = Value::String(link.clone());
        }
    }
    if !content.text.is_empty() {
        attachment["text"] = Value::String(content.text.clone());
    }
    if let Some(color) = &content.color {
        attachment["color"] = Value::String(color.clone());
    }
    if let Some(timestamp) = content.timestamp {
        attachment["ts"] = json!(timestamp);
    }
    json!([attachment])
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        if bot_token.trim().is_empty() {
            bail!("slack bot token cannot be empty");
        }
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("tau-pipeline-notify"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    pub async fn post_message(
        &self,
        channel: &str,
        content: &NotificationContent,
    ) -> Result<MessageReference> {
        let payload = json!({
            "channel": channel,
            "text": "",
            "attachments": attachment_payload(content),
            "unfurl_links": false,
            "unfurl_media": false,
        });
        let response: SlackChatMessageResponse = self
            .request_json("chat.postMessage", || {
                self.http
                    .post(format!("{}/chat.postMessage", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            return Err(slack_error("chat.postMessage", response.error));
        }

        let timestamp = response
            .ts
            .ok_or_else(|| anyhow!("slack chat.postMessage response missing ts"))?;
        Ok(MessageReference::new(
            response.channel.unwrap_or_else(|| channel.to_string()),
            timestamp,
        ))
    }

    pub async fn update_message(
        &self,
        reference: &MessageReference,
        content: &NotificationContent,
    ) -> Result<MessageReference> {
        let payload = json!({
            "channel": reference.channel_id,
            "ts": reference.timestamp,
            "text": "",
            "attachments": attachment_payload(content),
        });
        let response: SlackChatMessageResponse = self
            .request_json("chat.update", || {
                self.http
                    .post(format!("{}/chat.update", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            return Err(slack_error("chat.update", response.error));
        }
        Ok(MessageReference::new(
            response
                .channel
                .unwrap_or_else(|| reference.channel_id.clone()),
            response.ts.unwrap_or_else(|| reference.timestamp.clone()),
        ))
    }

    pub async fn open_conversation(&self, user_id: &str) -> Result<String> {
        let payload = json!({ "users": user_id });
        let response: SlackConversationsOpenResponse = self
            .request_json("conversations.open", || {
                self.http
                    .post(format!("{}/conversations.open", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            return Err(slack_error("conversations.open", response.error));
        }
        response
            .channel
            .map(|channel| channel.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("slack conversations.open did not return a channel id"))
    }

    /// Returns `None` when Slack reports `users_not_found`.
    pub async fn lookup_user_by_email(&self, email: &str) -> Result<Option<ChatUser>> {
        let response: SlackLookupByEmailResponse = self
            .request_json("users.lookupByEmail", || {
                self.http
                    .get(format!("{}/users.lookupByEmail", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .query(&[("email", email)])
            })
            .await?;
        if !response.ok {
            if response.error.as_deref() == Some("users_not_found") {
                return Ok(None);
            }
            return Err(slack_error("users.lookupByEmail", response.error));
        }
        Ok(response.user.map(|user| ChatUser {
            id: user.id,
            name: user.name,
        }))
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
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
                            .with_context(|| format!("failed to decode slack {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_slack_status(status.as_u16())
                    {
                        tracing::debug!(
                            operation,
                            attempt,
                            status = status.as_u16(),
                            "retrying slack api request"
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
                        "slack api {operation} failed with status {}: {}",
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
                        .with_context(|| format!("slack api {operation} request failed"));
                }
            }
        }
    }
}

#[async_trait]
impl ChatTransport for SlackApiClient {
    async fn post(
        &self,
        channel_id: &str,
        content: &NotificationContent,
    ) -> Result<MessageReference> {
        self.post_message(channel_id, content).await
    }

    async fn update(
        &self,
        reference: &MessageReference,
        content: &NotificationContent,
    ) -> Result<MessageReference> {
        self.update_message(reference, content).await
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String> {
        self.open_conversation(user_id).await
    }
}
