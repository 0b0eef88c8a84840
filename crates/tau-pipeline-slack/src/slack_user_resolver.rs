use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tau_pipeline_notify::{ChatUser, GitUser, UserResolver};
use tokio::sync::Mutex;

use crate::SlackApiClient;

/// Resolves git users through `users.lookupByEmail`. Lookups, including
/// misses, are remembered per email for the life of the resolver.
pub struct SlackEmailUserResolver {
    client: SlackApiClient,
    resolved: Mutex<HashMap<String, Option<ChatUser>>>,
}

impl SlackEmailUserResolver {
    pub fn new(client: SlackApiClient) -> Self {
        Self {
            client,
            resolved: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl UserResolver for SlackEmailUserResolver {
    async fn resolve(&self, user: &GitUser) -> Result<Option<ChatUser>> {
        let Some(email) = user
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
        else {
            tracing::debug!(login = %user.login, "git user has no email, cannot resolve slack user");
            return Ok(None);
        };
        let email = email.to_ascii_lowercase();
        if let Some(known) = self.resolved.lock().await.get(&email) {
            return Ok(known.clone());
        }
        let found = self.client.lookup_user_by_email(&email).await?;
        self.resolved.lock().await.insert(email, found.clone());
        Ok(found)
    }
}
