//! Slack Web API transport for pipeline notifications.
//!
//! Provides [`SlackApiClient`], which posts and edits attachment messages and
//! opens direct-message channels, and [`SlackEmailUserResolver`], which maps
//! git users onto Slack accounts by email address.

mod slack_api_client;
mod slack_transport_helpers;
mod slack_user_resolver;

pub use slack_api_client::{SlackApiClient, SLACK_API_BASE};
pub use slack_user_resolver::SlackEmailUserResolver;
