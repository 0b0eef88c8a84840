//! GitHub REST client that supplies pull request state to pipeline notifications.

mod github_api_client;
mod github_transport_helpers;

pub use github_api_client::{GithubApiClient, GITHUB_API_BASE};
