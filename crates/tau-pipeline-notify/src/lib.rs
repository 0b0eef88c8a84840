//! Message identity and canonicalization engine for CI pipeline notifications.
//!
//! This crate decides whether a pipeline or pull request event creates a new
//! chat message, edits the one already posted, or is dropped. Message identity
//! is kept durably as annotations on pipeline activities and volatilely in a
//! process-wide cache; chat, git hosting and storage are reached through the
//! traits in [`collaborators`].

pub mod activity;
pub mod canonicalize;
pub mod collaborators;
pub mod composer;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod file_store;
pub mod identity_store;
pub mod memory_store;
pub mod outcomes;
pub mod posting;
pub mod status_catalog;

pub use activity::{PipelineActivity, PipelineDetails};
pub use collaborators::{ActivityStore, ChatTransport, ChatUser, GitHost, GitUser, PullRequest, UserResolver};
pub use composer::{DefaultComposer, MessageComposer, NotificationContent};
pub use config::{ChannelConfig, ConfigSource, NotifyConfig};
pub use coordinator::{Collaborators, NotificationCoordinator, NotifyKinds, NotifyOutcome};
pub use error::{NotifyError, NotifyResult, TargetFailure};
pub use identity_store::{IdentityStore, MessageCache, MessageKind, MessageReference};
