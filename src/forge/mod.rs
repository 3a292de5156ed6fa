//! Code-hosting service client
//!
//! The [`ForgeClient`] trait covers exactly the remote operations the
//! controllers need: webhook lifecycle, release and pull-request listing,
//! and deployment status projection. The trait allows mocking the service
//! in tests while [`HttpForge`] talks to a GitHub-compatible REST API in
//! production.

mod http;
mod types;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub use http::HttpForge;
pub use types::{
    DeploymentRequest, HookTarget, PullRequestHead, RemoteDeployment, RemoteDeploymentStatus,
    RemoteHook, RemotePullRequest, RemoteRelease, HOOK_EVENTS,
};

/// Errors returned by the code-hosting API
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForgeError {
    /// The addressed entity does not exist remotely.
    ///
    /// Used as a control-flow signal: a missing hook triggers recreation, a
    /// missing latest release means the repository has no tagged releases.
    #[error("not found")]
    NotFound,

    /// Non-success response other than 404
    #[error("api error {code}: {message}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Response body excerpt
        message: String,
    },

    /// Transport-level failure (connect, TLS, timeout, decode)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ForgeError {
    /// True when the error is a remote not-found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Classify a non-success HTTP response
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        if code == 404 {
            Self::NotFound
        } else {
            Self::Status {
                code,
                message: message.into(),
            }
        }
    }
}

/// One page of a paginated listing
///
/// `next` carries the next page number while more pages remain, so callers
/// drive pagination as a lazy loop and can short-circuit on a mid-pagination
/// error instead of materializing the full history up front.
#[derive(Clone, Debug)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Next page number, or None when pagination is exhausted
    pub next: Option<u32>,
}

/// Operations against the code-hosting service
///
/// Every call authenticates with the per-repository token resolved from the
/// Repository's referenced secret.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Register a new webhook on `owner/repo`
    async fn create_hook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        target: &HookTarget,
    ) -> Result<RemoteHook, ForgeError>;

    /// Update an existing webhook's configuration
    async fn edit_hook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        hook_id: i64,
        target: &HookTarget,
    ) -> Result<RemoteHook, ForgeError>;

    /// Delete a webhook
    async fn delete_hook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        hook_id: i64,
    ) -> Result<(), ForgeError>;

    /// Fetch the single most recent tagged release
    async fn latest_release(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<RemoteRelease, ForgeError>;

    /// List tagged releases, one page at a time
    async fn list_releases(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<RemoteRelease>, ForgeError>;

    /// List the newest open pull requests, most recently updated first.
    ///
    /// Bounded to the API's default page size; preview freshness is limited
    /// to these entries.
    async fn list_open_pulls(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<RemotePullRequest>, ForgeError>;

    /// Create a deployment for a release tag
    async fn create_deployment(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        request: &DeploymentRequest,
    ) -> Result<RemoteDeployment, ForgeError>;

    /// Record a new state for a deployment
    async fn create_deployment_status(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        deployment_id: i64,
        state: &str,
    ) -> Result<(), ForgeError>;

    /// List a deployment's statuses, one page at a time
    async fn list_deployment_statuses(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        deployment_id: i64,
        page: u32,
    ) -> Result<Page<RemoteDeploymentStatus>, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_404_classifies_as_not_found() {
        assert!(ForgeError::from_status(404, "missing").is_not_found());
        assert!(!ForgeError::from_status(500, "boom").is_not_found());
    }

    #[test]
    fn status_errors_keep_code_and_message() {
        match ForgeError::from_status(422, "validation failed") {
            ForgeError::Status { code, message } => {
                assert_eq!(code, 422);
                assert_eq!(message, "validation failed");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }
}
