//! reqwest-backed [`ForgeClient`] implementation
//!
//! Talks to a GitHub-compatible REST API. Pagination is driven by page
//! numbers; a short page marks the end of the listing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use tracing::debug;

use super::types::HookRequest;
use super::{
    DeploymentRequest, ForgeClient, ForgeError, HookTarget, Page, RemoteDeployment,
    RemoteDeploymentStatus, RemoteHook, RemotePullRequest, RemoteRelease,
};

/// Page size used for all paginated listings
const PER_PAGE: usize = 30;

/// Request timeout for every remote call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the code-hosting REST API
pub struct HttpForge {
    http: reqwest::Client,
    base: String,
}

impl HttpForge {
    /// Create a client against the given API base URL
    pub fn new(base: impl Into<String>) -> Result<Self, ForgeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tagwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    fn headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, auth);
        }
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Turn a non-success response into a classified error
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ForgeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        let excerpt: String = message.chars().take(200).collect();
        Err(ForgeError::from_status(status.as_u16(), excerpt))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ForgeError> {
        let response = self
            .http
            .get(self.url(path))
            .headers(Self::headers(token))
            .query(query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    fn page_of<T>(items: Vec<T>, page: u32) -> Page<T> {
        let next = (items.len() == PER_PAGE).then_some(page + 1);
        Page { items, next }
    }
}

#[async_trait]
impl ForgeClient for HttpForge {
    async fn create_hook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        target: &HookTarget,
    ) -> Result<RemoteHook, ForgeError> {
        debug!(owner, repo, url = %target.url, "creating webhook");
        let response = self
            .http
            .post(self.url(&format!("/repos/{owner}/{repo}/hooks")))
            .headers(Self::headers(token))
            .json(&HookRequest::from_target(target))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn edit_hook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        hook_id: i64,
        target: &HookTarget,
    ) -> Result<RemoteHook, ForgeError> {
        debug!(owner, repo, hook_id, "updating webhook");
        let response = self
            .http
            .patch(self.url(&format!("/repos/{owner}/{repo}/hooks/{hook_id}")))
            .headers(Self::headers(token))
            .json(&HookRequest::from_target(target))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete_hook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        hook_id: i64,
    ) -> Result<(), ForgeError> {
        debug!(owner, repo, hook_id, "deleting webhook");
        let response = self
            .http
            .delete(self.url(&format!("/repos/{owner}/{repo}/hooks/{hook_id}")))
            .headers(Self::headers(token))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn latest_release(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<RemoteRelease, ForgeError> {
        self.get_json(token, &format!("/repos/{owner}/{repo}/releases/latest"), &[])
            .await
    }

    async fn list_releases(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<RemoteRelease>, ForgeError> {
        let items: Vec<RemoteRelease> = self
            .get_json(
                token,
                &format!("/repos/{owner}/{repo}/releases"),
                &[
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        Ok(Self::page_of(items, page))
    }

    async fn list_open_pulls(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<RemotePullRequest>, ForgeError> {
        self.get_json(
            token,
            &format!("/repos/{owner}/{repo}/pulls"),
            &[
                ("state", "open".to_string()),
                ("sort", "updated".to_string()),
                ("direction", "desc".to_string()),
                ("per_page", PER_PAGE.to_string()),
            ],
        )
        .await
    }

    async fn create_deployment(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        request: &DeploymentRequest,
    ) -> Result<RemoteDeployment, ForgeError> {
        debug!(owner, repo, target_ref = %request.target_ref, "creating deployment");
        let response = self
            .http
            .post(self.url(&format!("/repos/{owner}/{repo}/deployments")))
            .headers(Self::headers(token))
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create_deployment_status(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        deployment_id: i64,
        state: &str,
    ) -> Result<(), ForgeError> {
        debug!(owner, repo, deployment_id, state, "creating deployment status");
        let response = self
            .http
            .post(self.url(&format!(
                "/repos/{owner}/{repo}/deployments/{deployment_id}/statuses"
            )))
            .headers(Self::headers(token))
            .json(&serde_json::json!({ "state": state }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_deployment_statuses(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        deployment_id: i64,
        page: u32,
    ) -> Result<Page<RemoteDeploymentStatus>, ForgeError> {
        let items: Vec<RemoteDeploymentStatus> = self
            .get_json(
                token,
                &format!("/repos/{owner}/{repo}/deployments/{deployment_id}/statuses"),
                &[
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        Ok(Self::page_of(items, page))
    }
}
