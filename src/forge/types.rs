//! Wire types for the code-hosting REST API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Webhook events the operator subscribes to
pub const HOOK_EVENTS: [&str; 2] = ["pull_request", "release"];

/// Desired webhook configuration sent on create and edit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookTarget {
    /// Callback URL the service delivers payloads to
    pub url: String,
    /// Shared HMAC secret for payload signatures
    pub secret: String,
    /// Whether the service may skip TLS verification when delivering
    pub insecure_ssl: bool,
}

/// Request body for webhook create/edit
#[derive(Debug, Serialize)]
pub(crate) struct HookRequest<'a> {
    pub name: &'a str,
    pub active: bool,
    pub events: &'a [&'a str],
    pub config: HookRequestConfig<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HookRequestConfig<'a> {
    pub url: &'a str,
    pub content_type: &'a str,
    pub secret: &'a str,
    pub insecure_ssl: &'a str,
}

impl<'a> HookRequest<'a> {
    pub fn from_target(target: &'a HookTarget) -> Self {
        Self {
            name: "web",
            active: true,
            events: &HOOK_EVENTS,
            config: HookRequestConfig {
                url: &target.url,
                content_type: "json",
                secret: &target.secret,
                insecure_ssl: if target.insecure_ssl { "1" } else { "0" },
            },
        }
    }
}

/// A registered webhook as returned by the service
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteHook {
    /// Remote hook id
    pub id: i64,
}

/// A tagged release as returned by the service
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteRelease {
    /// Tag the release points at
    pub tag_name: String,
    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,
    /// Draft releases are never persisted
    #[serde(default)]
    pub draft: bool,
    /// Prereleases are classified as candidates
    #[serde(default)]
    pub prerelease: bool,
    /// Publication time
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// An open pull request as returned by the service
#[derive(Clone, Debug, Deserialize)]
pub struct RemotePullRequest {
    /// Pull request number
    pub number: u64,
    /// Last update time; previews inherit this as their release time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Head branch and commit
    pub head: PullRequestHead,
}

/// Head of a pull request
#[derive(Clone, Debug, Deserialize)]
pub struct PullRequestHead {
    /// Head branch name
    #[serde(rename = "ref")]
    pub branch: String,
    /// Head commit SHA
    pub sha: String,
}

/// Request body for deployment creation
#[derive(Debug, Serialize)]
pub struct DeploymentRequest {
    /// Git ref the deployment targets (the release tag)
    #[serde(rename = "ref")]
    pub target_ref: String,
    /// Never merge the default branch into the ref before deploying
    pub auto_merge: bool,
    /// Deployment environment; omitted when the release shares the repo name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// A deployment as returned by the service
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteDeployment {
    /// Remote deployment id
    pub id: i64,
}

/// A deployment status as returned by the service
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteDeploymentStatus {
    /// Remote status id; monotonically increasing, newest is largest
    pub id: i64,
    /// State string ("success", "inactive", ...)
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_request_carries_fixed_events_and_json_content_type() {
        let target = HookTarget {
            url: "https://hooks.example.com/payload/acme/widgets".to_string(),
            secret: "s3cr3t".to_string(),
            insecure_ssl: false,
        };
        let body = serde_json::to_value(HookRequest::from_target(&target)).unwrap();

        assert_eq!(body["name"], "web");
        assert_eq!(body["active"], true);
        assert_eq!(
            body["events"],
            serde_json::json!(["pull_request", "release"])
        );
        assert_eq!(body["config"]["content_type"], "json");
        assert_eq!(body["config"]["secret"], "s3cr3t");
        assert_eq!(body["config"]["insecure_ssl"], "0");
    }

    #[test]
    fn deployment_request_omits_environment_when_unset() {
        let body = serde_json::to_value(DeploymentRequest {
            target_ref: "v1.2.3".to_string(),
            auto_merge: false,
            environment: None,
        })
        .unwrap();

        assert_eq!(body["ref"], "v1.2.3");
        assert_eq!(body["auto_merge"], false);
        assert!(body.get("environment").is_none());
    }

    #[test]
    fn pull_request_head_ref_deserializes() {
        let pr: RemotePullRequest = serde_json::from_str(
            r#"{"number": 7, "updated_at": "2024-05-01T10:00:00Z",
                "head": {"ref": "feature/login", "sha": "abc123"}}"#,
        )
        .unwrap();
        assert_eq!(pr.head.branch, "feature/login");
        assert_eq!(pr.head.sha, "abc123");
    }
}
