//! Supporting types shared by the Repository and ExposedDomain CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the secret holding the code-hosting API token
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name of the secret in the Repository's namespace
    pub name: String,

    /// Key inside the secret data holding the token
    #[serde(default = "SecretRef::default_key")]
    pub key: String,
}

impl SecretRef {
    fn default_key() -> String {
        "token".to_string()
    }
}

/// Classification of a release into production/candidate/preview tiers
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseLevel {
    /// A published, non-prerelease tagged release
    #[default]
    Release,
    /// A tagged release marked as a prerelease
    Candidate,
    /// An open pull request, tracked as a preview build
    Preview,
}

impl std::fmt::Display for ReleaseLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Release => write!(f, "release"),
            Self::Candidate => write!(f, "candidate"),
            Self::Preview => write!(f, "preview"),
        }
    }
}

/// State of a projected deployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// The release is reachable through its matched domain
    #[default]
    Success,
    /// The matched domain was removed; the deployment is retired
    Inactive,
}

impl DeploymentState {
    /// Wire representation used when comparing against remote status strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote deployment bookkeeping attached to a release
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Remote deployment id; unset until the first successful create.
    /// Once assigned it never changes for the lifetime of the release entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// `namespace/name` of the ExposedDomain this deployment is linked to
    pub network_ref: String,

    /// Current deployment state
    #[serde(default)]
    pub state: DeploymentState,

    /// Externally reachable URL; cleared when the deployment goes inactive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One release known for a repository
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name (tag name for releases, head ref for previews)
    pub name: String,

    /// Tag (or head SHA for previews); (name, tag) is unique per repository
    pub tag: String,

    /// Release tier
    #[serde(default)]
    pub level: ReleaseLevel,

    /// When the release was published (or the PR last updated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<DateTime<Utc>>,

    /// Deployment projected from a matching domain, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentRecord>,
}

impl Release {
    /// True for preview-level entries (open pull requests)
    pub fn is_preview(&self) -> bool {
        self.level == ReleaseLevel::Preview
    }
}

/// Persisted webhook registration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStatus {
    /// Remote hook id; unset until the first successful create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Shared HMAC secret; stable across updates, regenerated on recreation
    #[serde(default)]
    pub secret: String,
}

/// Bookkeeping that gates release sync cycles
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStatus {
    /// Completion time of the last successful release sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Selector binding a domain to one release identity
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSelector {
    /// Release name to match
    pub name: String,

    /// Release tag/version to match
    pub version: String,
}

impl ReleaseSelector {
    /// True when this selector targets the given release identity
    pub fn matches(&self, release: &Release) -> bool {
        self.name == release.name && self.version == release.tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, tag: &str) -> Release {
        Release {
            name: name.to_string(),
            tag: tag.to_string(),
            level: ReleaseLevel::Release,
            release_time: None,
            deployment: None,
        }
    }

    #[test]
    fn release_level_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ReleaseLevel::Candidate).unwrap(),
            "\"candidate\""
        );
        assert_eq!(ReleaseLevel::Preview.to_string(), "preview");
    }

    #[test]
    fn selector_matches_on_both_name_and_version() {
        let selector = ReleaseSelector {
            name: "foo".to_string(),
            version: "1".to_string(),
        };
        assert!(selector.matches(&release("foo", "1")));
        assert!(!selector.matches(&release("foo", "2")));
        assert!(!selector.matches(&release("bar", "1")));
    }

    #[test]
    fn secret_ref_key_defaults_to_token() {
        let parsed: SecretRef = serde_json::from_str(r#"{"name": "gh-creds"}"#).unwrap();
        assert_eq!(parsed.key, "token");

        let explicit: SecretRef =
            serde_json::from_str(r#"{"name": "gh-creds", "key": "pat"}"#).unwrap();
        assert_eq!(explicit.key, "pat");
    }

    #[test]
    fn deployment_state_round_trips_as_lowercase() {
        let parsed: DeploymentState = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(parsed, DeploymentState::Inactive);
        assert_eq!(DeploymentState::Success.as_str(), "success");
    }
}
