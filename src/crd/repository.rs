//! Repository Custom Resource Definition
//!
//! A Repository describes one source repository on the code-hosting service
//! whose releases and webhook registration this operator keeps in sync.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ReconciliationStatus, Release, SecretRef, WebhookStatus};

/// Specification for a watched repository
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tagwatch.dev",
    version = "v1alpha1",
    kind = "Repository",
    plural = "repositories",
    shortname = "repo",
    status = "RepositoryStatus",
    namespaced,
    printcolumn = r#"{"name":"Owner","type":"string","jsonPath":".spec.owner"}"#,
    printcolumn = r#"{"name":"Repo","type":"string","jsonPath":".spec.repo"}"#,
    printcolumn = r#"{"name":"Hook","type":"integer","jsonPath":".status.webhook.id"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    /// Account or organization owning the repository
    pub owner: String,

    /// Repository name
    pub repo: String,

    /// Secret holding the API token used for all remote calls
    pub secret_ref: SecretRef,

    /// Cap on persisted non-preview releases (newest kept first); unlimited
    /// when unset or zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_available: Option<u32>,
}

impl RepositorySpec {
    /// The `owner/repo` slug identifying this repository remotely.
    ///
    /// Slugs are assumed globally unique across all watched Repository
    /// resources; the callback registry is keyed by them.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Validate the repository specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.owner.is_empty() || self.owner.contains('/') {
            return Err(crate::Error::validation(
                "spec.owner must be a non-empty single path segment",
            ));
        }
        if self.repo.is_empty() || self.repo.contains('/') {
            return Err(crate::Error::validation(
                "spec.repo must be a non-empty single path segment",
            ));
        }
        if self.secret_ref.name.is_empty() {
            return Err(crate::Error::validation("spec.secretRef.name is required"));
        }
        if self.secret_ref.key.is_empty() {
            return Err(crate::Error::validation(
                "spec.secretRef.key must not be empty",
            ));
        }
        Ok(())
    }
}

/// Status for a Repository
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStatus {
    /// Remote webhook registration, once established
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookStatus>,

    /// Release sync bookkeeping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationStatus>,

    /// Releases known for this repository, previews included
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<Release>,
}

impl RepositoryStatus {
    /// Set the webhook record and return self for chaining
    pub fn webhook(mut self, webhook: WebhookStatus) -> Self {
        self.webhook = Some(webhook);
        self
    }

    /// Set the releases and return self for chaining
    pub fn releases(mut self, releases: Vec<Release>) -> Self {
        self.releases = releases;
        self
    }

    /// Record a successful sync completion time and return self for chaining
    pub fn synced_at(mut self, at: chrono::DateTime<chrono::Utc>) -> Self {
        self.reconciliation = Some(ReconciliationStatus {
            last_update: Some(at),
        });
        self
    }
}
