//! ExposedDomain Custom Resource Definition
//!
//! An ExposedDomain is a read-only input describing one externally reachable
//! URL, optionally pinned to a single release identity. The operator projects
//! deployment status for matching releases; it never writes this resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ReleaseSelector;

/// Specification for an exposed domain
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tagwatch.dev",
    version = "v1alpha1",
    kind = "ExposedDomain",
    plural = "exposeddomains",
    shortname = "xdom",
    namespaced,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Release","type":"string","jsonPath":".spec.release.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ExposedDomainSpec {
    /// Externally reachable URL for the matched release
    pub url: String,

    /// Release identity this domain serves; domains without a selector never
    /// match any release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseSelector>,
}

impl ExposedDomainSpec {
    /// Validate the domain specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.url.is_empty() {
            return Err(crate::Error::validation("spec.url is required"));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(crate::Error::validation(
                "spec.url must be an http or https URL",
            ));
        }
        Ok(())
    }
}
