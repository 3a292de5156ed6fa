//! Deployment status projection
//!
//! Links releases to exposed domains. [`project`] is a pure transform from
//! (domains, releases) to an updated release list plus the indices that
//! changed; [`push`] then mirrors the changed entries onto the code-hosting
//! service with at-most-one-redundant-write semantics.

use tracing::{debug, warn};

use crate::crd::{
    DeploymentRecord, DeploymentState, ExposedDomain, Release, ReleaseSelector,
};
use crate::forge::{DeploymentRequest, ForgeClient};

/// Read-only view of one ExposedDomain used during projection
#[derive(Clone, Debug)]
pub struct DomainView {
    /// `namespace/name` reference recorded on matched deployments
    pub network_ref: String,
    /// Externally reachable URL
    pub url: String,
    /// Release identity this domain serves
    pub selector: Option<ReleaseSelector>,
}

impl DomainView {
    /// Build views from ExposedDomain resources
    pub fn from_domains(domains: &[ExposedDomain]) -> Vec<Self> {
        domains.iter().map(Self::from_domain).collect()
    }

    /// Build a view from one ExposedDomain resource
    pub fn from_domain(domain: &ExposedDomain) -> Self {
        use kube::ResourceExt;
        Self {
            network_ref: format!(
                "{}/{}",
                domain.namespace().unwrap_or_default(),
                domain.name_any()
            ),
            url: domain.spec.url.clone(),
            selector: domain.spec.release.clone(),
        }
    }

    fn matches(&self, release: &Release) -> bool {
        self.selector
            .as_ref()
            .is_some_and(|sel| sel.matches(release))
    }
}

/// Project domains onto releases. Pure; no I/O.
///
/// For each release the first matching domain wins:
/// - no deployment yet and the domain is not being deleted: attach a new
///   deployment in state success with the domain URL
/// - existing deployment, domain being deleted, not yet inactive: clear the
///   URL and retire the deployment
///
/// Unmatched releases pass through unchanged. Returns the changed indices
/// and the updated list.
pub fn project(
    domains: &[DomainView],
    deleted: bool,
    releases: &[Release],
) -> (Vec<usize>, Vec<Release>) {
    let mut changed = Vec::new();
    let mut updated = releases.to_vec();

    for (idx, release) in updated.iter_mut().enumerate() {
        let Some(domain) = domains.iter().find(|d| d.matches(release)) else {
            continue;
        };

        if release.deployment.is_none() {
            if !deleted {
                release.deployment = Some(DeploymentRecord {
                    id: None,
                    network_ref: domain.network_ref.clone(),
                    state: DeploymentState::Success,
                    url: Some(domain.url.clone()),
                });
                changed.push(idx);
            }
        } else if deleted {
            if let Some(deployment) = release.deployment.as_mut() {
                if deployment.state != DeploymentState::Inactive {
                    deployment.url = None;
                    deployment.state = DeploymentState::Inactive;
                    changed.push(idx);
                }
            }
        }
    }

    (changed, updated)
}

/// Mirror changed releases onto the remote service.
///
/// Creates the remote deployment on first match (the id is assigned once and
/// never changes afterwards), then appends a deployment status only when the
/// newest remote status differs from the desired state. Per-release failures
/// are logged and do not block the remaining changed releases; the returned
/// list reflects the last attempted write regardless of remote success.
pub async fn push(
    forge: &dyn ForgeClient,
    token: &str,
    owner: &str,
    repo: &str,
    mut releases: Vec<Release>,
    changed: &[usize],
) -> Vec<Release> {
    for &idx in changed {
        let Some(release) = releases.get_mut(idx) else {
            continue;
        };
        let name = release.name.clone();
        let tag = release.tag.clone();
        let Some(deployment) = release.deployment.as_mut() else {
            continue;
        };

        if deployment.id.is_none() {
            let request = DeploymentRequest {
                target_ref: tag.clone(),
                auto_merge: false,
                environment: (name != repo).then(|| name.clone()),
            };
            match forge.create_deployment(token, owner, repo, &request).await {
                Ok(remote) => deployment.id = Some(remote.id),
                Err(e) => {
                    warn!(owner, repo, release = %name, error = %e, "deployment create failed");
                    continue;
                }
            }
        }

        let Some(deployment_id) = deployment.id else {
            continue;
        };
        let desired = deployment.state.as_str();

        match latest_status_state(forge, token, owner, repo, deployment_id).await {
            Ok(Some(state)) if state == desired => {
                debug!(owner, repo, release = %name, state = desired, "deployment status already current");
            }
            Ok(_) => {
                if let Err(e) = forge
                    .create_deployment_status(token, owner, repo, deployment_id, desired)
                    .await
                {
                    warn!(owner, repo, release = %name, error = %e, "deployment status write failed");
                }
            }
            Err(e) => {
                warn!(owner, repo, release = %name, error = %e, "deployment status listing failed");
            }
        }
    }

    releases
}

/// Page through remote statuses and return the newest state, if any
async fn latest_status_state(
    forge: &dyn ForgeClient,
    token: &str,
    owner: &str,
    repo: &str,
    deployment_id: i64,
) -> Result<Option<String>, crate::forge::ForgeError> {
    let mut newest: Option<(i64, String)> = None;
    let mut page = 1u32;

    loop {
        let listing = forge
            .list_deployment_statuses(token, owner, repo, deployment_id, page)
            .await?;
        for status in listing.items {
            if newest.as_ref().map_or(true, |(id, _)| status.id > *id) {
                newest = Some((status.id, status.state));
            }
        }
        match listing.next {
            Some(next) => page = next,
            None => break,
        }
    }

    Ok(newest.map(|(_, state)| state))
}
