//! ExposedDomain controller implementation
//!
//! Domain add/update/delete events re-project deployment status across all
//! watched repositories. The domain itself is read-only input; only
//! Repository statuses are written. A finalizer keeps deleted domains
//! around long enough to retire their deployments.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, instrument, warn};

use crate::crd::{ExposedDomain, Repository};
use crate::deploy::{self, DomainView};
use crate::Error;

use super::repository::{has_finalizer, resolve_token, Context, FINALIZER};

/// Reconcile an ExposedDomain resource
///
/// On add/update, releases across all repositories are projected against the
/// full current domain set. On delete, only the vanishing domain is
/// projected, with the deleted flag set, so its deployments are retired
/// before the finalizer is released. One repository's failure never blocks
/// another.
#[instrument(skip(domain, ctx), fields(domain = %domain.name_any(), namespace = %domain.namespace().unwrap_or_default()))]
pub async fn reconcile_domain(
    domain: Arc<ExposedDomain>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let namespace = domain.namespace().unwrap_or_default();
    let name = domain.name_any();

    if let Err(e) = domain.spec.validate() {
        warn!(error = %e, "domain validation failed");
        return Ok(Action::await_change());
    }

    let deleting = domain.metadata.deletion_timestamp.is_some();

    if deleting && !has_finalizer(domain.finalizers()) {
        return Ok(Action::await_change());
    }

    if !deleting && !has_finalizer(domain.finalizers()) {
        let mut finalizers = domain.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        ctx.kube
            .set_domain_finalizers(&namespace, &name, finalizers)
            .await?;
    }

    let views = if deleting {
        vec![DomainView::from_domain(&domain)]
    } else {
        DomainView::from_domains(&ctx.kube.list_domains().await?)
    };

    let repositories = ctx.kube.list_repositories().await?;
    for repository in &repositories {
        project_repository(&ctx, repository, &views, deleting).await;
    }

    if deleting {
        let finalizers: Vec<String> = domain
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        ctx.kube
            .set_domain_finalizers(&namespace, &name, finalizers)
            .await?;
    }

    Ok(Action::await_change())
}

/// Project one repository's releases and persist when anything changed.
///
/// Failures are logged with repository context and swallowed so the
/// remaining repositories still get projected.
async fn project_repository(
    ctx: &Context,
    repository: &Repository,
    views: &[DomainView],
    deleted: bool,
) {
    let namespace = repository.namespace().unwrap_or_default();
    let name = repository.name_any();

    let Some(status) = repository.status.as_ref() else {
        return;
    };
    if status.releases.is_empty() {
        return;
    }

    let (changed, releases) = deploy::project(views, deleted, &status.releases);
    if changed.is_empty() {
        return;
    }
    debug!(repository = %name, namespace = %namespace, changed = changed.len(), "projecting deployments");

    let token = match resolve_token(ctx.kube.as_ref(), &namespace, &repository.spec.secret_ref)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            warn!(repository = %name, namespace = %namespace, error = %e, "token unavailable, skipping projection");
            return;
        }
    };

    let releases = deploy::push(
        ctx.forge.as_ref(),
        &token,
        &repository.spec.owner,
        &repository.spec.repo,
        releases,
        &changed,
    )
    .await;

    let mut status = status.clone();
    status.releases = releases;
    if let Err(e) = ctx
        .kube
        .patch_repository_status(&namespace, &name, &status)
        .await
    {
        warn!(repository = %name, namespace = %namespace, error = %e, "failed to persist projected status");
    }
}

/// Error policy for the ExposedDomain controller
pub fn domain_error_policy(domain: Arc<ExposedDomain>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        domain = %domain.name_any(),
        namespace = %domain.namespace().unwrap_or_default(),
        "domain reconciliation failed"
    );
    Action::requeue(Duration::from_secs(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::controller::repository::MockKubeClient;
    use crate::crd::{
        DeploymentRecord, DeploymentState, ExposedDomainSpec, Release, ReleaseLevel,
        ReleaseSelector, RepositorySpec, RepositoryStatus, SecretRef,
    };
    use crate::forge::MockForgeClient;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn sample_domain(name: &str, release: &str, version: &str) -> ExposedDomain {
        ExposedDomain {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                finalizers: Some(vec![FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: ExposedDomainSpec {
                url: "https://fake.com".to_string(),
                release: Some(ReleaseSelector {
                    name: release.to_string(),
                    version: version.to_string(),
                }),
            },
        }
    }

    fn repository_with_deployment(name: &str) -> Repository {
        Repository {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: RepositorySpec {
                owner: "acme".to_string(),
                repo: "widgets".to_string(),
                secret_ref: SecretRef {
                    name: "gh-creds".to_string(),
                    key: "token".to_string(),
                },
                max_available: None,
            },
            status: Some(RepositoryStatus {
                webhook: None,
                reconciliation: None,
                releases: vec![Release {
                    name: "foo".to_string(),
                    tag: "1".to_string(),
                    level: ReleaseLevel::Release,
                    release_time: None,
                    deployment: Some(DeploymentRecord {
                        id: Some(55),
                        network_ref: "default/foo-domain".to_string(),
                        state: DeploymentState::Success,
                        url: Some("https://fake.com".to_string()),
                    }),
                }],
            }),
        }
    }

    fn context(kube: MockKubeClient, forge: MockForgeClient) -> Arc<Context> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(Context::new(
            Arc::new(kube),
            Arc::new(forge),
            tx,
            Settings::default(),
        ))
    }

    /// Story: deleting a domain retires matching deployments across
    /// repositories, then releases the finalizer.
    #[tokio::test]
    async fn story_domain_deletion_retires_deployments() {
        let captured = Arc::new(Mutex::new(Vec::<RepositoryStatus>::new()));
        let captured_clone = captured.clone();

        let mut kube = MockKubeClient::new();
        kube.expect_list_repositories()
            .returning(|| Ok(vec![repository_with_deployment("widgets")]));
        kube.expect_read_secret()
            .returning(|_, _, _| Ok("gh-token".to_string()));
        kube.expect_patch_repository_status()
            .returning(move |_, _, status| {
                captured_clone.lock().unwrap().push(status.clone());
                Ok(())
            });
        kube.expect_set_domain_finalizers()
            .withf(|_, _, finalizers| finalizers.is_empty())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut forge = MockForgeClient::new();
        forge
            .expect_list_deployment_statuses()
            .returning(|_, _, _, _, _| {
                Ok(crate::forge::Page {
                    items: vec![],
                    next: None,
                })
            });
        forge
            .expect_create_deployment_status()
            .withf(|_, _, _, id, state| *id == 55 && state == "inactive")
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        let mut domain = sample_domain("foo-domain", "foo", "1");
        domain.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

        let action = reconcile_domain(Arc::new(domain), context(kube, forge))
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());

        let statuses = captured.lock().unwrap();
        let deployment = statuses[0].releases[0].deployment.as_ref().unwrap();
        assert_eq!(deployment.state, DeploymentState::Inactive);
        assert!(deployment.url.is_none());
    }

    /// Story: a domain matching nothing leaves every repository untouched;
    /// no status is patched and no token is read.
    #[tokio::test]
    async fn story_unmatched_domain_changes_nothing() {
        let mut kube = MockKubeClient::new();
        kube.expect_list_domains()
            .returning(|| Ok(vec![sample_domain("bar-domain", "bar", "9")]));
        kube.expect_list_repositories()
            .returning(|| Ok(vec![repository_with_deployment("widgets")]));
        // No read_secret / patch expectations: either call would panic.

        let forge = MockForgeClient::new();
        let domain = sample_domain("bar-domain", "bar", "9");

        let action = reconcile_domain(Arc::new(domain), context(kube, forge))
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
    }

    /// Story: one repository's missing secret does not stop the projection
    /// for the others.
    #[tokio::test]
    async fn story_per_repository_isolation_on_secret_failure() {
        let patched = Arc::new(Mutex::new(Vec::<String>::new()));
        let patched_clone = patched.clone();

        let mut broken = repository_with_deployment("broken");
        broken.metadata.name = Some("broken".to_string());
        broken.spec.secret_ref.name = "missing".to_string();
        // Strip the deployment so the domain attaches a fresh one
        broken.status.as_mut().unwrap().releases[0].deployment = None;

        let mut healthy = repository_with_deployment("healthy");
        healthy.metadata.name = Some("healthy".to_string());
        healthy.status.as_mut().unwrap().releases[0].deployment = None;

        let mut kube = MockKubeClient::new();
        kube.expect_list_domains()
            .returning(|| Ok(vec![sample_domain("foo-domain", "foo", "1")]));
        kube.expect_list_repositories()
            .returning(move || Ok(vec![broken.clone(), healthy.clone()]));
        kube.expect_read_secret().returning(|_, name, _| {
            if name == "missing" {
                Err(Error::secret("secret default/missing not found"))
            } else {
                Ok("gh-token".to_string())
            }
        });
        kube.expect_patch_repository_status()
            .returning(move |_, name, _| {
                patched_clone.lock().unwrap().push(name.to_string());
                Ok(())
            });

        let mut forge = MockForgeClient::new();
        forge
            .expect_create_deployment()
            .returning(|_, _, _, _| Ok(crate::forge::RemoteDeployment { id: 1 }));
        forge
            .expect_list_deployment_statuses()
            .returning(|_, _, _, _, _| {
                Ok(crate::forge::Page {
                    items: vec![],
                    next: None,
                })
            });
        forge
            .expect_create_deployment_status()
            .returning(|_, _, _, _, _| Ok(()));

        let domain = sample_domain("foo-domain", "foo", "1");
        reconcile_domain(Arc::new(domain), context(kube, forge))
            .await
            .unwrap();

        let patched = patched.lock().unwrap();
        assert_eq!(patched.as_slice(), ["healthy"]);
    }
}
