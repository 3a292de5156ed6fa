//! Repository controller implementation
//!
//! Reconciles Repository resources: resolve the API token, ensure the remote
//! webhook, sync releases, project deployments onto exposed domains, persist
//! status. Deletion is handled through a finalizer so the remote webhook is
//! removed before the resource goes away.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::Settings;
use crate::crd::{ExposedDomain, Repository, RepositoryStatus, SecretRef};
use crate::deploy::{self, DomainView};
use crate::forge::ForgeClient;
use crate::hook::{self, CallbackHook};
use crate::release;
use crate::Error;

/// Finalizer guarding remote webhook cleanup
pub const FINALIZER: &str = "tagwatch.dev/cleanup";

/// Field manager used for all patches
const FIELD_MANAGER: &str = "tagwatch-controller";

/// Trait abstracting Kubernetes client operations
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Read one key from a secret's data
    async fn read_secret(&self, namespace: &str, name: &str, key: &str) -> Result<String, Error>;

    /// Patch the status of a Repository
    async fn patch_repository_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RepositoryStatus,
    ) -> Result<(), Error>;

    /// Replace the finalizer list of a Repository
    async fn set_repository_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error>;

    /// Replace the finalizer list of an ExposedDomain
    async fn set_domain_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error>;

    /// List all ExposedDomain resources
    async fn list_domains(&self) -> Result<Vec<ExposedDomain>, Error>;

    /// List all Repository resources
    async fn list_repositories(&self) -> Result<Vec<Repository>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn read_secret(&self, namespace: &str, name: &str, key: &str) -> Result<String, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await?;

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .ok_or_else(|| {
                Error::secret(format!("secret {namespace}/{name} has no key {key:?}"))
            })?;

        String::from_utf8(value.0.clone())
            .map(|s| s.trim().to_string())
            .map_err(|_| Error::secret(format!("secret {namespace}/{name} key {key:?} is not UTF-8")))
    }

    async fn patch_repository_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RepositoryStatus,
    ) -> Result<(), Error> {
        let api: Api<Repository> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }

    async fn set_repository_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let api: Api<Repository> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn set_domain_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let api: Api<ExposedDomain> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<ExposedDomain>, Error> {
        let api: Api<ExposedDomain> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, Error> {
        let api: Api<Repository> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

/// Controller context containing shared state and clients
///
/// Shared across all reconciliation calls. The registry sender is the only
/// path by which reconcilers mutate the callback registry.
pub struct Context {
    /// Kubernetes operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Code-hosting API client
    pub forge: Arc<dyn ForgeClient>,
    /// Producer side of the callback registry update channel
    pub registry_tx: mpsc::Sender<CallbackHook>,
    /// Operator settings
    pub settings: Settings,
}

impl Context {
    /// Create a context with the given collaborators
    pub fn new(
        kube: Arc<dyn KubeClient>,
        forge: Arc<dyn ForgeClient>,
        registry_tx: mpsc::Sender<CallbackHook>,
        settings: Settings,
    ) -> Self {
        Self {
            kube,
            forge,
            registry_tx,
            settings,
        }
    }
}

/// Resolve the API token from the referenced secret.
///
/// A missing secret, missing key, or empty value blocks only this
/// repository's reconciliation; other repositories are unaffected.
pub async fn resolve_token(
    kube: &dyn KubeClient,
    namespace: &str,
    secret_ref: &SecretRef,
) -> Result<String, Error> {
    let token = kube
        .read_secret(namespace, &secret_ref.name, &secret_ref.key)
        .await?;
    if token.is_empty() {
        return Err(Error::secret(format!(
            "secret {namespace}/{} key {:?} is empty",
            secret_ref.name, secret_ref.key
        )));
    }
    Ok(token)
}

/// True when the tagwatch finalizer is present on the resource
pub fn has_finalizer(finalizers: &[String]) -> bool {
    finalizers.iter().any(|f| f == FINALIZER)
}

/// Reconcile a Repository resource
///
/// Steps run strictly ordered within one cycle: resolve secret, ensure
/// webhook, sync releases, project deployments, persist status. A failure
/// aborts the cycle; whatever completed before the failure is still
/// persisted so partial progress survives.
#[instrument(skip(repo, ctx), fields(repository = %repo.name_any(), namespace = %repo.namespace().unwrap_or_default()))]
pub async fn reconcile(repo: Arc<Repository>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = repo.namespace().unwrap_or_default();
    let name = repo.name_any();

    if let Err(e) = repo.spec.validate() {
        warn!(error = %e, "repository validation failed");
        // Validation errors require a spec change; don't requeue
        return Ok(Action::await_change());
    }

    if repo.metadata.deletion_timestamp.is_some() {
        return finalize(&repo, &ctx, &namespace, &name).await;
    }

    if !has_finalizer(repo.finalizers()) {
        let mut finalizers = repo.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        ctx.kube
            .set_repository_finalizers(&namespace, &name, finalizers)
            .await?;
    }

    let token = resolve_token(ctx.kube.as_ref(), &namespace, &repo.spec.secret_ref).await?;

    let mut status = repo.status.clone().unwrap_or_default();
    let owner = repo.spec.owner.as_str();
    let repo_name = repo.spec.repo.as_str();

    // Webhook first: nothing downstream is useful without a registration.
    let webhook = hook::ensure_hook(
        ctx.forge.as_ref(),
        &token,
        owner,
        repo_name,
        &ctx.settings,
        status.webhook.as_ref(),
    )
    .await?;
    status.webhook = Some(webhook.clone());

    ctx.registry_tx
        .send(CallbackHook::register(
            name.as_str(),
            namespace.as_str(),
            repo.spec.slug(),
            webhook,
        ))
        .await
        .map_err(|_| Error::registry("update channel closed"))?;

    let now = Utc::now();
    let last_update = status.reconciliation.as_ref().and_then(|r| r.last_update);
    match release::sync(
        ctx.forge.as_ref(),
        &token,
        owner,
        repo_name,
        now,
        last_update,
        ctx.settings.reconciliation_period,
        &status.releases,
        repo.spec.max_available,
    )
    .await
    {
        Ok(Some(releases)) => {
            status = status.releases(releases).synced_at(now);
        }
        Ok(None) => {}
        Err(e) => {
            // Keep the webhook progress made this cycle; retry the rest.
            persist_partial(&ctx, &namespace, &name, &status).await;
            return Err(e);
        }
    }

    let domains = match ctx.kube.list_domains().await {
        Ok(domains) => domains,
        Err(e) => {
            persist_partial(&ctx, &namespace, &name, &status).await;
            return Err(e);
        }
    };

    let views = DomainView::from_domains(&domains);
    let (changed, releases) = deploy::project(&views, false, &status.releases);
    status.releases = if changed.is_empty() {
        releases
    } else {
        deploy::push(ctx.forge.as_ref(), &token, owner, repo_name, releases, &changed).await
    };

    ctx.kube
        .patch_repository_status(&namespace, &name, &status)
        .await?;

    Ok(Action::requeue(ctx.settings.reconciliation_period))
}

/// Best-effort status patch used when a cycle fails midway
async fn persist_partial(ctx: &Context, namespace: &str, name: &str, status: &RepositoryStatus) {
    if let Err(e) = ctx
        .kube
        .patch_repository_status(namespace, name, status)
        .await
    {
        warn!(error = %e, "failed to persist partial status");
    }
}

/// Handle a Repository with a deletion timestamp.
///
/// The remote webhook is deleted first; a failure there keeps the finalizer
/// and the registry entry so deletion retries (repeated attempts are safe).
/// Once the remote side is clean, the registry drops the entry and the
/// finalizer is removed.
async fn finalize(
    repo: &Repository,
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Action, Error> {
    if !has_finalizer(repo.finalizers()) {
        return Ok(Action::await_change());
    }

    info!("repository deleted, removing webhook");

    if let Some(webhook) = repo.status.as_ref().and_then(|s| s.webhook.clone()) {
        match resolve_token(ctx.kube.as_ref(), namespace, &repo.spec.secret_ref).await {
            Ok(token) => {
                hook::remove_hook(
                    ctx.forge.as_ref(),
                    &token,
                    &repo.spec.owner,
                    &repo.spec.repo,
                    &webhook,
                )
                .await?;
            }
            Err(e) => {
                // Without credentials the remote hook can never be removed;
                // don't wedge resource deletion on it.
                warn!(error = %e, "secret unavailable during deletion, leaving remote hook behind");
            }
        }
    }

    ctx.registry_tx
        .send(CallbackHook::removal(name, namespace, repo.spec.slug()))
        .await
        .map_err(|_| Error::registry("update channel closed"))?;

    let finalizers: Vec<String> = repo
        .finalizers()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    ctx.kube
        .set_repository_finalizers(namespace, name, finalizers)
        .await?;

    Ok(Action::await_change())
}

/// Error policy for the Repository controller
///
/// Called when reconciliation fails; requeues after a short delay so
/// transient external-API failures retry promptly.
pub fn error_policy(repo: Arc<Repository>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        repository = %repo.name_any(),
        namespace = %repo.namespace().unwrap_or_default(),
        "reconciliation failed"
    );
    Action::requeue(Duration::from_secs(10))
}
