//! Tagwatch Operator - release and webhook reconciliation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tagwatch::config::Settings;
use tagwatch::controller::{
    domain_error_policy, error_policy, reconcile, reconcile_domain, Context, KubeClientImpl,
};
use tagwatch::crd::{ExposedDomain, Repository};
use tagwatch::forge::HttpForge;
use tagwatch::hook::{payload_router, spawn_consumer, update_channel, CallbackRegistry};

/// Tagwatch - keeps repository releases and webhook registrations in sync
/// with a code-hosting service
#[derive(Parser, Debug)]
#[command(name = "tagwatch", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Base domain used to build webhook callback URLs
    #[arg(long, env = "TAGWATCH_DOMAIN", default_value = "localhost")]
    domain: String,

    /// Build http (not https) callback URLs
    #[arg(long, env = "TAGWATCH_INSECURE_SSL")]
    insecure_ssl: bool,

    /// Port the callback server binds on
    #[arg(long, env = "TAGWATCH_CALLBACK_PORT", default_value_t = tagwatch::DEFAULT_CALLBACK_PORT)]
    callback_port: u16,

    /// Minimum seconds between release syncs per repository
    #[arg(long, env = "TAGWATCH_RECONCILIATION_PERIOD", default_value_t = 300)]
    reconciliation_period: u64,

    /// Base URL of the code-hosting REST API
    #[arg(long, env = "TAGWATCH_API_URL", default_value = "https://api.github.com")]
    api_url: String,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            domain: self.domain.clone(),
            insecure_ssl: self.insecure_ssl,
            callback_port: self.callback_port,
            reconciliation_period: Duration::from_secs(self.reconciliation_period),
            api_url: self.api_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let repository = serde_yaml::to_string(&Repository::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize Repository CRD: {}", e))?;
        let domain = serde_yaml::to_string(&ExposedDomain::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize ExposedDomain CRD: {}", e))?;
        println!("{repository}---\n{domain}");
        return Ok(());
    }

    run_controller(cli.settings()).await
}

/// Ensure all Tagwatch CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply,
/// so the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("tagwatch-controller").force();

    tracing::info!("Installing Repository CRD...");
    crds.patch(
        "repositories.tagwatch.dev",
        &params,
        &Patch::Apply(&Repository::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Repository CRD: {}", e))?;

    tracing::info!("Installing ExposedDomain CRD...");
    crds.patch(
        "exposeddomains.tagwatch.dev",
        &params,
        &Patch::Apply(&ExposedDomain::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install ExposedDomain CRD: {}", e))?;

    tracing::info!("All Tagwatch CRDs installed/updated");
    Ok(())
}

/// Run the operator: callback server, registry consumer, and both controllers
async fn run_controller(settings: Settings) -> anyhow::Result<()> {
    tracing::info!("Tagwatch controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    // The registry is the only mutable state shared with the callback
    // server; all writes flow through the single consumer task.
    let registry = Arc::new(CallbackRegistry::new());
    let (registry_tx, registry_rx) = update_channel();
    let consumer = spawn_consumer(registry.clone(), registry_rx);

    let forge = Arc::new(
        HttpForge::new(&settings.api_url)
            .map_err(|e| anyhow::anyhow!("Failed to create API client: {}", e))?,
    );

    let ctx = Arc::new(Context::new(
        Arc::new(KubeClientImpl::new(client.clone())),
        forge,
        registry_tx,
        settings.clone(),
    ));

    // Callback server with graceful drain on the termination signal
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.callback_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind callback server on {}: {}", addr, e))?;
    tracing::info!(addr = %addr, "callback server listening");

    let router = payload_router(registry.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let repositories: Api<Repository> = Api::all(client.clone());
    let domains: Api<ExposedDomain> = Api::all(client.clone());

    tracing::info!("Starting Tagwatch controllers...");
    tracing::info!("  - Repository controller");
    tracing::info!("  - ExposedDomain controller");

    let repository_controller = Controller::new(repositories, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Repository reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Repository reconciliation error");
                }
            }
        });

    let domain_controller = Controller::new(domains, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile_domain, domain_error_policy, ctx.clone())
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "ExposedDomain reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "ExposedDomain reconciliation error");
                }
            }
        });

    tokio::select! {
        _ = repository_controller => {
            tracing::info!("Repository controller completed");
        }
        _ = domain_controller => {
            tracing::info!("ExposedDomain controller completed");
        }
    }

    // Give the callback server a bounded window to drain in-flight requests
    match tokio::time::timeout(Duration::from_secs(10), server).await {
        Ok(Ok(Ok(()))) => tracing::info!("callback server drained"),
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "callback server exited with error"),
        Ok(Err(e)) => tracing::warn!(error = %e, "callback server task panicked"),
        Err(_) => tracing::warn!("callback server drain timed out"),
    }

    // Dropping the context closes the update channel; the consumer exits
    drop(ctx);
    let _ = consumer.await;

    tracing::info!("Tagwatch controller shutting down");
    Ok(())
}

/// Resolves when the process receives a termination signal
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("termination signal received");
}
