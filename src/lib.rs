//! Tagwatch - release and webhook reconciliation for code-hosting services
//!
//! Tagwatch keeps a cluster's record of a source repository's releases and
//! webhook registration synchronized with an external code-hosting service.
//! Push webhooks provide freshness; a periodic poll provides correctness
//! across restarts, webhook loss, and out-of-order events. Per-release
//! deployment status is projected onto ExposedDomain resources.
//!
//! # Architecture
//!
//! - Repository resources drive a reconcile loop: resolve the API token,
//!   ensure the remote webhook, sync releases and pull-request previews,
//!   project deployments, persist status
//! - A callback HTTP server validates signed inbound payloads against an
//!   in-memory registry shared with the reconcilers
//! - ExposedDomain events re-project deployment status across repositories
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Repository, ExposedDomain)
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`forge`] - Code-hosting REST API client
//! - [`hook`] - Webhook lifecycle, callback registry, payload receiver
//! - [`release`] - Incremental release and pull-request sync
//! - [`deploy`] - Deployment status projection
//! - [`config`] - Runtime settings
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod deploy;
pub mod error;
pub mod forge;
pub mod hook;
pub mod release;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default port the callback server binds on
pub const DEFAULT_CALLBACK_PORT: u16 = 8090;
