//! Custom Resource Definitions for Tagwatch
//!
//! Two resources are defined: [`Repository`] (the watched source repository,
//! with persisted webhook/release status) and [`ExposedDomain`] (a read-only
//! description of an externally reachable URL bound to one release).

mod domain;
mod repository;
mod types;

pub use domain::{ExposedDomain, ExposedDomainSpec};
pub use repository::{Repository, RepositorySpec, RepositoryStatus};
pub use types::{
    DeploymentRecord, DeploymentState, ReconciliationStatus, Release, ReleaseLevel,
    ReleaseSelector, SecretRef, WebhookStatus,
};
