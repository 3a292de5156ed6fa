//! Controller implementations for Tagwatch CRDs
//!
//! This module contains the reconciliation logic for Repository and
//! ExposedDomain resources. Controllers follow the Kubernetes controller
//! pattern with observe-diff-act loops.

mod domain;
mod repository;

pub use domain::{domain_error_policy, reconcile_domain};
pub use repository::{
    error_policy, has_finalizer, reconcile, resolve_token, Context, KubeClient, KubeClientImpl,
    FINALIZER,
};
