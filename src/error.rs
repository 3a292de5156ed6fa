//! Error types for the Tagwatch operator

use thiserror::Error;

/// Main error type for Tagwatch operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Code-hosting API error
    #[error("forge error: {0}")]
    Forge(#[from] crate::forge::ForgeError),

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Secret resolution error (missing secret, missing key, bad encoding)
    #[error("secret error: {0}")]
    Secret(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Registry update channel closed (consumer task gone)
    #[error("registry error: {0}")]
    Registry(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a secret resolution error with the given message
    pub fn secret(msg: impl Into<String>) -> Self {
        Self::Secret(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a registry error with the given message
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// True when the underlying cause is a remote not-found.
    ///
    /// Not-found is control flow for this operator: a missing hook means
    /// recreate, a missing latest release means an empty release list.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Forge(e) => e.is_not_found(),
            Self::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}
