//! Remote webhook lifecycle
//!
//! Ensures the remote webhook for a repository exists and matches the desired
//! configuration. Updates reuse the stored secret; only a full recreation
//! (create, or edit falling back after a remote 404) generates a new one.

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::crd::WebhookStatus;
use crate::forge::{ForgeClient, HookTarget};
use crate::Error;

use super::secret::HookSecret;

/// Desired webhook configuration for one repository
pub fn desired_target(settings: &Settings, owner: &str, repo: &str, secret: &str) -> HookTarget {
    HookTarget {
        url: settings.callback_url(owner, repo),
        secret: secret.to_string(),
        insecure_ssl: settings.insecure_ssl,
    }
}

/// Ensure the remote webhook exists and matches the desired configuration.
///
/// With no usable existing record, a hook is created with a freshly generated
/// secret. With an existing record, the hook is edited using the stored
/// secret; a remote 404 falls back to create-as-new. Any other failure is
/// returned unmodified so callers do not advance persisted status on an
/// unexplained error.
pub async fn ensure_hook(
    forge: &dyn ForgeClient,
    token: &str,
    owner: &str,
    repo: &str,
    settings: &Settings,
    existing: Option<&WebhookStatus>,
) -> Result<WebhookStatus, Error> {
    // A record that never got an id (or lost its secret) is treated as absent.
    let usable = existing.and_then(|rec| match rec.id {
        Some(id) if !rec.secret.is_empty() => Some((id, rec.secret.clone())),
        _ => None,
    });

    let Some((hook_id, secret)) = usable else {
        return create_hook(forge, token, owner, repo, settings).await;
    };

    let target = desired_target(settings, owner, repo, &secret);

    match forge.edit_hook(token, owner, repo, hook_id, &target).await {
        Ok(hook) => {
            debug!(owner, repo, hook_id = hook.id, "webhook updated");
            Ok(WebhookStatus {
                id: Some(hook.id),
                secret,
            })
        }
        Err(e) if e.is_not_found() => {
            info!(owner, repo, hook_id, "webhook vanished remotely, recreating");
            create_hook(forge, token, owner, repo, settings).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_hook(
    forge: &dyn ForgeClient,
    token: &str,
    owner: &str,
    repo: &str,
    settings: &Settings,
) -> Result<WebhookStatus, Error> {
    let secret = HookSecret::generate();
    let target = desired_target(settings, owner, repo, secret.as_str());

    let hook = forge.create_hook(token, owner, repo, &target).await?;
    info!(owner, repo, hook_id = hook.id, "webhook created");

    Ok(WebhookStatus {
        id: Some(hook.id),
        secret: secret.into_string(),
    })
}

/// Delete the remote webhook for a repository being removed.
///
/// A remote 404 counts as success (the hook is already gone). Any other
/// failure propagates so the caller retries; repeated attempts are safe.
pub async fn remove_hook(
    forge: &dyn ForgeClient,
    token: &str,
    owner: &str,
    repo: &str,
    existing: &WebhookStatus,
) -> Result<(), Error> {
    let Some(hook_id) = existing.id else {
        return Ok(());
    };

    match forge.delete_hook(token, owner, repo, hook_id).await {
        Ok(()) => {
            info!(owner, repo, hook_id, "webhook deleted");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            warn!(owner, repo, hook_id, "webhook already gone remotely");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
