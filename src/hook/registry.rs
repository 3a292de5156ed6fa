//! In-memory callback hook registry
//!
//! The registry maps repository slugs to active webhook records. It is the
//! only mutable structure shared between the reconcilers and the callback
//! server: reads happen on every inbound HTTP request, while all mutation is
//! linearized through a single bounded channel drained by one consumer task.
//! Producers block on send until the consumer drains, giving natural
//! backpressure with no unbounded queueing.
//!
//! Repository slugs (`owner/repo`) are assumed globally unique across all
//! watched Repository resources; the registry is keyed by them.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::crd::WebhookStatus;

/// An active webhook registration held in memory
///
/// Process-lifetime only; rebuilt from persisted Repository status on the
/// first reconcile after a restart.
#[derive(Clone, Debug)]
pub struct CallbackHook {
    /// Name of the owning Repository resource
    pub crd_name: String,
    /// Namespace of the owning Repository resource
    pub crd_namespace: String,
    /// `owner/repo` slug the callback route is keyed by
    pub repo_slug: String,
    /// Hook id and shared secret
    pub record: WebhookStatus,
    /// When set, this update removes the entry instead of upserting it
    pub delete: bool,
}

impl CallbackHook {
    /// Build a register update for an active hook
    pub fn register(
        crd_name: impl Into<String>,
        crd_namespace: impl Into<String>,
        repo_slug: impl Into<String>,
        record: WebhookStatus,
    ) -> Self {
        Self {
            crd_name: crd_name.into(),
            crd_namespace: crd_namespace.into(),
            repo_slug: repo_slug.into(),
            record,
            delete: false,
        }
    }

    /// Build a delete notification for a removed hook
    pub fn removal(
        crd_name: impl Into<String>,
        crd_namespace: impl Into<String>,
        repo_slug: impl Into<String>,
    ) -> Self {
        Self {
            crd_name: crd_name.into(),
            crd_namespace: crd_namespace.into(),
            repo_slug: repo_slug.into(),
            record: WebhookStatus::default(),
            delete: true,
        }
    }

    fn same_key(&self, other: &CallbackHook) -> bool {
        self.crd_name == other.crd_name
            && self.crd_namespace == other.crd_namespace
            && self.repo_slug == other.repo_slug
    }
}

/// Thread-safe hook table shared with the callback server
#[derive(Default)]
pub struct CallbackRegistry {
    hooks: RwLock<Vec<CallbackHook>>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one registry update.
    ///
    /// Absent key: insert. Present key with the delete flag: remove. Present
    /// key without the delete flag: replace the stored record, so a secret
    /// rotated by a recreate becomes visible to the callback server.
    pub fn apply(&self, hook: CallbackHook) {
        let mut hooks = self.hooks.write().expect("registry lock poisoned");

        match hooks.iter().position(|h| h.same_key(&hook)) {
            Some(idx) if hook.delete => {
                debug!(slug = %hook.repo_slug, "dropping callback hook");
                hooks.remove(idx);
            }
            Some(idx) => {
                hooks[idx].record = hook.record;
            }
            None if hook.delete => {}
            None => {
                debug!(slug = %hook.repo_slug, "registering callback hook");
                hooks.push(hook);
            }
        }
    }

    /// Find the active hook for `owner/repo`
    pub fn lookup(&self, owner: &str, repo: &str) -> Option<CallbackHook> {
        let slug = format!("{owner}/{repo}");
        let hooks = self.hooks.read().expect("registry lock poisoned");
        hooks.iter().find(|h| h.repo_slug == slug).cloned()
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.read().expect("registry lock poisoned").len()
    }

    /// True when no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create the bounded registry update channel.
///
/// Capacity one: producers block on send until the consumer drains.
pub fn update_channel() -> (mpsc::Sender<CallbackHook>, mpsc::Receiver<CallbackHook>) {
    mpsc::channel(1)
}

/// Spawn the single consumer task owning all registry mutation
pub fn spawn_consumer(
    registry: Arc<CallbackRegistry>,
    mut updates: mpsc::Receiver<CallbackHook>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(hook) = updates.recv().await {
            registry.apply(hook);
        }
        debug!("registry update channel closed, consumer exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(secret: &str) -> WebhookStatus {
        WebhookStatus {
            id: Some(1),
            secret: secret.to_string(),
        }
    }

    #[test]
    fn register_then_lookup_finds_the_hook() {
        let registry = CallbackRegistry::new();
        registry.apply(CallbackHook::register(
            "widgets",
            "default",
            "acme/widgets",
            record("s1"),
        ));

        let found = registry.lookup("acme", "widgets").unwrap();
        assert_eq!(found.record.secret, "s1");
        assert!(registry.lookup("acme", "gadgets").is_none());
    }

    #[test]
    fn re_register_replaces_the_record_without_duplicating() {
        let registry = CallbackRegistry::new();
        registry.apply(CallbackHook::register(
            "widgets",
            "default",
            "acme/widgets",
            record("old"),
        ));
        registry.apply(CallbackHook::register(
            "widgets",
            "default",
            "acme/widgets",
            record("rotated"),
        ));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup("acme", "widgets").unwrap().record.secret,
            "rotated"
        );
    }

    #[test]
    fn delete_flag_removes_the_entry() {
        let registry = CallbackRegistry::new();
        registry.apply(CallbackHook::register(
            "widgets",
            "default",
            "acme/widgets",
            record("s1"),
        ));
        registry.apply(CallbackHook::removal("widgets", "default", "acme/widgets"));

        assert!(registry.is_empty());
    }

    #[test]
    fn delete_of_unknown_key_is_a_no_op() {
        let registry = CallbackRegistry::new();
        registry.apply(CallbackHook::removal("ghost", "default", "acme/ghost"));
        assert!(registry.is_empty());
    }

    /// Story: many reconcilers registering through the channel while the
    /// callback server reads concurrently must never produce duplicate
    /// (name, namespace, slug) entries.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn story_concurrent_register_and_lookup_never_duplicates() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, rx) = update_channel();
        let consumer = spawn_consumer(registry.clone(), rx);

        let mut producers = Vec::new();
        for round in 0..8u32 {
            let tx = tx.clone();
            producers.push(tokio::spawn(async move {
                for _ in 0..16 {
                    tx.send(CallbackHook::register(
                        "widgets",
                        "default",
                        "acme/widgets",
                        record(&format!("secret-{round}")),
                    ))
                    .await
                    .unwrap();
                }
            }));
        }

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    for _ in 0..64 {
                        let _ = registry.lookup("acme", "widgets");
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for p in producers {
            p.await.unwrap();
        }
        for r in readers {
            r.await.unwrap();
        }
        drop(tx);
        consumer.await.unwrap();

        assert_eq!(registry.len(), 1);
    }
}
