//! Webhook lifecycle, callback registry, and payload receiver
//!
//! This module owns everything webhook-shaped:
//! - [`lifecycle`] drives the remote hook (create / update / recreate-on-404
//!   / delete) against the code-hosting API
//! - [`registry`] is the in-memory table the callback server resolves
//!   inbound payloads against, mutated only through a single-consumer channel
//! - [`receiver`] is the HTTP surface validating payload signatures
//! - [`secret`] and [`signature`] supply the shared-secret HMAC machinery

pub mod lifecycle;
pub mod receiver;
pub mod registry;
pub mod secret;
pub mod signature;

pub use lifecycle::{desired_target, ensure_hook, remove_hook};
pub use receiver::payload_router;
pub use registry::{spawn_consumer, update_channel, CallbackHook, CallbackRegistry};
pub use secret::HookSecret;
