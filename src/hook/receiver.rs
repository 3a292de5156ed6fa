//! Webhook callback HTTP server
//!
//! One route: `POST /payload/{owner}/{name}`. The handler looks the
//! repository up in the [`CallbackRegistry`] and validates the payload
//! signature against the hook's shared secret. Validation failures are
//! request-scoped; they never reach the reconciliation loop.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tracing::{debug, warn};

use super::registry::CallbackRegistry;
use super::signature::{self, SIGNATURE_HEADER};

/// Header naming the delivered event type
const EVENT_HEADER: &str = "x-github-event";

/// Header carrying the unique delivery id
const DELIVERY_HEADER: &str = "x-github-delivery";

/// Build the callback router
pub fn payload_router(registry: Arc<CallbackRegistry>) -> Router {
    Router::new()
        .route("/payload/{owner}/{name}", post(payload_handler))
        .with_state(registry)
}

async fn payload_handler(
    State(registry): State<Arc<CallbackRegistry>>,
    Path((owner, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(hook) = registry.lookup(&owner, &name) else {
        debug!(owner, repo = name, "payload for unknown repository");
        return StatusCode::NOT_FOUND;
    };

    let sig = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    match sig {
        Some(sig) if signature::verify(&hook.record.secret, &body, sig) => {}
        Some(_) => {
            warn!(slug = %hook.repo_slug, "invalid payload signature");
            return StatusCode::UNAUTHORIZED;
        }
        None => {
            warn!(slug = %hook.repo_slug, "missing payload signature header");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let delivery = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    debug!(slug = %hook.repo_slug, event, delivery, "payload accepted");
    StatusCode::OK
}
