//! Webhook secret generation
//!
//! Secrets are cryptographically random strings shared with the code-hosting
//! service and used to sign every delivered payload.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Raw entropy per secret; encodes to a fixed 43-character string
const SECRET_BYTES: usize = 32;

/// A freshly generated webhook signing secret
#[derive(Clone)]
pub struct HookSecret(String);

impl HookSecret {
    /// Generate a new random secret (URL-safe alphabet, fixed length)
    pub fn generate() -> Self {
        let mut raw = [0u8; SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        Self(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Borrow the secret string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the owned secret string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for HookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the secret in debug output
        f.write_str("HookSecret(..)")
    }
}
