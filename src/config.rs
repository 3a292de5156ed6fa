//! Runtime settings for the operator
//!
//! Settings are parsed once at startup (clap, in `main`) and shared read-only
//! across the controllers and the callback server.

use std::time::Duration;

/// Operator-wide settings
#[derive(Clone, Debug)]
pub struct Settings {
    /// Base domain used to build webhook callback URLs
    pub domain: String,

    /// Use http instead of https for callback URLs
    pub insecure_ssl: bool,

    /// Port the callback server binds on
    pub callback_port: u16,

    /// Minimum interval between full release syncs per repository
    pub reconciliation_period: Duration,

    /// Base URL of the code-hosting REST API
    pub api_url: String,
}

impl Settings {
    /// URL scheme for callback URLs, derived from the insecure flag
    pub fn scheme(&self) -> &'static str {
        if self.insecure_ssl {
            "http"
        } else {
            "https"
        }
    }

    /// Callback URL the remote webhook is pointed at for one repository
    pub fn callback_url(&self, owner: &str, repo: &str) -> String {
        format!(
            "{}://{}/payload/{}/{}",
            self.scheme(),
            self.domain,
            owner,
            repo
        )
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            insecure_ssl: false,
            callback_port: crate::DEFAULT_CALLBACK_PORT,
            reconciliation_period: Duration::from_secs(300),
            api_url: "https://api.github.com".to_string(),
        }
    }
}
