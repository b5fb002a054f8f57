use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://api.imgur.com/3/image";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Settings of one upload manager, fixed for its lifetime.
#[derive(Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Client credential attached to every request. Never validated locally.
    pub api_key: String,
    /// Resolve successes to the direct image link instead of the image page.
    #[serde(default = "default_direct_url")]
    pub direct_url: bool,
    /// Upload endpoint used by the HTTP transport.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Whole-transfer timeout used by the HTTP transport.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_direct_url() -> bool {
    true
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl UploadConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            direct_url: default_direct_url(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_direct_url(mut self, direct_url: bool) -> Self {
        self.direct_url = direct_url;
        self
    }

    pub fn trace_loaded(&self) {
        info!(
            endpoint = %self.endpoint,
            direct_url = self.direct_url,
            timeout_secs = self.timeout_secs,
            api_key_set = !self.api_key.is_empty(),
            "Loaded UploadConfig"
        );
        debug!(?self, "UploadConfig loaded (full debug)");
    }
}

// The credential stays out of logs.
impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("api_key", &"<redacted>")
            .field("direct_url", &self.direct_url)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
