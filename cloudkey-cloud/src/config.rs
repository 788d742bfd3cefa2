//! Cloud storage configuration.

use crate::error::{CloudError, CloudResult};
use serde::{Deserialize, Serialize};

/// Configuration for the blob service client and sync manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Base URL of the blob service (e.g., "https://api.virgilsecurity.com").
    pub service_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Retry once with a refreshed token when the service answers 401.
    pub retry_on_unauthorized: bool,

    /// Product name sent in the agent header.
    pub agent_product: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            service_url: "https://api.virgilsecurity.com".to_string(),
            request_timeout_secs: 30,
            retry_on_unauthorized: false,
            agent_product: "keyknox".to_string(),
        }
    }
}

impl CloudConfig {
    /// Creates a config pointing at a local test server.
    pub fn local(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            request_timeout_secs: 5,
            ..Self::default()
        }
    }

    /// Checks the settings that would otherwise fail on the first request.
    pub fn validate(&self) -> CloudResult<()> {
        let url = self.service_url.trim();
        if url.is_empty() {
            return Err(CloudError::Config("missing service_url".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CloudError::Config(format!(
                "service_url must be http(s), got {url}"
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CloudError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
