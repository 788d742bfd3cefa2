//! Transport to the single-blob storage service.
//!
//! The service holds one encrypted blob per identity. Each response carries
//! the blob's version and a content hash; the hash is echoed back on the
//! next push so concurrent writers are detected by the service.

use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use crate::types::{DecryptedValue, EncryptedValue};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the blob's content hash on responses.
pub const HASH_HEADER: &str = "virgil-keyknox-hash";
/// Header carrying the expected previous hash on pushes.
pub const PREVIOUS_HASH_HEADER: &str = "virgil-keyknox-previous-hash";
/// Header identifying the client product.
pub const AGENT_HEADER: &str = "virgil-agent";

const BLOB_PATH: &str = "/keyknox/v1";
const RESET_PATH: &str = "/keyknox/v1/reset";

/// Raw operations on the remote blob.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replaces the blob. `previous_hash` must match the current content
    /// hash when given.
    async fn push(
        &self,
        meta: &[u8],
        value: &[u8],
        previous_hash: Option<&[u8]>,
        token: &str,
    ) -> CloudResult<EncryptedValue>;

    /// Fetches the blob.
    async fn pull(&self, token: &str) -> CloudResult<EncryptedValue>;

    /// Empties the blob.
    async fn reset(&self, token: &str) -> CloudResult<DecryptedValue>;
}

#[derive(Serialize)]
struct PushBody {
    meta: String,
    value: String,
}

#[derive(Deserialize)]
struct ValueBody {
    #[serde(default)]
    meta: String,
    #[serde(default)]
    value: String,
    version: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// HTTP client for the blob service.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    agent: String,
}

impl HttpRemoteStore {
    pub fn new(config: &CloudConfig) -> CloudResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.service_url.trim_end_matches('/').to_string(),
            agent: format!(
                "{};rust;{};{}",
                config.agent_product,
                std::env::consts::OS,
                env!("CARGO_PKG_VERSION")
            ),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends an authorized request and maps error statuses.
    async fn send(&self, request: RequestBuilder, token: &str) -> CloudResult<Response> {
        let resp = request
            .header(AUTHORIZATION, format!("Virgil {token}"))
            .header(AGENT_HEADER, &self.agent)
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            let text = resp.text().await.unwrap_or_default();
            let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
            let (code, message) = match body {
                Some(b) => (b.code, b.message.unwrap_or_else(|| text.clone())),
                None => (None, text),
            };
            warn!("blob service returned {status}: {message}");
            return Err(CloudError::Server {
                status: status.as_u16(),
                code,
                message,
            });
        }
        Ok(resp)
    }

    /// Reads the content hash header and the JSON body.
    async fn read_value(resp: Response) -> CloudResult<EncryptedValue> {
        let content_hash = resp
            .headers()
            .get(HASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(CloudError::InvalidHashHeader)
            .and_then(|v| STANDARD.decode(v).map_err(|_| CloudError::InvalidHashHeader))?;

        let body: ValueBody = resp.json().await?;
        Ok(EncryptedValue {
            meta: decode_field("meta", &body.meta)?,
            value: decode_field("value", &body.value)?,
            version: body.version,
            content_hash,
        })
    }
}

fn decode_field(field: &str, encoded: &str) -> CloudResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| CloudError::Encoding(format!("{field}: {e}")))
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn push(
        &self,
        meta: &[u8],
        value: &[u8],
        previous_hash: Option<&[u8]>,
        token: &str,
    ) -> CloudResult<EncryptedValue> {
        let body = PushBody {
            meta: STANDARD.encode(meta),
            value: STANDARD.encode(value),
        };
        let mut request = self.client.put(self.url(BLOB_PATH)).json(&body);
        if let Some(hash) = previous_hash {
            request = request.header(PREVIOUS_HASH_HEADER, STANDARD.encode(hash));
        }

        let resp = self.send(request, token).await?;
        let pushed = Self::read_value(resp).await?;
        debug!("pushed blob, version {}", pushed.version);
        Ok(pushed)
    }

    async fn pull(&self, token: &str) -> CloudResult<EncryptedValue> {
        let resp = self.send(self.client.get(self.url(BLOB_PATH)), token).await?;
        let pulled = Self::read_value(resp).await?;
        debug!("pulled blob, version {}", pulled.version);
        Ok(pulled)
    }

    async fn reset(&self, token: &str) -> CloudResult<DecryptedValue> {
        let resp = self.send(self.client.post(self.url(RESET_PATH)), token).await?;
        let reset = Self::read_value(resp).await?;
        debug!("reset blob, version {}", reset.version);
        reset.into_reset_value()
    }
}
