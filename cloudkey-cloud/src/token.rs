//! Access-token supply for blob service requests.
//!
//! Every request asks a [`TokenProvider`] for a token describing the
//! operation it is about to perform. After a 401 the manager asks again
//! with `force_reload` set so cached tokens get replaced.

use crate::error::CloudResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Service name the tokens are scoped to.
pub const SERVICE_NAME: &str = "keyknox";

/// Kind of blob operation a token is requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenOperation {
    Put,
    Get,
    Delete,
}

impl TokenOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenOperation::Put => "put",
            TokenOperation::Get => "get",
            TokenOperation::Delete => "delete",
        }
    }
}

/// What a token is for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenContext {
    pub operation: TokenOperation,
    pub force_reload: bool,
    pub service: String,
}

impl TokenContext {
    pub fn new(operation: TokenOperation, force_reload: bool) -> Self {
        Self {
            operation,
            force_reload,
            service: SERVICE_NAME.to_string(),
        }
    }
}

/// Supplies access tokens for blob service requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, context: &TokenContext) -> CloudResult<String>;
}

/// Always returns the same token.
#[derive(Clone, Debug)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _context: &TokenContext) -> CloudResult<String> {
        Ok(self.token.clone())
    }
}

/// Caches the last token from an inner provider until a forced reload.
pub struct CachingTokenProvider {
    inner: Arc<dyn TokenProvider>,
    cached: RwLock<Option<String>>,
}

impl CachingTokenProvider {
    pub fn new(inner: Arc<dyn TokenProvider>) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
        }
    }

    /// Drops the cached token.
    pub async fn clear(&self) {
        *self.cached.write().await = None;
    }
}

#[async_trait]
impl TokenProvider for CachingTokenProvider {
    async fn get_token(&self, context: &TokenContext) -> CloudResult<String> {
        if !context.force_reload {
            if let Some(token) = self.cached.read().await.as_ref() {
                return Ok(token.clone());
            }
        }

        debug!(
            "fetching {} token (force_reload={})",
            context.operation.as_str(),
            context.force_reload
        );
        let token = self.inner.get_token(context).await?;
        *self.cached.write().await = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn get_token(&self, _context: &TokenContext) -> CloudResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{n}"))
        }
    }

    #[tokio::test]
    async fn caching_provider_reuses_token_until_forced() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let provider = CachingTokenProvider::new(inner.clone());

        let get = TokenContext::new(TokenOperation::Get, false);
        assert_eq!(provider.get_token(&get).await.unwrap(), "token-0");
        assert_eq!(provider.get_token(&get).await.unwrap(), "token-0");

        let forced = TokenContext::new(TokenOperation::Get, true);
        assert_eq!(provider.get_token(&forced).await.unwrap(), "token-1");
        assert_eq!(provider.get_token(&get).await.unwrap(), "token-1");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_forces_fetch() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let provider = CachingTokenProvider::new(inner.clone());
        let ctx = TokenContext::new(TokenOperation::Put, false);

        provider.get_token(&ctx).await.unwrap();
        provider.clear().await;
        assert_eq!(provider.get_token(&ctx).await.unwrap(), "token-1");
    }

    #[test]
    fn context_defaults_to_blob_service() {
        let ctx = TokenContext::new(TokenOperation::Delete, true);
        assert_eq!(ctx.service, "keyknox");
        assert_eq!(ctx.operation.as_str(), "delete");
    }
}
