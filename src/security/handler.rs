//! 令牌处理器
//!
//! 在 [`TokenStore`] 之上实现取令牌流程：先清理过期令牌，池中有令牌则取出最早的一个，
//! 否则从令牌来源补充一次后再取。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;

use super::source::TokenSource;
use super::store::TokenStore;
use super::token::Token;
use crate::utils::{CoreError, Result};

/// 令牌处理器
pub struct TokenHandler {
    store: Arc<TokenStore>,
    source: Arc<dyn TokenSource>,
    /// 补充操作互斥，并发的空池请求只触发一次补充
    refill_lock: Mutex<()>,
    refills: AtomicU64,
}

impl TokenHandler {
    pub fn new(store: Arc<TokenStore>, source: Arc<dyn TokenSource>) -> Self {
        Self {
            store,
            source,
            refill_lock: Mutex::new(()),
            refills: AtomicU64::new(0),
        }
    }

    /// 取出一个令牌
    ///
    /// 令牌池为空时补充一次；补充后仍为空则返回 [`CoreError::TokenRefill`]。
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn get_token(&self) -> Result<Token> {
        self.store.expire_old_tokens();
        if let Some(token) = self.store.pop() {
            return Ok(token);
        }

        let _guard = self.refill_lock.lock().await;

        // 等待期间其他任务可能已经补充完毕
        if let Some(token) = self.store.pop() {
            return Ok(token);
        }

        self.refills.fetch_add(1, Ordering::Relaxed);
        let tokens = self.source.fetch().await?;
        let received = tokens.len();
        for token in tokens {
            self.store.push(token);
        }
        tracing::debug!(received, "令牌池已补充");
        self.store.log();

        self.store.pop().ok_or(CoreError::TokenRefill)
    }

    /// 放回服务端下发的新令牌
    pub fn set_token(&self, value: impl Into<String>) -> bool {
        self.store.push(Token::new(value))
    }

    pub fn clear_store(&self) {
        self.store.clear();
    }

    /// 令牌池中的令牌数量
    pub fn queue_length(&self) -> usize {
        self.store.size()
    }

    pub fn set_max_size(&self, max_size: usize) {
        self.store.set_max_size(max_size);
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// 已执行的补充次数
    pub fn refills(&self) -> u64 {
        self.refills.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for TokenHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenHandler")
            .field("store", &self.store)
            .field("source", &self.source.name())
            .field("refills", &self.refills())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::source::ClientConfigTokenSource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct CountingSource {
        calls: AtomicUsize,
        batch: Vec<&'static str>,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fetch(&self) -> Result<Vec<Token>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.batch.iter().map(|v| Token::new(*v)).collect())
        }
    }

    fn store() -> Arc<TokenStore> {
        Arc::new(TokenStore::new(15, Duration::from_secs(30)))
    }

    #[tokio::test]
    async fn test_get_token_pops_oldest() {
        let store = store();
        store.push("a");
        store.push("b");
        let handler = TokenHandler::new(store, Arc::new(ClientConfigTokenSource::default()));

        assert_eq!(handler.get_token().await.unwrap().value, "a");
        assert_eq!(handler.queue_length(), 1);
        assert_eq!(handler.refills(), 0);
    }

    #[tokio::test]
    async fn test_refill_from_client_config() {
        let source = ClientConfigTokenSource::new(&json!({"tokens": ["t1", "t2", "t3"]}));
        let handler = TokenHandler::new(store(), Arc::new(source));

        assert_eq!(handler.get_token().await.unwrap().value, "t1");
        assert_eq!(handler.queue_length(), 2);
        assert_eq!(handler.get_token().await.unwrap().value, "t2");
        assert_eq!(handler.refills(), 1);
    }

    #[tokio::test]
    async fn test_empty_refill_fails() {
        let source = Arc::new(CountingSource::default());
        let handler = TokenHandler::new(store(), source.clone());

        let err = handler.get_token().await.unwrap_err();
        assert!(matches!(err, CoreError::TokenRefill));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_refill() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            batch: vec!["x1", "x2", "x3"],
        });
        let handler = Arc::new(TokenHandler::new(store(), source.clone()));

        let mut handles = vec![];
        for _ in 0..3 {
            let h = Arc::clone(&handler);
            handles.push(tokio::spawn(async move { h.get_token().await }));
        }

        let mut values = vec![];
        for handle in handles {
            values.push(handle.await.unwrap().unwrap().value);
        }
        values.sort();

        assert_eq!(values, vec!["x1", "x2", "x3"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.queue_length(), 0);
    }

    #[tokio::test]
    async fn test_delegates_to_store() {
        let handler = TokenHandler::new(store(), Arc::new(ClientConfigTokenSource::default()));

        assert!(handler.set_token("n1"));
        assert!(!handler.set_token("n1"));
        assert_eq!(handler.queue_length(), 1);

        handler.set_max_size(1);
        assert_eq!(handler.store().max_size(), 1);

        handler.clear_store();
        assert_eq!(handler.queue_length(), 0);
    }
}
