//! 令牌来源
//!
//! 令牌池为空时由令牌来源补充。两种来源互为替代：
//!
//! - 页面已下发的客户端配置中的 `tokens` 字段
//! - 网络请求 `GET /tao/ClientConfig/tokens`，返回 `[{"value": ...}]`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::feedback::{Feedback, LogFeedback, NO_TOKENS_RETRIEVED};
use super::token::Token;
use crate::utils::{CoreError, Result};

/// 令牌来源
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// 来源名称（用于日志）
    fn name(&self) -> &'static str;

    /// 取一批新令牌，按到达顺序返回
    async fn fetch(&self) -> Result<Vec<Token>>;
}

/// 从客户端配置载荷中提取令牌值
///
/// `tokens` 的元素可以是字符串，也可以是带 `value` 字段的对象。
pub fn tokens_from_payload(payload: &Value) -> Vec<String> {
    payload
        .get("tokens")
        .and_then(Value::as_array)
        .map(|tokens| {
            tokens
                .iter()
                .filter_map(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => map.get("value").and_then(Value::as_str).map(String::from),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// 客户端配置令牌来源
///
/// 载荷中的令牌只能被取用一次，之后返回空列表，直到下发新的载荷。
#[derive(Debug, Default)]
pub struct ClientConfigTokenSource {
    pending: Mutex<Vec<String>>,
}

impl ClientConfigTokenSource {
    /// 由客户端配置载荷创建
    pub fn new(payload: &Value) -> Self {
        Self::from_values(tokens_from_payload(payload))
    }

    pub fn from_values(values: Vec<String>) -> Self {
        Self {
            pending: Mutex::new(values),
        }
    }

    /// 下发新的客户端配置载荷
    pub fn set_payload(&self, payload: &Value) {
        *self.pending.lock() = tokens_from_payload(payload);
    }

    /// 尚未取用的令牌数量
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl TokenSource for ClientConfigTokenSource {
    fn name(&self) -> &'static str {
        "client_config"
    }

    async fn fetch(&self) -> Result<Vec<Token>> {
        let values = std::mem::take(&mut *self.pending.lock());
        Ok(values.into_iter().map(Token::new).collect())
    }
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    value: String,
}

/// 网络令牌来源
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    url: String,
    client: reqwest::Client,
    feedback: Arc<dyn Feedback>,
}

impl HttpTokenSource {
    /// 创建网络令牌来源
    ///
    /// `base_url` 与 `endpoint` 直接拼接，例如 `http://localhost` + `/tao/ClientConfig/tokens`。
    pub fn new(base_url: &str, endpoint: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "HTTP 客户端构建失败，使用默认配置");
                reqwest::Client::new()
            });
        Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), endpoint),
            client,
            feedback: Arc::new(LogFeedback),
        }
    }

    /// 替换反馈通道
    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = feedback;
        self
    }

    /// 使用已有的 HTTP 客户端
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn fail(&self, reason: String) -> CoreError {
        self.feedback.error(NO_TOKENS_RETRIEVED);
        tracing::warn!(url = %self.url, reason = %reason, "令牌获取失败");
        CoreError::TokenFetch(reason)
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<Token>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.fail(format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|e| self.fail(e.to_string()))?;
        let payload: Vec<TokenPayload> =
            serde_json::from_str(&body).map_err(|e| self.fail(e.to_string()))?;

        tracing::debug!(count = payload.len(), "已获取新令牌");
        Ok(payload.into_iter().map(|t| Token::new(t.value)).collect())
    }
}
