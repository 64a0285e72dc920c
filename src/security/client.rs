//! 受令牌保护的请求客户端
//!
//! 每个请求按以下规则分发：
//!
//! | 条件 | 处理 |
//! |---|---|
//! | `no_token` | 立即发送，不取令牌 |
//! | `sequential`、令牌池只剩一个令牌或通道中已有请求 | 进入单通道队列，逐个执行 |
//! | 其他 | 立即并发发送 |

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{instrument, Instrument};

use super::feedback::{Feedback, LogFeedback, UNAUTHORISED_REQUEST};
use super::handler::TokenHandler;
use super::queue::RequestQueue;
use crate::routing::Method;
use crate::utils::{generate_uuid, status_code, CoreError, Result};

/// CSRF 令牌请求头
pub const X_CSRF_TOKEN: &str = "X-CSRF-Token";
/// 认证令牌请求头
pub const X_AUTH_TOKEN: &str = "X-Auth-Token";
/// 没有可用令牌时发送的占位值
pub const NO_TOKEN: &str = "none";

const EMPTY_RESPONSE: &str = "The server has sent an empty response";

/// 请求选项
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub url: String,
    pub method: Method,
    /// GET 时作为查询参数，其他方法作为表单提交
    pub data: Map<String, Value>,
    pub headers: IndexMap<String, String>,
    /// 不使用令牌保护
    pub no_token: bool,
    /// 强制串行执行
    pub sequential: bool,
    /// 超时（秒），未设置时使用客户端默认值
    pub timeout_secs: Option<u64>,
}

impl RequestOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url).with_method(Method::Post)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn no_token(mut self) -> Self {
        self.no_token = true;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// 受保护请求客户端
#[derive(Debug, Clone)]
pub struct ProtectedClient {
    http: reqwest::Client,
    base_url: Option<String>,
    tokens: Arc<TokenHandler>,
    queue: RequestQueue,
    feedback: Arc<dyn Feedback>,
    timeout: Duration,
}

impl ProtectedClient {
    pub fn new(tokens: Arc<TokenHandler>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: None,
            tokens,
            queue: RequestQueue::new(),
            feedback: Arc::new(LogFeedback),
            timeout,
        }
    }

    /// 相对 URL 的前缀
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn tokens(&self) -> &Arc<TokenHandler> {
        &self.tokens
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// 发送请求
    ///
    /// 成功时返回响应信封；`204` 响应返回 `Value::Null`。
    /// 进入队列的请求即使调用方放弃等待也会被发送。
    pub async fn request(&self, options: RequestOptions) -> Result<Value> {
        if options.url.trim().is_empty() {
            return Err(CoreError::InvalidRequest(
                "At least give a URL for the request".to_string(),
            ));
        }

        if options.sequential {
            self.tokens.set_max_size(1);
        }

        let span = tracing::info_span!(
            "protected_request",
            request_id = %generate_uuid(),
            url = %options.url,
            method = %options.method,
        );

        if options.no_token {
            return self.send(options, false).instrument(span).await;
        }

        // 通道忙时也要排队：前一个请求可能刚取走最后一个令牌
        if options.sequential || self.tokens.queue_length() == 1 || !self.queue.is_idle() {
            tracing::debug!(parent: &span, pending = self.queue.pending(), "进入单通道队列");
            let client = self.clone();
            let task = async move { client.send(options, true).await }.instrument(span.clone());
            return self.queue.serie(task).instrument(span).await?;
        }

        self.send(options, true).instrument(span).await
    }

    /// 同时提交多个请求，结果按提交顺序返回
    ///
    /// 每个请求仍按分发规则决定是否进入单通道队列。
    pub async fn request_all(&self, requests: Vec<RequestOptions>) -> Vec<Result<Value>> {
        futures::future::join_all(requests.into_iter().map(|options| self.request(options))).await
    }

    async fn send(&self, options: RequestOptions, protected: bool) -> Result<Value> {
        let token = if protected { self.acquire_token().await? } else { None };

        let url = self.resolve_url(&options.url);
        let timeout = options
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.timeout);

        let mut builder = self
            .http
            .request(to_reqwest_method(options.method), &url)
            .timeout(timeout);

        let pairs = form_pairs(&options.data);
        builder = match options.method {
            Method::Get | Method::Head | Method::Delete => builder.query(&pairs),
            _ => builder.form(&pairs),
        };

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if protected {
            let value = token.as_deref().unwrap_or(NO_TOKEN);
            builder = builder.header(X_CSRF_TOKEN, value).header(X_AUTH_TOKEN, value);
        }

        let response = builder.send().await.map_err(|e| CoreError::Network {
            code: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        })?;

        // 新令牌先回池，再判断响应
        if let Some(next) = response
            .headers()
            .get(X_CSRF_TOKEN)
            .and_then(|v| v.to_str().ok())
        {
            self.tokens.set_token(next);
        }

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| CoreError::Network {
            code: status,
            message: e.to_string(),
        })?;

        self.evaluate(status, &body)
    }

    /// 取令牌；令牌来源没有返回令牌时以降级方式继续
    #[instrument(skip(self))]
    async fn acquire_token(&self) -> Result<Option<String>> {
        match self.tokens.get_token().await {
            Ok(token) => Ok(Some(token.value)),
            Err(CoreError::TokenRefill) => {
                tracing::warn!("没有可用令牌，请求以 '{}' 继续", NO_TOKEN);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.contains("://") => {
                format!("{}/{}", base, url.trim_start_matches('/'))
            }
            _ => url.to_string(),
        }
    }

    fn evaluate(&self, status: u16, body: &str) -> Result<Value> {
        if status == status_code::NO_CONTENT {
            return Ok(Value::Null);
        }

        let envelope: Option<Value> = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str(body).ok()
        };
        let error_code = envelope.as_ref().and_then(envelope_code);

        if status == status_code::UNAUTHORIZED || error_code == Some(status_code::UNAUTHORIZED) {
            self.feedback.error(UNAUTHORISED_REQUEST);
            let message = envelope
                .as_ref()
                .and_then(envelope_message)
                .unwrap_or_else(|| UNAUTHORISED_REQUEST.to_string());
            return Err(CoreError::Unauthorized(message));
        }

        if !(200..300).contains(&status) {
            let message = envelope
                .as_ref()
                .and_then(envelope_message)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(CoreError::Network { code: status, message });
        }

        if error_code == Some(status_code::NO_CONTENT) {
            return Ok(Value::Null);
        }

        match envelope {
            Some(envelope) if envelope.get("success").and_then(Value::as_bool) == Some(true) => {
                Ok(envelope)
            }
            Some(envelope) => Err(server_error(status, envelope)),
            None => Err(CoreError::ServerError {
                code: status,
                message: EMPTY_RESPONSE.to_string(),
                response: None,
            }),
        }
    }
}

/// 响应信封中的 `errorCode`（数字或数字字符串）
fn envelope_code(envelope: &Value) -> Option<u16> {
    match envelope.get("errorCode")? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn envelope_message(envelope: &Value) -> Option<String> {
    ["errorMsg", "errorMessage", "error"]
        .iter()
        .find_map(|key| envelope.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// 失败信封转换为错误，消息格式为 `"<errorCode> : <message>"`
fn server_error(status: u16, envelope: Value) -> CoreError {
    let message = match envelope.get("errorCode").filter(|c| !c.is_null()) {
        Some(code) => {
            let code = match code {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{} : {}", code, envelope_message(&envelope).unwrap_or_default())
        }
        None => EMPTY_RESPONSE.to_string(),
    };
    CoreError::ServerError {
        code: envelope_code(&envelope).unwrap_or(status),
        message,
        response: Some(envelope),
    }
}

fn form_pairs(data: &Map<String, Value>) -> Vec<(String, String)> {
    data.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::source::ClientConfigTokenSource;
    use crate::security::store::TokenStore;
    use serde_json::json;

    fn client() -> ProtectedClient {
        let store = Arc::new(TokenStore::new(15, Duration::from_secs(30)));
        let handler = TokenHandler::new(store, Arc::new(ClientConfigTokenSource::default()));
        ProtectedClient::new(Arc::new(handler), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected() {
        let err = client().request(RequestOptions::new("  ")).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn test_evaluate_envelopes() {
        let client = client();

        assert_eq!(client.evaluate(204, "").unwrap(), Value::Null);
        assert_eq!(client.evaluate(200, r#"{"errorCode": 204}"#).unwrap(), Value::Null);

        let ok = client.evaluate(200, r#"{"success": true, "data": [1]}"#).unwrap();
        assert_eq!(ok["data"], json!([1]));

        let err = client
            .evaluate(200, r#"{"success": false, "errorCode": "412", "errorMsg": "stale"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "412 : stale");
        assert_eq!(err.status_code(), 412);

        let err = client.evaluate(200, r#"{"success": false}"#).unwrap_err();
        assert_eq!(err.to_string(), EMPTY_RESPONSE);

        let err = client.evaluate(200, "").unwrap_err();
        assert_eq!(err.to_string(), EMPTY_RESPONSE);
    }

    #[test]
    fn test_evaluate_unauthorized_and_network() {
        let client = client();

        assert!(matches!(client.evaluate(401, ""), Err(CoreError::Unauthorized(_))));
        assert!(matches!(
            client.evaluate(200, r#"{"errorCode": 401, "errorMessage": "expired"}"#),
            Err(CoreError::Unauthorized(m)) if m == "expired"
        ));

        match client.evaluate(503, "") {
            Err(CoreError::Network { code, .. }) => assert_eq!(code, 503),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_url() {
        let client = client().with_base_url("http://localhost:8080/");
        assert_eq!(client.resolve_url("/tao/Main/index"), "http://localhost:8080/tao/Main/index");
        assert_eq!(client.resolve_url("https://other/x"), "https://other/x");
    }

    #[test]
    fn test_form_pairs() {
        let mut data = Map::new();
        data.insert("a".into(), json!("x"));
        data.insert("b".into(), json!(2));
        assert_eq!(
            form_pairs(&data),
            vec![("a".to_string(), "x".to_string()), ("b".to_string(), "2".to_string())]
        );
    }
}
