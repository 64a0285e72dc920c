//! 请求与响应数据结构
//!
//! 分发器在一次 HTTP 请求内部使用的最小请求/响应模型。转发时请求会被
//! 替换为指向新 URL 的副本，响应对象在整个转发链中共享。

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::utils::{generate_uuid, status_code, CoreError};

/// 转发响应头
pub const X_TAO_FORWARD: &str = "X-Tao-Forward";

/// 重定向目标响应头
pub const LOCATION: &str = "Location";

/// HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            _ => Method::Get,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解析查询字符串为参数表
pub fn parse_query(query: &str) -> Map<String, Value> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

/// 入站请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    /// 请求唯一标识（转发链中保持不变）
    pub request_id: String,

    /// 请求方法
    pub method: Method,

    /// 请求 URL（可以是绝对 URL 或路径，带查询字符串）
    pub url: String,

    /// 查询参数
    #[serde(default)]
    pub query: Map<String, Value>,

    /// 已解析的请求体参数
    #[serde(default)]
    pub body: Map<String, Value>,

    /// 请求头
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// 接收时间
    pub timestamp: DateTime<Utc>,
}

impl HttpRequest {
    /// 创建请求，查询参数从 URL 中解析
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        let query = url
            .split_once('?')
            .map(|(_, q)| parse_query(q.split('#').next().unwrap_or_default()))
            .unwrap_or_default();
        Self {
            request_id: generate_uuid(),
            method,
            url,
            query,
            body: Map::new(),
            headers: IndexMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// 创建 GET 请求
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// 创建带请求体的 POST 请求
    pub fn post(url: impl Into<String>, body: Map<String, Value>) -> Self {
        Self::new(Method::Post, url).with_body(body)
    }

    /// 设置请求体参数
    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// 添加请求头
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 获取请求头（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URL 中不含查询字符串与片段的部分
    pub fn path(&self) -> &str {
        let end = self.url.find(['?', '#']).unwrap_or(self.url.len());
        &self.url[..end]
    }

    /// 转发时需要保留的原请求参数
    ///
    /// GET 取查询参数，POST 取请求体，其他方法为空。
    pub fn forwarded_params(&self) -> Map<String, Value> {
        match self.method {
            Method::Get => self.query.clone(),
            Method::Post => self.body.clone(),
            _ => Map::new(),
        }
    }

    /// 以新 URL 派生请求
    ///
    /// 方法、请求头、请求体和请求 ID 保持不变，查询参数替换为新 URL 上的参数。
    pub fn forward_to(&self, url: impl Into<String>) -> Self {
        let mut forwarded = Self::new(self.method, url);
        forwarded.request_id = self.request_id.clone();
        forwarded.body = self.body.clone();
        forwarded.headers = self.headers.clone();
        forwarded.timestamp = self.timestamp;
        forwarded
    }
}

/// 出站响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    /// 状态码
    pub status: u16,

    /// 响应头
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// 响应体
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    /// 创建空的 200 响应
    pub fn new() -> Self {
        Self {
            status: status_code::OK,
            headers: IndexMap::new(),
            body: None,
        }
    }

    /// 由错误生成响应，使用 `{success: false, errorCode, errorMsg}` 信封
    pub fn from_error(err: &CoreError) -> Self {
        Self {
            status: err.status_code(),
            headers: IndexMap::new(),
            body: Some(json!({
                "success": false,
                "errorCode": err.error_code(),
                "errorMsg": err.to_string(),
            })),
        }
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// 设置响应头，同名（大小写不敏感）的旧值会被替换
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
    }

    /// 获取响应头（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 设置 JSON 响应体
    pub fn set_json(&mut self, body: Value) {
        self.set_header("Content-Type", "application/json");
        self.body = Some(body);
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parsed_from_url() {
        let request = HttpRequest::get("/taoItems/Items/edit?uri=http%3A%2F%2Fx%23i1&mode=full");
        assert_eq!(request.query["uri"], "http://x#i1");
        assert_eq!(request.query["mode"], "full");
        assert_eq!(request.path(), "/taoItems/Items/edit");
    }

    #[test]
    fn test_forwarded_params_by_method() {
        let get = HttpRequest::get("/tao/Main/index?a=1");
        assert_eq!(get.forwarded_params()["a"], "1");

        let mut body = Map::new();
        body.insert("label".to_string(), json!("item"));
        let post = HttpRequest::post("/tao/Main/save?ignored=1", body);
        let params = post.forwarded_params();
        assert_eq!(params["label"], "item");
        assert!(!params.contains_key("ignored"));

        let delete = HttpRequest::new(Method::Delete, "/tao/Main/remove?a=1");
        assert!(delete.forwarded_params().is_empty());
    }

    #[test]
    fn test_forward_to_keeps_identity() {
        let request = HttpRequest::get("/tao/Main/index?a=1").with_header("X-Requested-With", "XMLHttpRequest");
        let forwarded = request.forward_to("/tao/Users/add?b=2");

        assert_eq!(forwarded.request_id, request.request_id);
        assert_eq!(forwarded.header("x-requested-with"), Some("XMLHttpRequest"));
        assert!(!forwarded.query.contains_key("a"));
        assert_eq!(forwarded.query["b"], "2");
    }

    #[test]
    fn test_response_headers_case_insensitive() {
        let mut response = HttpResponse::new();
        response.set_header("location", "/a");
        response.set_header(LOCATION, "/b");
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header("LOCATION"), Some("/b"));
    }

    #[test]
    fn test_error_response() {
        let response = HttpResponse::from_error(&CoreError::UnresolvedRoute("/x".to_string()));
        assert_eq!(response.status, status_code::NOT_FOUND);
        let body = response.body.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["errorCode"], "ROUTING-001");
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::from("post"), Method::Post);
        assert_eq!(Method::from("unknown"), Method::Get);
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
