//! 请求上下文与动作上下文
//!
//! `RequestContext` 记录当前请求正在执行的扩展/模块/动作，转发时被更新。
//! `ActionContext` 是动作可见的全部状态，并提供转发与重定向辅助方法。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::http::{HttpRequest, HttpResponse};
use super::outcome::ActionOutcome;
use super::resolution::Resolution;

/// 当前请求的路由上下文
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub extension: String,
    pub module: String,
    pub action: String,
}

impl RequestContext {
    pub fn new(
        extension: impl Into<String>,
        module: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            extension: extension.into(),
            module: module.into(),
            action: action.into(),
        }
    }

    /// 切换到新的解析结果
    pub fn update(&mut self, resolution: &Resolution) {
        self.extension = resolution.extension_id().to_string();
        self.module = resolution.module_name().to_string();
        self.action = resolution.action_name().to_string();
    }
}

/// 按平台 URL 约定拼接 `/<ext>/<module>/<action>?<query>`
pub fn build_url(extension: &str, module: &str, action: &str, params: &[(&str, &str)]) -> String {
    let mut url = format!("/{}/{}/{}", extension, module, action);
    if !params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        url.push('?');
        url.push_str(&query);
    }
    url
}

/// 动作上下文
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// 当前请求（转发后为派生请求）
    pub request: HttpRequest,
    /// 共享响应
    pub response: HttpResponse,
    /// 显式传入的参数，优先于请求参数
    pub params: Map<String, Value>,
    /// 路由上下文
    pub context: RequestContext,
}

impl ActionContext {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            response: HttpResponse::new(),
            params: Map::new(),
            context: RequestContext::default(),
        }
    }

    /// 按名称读取参数：显式参数、查询参数、请求体依次查找
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .get(name)
            .or_else(|| self.request.query.get(name))
            .or_else(|| self.request.body.get(name))
    }

    /// 读取字符串参数
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(Value::as_str)
    }

    /// 合并后的参数视图
    pub fn merged_params(&self) -> Map<String, Value> {
        let mut merged = self.request.body.clone();
        merged.extend(self.request.query.clone());
        merged.extend(self.params.clone());
        merged
    }

    /// 转发到另一个动作
    ///
    /// 未指定的控制器和扩展取当前上下文中的值。
    pub fn forward(
        &self,
        action: &str,
        controller: Option<&str>,
        extension: Option<&str>,
        params: &[(&str, &str)],
    ) -> ActionOutcome {
        let url = build_url(
            extension.unwrap_or(&self.context.extension),
            controller.unwrap_or(&self.context.module),
            action,
            params,
        );
        ActionOutcome::forward(url)
    }

    /// 转发到 URL
    pub fn forward_url(&self, url: impl Into<String>) -> ActionOutcome {
        ActionOutcome::forward(url)
    }

    /// 302 重定向
    pub fn redirect(&self, url: impl Into<String>) -> ActionOutcome {
        ActionOutcome::redirect(url)
    }

    /// 指定状态码重定向
    pub fn redirect_with_status(&self, url: impl Into<String>, status: u16) -> ActionOutcome {
        ActionOutcome::redirect_with_status(url, status)
    }
}
