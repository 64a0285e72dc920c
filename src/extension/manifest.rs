//! 扩展清单定义
//!
//! 定义扩展描述文件 (manifest.yaml) 中的数据结构。路由声明保持清单中的
//! 书写顺序，解析时按该顺序逐条尝试。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 路由声明
///
/// 清单中的每条路由要么是一个命名空间字符串（自动提升为 `NamespaceRoute`），
/// 要么是带 `class` 字段的结构化条目，其余字段作为路由选项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteDeclaration {
    /// 命名空间简写，例如 `"/taoItems": "oat::taoItems::controller"`
    Namespace(String),
    /// 结构化声明，例如 `{class: RegexRoute, pattern: ..., target: ...}`
    Structured(Map<String, Value>),
}

impl RouteDeclaration {
    /// 声明的路由类型标识
    ///
    /// 命名空间简写返回 `None`，由路由类型注册表补上默认类型。
    pub fn class(&self) -> Option<&str> {
        match self {
            RouteDeclaration::Namespace(_) => None,
            RouteDeclaration::Structured(map) => map.get("class").and_then(Value::as_str),
        }
    }

    /// 路由选项（不含 `class`）
    pub fn options(&self) -> Map<String, Value> {
        match self {
            RouteDeclaration::Namespace(ns) => {
                let mut map = Map::new();
                map.insert("namespace".to_string(), Value::String(ns.clone()));
                map
            }
            RouteDeclaration::Structured(map) => {
                let mut options = map.clone();
                options.remove("class");
                options
            }
        }
    }

    /// 是否为命名空间简写
    pub fn is_shorthand(&self) -> bool {
        matches!(self, RouteDeclaration::Namespace(_))
    }
}

/// 扩展
///
/// 启动时从配置或清单文件加载一次，请求处理期间不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extension {
    /// 扩展 ID（同时是旧式路由的 URL 命名空间）
    pub id: String,

    /// 显示名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// 版本号（semver）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// 是否已安装启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// 路由声明：route id -> 声明，保持清单顺序
    #[serde(default)]
    pub routes: IndexMap<String, RouteDeclaration>,
}

fn default_enabled() -> bool {
    true
}

impl Extension {
    /// 创建没有路由声明的扩展
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            version: None,
            enabled: true,
            routes: IndexMap::new(),
        }
    }

    /// 追加一条命名空间路由
    pub fn with_namespace_route(
        mut self,
        route_id: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        self.routes
            .insert(route_id.into(), RouteDeclaration::Namespace(namespace.into()));
        self
    }

    /// 追加一条结构化路由
    pub fn with_route(mut self, route_id: impl Into<String>, declaration: Value) -> Self {
        let declaration = match declaration {
            Value::String(ns) => RouteDeclaration::Namespace(ns),
            Value::Object(map) => RouteDeclaration::Structured(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                RouteDeclaration::Structured(map)
            }
        };
        self.routes.insert(route_id.into(), declaration);
        self
    }

    /// 设置启用状态
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 显示名称，未设置时回退为 ID
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// 是否声明了路由
    pub fn has_routes(&self) -> bool {
        !self.routes.is_empty()
    }
}
