//! 路由类型
//!
//! 每条路由把相对 URL 映射为 `Controller@action` 目标字符串，不匹配时返回 `None`。
//! 内置三种路由类型：
//!
//! - `NamespaceRoute`：路由 ID 作为 URL 前缀，剩余部分为 `Controller[/action]`
//! - `LegacyRoute`：`<ext>/<Module>/<action>` 映射到 `<ext>_actions_<Module>`
//! - `RegexRoute`：正则匹配，目标模板用捕获组展开
//!
//! 路由类型通过 [`RouteTypeRegistry`] 按清单中的 `class` 标识创建。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::extension::RouteDeclaration;
use crate::utils::{CoreError, Result};

/// 命名空间路由类型标识
pub const NAMESPACE_ROUTE: &str = "NamespaceRoute";
/// 旧式路由类型标识
pub const LEGACY_ROUTE: &str = "LegacyRoute";
/// 正则路由类型标识
pub const REGEX_ROUTE: &str = "RegexRoute";

/// 命名空间路由的选项键
pub const OPTION_NAMESPACE: &str = "namespace";

const DEFAULT_CONTROLLER: &str = "Main";
const DEFAULT_ACTION: &str = "index";

/// 路由
pub trait Route: Send + Sync + fmt::Debug {
    /// 路由 ID（去掉首尾斜杠）
    fn id(&self) -> &str;

    /// 所属扩展
    fn extension_id(&self) -> &str;

    /// 路由类型标识
    fn kind(&self) -> &'static str;

    /// 尝试解析相对 URL，返回 `Controller@action`
    fn resolve(&self, relative_url: &str) -> Option<String>;
}

/// 把 `a/b/c` 形式的剩余路径拆成控制器和动作
fn split_remainder(rest: &str) -> (&str, &str) {
    let mut parts = rest.split('/').filter(|s| !s.is_empty());
    let controller = parts.next().unwrap_or(DEFAULT_CONTROLLER);
    let action = parts.next().unwrap_or(DEFAULT_ACTION);
    (controller, action)
}

/// 去掉前缀后的剩余路径；前缀必须在段边界上结束
fn strip_segment_prefix<'a>(url: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = url.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

// ============================================================================
// NamespaceRoute
// ============================================================================

/// 命名空间路由
#[derive(Debug, Clone)]
pub struct NamespaceRoute {
    extension_id: String,
    id: String,
    namespace: String,
}

impl NamespaceRoute {
    pub fn new(
        extension_id: impl Into<String>,
        id: impl Into<String>,
        options: &Map<String, Value>,
    ) -> Result<Self> {
        let extension_id = extension_id.into();
        let id = id.into();
        let namespace = options
            .get(OPTION_NAMESPACE)
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| CoreError::InvalidRouteConfig {
                extension: extension_id.clone(),
                route: id.clone(),
                reason: "缺少 namespace 选项".to_string(),
            })?;

        Ok(Self {
            namespace: namespace.trim_end_matches("::").to_string(),
            extension_id,
            id,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Route for NamespaceRoute {
    fn id(&self) -> &str {
        &self.id
    }

    fn extension_id(&self) -> &str {
        &self.extension_id
    }

    fn kind(&self) -> &'static str {
        NAMESPACE_ROUTE
    }

    fn resolve(&self, relative_url: &str) -> Option<String> {
        let rest = strip_segment_prefix(relative_url, &self.id)?;
        let (controller, action) = split_remainder(rest);
        Some(format!("{}::{}@{}", self.namespace, controller, action))
    }
}

// ============================================================================
// LegacyRoute
// ============================================================================

/// 旧式路由
///
/// 以扩展 ID 作为 URL 命名空间，没有声明路由的扩展会自动获得一条。
#[derive(Debug, Clone)]
pub struct LegacyRoute {
    extension_id: String,
    id: String,
}

impl LegacyRoute {
    pub fn new(extension_id: impl Into<String>) -> Self {
        let extension_id = extension_id.into();
        Self {
            id: extension_id.clone(),
            extension_id,
        }
    }

    /// 旧式控制器名称
    pub fn controller_name(extension_id: &str, module: &str) -> String {
        format!("{}_actions_{}", extension_id, module)
    }
}

impl Route for LegacyRoute {
    fn id(&self) -> &str {
        &self.id
    }

    fn extension_id(&self) -> &str {
        &self.extension_id
    }

    fn kind(&self) -> &'static str {
        LEGACY_ROUTE
    }

    fn resolve(&self, relative_url: &str) -> Option<String> {
        let rest = strip_segment_prefix(relative_url, &self.extension_id)?;
        let (module, action) = split_remainder(rest);
        Some(format!(
            "{}@{}",
            Self::controller_name(&self.extension_id, module),
            action
        ))
    }
}

// ============================================================================
// RegexRoute
// ============================================================================

/// 正则路由
///
/// 选项 `pattern` 匹配整个相对 URL，`target` 中的 `$name` / `${1}` 用捕获组展开。
#[derive(Debug, Clone)]
pub struct RegexRoute {
    extension_id: String,
    id: String,
    pattern: Regex,
    target: String,
}

impl RegexRoute {
    pub fn new(
        extension_id: impl Into<String>,
        id: impl Into<String>,
        options: &Map<String, Value>,
    ) -> Result<Self> {
        let extension_id = extension_id.into();
        let id = id.into();
        let invalid = |reason: String| CoreError::InvalidRouteConfig {
            extension: extension_id.clone(),
            route: id.clone(),
            reason,
        };

        let pattern = options
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("缺少 pattern 选项".to_string()))?;
        let target = options
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("缺少 target 选项".to_string()))?;
        let pattern =
            Regex::new(pattern).map_err(|e| invalid(format!("无效的正则表达式: {}", e)))?;

        Ok(Self {
            target: target.to_string(),
            pattern,
            extension_id,
            id,
        })
    }
}

impl Route for RegexRoute {
    fn id(&self) -> &str {
        &self.id
    }

    fn extension_id(&self) -> &str {
        &self.extension_id
    }

    fn kind(&self) -> &'static str {
        REGEX_ROUTE
    }

    fn resolve(&self, relative_url: &str) -> Option<String> {
        let captures = self.pattern.captures(relative_url)?;
        let mut target = String::new();
        captures.expand(&self.target, &mut target);
        Some(target)
    }
}

// ============================================================================
// RouteTypeRegistry
// ============================================================================

/// 路由工厂：(扩展 ID, 路由 ID, 选项) -> 路由
pub type RouteFactory =
    Arc<dyn Fn(&str, &str, &Map<String, Value>) -> Result<Arc<dyn Route>> + Send + Sync>;

/// 路由类型注册表
///
/// 按 `class` 标识创建路由。标识可以带命名空间前缀
/// （例如 `oat\tao\model\routing\NamespaceRoute`），查找时先精确匹配，再按最后一段匹配。
#[derive(Clone)]
pub struct RouteTypeRegistry {
    factories: HashMap<String, RouteFactory>,
}

impl fmt::Debug for RouteTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("RouteTypeRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for RouteTypeRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl RouteTypeRegistry {
    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// 创建包含内置路由类型的注册表
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(NAMESPACE_ROUTE, |ext, id, options| {
            Ok(Arc::new(NamespaceRoute::new(ext, id, options)?) as Arc<dyn Route>)
        });
        registry.register(LEGACY_ROUTE, |ext, _id, _options| {
            Ok(Arc::new(LegacyRoute::new(ext)) as Arc<dyn Route>)
        });
        registry.register(REGEX_ROUTE, |ext, id, options| {
            Ok(Arc::new(RegexRoute::new(ext, id, options)?) as Arc<dyn Route>)
        });
        registry
    }

    /// 注册路由类型，同名类型会被覆盖
    pub fn register<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&str, &str, &Map<String, Value>) -> Result<Arc<dyn Route>> + Send + Sync + 'static,
    {
        self.factories.insert(class.into(), Arc::new(factory));
    }

    /// 是否为已知路由类型
    pub fn contains(&self, class: &str) -> bool {
        self.lookup(class).is_some()
    }

    fn lookup(&self, class: &str) -> Option<&RouteFactory> {
        self.factories.get(class).or_else(|| {
            let short = class.rsplit(['\\', ':']).next().unwrap_or(class);
            self.factories.get(short)
        })
    }

    /// 根据清单声明创建路由
    ///
    /// 字符串声明提升为 `NamespaceRoute`；结构化声明缺少 `class` 或 `class`
    /// 未注册时返回 `InvalidRouteConfig`。
    pub fn create(
        &self,
        extension_id: &str,
        route_id: &str,
        declaration: &RouteDeclaration,
    ) -> Result<Arc<dyn Route>> {
        let route_id = route_id.trim_matches('/');
        let class = match declaration {
            RouteDeclaration::Namespace(_) => NAMESPACE_ROUTE,
            RouteDeclaration::Structured(_) => {
                declaration
                    .class()
                    .ok_or_else(|| CoreError::InvalidRouteConfig {
                        extension: extension_id.to_string(),
                        route: route_id.to_string(),
                        reason: "缺少 class".to_string(),
                    })?
            }
        };

        let factory = self
            .lookup(class)
            .ok_or_else(|| CoreError::InvalidRouteConfig {
                extension: extension_id.to_string(),
                route: route_id.to_string(),
                reason: format!("未知的路由类型 '{}'", class),
            })?;

        factory(extension_id, route_id, &declaration.options())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_namespace_route() {
        let route = NamespaceRoute::new(
            "taoItems",
            "taoItems",
            &options(json!({"namespace": "oat::taoItems::controller::"})),
        )
        .unwrap();

        assert_eq!(
            route.resolve("taoItems/Items/editItem").as_deref(),
            Some("oat::taoItems::controller::Items@editItem")
        );
        assert_eq!(
            route.resolve("taoItems/Items").as_deref(),
            Some("oat::taoItems::controller::Items@index")
        );
        assert_eq!(
            route.resolve("taoItems").as_deref(),
            Some("oat::taoItems::controller::Main@index")
        );
        assert_eq!(route.resolve("taoItemsExtra/Items/edit"), None);
        assert_eq!(route.resolve("tao/Main/index"), None);
    }

    #[test]
    fn test_namespace_route_requires_namespace() {
        let err = NamespaceRoute::new("tao", "tao", &Map::new()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRouteConfig { .. }));
    }

    #[test]
    fn test_legacy_route() {
        let route = LegacyRoute::new("taoQtiTest");
        assert_eq!(
            route.resolve("taoQtiTest/Runner/init").as_deref(),
            Some("taoQtiTest_actions_Runner@init")
        );
        assert_eq!(
            route.resolve("taoQtiTest").as_deref(),
            Some("taoQtiTest_actions_Main@index")
        );
        assert_eq!(route.resolve("tao/Main/index"), None);
    }

    #[test]
    fn test_regex_route() {
        let route = RegexRoute::new(
            "taoDelivery",
            "deliveries",
            &options(json!({
                "pattern": r"^deliveries/(?P<ctl>\w+)/(?P<act>\w+)$",
                "target": "oat::taoDelivery::$ctl@$act"
            })),
        )
        .unwrap();

        assert_eq!(
            route.resolve("deliveries/Runner/resume").as_deref(),
            Some("oat::taoDelivery::Runner@resume")
        );
        assert_eq!(route.resolve("deliveries/Runner"), None);
    }

    #[test]
    fn test_regex_route_rejects_bad_pattern() {
        let err = RegexRoute::new(
            "tao",
            "bad",
            &options(json!({"pattern": "([", "target": "x@y"})),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRouteConfig { .. }));
    }

    #[test]
    fn test_registry_create() {
        let registry = RouteTypeRegistry::with_builtin();

        let shorthand = RouteDeclaration::Namespace("oat::tao::actions".to_string());
        let route = registry.create("tao", "/tao/", &shorthand).unwrap();
        assert_eq!(route.kind(), NAMESPACE_ROUTE);
        assert_eq!(route.id(), "tao");

        let qualified = RouteDeclaration::Structured(options(json!({
            "class": "oat\\tao\\model\\routing\\LegacyRoute"
        })));
        let route = registry.create("tao", "legacy", &qualified).unwrap();
        assert_eq!(route.kind(), LEGACY_ROUTE);
    }

    #[test]
    fn test_registry_rejects_missing_or_unknown_class() {
        let registry = RouteTypeRegistry::with_builtin();

        let missing = RouteDeclaration::Structured(options(json!({"namespace": "x"})));
        let err = registry.create("tao", "a", &missing).unwrap_err();
        assert!(err.to_string().contains("缺少 class"));

        let unknown = RouteDeclaration::Structured(options(json!({"class": "NoSuchRoute"})));
        let err = registry.create("tao", "a", &unknown).unwrap_err();
        assert!(err.to_string().contains("NoSuchRoute"));
    }

    #[test]
    fn test_register_custom_route_type() {
        #[derive(Debug)]
        struct FixedRoute;

        impl Route for FixedRoute {
            fn id(&self) -> &str {
                "fixed"
            }
            fn extension_id(&self) -> &str {
                "tao"
            }
            fn kind(&self) -> &'static str {
                "FixedRoute"
            }
            fn resolve(&self, relative_url: &str) -> Option<String> {
                (relative_url == "ping").then(|| "Health@ping".to_string())
            }
        }

        let mut registry = RouteTypeRegistry::with_builtin();
        registry.register("FixedRoute", |_, _, _| Ok(Arc::new(FixedRoute) as Arc<dyn Route>));

        let decl = RouteDeclaration::Structured(options(json!({"class": "FixedRoute"})));
        let route = registry.create("tao", "fixed", &decl).unwrap();
        assert_eq!(route.resolve("ping").as_deref(), Some("Health@ping"));
    }
}
