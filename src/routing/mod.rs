//! 路由模块
//!
//! 把请求路径解析为扩展/控制器/动作，并在单个请求内执行动作：
//! - 路由类型与路由类型注册表
//! - 按扩展缓存的路由表
//! - 路由解析器与解析结果
//! - 控制器注册表与动作执行器
//! - 支持转发与重定向的顶层分发器

pub mod context;
pub mod controller;
pub mod dispatcher;
pub mod enforcer;
pub mod http;
pub mod outcome;
pub mod resolution;
pub mod resolver;
pub mod route;
pub mod route_table;

pub use context::{build_url, ActionContext, RequestContext};
pub use controller::{Controller, ControllerFactory, ControllerRegistry};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use enforcer::ActionEnforcer;
pub use http::{HttpRequest, HttpResponse, Method, LOCATION, X_TAO_FORWARD};
pub use outcome::{ActionOutcome, InterruptReason, InterruptedAction};
pub use resolution::Resolution;
pub use resolver::Resolver;
pub use route::{
    LegacyRoute, NamespaceRoute, RegexRoute, Route, RouteFactory, RouteTypeRegistry,
    LEGACY_ROUTE, NAMESPACE_ROUTE, REGEX_ROUTE,
};
pub use route_table::{InvalidRoutePolicy, RouteTable, RouteTableCache, RouteTableCacheStats};
