//! # TAO Core
//!
//! TAO 平台的请求路由与安全令牌核心：
//!
//! - **路由解析**: 按扩展注册顺序查找第一条匹配的路由，得到扩展/控制器/动作
//! - **动作分发**: 执行动作，在同一请求内处理转发与重定向
//! - **扩展管理**: 从配置或扩展目录加载扩展清单
//! - **令牌池**: 有容量上限和有效期的一次性 CSRF 令牌池与受保护请求客户端
//! - **配置与日志**: 统一的配置加载和结构化日志
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use tao_core::{CoreConfig, HttpRequest, TaoCore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut core = TaoCore::new(CoreConfig::default()).await?;
//!     core.start()?;
//!
//!     let outcome = core.dispatch(HttpRequest::get("/tao/Main/index")).await;
//!     println!("{}", outcome.response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `routing` - 路由、解析与分发
//! - `extension` - 扩展清单与注册表
//! - `security` - 令牌池与受保护请求
//! - `core` - 配置
//! - `utils` - 错误类型、ID 和日志
//! - `api` - 对外入口

#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod core;
pub mod extension;
pub mod routing;
pub mod security;
pub mod utils;

pub use api::{CoreState, RouteSummary, TaoCore};

pub use extension::{Extension, ExtensionRegistry, ManifestParser, RouteDeclaration};

pub use routing::{
    ActionContext, ActionEnforcer, ActionOutcome, Controller, ControllerRegistry,
    DispatchOutcome, Dispatcher, HttpRequest, HttpResponse, InterruptedAction,
    InvalidRoutePolicy, Method, Resolution, Resolver, Route, RouteTable, RouteTableCache,
    RouteTypeRegistry,
};

pub use security::{
    ClientConfigTokenSource, HttpTokenSource, ProtectedClient, RequestOptions, RequestQueue,
    Token, TokenHandler, TokenSource, TokenStore,
};

pub use utils::{error_code, generate_uuid, status_code, CoreError, Result};
pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use core::config::{
    ClientConfig, CoreConfig, CoreConfigBuilder, LogConfig, RoutingConfig, TokenConfig,
};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
