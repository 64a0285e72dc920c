//! TaoCore SDK
//!
//! 把配置、扩展注册表、路由解析、分发器和令牌池组装成一个实例。
//!
//! # 示例
//!
//! ```rust,no_run
//! use tao_core::{CoreConfig, HttpRequest, TaoCore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::builder().max_forwards(4).build();
//!     let mut core = TaoCore::new(config).await?;
//!     core.start()?;
//!
//!     let outcome = core.dispatch(HttpRequest::get("/tao/Main/index")).await;
//!     println!("{}", outcome.response.status);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::config::CoreConfig;
use crate::extension::ExtensionRegistry;
use crate::routing::{
    ControllerRegistry, DispatchOutcome, Dispatcher, HttpRequest, HttpResponse, Resolution,
    Resolver, RouteTableCacheStats,
};
use crate::security::{
    ClientConfigTokenSource, HttpTokenSource, ProtectedClient, TokenHandler, TokenSource,
    TokenStore,
};
use crate::utils::{CoreError, Result};

/// 实例状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoreState {
    Initialized,
    Running,
    Shutdown,
}

impl CoreState {
    pub fn can_start(&self) -> bool {
        matches!(self, CoreState::Initialized)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, CoreState::Running)
    }
}

/// 单个扩展的路由表概要
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub extension_id: String,
    /// 按声明顺序排列的 `(路由 ID, 路由类型)`
    pub routes: Vec<(String, String)>,
    pub legacy_fallback: bool,
}

/// TAO 核心实例
pub struct TaoCore {
    config: CoreConfig,
    state: RwLock<CoreState>,
    extensions: Arc<ExtensionRegistry>,
    controllers: Arc<ControllerRegistry>,
    resolver: Arc<Resolver>,
    dispatcher: Dispatcher,
    tokens: Arc<TokenHandler>,
    client: ProtectedClient,
    /// 未配置令牌接口时使用客户端配置作为令牌来源
    client_config: Option<Arc<ClientConfigTokenSource>>,
    started_at: RwLock<Option<Instant>>,
}

impl TaoCore {
    /// 创建实例
    ///
    /// 依次注册配置中内联的扩展和扩展目录中扫描到的扩展，注册顺序即解析顺序。
    pub async fn new(config: CoreConfig) -> Result<Self> {
        Self::with_controllers(config, Arc::new(ControllerRegistry::new())).await
    }

    /// 使用已填充的控制器注册表创建实例
    pub async fn with_controllers(
        config: CoreConfig,
        controllers: Arc<ControllerRegistry>,
    ) -> Result<Self> {
        info!("初始化 TAO 核心 v{}", crate::VERSION);
        config.validate()?;

        let mut registry = ExtensionRegistry::from_extensions(config.extensions.iter().cloned())?;
        for dir in &config.extension_dirs {
            let found = registry.scan(dir).await?;
            debug!(dir = %dir.display(), count = found.len(), "扩展目录扫描完成");
        }
        let extensions = Arc::new(registry);

        let resolver = Arc::new(Resolver::new(
            Arc::clone(&extensions),
            Arc::clone(&controllers),
            config.routing.clone(),
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&resolver));

        let store = Arc::new(TokenStore::from_config(&config.tokens)?);
        let timeout = Duration::from_secs(config.client.timeout_secs);
        let (source, client_config): (Arc<dyn TokenSource>, _) = match config.tokens.base_url {
            Some(ref base_url) => (
                Arc::new(HttpTokenSource::new(base_url, &config.tokens.endpoint, timeout)),
                None,
            ),
            None => {
                let source = Arc::new(ClientConfigTokenSource::default());
                (source.clone() as Arc<dyn TokenSource>, Some(source))
            }
        };
        let tokens = Arc::new(TokenHandler::new(store, source));

        let mut client = ProtectedClient::new(Arc::clone(&tokens), timeout);
        if let Some(ref base_url) = config.tokens.base_url {
            client = client.with_base_url(base_url.clone());
        }

        info!(extensions = extensions.len(), "TAO 核心初始化完成");
        Ok(Self {
            config,
            state: RwLock::new(CoreState::Initialized),
            extensions,
            controllers,
            resolver,
            dispatcher,
            tokens,
            client,
            client_config,
            started_at: RwLock::new(None),
        })
    }

    /// 启动实例
    ///
    /// 预先构建所有已安装扩展的路由表；无效的路由声明在此处中止启动。
    pub fn start(&mut self) -> Result<()> {
        let mut state = self.state.write();
        if !state.can_start() {
            return Err(CoreError::InitFailed(format!(
                "当前状态 {:?} 不允许启动",
                *state
            )));
        }

        let built = self.resolver.warm_up()?;
        debug!(tables = built, "路由表预热完成");

        *state = CoreState::Running;
        *self.started_at.write() = Some(Instant::now());
        info!("TAO 核心已启动");
        Ok(())
    }

    /// 关闭实例
    pub fn shutdown(&mut self) {
        let mut state = self.state.write();
        if !state.is_running() {
            return;
        }
        *state = CoreState::Shutdown;
        info!(uptime_secs = ?self.uptime().map(|d| d.as_secs()), "TAO 核心已关闭");
    }

    /// 分发请求
    ///
    /// 未启动时返回 503 响应。
    pub async fn dispatch(&self, request: HttpRequest) -> DispatchOutcome {
        if !self.state().is_running() {
            warn!(url = %request.url, "实例未运行，拒绝请求");
            let err = CoreError::InitFailed("实例未运行".to_string());
            let mut response = HttpResponse::from_error(&err);
            response.set_status(crate::utils::status_code::SERVICE_UNAVAILABLE);
            return DispatchOutcome::rejected(response);
        }
        self.dispatcher.dispatch(request).await
    }

    /// 只解析，不执行
    pub fn resolve(&self, url: &str) -> Result<Resolution> {
        self.resolver.resolve_url(url)
    }

    /// 下发新的客户端配置载荷（包含 `tokens` 字段）
    ///
    /// 令牌来源为网络接口时忽略。
    pub fn load_client_config(&self, payload: &Value) {
        match self.client_config {
            Some(ref source) => {
                source.set_payload(payload);
                debug!(pending = source.pending(), "客户端配置令牌已更新");
            }
            None => debug!("令牌来源为网络接口，忽略客户端配置令牌"),
        }
    }

    /// 所有已安装扩展的路由表概要
    pub fn route_summaries(&self) -> Result<Vec<RouteSummary>> {
        self.extensions
            .installed()
            .map(|extension| {
                let table = self.resolver.route_table(extension)?;
                Ok(RouteSummary {
                    extension_id: extension.id.clone(),
                    routes: table
                        .routes()
                        .iter()
                        .map(|r| (r.id().to_string(), r.kind().to_string()))
                        .collect(),
                    legacy_fallback: table.is_legacy_fallback(),
                })
            })
            .collect()
    }

    pub fn state(&self) -> CoreState {
        *self.state.read()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    pub fn controllers(&self) -> &Arc<ControllerRegistry> {
        &self.controllers
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn tokens(&self) -> &Arc<TokenHandler> {
        &self.tokens
    }

    pub fn client(&self) -> &ProtectedClient {
        &self.client
    }

    pub fn cache_stats(&self) -> RouteTableCacheStats {
        self.resolver.cache().stats()
    }

    pub fn uptime(&self) -> Option<Duration> {
        let started_at = *self.started_at.read();
        started_at.map(|t| t.elapsed())
    }
}

impl std::fmt::Debug for TaoCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaoCore")
            .field("state", &self.state())
            .field("extensions", &self.extensions.installed_ids())
            .field("tokens", &self.tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Extension;
    use crate::routing::{ActionContext, ActionOutcome, Controller};
    use async_trait::async_trait;
    use serde_json::json;

    struct MainController;

    #[async_trait]
    impl Controller for MainController {
        fn has_action(&self, action: &str) -> bool {
            action == "index"
        }

        async fn call(&self, _action: &str, ctx: &mut ActionContext) -> Result<ActionOutcome> {
            ctx.response.set_json(json!({"success": true}));
            Ok(ActionOutcome::Continue)
        }
    }

    fn config() -> CoreConfig {
        CoreConfig::builder()
            .extension(Extension::new("tao").with_namespace_route("tao", "oat::tao::controller"))
            .build()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mut core = TaoCore::new(config()).await.unwrap();
        assert_eq!(core.state(), CoreState::Initialized);

        core.start().unwrap();
        assert!(core.state().is_running());
        assert!(core.uptime().is_some());
        assert!(core.start().is_err());

        core.shutdown();
        assert_eq!(core.state(), CoreState::Shutdown);
    }

    #[tokio::test]
    async fn test_dispatch_requires_running() {
        let controllers = Arc::new(ControllerRegistry::new());
        controllers.register("oat::tao::controller::Main", || {
            Arc::new(MainController) as Arc<dyn Controller>
        });
        let mut core = TaoCore::with_controllers(config(), controllers).await.unwrap();

        let outcome = core.dispatch(HttpRequest::get("/tao/Main/index")).await;
        assert_eq!(outcome.response.status, 503);

        core.start().unwrap();
        let outcome = core.dispatch(HttpRequest::get("/tao/Main/index")).await;
        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.context.extension, "tao");
    }

    #[tokio::test]
    async fn test_route_summaries() {
        let config = CoreConfig::builder()
            .extension(Extension::new("tao").with_namespace_route("tao", "oat::tao::controller"))
            .extension(Extension::new("taoItems"))
            .build();
        let core = TaoCore::new(config).await.unwrap();

        let summaries = core.route_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].routes[0].1, crate::routing::NAMESPACE_ROUTE);
        assert!(summaries[1].legacy_fallback);
    }

    #[tokio::test]
    async fn test_client_config_tokens_feed_pool() {
        let core = TaoCore::new(config()).await.unwrap();
        core.load_client_config(&json!({"tokens": ["c1", "c2"]}));

        let token = core.tokens().get_token().await.unwrap();
        assert_eq!(token.value, "c1");
        assert_eq!(core.tokens().queue_length(), 1);
    }
}
