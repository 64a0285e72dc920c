//! 路由解析器
//!
//! 按注册顺序遍历已安装扩展，在每个扩展的路由表中按声明顺序查找，
//! 第一条匹配的路由决定解析结果。

use std::sync::Arc;

use tracing::instrument;

use super::controller::ControllerRegistry;
use super::http::HttpRequest;
use super::resolution::Resolution;
use super::route::RouteTypeRegistry;
use super::route_table::{RouteTable, RouteTableCache};
use crate::core::config::RoutingConfig;
use crate::extension::{Extension, ExtensionRegistry};
use crate::utils::{CoreError, Result};

/// 路由解析器
#[derive(Debug, Clone)]
pub struct Resolver {
    extensions: Arc<ExtensionRegistry>,
    controllers: Arc<ControllerRegistry>,
    route_types: Arc<RouteTypeRegistry>,
    cache: Arc<RouteTableCache>,
    config: RoutingConfig,
}

impl Resolver {
    /// 创建解析器，使用内置路由类型和新的路由表缓存
    pub fn new(
        extensions: Arc<ExtensionRegistry>,
        controllers: Arc<ControllerRegistry>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            extensions,
            controllers,
            route_types: Arc::new(RouteTypeRegistry::with_builtin()),
            cache: Arc::new(RouteTableCache::new()),
            config,
        }
    }

    /// 替换路由类型注册表
    pub fn with_route_types(mut self, route_types: Arc<RouteTypeRegistry>) -> Self {
        self.route_types = route_types;
        self
    }

    /// 共享已有的路由表缓存
    pub fn with_cache(mut self, cache: Arc<RouteTableCache>) -> Self {
        self.cache = cache;
        self
    }

    /// 计算相对 URL
    ///
    /// 去掉协议与主机、查询字符串与片段、基础路径以及首尾斜杠。
    pub fn relative_url(&self, url: &str) -> String {
        let path = match url.find("://") {
            Some(pos) => {
                let rest = &url[pos + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("")
            }
            None => url,
        };
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim_matches('/');

        let base = self.config.base_path.trim_matches('/');
        if base.is_empty() {
            return path.to_string();
        }
        match path.strip_prefix(base) {
            Some("") => String::new(),
            Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
            _ => path.to_string(),
        }
    }

    /// 解析请求
    pub fn resolve(&self, request: &HttpRequest) -> Result<Resolution> {
        self.resolve_url(&request.url)
    }

    /// 解析 URL
    ///
    /// # Errors
    ///
    /// - 没有任何已安装扩展的路由匹配时返回 `UnresolvedRoute`
    /// - 路由表构建失败时返回 `InvalidRouteConfig`
    #[instrument(skip(self), fields(relative_url = tracing::field::Empty))]
    pub fn resolve_url(&self, url: &str) -> Result<Resolution> {
        let relative_url = self.relative_url(url);
        tracing::Span::current().record("relative_url", relative_url.as_str());

        for extension in self.extensions.installed() {
            let table = self.route_table(extension)?;
            if let Some((route, target)) = table.resolve(&relative_url) {
                let resolution = Resolution::new(
                    route.clone(),
                    &target,
                    &relative_url,
                    &self.config.default_module,
                    &self.config.default_action,
                    self.controllers.clone(),
                );
                tracing::debug!(
                    extension = %resolution.extension_id(),
                    controller = %resolution.controller_name(),
                    action = %resolution.action_name(),
                    route = %route.id(),
                    "路由已解析"
                );
                return Ok(resolution);
            }
        }

        Err(CoreError::UnresolvedRoute(url.to_string()))
    }

    /// 获取扩展的路由表，首次访问时构建
    pub fn route_table(&self, extension: &Extension) -> Result<Arc<RouteTable>> {
        self.cache.get_or_build(&extension.id, || {
            RouteTable::build(extension, &self.route_types, self.config.invalid_routes)
        })
    }

    /// 预先构建所有已安装扩展的路由表
    ///
    /// 返回构建（或已缓存）的路由表数量。无效路由在这里即可暴露。
    pub fn warm_up(&self) -> Result<usize> {
        let mut count = 0;
        for extension in self.extensions.installed() {
            self.route_table(extension)?;
            count += 1;
        }
        tracing::info!(tables = count, "路由表预热完成");
        Ok(count)
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    pub fn controllers(&self) -> &Arc<ControllerRegistry> {
        &self.controllers
    }

    pub fn cache(&self) -> &Arc<RouteTableCache> {
        &self.cache
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }
}
