//! 路由表
//!
//! 每个扩展一张路由表，按清单声明顺序保存编译后的路由。
//! 路由表在第一次查找时构建，由 [`RouteTableCache`] 按扩展 ID 缓存，
//! 缓存对象由解析器持有，进程内不会主动失效。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::route::{LegacyRoute, Route, RouteTypeRegistry};
use crate::extension::Extension;
use crate::utils::Result;

/// 无效路由声明的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidRoutePolicy {
    /// 构建失败，错误向上传播
    #[default]
    Fail,
    /// 记录警告，整个扩展退回旧式路由
    Legacy,
}

/// 单个扩展的路由表
#[derive(Debug)]
pub struct RouteTable {
    extension_id: String,
    routes: Vec<Arc<dyn Route>>,
    legacy_fallback: bool,
}

impl RouteTable {
    /// 根据扩展清单构建路由表
    ///
    /// - 没有声明路由：合成一条旧式路由
    /// - 声明无效：按 `policy` 失败或退回旧式路由
    pub fn build(
        extension: &Extension,
        route_types: &RouteTypeRegistry,
        policy: InvalidRoutePolicy,
    ) -> Result<Self> {
        if !extension.has_routes() {
            tracing::debug!(extension = %extension.id, "扩展未声明路由，使用旧式路由");
            return Ok(Self::legacy(&extension.id));
        }

        let mut routes = Vec::with_capacity(extension.routes.len());
        for (route_id, declaration) in &extension.routes {
            match route_types.create(&extension.id, route_id, declaration) {
                Ok(route) => routes.push(route),
                Err(e) => match policy {
                    InvalidRoutePolicy::Fail => return Err(e),
                    InvalidRoutePolicy::Legacy => {
                        tracing::warn!(
                            extension = %extension.id,
                            error = %e,
                            "路由声明无效，扩展退回旧式路由"
                        );
                        return Ok(Self::legacy(&extension.id));
                    }
                },
            }
        }

        Ok(Self {
            extension_id: extension.id.clone(),
            routes,
            legacy_fallback: false,
        })
    }

    /// 只包含旧式路由的路由表
    pub fn legacy(extension_id: &str) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            routes: vec![Arc::new(LegacyRoute::new(extension_id))],
            legacy_fallback: true,
        }
    }

    /// 按声明顺序查找第一条匹配的路由
    pub fn resolve(&self, relative_url: &str) -> Option<(&Arc<dyn Route>, String)> {
        self.routes
            .iter()
            .find_map(|route| route.resolve(relative_url).map(|target| (route, target)))
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    pub fn routes(&self) -> &[Arc<dyn Route>] {
        &self.routes
    }

    /// 是否为合成的旧式路由表
    pub fn is_legacy_fallback(&self) -> bool {
        self.legacy_fallback
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// 路由表缓存统计信息
#[derive(Debug, Clone, Serialize)]
pub struct RouteTableCacheStats {
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 实际写入缓存的构建次数
    pub builds: u64,
    /// 已缓存的路由表数量
    pub size: usize,
    /// 命中率（百分比）
    pub hit_rate: f64,
}

/// 路由表缓存
///
/// 以扩展 ID 为键，每个键最多写入一次。并发的首次访问可能各自构建，
/// 但只有第一个写入的结果会被保留，构建过程本身没有副作用。
#[derive(Debug, Default)]
pub struct RouteTableCache {
    tables: RwLock<HashMap<String, Arc<RouteTable>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
}

impl RouteTableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已缓存的路由表
    pub fn get(&self, extension_id: &str) -> Option<Arc<RouteTable>> {
        self.tables.read().get(extension_id).cloned()
    }

    /// 获取路由表，不存在时调用 `build` 构建并缓存
    ///
    /// 构建在锁外执行，构建失败不会写入缓存。
    pub fn get_or_build<F>(&self, extension_id: &str, build: F) -> Result<Arc<RouteTable>>
    where
        F: FnOnce() -> Result<RouteTable>,
    {
        if let Some(table) = self.get(extension_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(table);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let built = Arc::new(build()?);
        let mut tables = self.tables.write();
        let table = tables
            .entry(extension_id.to_string())
            .or_insert_with(|| {
                self.builds.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    extension = %extension_id,
                    routes = built.len(),
                    legacy = built.is_legacy_fallback(),
                    "路由表已构建"
                );
                built.clone()
            })
            .clone();
        Ok(table)
    }

    /// 是否已缓存
    pub fn contains(&self, extension_id: &str) -> bool {
        self.tables.read().contains_key(extension_id)
    }

    /// 已缓存的扩展 ID
    pub fn extension_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tables.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    /// 丢弃所有已缓存的路由表
    pub fn clear(&self) {
        self.tables.write().clear();
    }

    /// 获取统计信息
    pub fn stats(&self) -> RouteTableCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        RouteTableCacheStats {
            hits,
            misses,
            builds: self.builds.load(Ordering::Relaxed),
            size: self.len(),
            hit_rate: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}
