//! 控制器与控制器注册表
//!
//! 控制器按路由目标中的名称注册工厂函数，解析结果通过注册表实例化控制器，
//! 不依赖运行时按字符串查找类型。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::context::ActionContext;
use super::outcome::ActionOutcome;
use crate::utils::{CoreError, Result};

/// 控制器
///
/// 一个控制器暴露若干按名称调用的动作。
#[async_trait]
pub trait Controller: Send + Sync {
    /// 是否存在该动作
    fn has_action(&self, action: &str) -> bool;

    /// 执行动作
    async fn call(&self, action: &str, ctx: &mut ActionContext) -> Result<ActionOutcome>;
}

/// 控制器工厂
pub type ControllerFactory = Arc<dyn Fn() -> Arc<dyn Controller> + Send + Sync>;

/// 控制器注册表
#[derive(Default)]
pub struct ControllerRegistry {
    factories: RwLock<HashMap<String, ControllerFactory>>,
    instantiations: AtomicU64,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.names())
            .field("instantiations", &self.instantiations())
            .finish()
    }
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册控制器工厂，同名控制器会被覆盖
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Controller> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(controller = %name, "注册控制器");
        self.factories.write().insert(name, Arc::new(factory));
    }

    /// 注册共享实例，每次实例化都返回同一个对象
    pub fn register_instance(&self, name: impl Into<String>, controller: Arc<dyn Controller>) {
        self.register(name, move || controller.clone());
    }

    /// 按名称实例化控制器
    pub fn create(&self, name: &str) -> Result<Arc<dyn Controller>> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ControllerNotFound(name.to_string()))?;
        self.instantiations.fetch_add(1, Ordering::Relaxed);
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// 已注册的控制器名称（排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 累计实例化次数
    pub fn instantiations(&self) -> u64 {
        self.instantiations.load(Ordering::Relaxed)
    }
}
