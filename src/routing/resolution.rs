//! 路由解析结果

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::controller::{Controller, ControllerRegistry};
use super::route::Route;
use crate::utils::Result;

/// 路由解析结果
///
/// 构造后不可变，唯一例外是按需实例化并缓存的控制器。
pub struct Resolution {
    extension_id: String,
    controller_name: String,
    action_name: String,
    module_name: String,
    relative_url: String,
    route: Arc<dyn Route>,
    controllers: Arc<ControllerRegistry>,
    controller: Mutex<Option<Arc<dyn Controller>>>,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("extension_id", &self.extension_id)
            .field("controller_name", &self.controller_name)
            .field("action_name", &self.action_name)
            .field("module_name", &self.module_name)
            .field("route", &self.route.id())
            .field("instantiated", &self.controller.lock().is_some())
            .finish()
    }
}

impl Resolution {
    /// 由路由目标构造解析结果
    ///
    /// `target` 在 `@` 处拆成控制器和动作，没有 `@` 时动作取 `default_action`。
    /// 模块名独立地取相对 URL 的第二段，与命中的路由无关。
    pub fn new(
        route: Arc<dyn Route>,
        target: &str,
        relative_url: &str,
        default_module: &str,
        default_action: &str,
        controllers: Arc<ControllerRegistry>,
    ) -> Self {
        let (controller_name, action_name) = match target.split_once('@') {
            Some((controller, action)) if !action.is_empty() => (controller, action),
            Some((controller, _)) => (controller, default_action),
            None => (target, default_action),
        };

        Self {
            extension_id: route.extension_id().to_string(),
            controller_name: controller_name.to_string(),
            action_name: action_name.to_string(),
            module_name: Self::extract_module_name(relative_url, default_module),
            relative_url: relative_url.to_string(),
            route,
            controllers,
            controller: Mutex::new(None),
        }
    }

    /// 取路径第二段作为模块名，缺失或为空时取默认值
    pub fn extract_module_name(relative_url: &str, default_module: &str) -> String {
        relative_url
            .trim_start_matches('/')
            .split('/')
            .nth(1)
            .filter(|segment| !segment.is_empty())
            .unwrap_or(default_module)
            .to_string()
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// 控制器名称（路由目标中 `@` 之前的部分）
    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn relative_url(&self) -> &str {
        &self.relative_url
    }

    /// 命中的路由
    pub fn route(&self) -> &Arc<dyn Route> {
        &self.route
    }

    /// 获取控制器实例
    ///
    /// 第一次调用时通过控制器注册表实例化，之后返回同一实例。
    /// 检查与实例化在同一把锁内完成，并发调用也只实例化一次。
    ///
    /// # Errors
    ///
    /// 控制器未注册时返回 `ControllerNotFound`。
    pub fn controller(&self) -> Result<Arc<dyn Controller>> {
        let mut slot = self.controller.lock();
        if let Some(controller) = slot.as_ref() {
            return Ok(controller.clone());
        }
        let created = self.controllers.create(&self.controller_name)?;
        *slot = Some(created.clone());
        Ok(created)
    }

    /// 转换为 JSON 摘要
    pub fn to_json(&self) -> Value {
        json!({
            "extension": self.extension_id,
            "controller": self.controller_name,
            "action": self.action_name,
            "module": self.module_name,
            "relativeUrl": self.relative_url,
            "route": {
                "id": self.route.id(),
                "kind": self.route.kind(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::context::ActionContext;
    use crate::routing::outcome::ActionOutcome;
    use crate::routing::route::LegacyRoute;
    use crate::utils::CoreError;
    use async_trait::async_trait;

    struct Main;

    #[async_trait]
    impl Controller for Main {
        fn has_action(&self, action: &str) -> bool {
            action == "index"
        }

        async fn call(&self, _action: &str, _ctx: &mut ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::Continue)
        }
    }

    fn resolution(target: &str, url: &str, controllers: Arc<ControllerRegistry>) -> Resolution {
        Resolution::new(
            Arc::new(LegacyRoute::new("tao")),
            target,
            url,
            "Main",
            "index",
            controllers,
        )
    }

    #[test]
    fn test_target_split() {
        let r = resolution("tao_actions_Users@edit", "tao/Users/edit", Arc::default());
        assert_eq!(r.extension_id(), "tao");
        assert_eq!(r.controller_name(), "tao_actions_Users");
        assert_eq!(r.action_name(), "edit");

        let r = resolution("tao_actions_Users", "tao/Users", Arc::default());
        assert_eq!(r.action_name(), "index");
    }

    #[test]
    fn test_module_name_is_positional() {
        assert_eq!(Resolution::extract_module_name("tao/Users/edit", "Main"), "Users");
        assert_eq!(Resolution::extract_module_name("/tao/Users", "Main"), "Users");
        assert_eq!(Resolution::extract_module_name("tao", "Main"), "Main");
        assert_eq!(Resolution::extract_module_name("tao//x", "Main"), "Main");
        assert_eq!(Resolution::extract_module_name("", "Main"), "Main");
    }

    #[test]
    fn test_controller_is_memoized() {
        let controllers = Arc::new(ControllerRegistry::new());
        controllers.register("tao_actions_Main", || Arc::new(Main) as Arc<dyn Controller>);

        let r = resolution("tao_actions_Main@index", "tao/Main/index", controllers.clone());
        let first = r.controller().unwrap();
        let second = r.controller().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(controllers.instantiations(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_instance() {
        let controllers = Arc::new(ControllerRegistry::new());
        controllers.register("tao_actions_Main", || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            Arc::new(Main) as Arc<dyn Controller>
        });

        let r = Arc::new(resolution("tao_actions_Main@index", "tao/Main", controllers.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = r.clone();
                std::thread::spawn(move || r.controller().unwrap())
            })
            .collect();
        let instances: Vec<Arc<dyn Controller>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(instances.iter().all(|c| Arc::ptr_eq(c, &instances[0])));
        assert_eq!(controllers.instantiations(), 1);
    }

    #[test]
    fn test_controller_not_found() {
        let r = resolution("tao_actions_Ghost@index", "tao/Ghost", Arc::default());
        let err = r.controller().err().unwrap();
        assert!(matches!(err, CoreError::ControllerNotFound(_)));
        assert!(err.to_string().contains("tao_actions_Ghost"));
    }

    #[test]
    fn test_to_json() {
        let r = resolution("tao_actions_Main@index", "tao", Arc::default());
        let json = r.to_json();
        assert_eq!(json["module"], "Main");
        assert_eq!(json["route"]["kind"], "LegacyRoute");
    }
}
