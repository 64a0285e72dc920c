//! 动作执行器

use super::context::ActionContext;
use super::controller::Controller;
use super::outcome::ActionOutcome;
use super::resolution::Resolution;
use crate::utils::{CoreError, Result};

/// 动作执行器
///
/// 在控制器上按名称调用动作。控制器没有该动作时返回 `ActionNotFound`。
#[derive(Debug, Clone)]
pub struct ActionEnforcer {
    extension_id: String,
    controller_name: String,
    action_name: String,
}

impl ActionEnforcer {
    pub fn new(
        extension_id: impl Into<String>,
        controller_name: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        Self {
            extension_id: extension_id.into(),
            controller_name: controller_name.into(),
            action_name: action_name.into(),
        }
    }

    pub fn from_resolution(resolution: &Resolution) -> Self {
        Self::new(
            resolution.extension_id(),
            resolution.controller_name(),
            resolution.action_name(),
        )
    }

    /// 执行动作
    pub async fn enforce(
        &self,
        controller: &dyn Controller,
        ctx: &mut ActionContext,
    ) -> Result<ActionOutcome> {
        if !controller.has_action(&self.action_name) {
            return Err(CoreError::ActionNotFound {
                controller: self.controller_name.clone(),
                action: self.action_name.clone(),
            });
        }

        tracing::debug!(
            extension = %self.extension_id,
            controller = %self.controller_name,
            action = %self.action_name,
            "执行动作"
        );
        controller.call(&self.action_name, ctx).await
    }

    /// 实例化解析结果中的控制器并执行动作
    pub async fn enforce_resolution(
        resolution: &Resolution,
        ctx: &mut ActionContext,
    ) -> Result<ActionOutcome> {
        let controller = resolution.controller()?;
        Self::from_resolution(resolution)
            .enforce(controller.as_ref(), ctx)
            .await
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }
}
