//! 动作执行结果
//!
//! 转发与重定向不通过栈展开实现，而是由动作返回带标签的结果，
//! 顶层分发循环检查结果后执行重新分发或写入响应头。

use serde::{Deserialize, Serialize};

use crate::utils::status_code;

/// 动作执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
#[must_use = "转发和重定向需要把结果返回给分发器才会生效"]
pub enum ActionOutcome {
    /// 正常完成
    Continue,
    /// 在同一请求内转发到另一个 URL
    Forward { url: String },
    /// 重定向
    Redirect { url: String, status: u16 },
}

impl ActionOutcome {
    pub fn forward(url: impl Into<String>) -> Self {
        ActionOutcome::Forward { url: url.into() }
    }

    /// 默认 302 重定向
    pub fn redirect(url: impl Into<String>) -> Self {
        Self::redirect_with_status(url, status_code::FOUND)
    }

    pub fn redirect_with_status(url: impl Into<String>, status: u16) -> Self {
        ActionOutcome::Redirect {
            url: url.into(),
            status,
        }
    }

    /// 是否中断了原动作的控制流
    pub fn is_interrupt(&self) -> bool {
        !matches!(self, ActionOutcome::Continue)
    }
}

/// 中断原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptReason {
    Forward,
    Redirect,
}

/// 动作被中断的信号
///
/// 只在分发器内部产生，作为分发结果的一部分返回，不作为错误向外传播。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptedAction {
    /// 中断时上下文中的模块名
    pub module: String,
    /// 中断时上下文中的动作名
    pub action: String,
    pub reason: InterruptReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_defaults_to_found() {
        assert_eq!(
            ActionOutcome::redirect("/login"),
            ActionOutcome::Redirect {
                url: "/login".to_string(),
                status: 302
            }
        );
    }

    #[test]
    fn test_interrupt_flag() {
        assert!(!ActionOutcome::Continue.is_interrupt());
        assert!(ActionOutcome::forward("/tao/Main/index").is_interrupt());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(ActionOutcome::forward("/a")).unwrap();
        assert_eq!(json["type"], "forward");
        assert_eq!(json["url"], "/a");
    }
}
