//! 用户可见的反馈消息

use std::fmt;

use parking_lot::Mutex;

/// 反馈消息：未能取得令牌
pub const NO_TOKENS_RETRIEVED: &str = "No tokens retrieved";
/// 反馈消息：请求未授权
pub const UNAUTHORISED_REQUEST: &str = "Unauthorised request";

/// 用户反馈通道
pub trait Feedback: Send + Sync + fmt::Debug {
    /// 显示错误消息
    fn error(&self, message: &str);
}

/// 只写日志的反馈通道
#[derive(Debug, Default, Clone)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn error(&self, message: &str) {
        tracing::warn!(feedback = %message, "用户反馈");
    }
}

/// 记录所有消息的反馈通道
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    messages: Mutex<Vec<String>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的消息
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Feedback for RecordingFeedback {
    fn error(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}
