//! 安全令牌

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一次性安全令牌
///
/// 以 `value` 作为标识，被取出后即从令牌池中移除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// 服务端签发的令牌值
    pub value: String,
    /// 本地接收时间
    pub received_at: DateTime<Utc>,
}

impl Token {
    /// 以当前时间作为接收时间创建令牌
    pub fn new(value: impl Into<String>) -> Self {
        Self::with_received_at(value, Utc::now())
    }

    pub fn with_received_at(value: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            received_at,
        }
    }

    /// 相对 `now` 是否已超过有效期
    pub fn is_expired(&self, time_limit: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(time_limit) {
            Ok(limit) => now - self.received_at > limit,
            Err(_) => false,
        }
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::new(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::new(value)
    }
}
