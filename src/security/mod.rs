//! 安全令牌池
//!
//! 客户端持有服务端签发的一次性 CSRF 令牌：
//! - 有容量上限和有效期的有序令牌池
//! - 池空时从令牌来源补充的令牌处理器
//! - 令牌紧张时串行发送请求的单通道队列
//! - 按分发规则附加令牌请求头的受保护请求客户端

pub mod client;
pub mod feedback;
pub mod handler;
pub mod queue;
pub mod source;
pub mod store;
pub mod token;

pub use client::{ProtectedClient, RequestOptions, NO_TOKEN, X_AUTH_TOKEN, X_CSRF_TOKEN};
pub use feedback::{Feedback, LogFeedback, RecordingFeedback};
pub use handler::TokenHandler;
pub use queue::{QueueStats, RequestQueue};
pub use source::{tokens_from_payload, ClientConfigTokenSource, HttpTokenSource, TokenSource};
pub use store::{JsonFileBackend, MemoryBackend, TokenBackend, TokenStore};
pub use token::Token;
