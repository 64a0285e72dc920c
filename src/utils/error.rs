//! 内核错误类型定义
//!
//! 本模块定义了路由解析、动作执行与令牌池中使用的所有错误类型。

use thiserror::Error;

/// 内核核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 路由解析错误 ====================

    /// 没有任何已安装扩展的路由匹配该请求
    #[error("无法解析请求: '{0}'")]
    UnresolvedRoute(String),

    /// 路由声明无效（缺少 class 或 class 不是已知的路由类型）
    #[error("无效的路由声明: 扩展 '{extension}' 路由 '{route}' - {reason}")]
    InvalidRouteConfig {
        extension: String,
        route: String,
        reason: String,
    },

    /// 控制器未找到
    #[error("控制器未找到: '{0}'")]
    ControllerNotFound(String),

    /// 动作未找到
    #[error("动作未找到: '{controller}@{action}'")]
    ActionNotFound {
        controller: String,
        action: String,
    },

    /// 连续转发次数超过上限
    #[error("转发次数超过上限 ({max}): 最后目标 '{url}'")]
    ForwardLoop {
        max: usize,
        url: String,
    },

    /// 扩展未找到
    #[error("扩展未找到: '{0}'")]
    ExtensionNotFound(String),

    /// 扩展已注册
    #[error("扩展已注册: '{0}'")]
    ExtensionAlreadyRegistered(String),

    /// 无效的扩展清单
    #[error("无效的扩展清单: {0}")]
    InvalidManifest(String),

    /// 请求格式无效
    #[error("请求格式无效: {0}")]
    InvalidRequest(String),

    // ==================== 令牌池错误 ====================

    /// 令牌补充后仍为空
    #[error("令牌池补充失败: 令牌来源没有返回任何令牌")]
    TokenRefill,

    /// 令牌接口传输失败
    #[error("令牌获取失败: {0}")]
    TokenFetch(String),

    /// 令牌持久化失败
    #[error("令牌持久化失败: {0}")]
    TokenPersistence(String),

    // ==================== 受保护请求错误 ====================

    /// 未授权（HTTP 401 或 errorCode 401）
    #[error("未授权请求: {0}")]
    Unauthorized(String),

    /// 网络传输失败
    #[error("网络错误 ({code}): {message}")]
    Network {
        /// HTTP 状态码（连接失败时为 0）
        code: u16,
        message: String,
    },

    /// 服务端返回了失败的响应信封
    #[error("{message}")]
    ServerError {
        code: u16,
        message: String,
        response: Option<serde_json::Value>,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 版本解析错误
    #[error("版本解析错误: {0}")]
    VersionParse(#[from] semver::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误（控制器代码通过 anyhow 返回）
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 内核操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 状态码常量
pub mod status_code {
    /// 成功
    pub const OK: u16 = 200;

    /// 无内容
    pub const NO_CONTENT: u16 = 204;

    /// 临时重定向（redirect 默认值）
    pub const FOUND: u16 = 302;

    /// 请求格式错误
    pub const BAD_REQUEST: u16 = 400;

    /// 未授权
    pub const UNAUTHORIZED: u16 = 401;

    /// 权限不足
    pub const FORBIDDEN: u16 = 403;

    /// 未找到
    pub const NOT_FOUND: u16 = 404;

    /// 内部错误
    pub const INTERNAL_ERROR: u16 = 500;

    /// 服务不可用
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// 错误码常量
pub mod error_code {
    // 路由错误 (ROUTING-xxx)
    pub const ROUTING_UNRESOLVED: &str = "ROUTING-001";
    pub const ROUTING_INVALID_CONFIG: &str = "ROUTING-002";
    pub const ROUTING_CONTROLLER_NOT_FOUND: &str = "ROUTING-003";
    pub const ROUTING_ACTION_NOT_FOUND: &str = "ROUTING-004";
    pub const ROUTING_FORWARD_LOOP: &str = "ROUTING-005";

    // 扩展错误 (EXTENSION-xxx)
    pub const EXTENSION_NOT_FOUND: &str = "EXTENSION-001";
    pub const EXTENSION_INVALID_MANIFEST: &str = "EXTENSION-002";

    // 令牌错误 (TOKEN-xxx)
    pub const TOKEN_REFILL_FAILED: &str = "TOKEN-001";
    pub const TOKEN_FETCH_FAILED: &str = "TOKEN-002";
    pub const TOKEN_PERSISTENCE_FAILED: &str = "TOKEN-003";

    // 请求错误 (REQUEST-xxx)
    pub const REQUEST_UNAUTHORIZED: &str = "REQUEST-001";
    pub const REQUEST_NETWORK: &str = "REQUEST-002";
    pub const REQUEST_SERVER_ERROR: &str = "REQUEST-003";
    pub const REQUEST_INVALID: &str = "REQUEST-004";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::UnresolvedRoute(_) => error_code::ROUTING_UNRESOLVED,
            CoreError::InvalidRouteConfig { .. } => error_code::ROUTING_INVALID_CONFIG,
            CoreError::ControllerNotFound(_) => error_code::ROUTING_CONTROLLER_NOT_FOUND,
            CoreError::ActionNotFound { .. } => error_code::ROUTING_ACTION_NOT_FOUND,
            CoreError::ForwardLoop { .. } => error_code::ROUTING_FORWARD_LOOP,
            CoreError::ExtensionNotFound(_) => error_code::EXTENSION_NOT_FOUND,
            CoreError::InvalidManifest(_) => error_code::EXTENSION_INVALID_MANIFEST,
            CoreError::TokenRefill => error_code::TOKEN_REFILL_FAILED,
            CoreError::TokenFetch(_) => error_code::TOKEN_FETCH_FAILED,
            CoreError::TokenPersistence(_) => error_code::TOKEN_PERSISTENCE_FAILED,
            CoreError::Unauthorized(_) => error_code::REQUEST_UNAUTHORIZED,
            CoreError::Network { .. } => error_code::REQUEST_NETWORK,
            CoreError::ServerError { .. } => error_code::REQUEST_SERVER_ERROR,
            CoreError::InvalidRequest(_) => error_code::REQUEST_INVALID,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            _ => "UNKNOWN",
        }
    }

    /// 获取 HTTP 状态码
    ///
    /// 分发器把错误转换成响应时使用。
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::UnresolvedRoute(_) => status_code::NOT_FOUND,
            CoreError::ExtensionNotFound(_) => status_code::NOT_FOUND,
            CoreError::InvalidRequest(_) => status_code::BAD_REQUEST,
            CoreError::Unauthorized(_) => status_code::UNAUTHORIZED,
            CoreError::Network { code, .. } if *code > 0 => *code,
            CoreError::ServerError { code, .. } if *code > 0 => *code,
            CoreError::TokenFetch(_) => status_code::SERVICE_UNAVAILABLE,
            _ => status_code::INTERNAL_ERROR,
        }
    }

    /// 是否为路由/配置类错误（重试没有意义）
    pub fn is_routing_error(&self) -> bool {
        matches!(
            self,
            CoreError::UnresolvedRoute(_)
                | CoreError::InvalidRouteConfig { .. }
                | CoreError::ControllerNotFound(_)
                | CoreError::ActionNotFound { .. }
                | CoreError::ForwardLoop { .. }
        )
    }
}
