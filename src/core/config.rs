//! 内核配置
//!
//! 定义内核的配置结构和加载逻辑。配置文件按后缀选择 YAML 或 JSON。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::extension::Extension;
use crate::routing::InvalidRoutePolicy;
use crate::utils::{CoreError, Result};

/// 路由配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// 基础路径，计算相对 URL 时去掉
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// 默认扩展
    #[serde(default = "default_extension")]
    pub default_extension: String,

    /// URL 缺少模块段时使用的模块名
    #[serde(default = "default_module")]
    pub default_module: String,

    /// 路由目标缺少动作时使用的动作名
    #[serde(default = "default_action")]
    pub default_action: String,

    /// 单次请求内允许的最大连续转发次数
    #[serde(default = "default_max_forwards")]
    pub max_forwards: usize,

    /// 无效路由声明的处理策略
    #[serde(default)]
    pub invalid_routes: InvalidRoutePolicy,
}

fn default_base_path() -> String {
    "/".to_string()
}

fn default_extension() -> String {
    "tao".to_string()
}

fn default_module() -> String {
    "Main".to_string()
}

fn default_action() -> String {
    "index".to_string()
}

fn default_max_forwards() -> usize {
    8
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            default_extension: default_extension(),
            default_module: default_module(),
            default_action: default_action(),
            max_forwards: default_max_forwards(),
            invalid_routes: InvalidRoutePolicy::default(),
        }
    }
}

/// 令牌池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// 令牌池容量
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// 令牌有效期（毫秒）
    #[serde(default = "default_token_time_limit_ms")]
    pub token_time_limit_ms: u64,

    /// 令牌接口路径
    #[serde(default = "default_token_endpoint")]
    pub endpoint: String,

    /// 服务端地址，网络令牌来源和受保护请求都基于它
    #[serde(default)]
    pub base_url: Option<String>,

    /// 令牌持久化文件（None 表示只保存在内存中）
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_max_size() -> usize {
    15
}

fn default_token_time_limit_ms() -> u64 {
    30_000
}

fn default_token_endpoint() -> String {
    "/tao/ClientConfig/tokens".to_string()
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            token_time_limit_ms: default_token_time_limit_ms(),
            endpoint: default_token_endpoint(),
            base_url: None,
            store_path: None,
        }
    }
}

/// 受保护请求客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 默认请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 内核配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 路由配置
    #[serde(default)]
    pub routing: RoutingConfig,

    /// 已安装扩展，顺序即解析顺序
    #[serde(default)]
    pub extensions: Vec<Extension>,

    /// 需要扫描清单的扩展目录，扫描到的扩展排在 `extensions` 之后
    #[serde(default)]
    pub extension_dirs: Vec<PathBuf>,

    /// 令牌池配置
    #[serde(default)]
    pub tokens: TokenConfig,

    /// 客户端配置
    #[serde(default)]
    pub client: ClientConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,
}

impl CoreConfig {
    /// 创建配置构建器
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }

    /// 从文件加载配置
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;

        let mut config: CoreConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path);
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.routing.max_forwards == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "routing.max_forwards".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.routing.default_module.is_empty() || self.routing.default_action.is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "routing.default_module/default_action".to_string(),
                reason: "不能为空".to_string(),
            });
        }
        if self.tokens.max_size == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "tokens.max_size".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.tokens.token_time_limit_ms == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "tokens.token_time_limit_ms".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if let Some(ref base_url) = self.tokens.base_url {
            url::Url::parse(base_url).map_err(|e| CoreError::InvalidConfigValue {
                key: "tokens.base_url".to_string(),
                reason: e.to_string(),
            })?;
        }

        let mut seen = std::collections::HashSet::new();
        for extension in &self.extensions {
            if !seen.insert(extension.id.as_str()) {
                return Err(CoreError::InvalidConfigValue {
                    key: "extensions".to_string(),
                    reason: format!("扩展 '{}' 重复声明", extension.id),
                });
            }
        }
        Ok(())
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: CoreConfig) {
        // 只覆盖非默认值的配置
        if other.routing.base_path != default_base_path() {
            self.routing.base_path = other.routing.base_path;
        }
        if other.routing.max_forwards != default_max_forwards() {
            self.routing.max_forwards = other.routing.max_forwards;
        }
        if other.routing.invalid_routes != InvalidRoutePolicy::default() {
            self.routing.invalid_routes = other.routing.invalid_routes;
        }
        for extension in other.extensions {
            match self.extensions.iter_mut().find(|e| e.id == extension.id) {
                Some(existing) => *existing = extension,
                None => self.extensions.push(extension),
            }
        }
        self.extension_dirs.extend(other.extension_dirs);
        if other.tokens.max_size != default_max_size() {
            self.tokens.max_size = other.tokens.max_size;
        }
        if other.tokens.token_time_limit_ms != default_token_time_limit_ms() {
            self.tokens.token_time_limit_ms = other.tokens.token_time_limit_ms;
        }
        if other.tokens.base_url.is_some() {
            self.tokens.base_url = other.tokens.base_url;
        }
        if other.tokens.store_path.is_some() {
            self.tokens.store_path = other.tokens.store_path;
        }
        if other.client.timeout_secs != default_timeout_secs() {
            self.client.timeout_secs = other.client.timeout_secs;
        }
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置基础路径
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.config.routing.base_path = base_path.into();
        self
    }

    /// 设置最大转发次数
    pub fn max_forwards(mut self, max: usize) -> Self {
        self.config.routing.max_forwards = max;
        self
    }

    /// 设置无效路由策略
    pub fn invalid_routes(mut self, policy: InvalidRoutePolicy) -> Self {
        self.config.routing.invalid_routes = policy;
        self
    }

    /// 追加扩展（按调用顺序决定解析顺序）
    pub fn extension(mut self, extension: Extension) -> Self {
        self.config.extensions.push(extension);
        self
    }

    /// 添加扩展目录
    pub fn extension_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.extension_dirs.push(dir.into());
        self
    }

    /// 设置令牌池容量
    pub fn token_pool_size(mut self, max_size: usize) -> Self {
        self.config.tokens.max_size = max_size;
        self
    }

    /// 设置令牌有效期（毫秒）
    pub fn token_time_limit_ms(mut self, limit: u64) -> Self {
        self.config.tokens.token_time_limit_ms = limit;
        self
    }

    /// 设置服务端地址
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.tokens.base_url = Some(url.into());
        self
    }

    /// 设置令牌持久化文件
    pub fn token_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tokens.store_path = Some(path.into());
        self
    }

    /// 设置默认请求超时（秒）
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.client.timeout_secs = secs;
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> CoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.routing.base_path, "/");
        assert_eq!(config.routing.default_module, "Main");
        assert_eq!(config.routing.max_forwards, 8);
        assert_eq!(config.tokens.max_size, 15);
        assert_eq!(config.tokens.token_time_limit_ms, 30_000);
        assert_eq!(config.tokens.endpoint, "/tao/ClientConfig/tokens");
        assert_eq!(config.client.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CoreConfig::builder()
            .base_path("/platform")
            .extension(Extension::new("tao"))
            .extension(Extension::new("taoItems"))
            .token_pool_size(3)
            .log_level("debug")
            .build();

        assert_eq!(config.routing.base_path, "/platform");
        assert_eq!(config.extensions.len(), 2);
        assert_eq!(config.extensions[1].id, "taoItems");
        assert_eq!(config.tokens.max_size, 3);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_merge() {
        let mut base = CoreConfig::builder()
            .extension(Extension::new("tao"))
            .build();
        let override_config = CoreConfig::builder()
            .extension(Extension::new("tao").with_enabled(false))
            .extension(Extension::new("taoItems"))
            .invalid_routes(InvalidRoutePolicy::Legacy)
            .log_level("debug")
            .build();

        base.merge(override_config);

        assert_eq!(base.extensions.len(), 2);
        assert!(!base.extensions[0].enabled);
        assert_eq!(base.routing.invalid_routes, InvalidRoutePolicy::Legacy);
        assert_eq!(base.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CoreConfig::builder().max_forwards(0).build();
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfigValue { ref key, .. }) if key == "routing.max_forwards"
        ));

        let config = CoreConfig::builder().base_url("not a url").build();
        assert!(config.validate().is_err());

        let config = CoreConfig::builder()
            .extension(Extension::new("tao"))
            .extension(Extension::new("tao"))
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = CoreConfig::builder()
            .extension(Extension::new("tao").with_namespace_route("/tao", "oat::tao::controller"))
            .token_time_limit_ms(100)
            .build();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: CoreConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.extensions[0].routes.len(), 1);
        assert_eq!(parsed.tokens.token_time_limit_ms, 100);
    }
}
