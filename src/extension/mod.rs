//! 扩展模块
//!
//! 扩展是平台的可安装单元，贡献路由、控制器和配置：
//! - 扩展清单与路由声明
//! - 清单解析与校验
//! - 有序的扩展注册表

pub mod manifest;
pub mod parser;
pub mod registry;

pub use manifest::{Extension, RouteDeclaration};
pub use parser::ManifestParser;
pub use registry::ExtensionRegistry;
