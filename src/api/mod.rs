//! API 模块
//!
//! 对外提供的 [`TaoCore`] 入口：组装扩展注册表、路由解析、分发器和令牌池。
//!
//! ```rust,no_run
//! use tao_core::{CoreConfig, TaoCore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::from_file("config.yaml").await?;
//!     let mut core = TaoCore::new(config).await?;
//!     core.start()?;
//!
//!     let resolution = core.resolve("/tao/Main/index")?;
//!     println!("{}", resolution.to_json());
//!     Ok(())
//! }
//! ```

pub mod sdk;

pub use sdk::{CoreState, RouteSummary, TaoCore};
