//! TAO Core 命令行入口
//!
//! # 命令概览
//!
//! - `resolve` - 解析 URL，显示扩展/控制器/动作
//! - `routes` - 查看所有已安装扩展的路由表
//! - `token` - 从令牌来源取一个令牌
//! - `check-config` - 验证配置文件
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! tao-core -c config.yaml resolve /tao/Main/index
//! tao-core routes
//! tao-core check-config -c config.yaml
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use tao_core::{CoreConfig, LogGuard, Logger, LoggerConfig, TaoCore};

/// TAO Core - 扩展路由解析与令牌池
#[derive(Parser)]
#[command(name = "tao-core")]
#[command(version, about = "TAO 平台的路由解析与令牌池工具", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 解析 URL
    ///
    /// 按扩展注册顺序查找第一条匹配的路由。
    Resolve {
        /// 请求 URL（可以包含协议、主机和查询字符串）
        url: String,
    },

    /// 查看路由表
    Routes,

    /// 从令牌来源取一个令牌
    Token,

    /// 验证配置文件
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 查看版本信息
    Version,
}

fn init_logging(config: &CoreConfig, level: Option<&str>) -> LogGuard {
    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    if let Some(level) = level {
        logger_config.level = level.to_string();
    }
    Logger::try_init(logger_config)
}

async fn load_config(path: &Path) -> Result<CoreConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        let config = CoreConfig::from_file(path).await?;
        info!("已加载配置文件: {}", path.display());
        Ok(config)
    } else {
        info!("配置文件不存在 ({})，使用默认配置", path.display());
        Ok(CoreConfig::default())
    }
}

async fn resolve(config: CoreConfig, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let core = TaoCore::new(config).await?;
    let resolution = core.resolve(url)?;
    println!("{}", serde_json::to_string_pretty(&resolution.to_json())?);
    Ok(())
}

async fn show_routes(config: CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let core = TaoCore::new(config).await?;
    let summaries = core.route_summaries()?;

    println!();
    println!("路由表");
    println!("═══════════════════════════════════════");
    for summary in summaries {
        let marker = if summary.legacy_fallback { " (旧式路由)" } else { "" };
        println!("  [{}]{}", summary.extension_id, marker);
        for (id, kind) in summary.routes {
            println!("    /{:<24} {}", id, kind);
        }
    }
    println!("═══════════════════════════════════════");
    println!();
    Ok(())
}

async fn fetch_token(config: CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let core = TaoCore::new(config).await?;
    let token = core.tokens().get_token().await?;
    println!("{}", token.value);
    println!("剩余令牌: {}", core.tokens().queue_length());
    Ok(())
}

async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    let config = match CoreConfig::from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            println!("配置文件无效: {}", e);
            return Err(Box::new(e));
        }
    };

    println!("配置文件有效");
    println!("────────────────────────────────────────");
    println!("  [路由]");
    println!("    基础路径:       {}", config.routing.base_path);
    println!("    默认扩展:       {}", config.routing.default_extension);
    println!("    最大转发次数:   {}", config.routing.max_forwards);
    println!("    无效路由处理:   {:?}", config.routing.invalid_routes);
    println!("    内联扩展:       {}", config.extensions.len());
    println!("    扩展目录:       {:?}", config.extension_dirs);
    println!();
    println!("  [令牌池]");
    println!("    容量:           {}", config.tokens.max_size);
    println!("    有效期:         {} ms", config.tokens.token_time_limit_ms);
    match config.tokens.base_url {
        Some(ref base_url) => println!("    令牌接口:       {}{}", base_url, config.tokens.endpoint),
        None => println!("    令牌接口:       (客户端配置)"),
    }
    println!();
    println!("  [日志]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    JSON 格式:      {}", if config.logging.json_format { "是" } else { "否" });
    println!("────────────────────────────────────────");

    let core = TaoCore::new(config).await?;
    match core.resolver().warm_up() {
        Ok(tables) => println!("路由表构建成功: {} 个扩展", tables),
        Err(e) => {
            println!("路由表构建失败: {}", e);
            return Err(Box::new(e));
        }
    }
    Ok(())
}

fn print_version() {
    println!("TAO Core {}", tao_core::VERSION);
    println!("  目标平台: {}", std::env::consts::ARCH);
    println!("  操作系统: {}", std::env::consts::OS);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => print_version(),
        Commands::CheckConfig { config } => {
            let path = config.unwrap_or(cli.config);
            check_config(&path).await?;
        }
        command => {
            let config = load_config(&cli.config).await?;
            let _guard = init_logging(&config, cli.log_level.as_deref());
            match command {
                Commands::Resolve { url } => resolve(config, &url).await?,
                Commands::Routes => show_routes(config).await?,
                Commands::Token => fetch_token(config).await?,
                Commands::Version | Commands::CheckConfig { .. } => {}
            }
        }
    }

    Ok(())
}
