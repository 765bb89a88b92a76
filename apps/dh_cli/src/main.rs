// apps/dh_cli/src/main.rs

//! DrainHydro 命令行界面
//!
//! 提供雨洪产流与管网演算的命令行工具。
//!
//! # 架构层级
//!
//! 本模块属于应用层：只消费 `ProjectConfig` 与引擎公开接口，
//! 不触碰引擎内部状态。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// DrainHydro 雨洪模拟命令行工具
#[derive(Parser)]
#[command(name = "dh_cli")]
#[command(author = "DrainHydro Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "DrainHydro stormwater runoff and routing engine", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行模拟
    Run(commands::run::RunArgs),
    /// 显示项目信息
    Info(commands::info::InfoArgs),
    /// 验证项目描述
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 执行命令
    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
