// apps/dh_cli/src/commands/validate.rs

//! 项目验证命令
//!
//! 解析项目描述、构建项目对象并执行管网布局静态校验，
//! 不进入模拟循环。

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{error, info, warn};

use dh_config::ProjectConfig;
use dh_physics::{FlowRouting, Project};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 项目描述文件（JSON）
    #[arg(short, long)]
    pub project: PathBuf,

    /// 严格模式（告警也视为失败）
    #[arg(long)]
    pub strict: bool,
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("验证项目描述: {}", args.project.display());

    let cfg = ProjectConfig::from_file(&args.project)
        .with_context(|| format!("项目描述加载失败: {}", args.project.display()))?;
    let mut prj = Project::from_config(&cfg).context("项目构建失败")?;

    // 未被任何子汇水区引用的雨量计
    let unused: Vec<String> = prj
        .gages
        .iter()
        .filter(|g| !g.is_used)
        .map(|g| g.name.clone())
        .collect();
    for name in unused {
        prj.warn(&format!("雨量计 {} 未被引用", name));
    }

    // 管网布局静态校验
    if !prj.ignore_routing && !prj.links.is_empty() {
        if let Err(e) = FlowRouting::open(&mut prj, None, false) {
            error!("{}", e);
        }
    }

    if let Some(code) = prj.error_code {
        bail!("验证失败: {}", code);
    }
    if prj.warning_count > 0 {
        warn!("验证通过，共 {} 条告警", prj.warning_count);
        if args.strict {
            bail!("严格模式下告警视为失败");
        }
    } else {
        info!("验证通过");
    }
    Ok(())
}
