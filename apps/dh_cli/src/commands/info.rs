// apps/dh_cli/src/commands/info.rs

//! 项目信息命令
//!
//! 打印项目描述的对象目录与模拟选项摘要。

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use dh_config::ProjectConfig;
use dh_physics::Project;

/// 信息参数
#[derive(Args)]
pub struct InfoArgs {
    /// 项目描述文件（JSON）
    #[arg(short, long)]
    pub project: PathBuf,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    let cfg = ProjectConfig::from_file(&args.project)
        .with_context(|| format!("项目描述加载失败: {}", args.project.display()))?;
    let prj = Project::from_config(&cfg).context("项目构建失败")?;

    if let Some(title) = &prj.title {
        info!("项目: {}", title);
    }
    info!("流量单位: {:?}", prj.units.flow_units());
    info!("演算模型: {:?}", prj.routing_model);
    info!(
        "时段: {} 起, 共 {:.1} 小时",
        prj.start_date,
        prj.total_duration_ms / 3_600_000.0
    );
    info!(
        "步长: 湿 {}s / 干 {}s / 演算 {}s / 报告 {}s",
        prj.wet_step, prj.dry_step, prj.routing_step, prj.report_step
    );

    info!("雨量计: {}", prj.gages.len());
    info!("子汇水区: {}", prj.subcatchments.len());
    info!("节点: {}", prj.nodes.len());
    info!("管段: {}", prj.links.len());
    info!("污染物: {}", prj.pollutants.len());
    info!("土地利用: {}", prj.land_uses.len());

    let total_area: f64 = prj.subcatchments.iter().map(|s| s.area).sum();
    if total_area > 0.0 {
        info!(
            "汇水总面积: {:.2} acre",
            total_area * prj.units.ucf(dh_foundation::units::Quantity::LandArea)
        );
    }
    Ok(())
}
