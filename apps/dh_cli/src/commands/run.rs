// apps/dh_cli/src/commands/run.rs

//! 运行模拟命令
//!
//! 驱动产流与管网演算的交替推进：产流时钟始终领先演算时钟，
//! 演算步（通常更小）逐步追赶；到达每个报告时刻时把插值结果
//! 写入二进制结果文件。
//!
//! 关闭路径与错误无关：结果文件尾记录、热启动保存与接口文件
//! 回填在任何退出路径上都执行一次。

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use dh_config::ProjectConfig;
use dh_io::{hotstart, ResultsStore, RunoffIfaceFile};
use dh_physics::runoff::{self, NoIface};
use dh_physics::{FlowRouting, IfaceMode, Project};

/// 运行模拟参数
#[derive(Args)]
pub struct RunArgs {
    /// 项目描述文件（JSON）
    #[arg(short, long)]
    pub project: PathBuf,

    /// 结果文件路径（覆盖项目描述中的设置）
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== DrainHydro 模拟启动 ===");
    let started = Instant::now();

    let cfg = ProjectConfig::from_file(&args.project)
        .with_context(|| format!("项目描述加载失败: {}", args.project.display()))?;
    let mut prj = Project::from_config(&cfg).context("项目构建失败")?;
    info!(
        "项目就绪: {} 子汇水区, {} 节点, {} 管段",
        prj.subcatchments.len(),
        prj.nodes.len(),
        prj.links.len()
    );

    // 热启动读取（在进入模拟循环之前恢复状态）
    let mut hotstart_loaded = false;
    if let Some(path) = &cfg.options.hotstart_use {
        hotstart::read(&mut prj, path)
            .with_context(|| format!("热启动文件读取失败: {}", path.display()))?;
        hotstart_loaded = true;
    }

    // 产流接口文件
    let mut file_iface = match prj.runoff_iface_mode {
        IfaceMode::None => None,
        mode => {
            let path = cfg
                .options
                .runoff_file
                .as_ref()
                .map(|f| f.path.clone())
                .context("产流接口文件缺少路径")?;
            Some(RunoffIfaceFile::open(&mut prj, &path, mode)?)
        }
    };
    let mut no_iface = NoIface;

    // 管网演算引擎
    let mut routing = if prj.ignore_routing || prj.links.is_empty() {
        None
    } else {
        Some(FlowRouting::open(&mut prj, None, hotstart_loaded).context("管网演算初始化失败")?)
    };

    // 结果文件
    let results_path = args
        .output
        .or_else(|| cfg.options.results_file.clone())
        .unwrap_or_else(|| PathBuf::from("results.out"));
    let mut results = ResultsStore::open(&mut prj, &results_path)?;
    info!("结果文件: {}", results_path.display());

    prj.massbal.runoff.init_storage = prj.surface_storage();
    prj.massbal.flow.init_storage = prj.system_storage();

    // 主循环：报告时刻从报告起点后的第一个报告期开始
    let report_step_ms = prj.report_step * 1000.0;
    let mut report_time = prj.report_start_ms + report_step_ms;
    let total = prj.total_duration_ms;

    match &mut routing {
        Some(routing) => {
            while prj.clock.new_routing_time < total && !prj.has_error() {
                // 产流时钟领先演算时钟
                if prj.clock.new_routing_time >= prj.clock.new_runoff_time {
                    exec_runoff(&mut prj, &mut file_iface, &mut no_iface);
                }
                let dt = routing
                    .routing_step(&prj, prj.routing_step)
                    .min((total - prj.clock.new_routing_time) / 1000.0);
                if dt <= 0.0 {
                    break;
                }
                routing.step(&mut prj, dt);

                while report_time <= total && prj.clock.new_routing_time >= report_time {
                    results.save_results(&mut prj, report_time);
                    report_time += report_step_ms;
                }
            }
        }
        None => {
            // 仅产流模式
            while prj.clock.new_runoff_time < total && !prj.has_error() {
                exec_runoff(&mut prj, &mut file_iface, &mut no_iface);
                while report_time <= total && prj.clock.new_runoff_time >= report_time {
                    results.save_results(&mut prj, report_time);
                    report_time += report_step_ms;
                }
            }
        }
    }

    prj.massbal.runoff.final_storage = prj.surface_storage();
    prj.massbal.flow.final_storage = prj.system_storage();

    // 关闭路径：出错与否都执行
    results.end(&mut prj);
    if let Some(routing) = &mut routing {
        routing.close(&mut prj);
    }
    if let Some(iface) = &mut file_iface {
        iface.close(&mut prj);
    }
    if let Some(path) = &cfg.options.hotstart_save {
        if hotstart::save(&mut prj, path).is_ok() {
            info!("热启动文件已保存: {}", path.display());
        }
    }

    let continuity = prj.massbal.runoff.continuity_error();
    info!(
        "模拟完成: {} 个报告期, 产流连续性误差 {:.4}%, 耗时 {:.2}s",
        results.n_periods(),
        continuity * 100.0,
        started.elapsed().as_secs_f64()
    );
    if prj.warning_count > 0 {
        warn!("共 {} 条告警", prj.warning_count);
    }
    if let Some(code) = prj.error_code {
        bail!("模拟以错误终止: {}", code);
    }
    Ok(())
}

/// 按接口文件配置分发产流执行
fn exec_runoff(
    prj: &mut Project,
    file_iface: &mut Option<RunoffIfaceFile>,
    no_iface: &mut NoIface,
) {
    match file_iface {
        Some(iface) => runoff::execute(prj, iface),
        None => runoff::execute(prj, no_iface),
    }
}
