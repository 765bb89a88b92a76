// crates/dh_physics/src/runoff/mod.rs

//! 产流步进控制器
//!
//! 每个产流步：推进气候与雨量计状态，选择湿/干步长（受下一次
//! 降雨或蒸发变化时刻约束），翻转子汇水区双缓冲状态，执行排放口
//! 回灌与来水分配，再对每个非零面积子汇水区计算产流。
//!
//! 产流接口文件的读写经由 [`RunoffIface`] 注入：读取模式下用
//! 文件记录替换全部子汇水区动态状态，保存模式下逐步追加记录。
//! 文件编解码本身在 IO 层实现。

pub mod ode;
pub mod subcatch_flow;

use dh_foundation::consts::LPER_FT3;

use crate::error::ErrorCode;
use crate::massbal::RunoffQuantity;
use crate::objects::node::NodeKind;
use crate::project::{IfaceMode, Project};

/// 产流接口文件钩子
///
/// 读取端返回 `Ok(tstep)`（本记录的步长 [s]）；出错时置位项目
/// 粘性错误码并返回 `Err(())`。
pub trait RunoffIface {
    /// 读一条记录并替换全部子汇水区动态状态
    fn read_step(&mut self, prj: &mut Project) -> Result<f64, ()>;
    /// 追加一条当前步的记录
    fn save_step(&mut self, prj: &mut Project, tstep: f64);
}

/// 不使用接口文件时的空钩子
pub struct NoIface;

impl RunoffIface for NoIface {
    fn read_step(&mut self, prj: &mut Project) -> Result<f64, ()> {
        prj.set_error(ErrorCode::RunoffFileRead, "未附着产流接口文件");
        Err(())
    }
    fn save_step(&mut self, _prj: &mut Project, _tstep: f64) {}
}

/// 执行一个产流步
pub fn execute(prj: &mut Project, iface: &mut dyn RunoffIface) {
    if prj.has_error() {
        return;
    }

    // 上一产流步长，用于排放口回灌的体积→流量换算
    let old_runoff_step = (prj.clock.new_runoff_time - prj.clock.old_runoff_time) / 1000.0;

    let current_date = prj.date_at(prj.clock.new_runoff_time);
    prj.climate.set_state(current_date);

    // 没有子汇水区时只推进时钟
    if prj.subcatchments.is_empty() {
        prj.clock.old_runoff_time = prj.clock.new_runoff_time;
        prj.clock.new_runoff_time = (prj.clock.new_runoff_time + 1000.0 * prj.dry_step)
            .min(prj.total_duration_ms);
        return;
    }

    // 雨量计按目录顺序推进
    let elapsed = prj.clock.new_runoff_time;
    prj.runoff_flags.is_raining = false;
    for gage in &mut prj.gages {
        gage.set_state(elapsed);
        if gage.rainfall > 0.0 {
            prj.runoff_flags.is_raining = true;
        }
    }

    // 读取模式：用接口文件记录替换计算
    if prj.runoff_iface_mode == IfaceMode::Use {
        for j in 0..prj.subcatchments.len() {
            prj.subcatchments[j].set_old_state();
        }
        if let Ok(tstep) = iface.read_step(prj) {
            prj.clock.old_runoff_time = prj.clock.new_runoff_time;
            prj.clock.new_runoff_time = (prj.clock.new_runoff_time + tstep * 1000.0)
                .min(prj.total_duration_ms);
            prj.runoff_flags.nsteps += 1;
        }
        return;
    }

    // 步长选择
    let mut runoff_step = get_time_step(prj, elapsed, current_date);
    if runoff_step <= 0.0 {
        prj.set_error(ErrorCode::Timestep, "产流步长不为正");
        return;
    }

    // 推进产流时钟，步长不越过模拟终点
    prj.clock.old_runoff_time = prj.clock.new_runoff_time;
    prj.clock.new_runoff_time += 1000.0 * runoff_step;
    if prj.clock.new_runoff_time > prj.total_duration_ms {
        runoff_step = (prj.total_duration_ms - prj.clock.old_runoff_time) / 1000.0;
        prj.clock.new_runoff_time = prj.total_duration_ms;
    }

    // 翻转双缓冲状态
    for j in 0..prj.subcatchments.len() {
        prj.subcatchments[j].set_old_state();
    }

    // 排放口回灌：用上一步长换算体积为流量
    if old_runoff_step > 0.0 {
        get_outfall_runon(prj, old_runoff_step);
    }

    // 来水分配与除雪
    for j in 0..prj.subcatchments.len() {
        if prj.subcatchments[j].area == 0.0 {
            continue;
        }
        subcatch_flow::get_runon(prj, j);
        if !prj.ignore_snowmelt {
            if let Some(snow) = &mut prj.subcatchments[j].snowpack {
                snow.plow_snow(runoff_step);
            }
        }
    }

    // 产流计算
    prj.runoff_flags.has_snow = false;
    prj.runoff_flags.has_runoff = false;
    prj.runoff_flags.has_wet_lids = false;
    for j in 0..prj.subcatchments.len() {
        if prj.subcatchments[j].area == 0.0 {
            continue;
        }
        let runoff = match subcatch_flow::get_runoff(prj, j, runoff_step) {
            Ok(r) => r,
            Err(err) => {
                let code = err.code().unwrap_or(ErrorCode::OdeSolver);
                prj.set_error(code, &err.to_string());
                return;
            }
        };
        if runoff > 0.0 {
            prj.runoff_flags.has_runoff = true;
        }
        if prj.subcatchments[j].new_snow_depth > 0.0 {
            prj.runoff_flags.has_snow = true;
        }
        if prj.subcatchments[j].lid.as_ref().is_some_and(|l| l.is_wet()) {
            prj.runoff_flags.has_wet_lids = true;
        }
    }

    prj.runoff_flags.nsteps += 1;
    if prj.runoff_iface_mode == IfaceMode::Save {
        iface.save_step(prj, runoff_step);
    }

    // 来水累加器清零，准备下一步
    for sc in &mut prj.subcatchments {
        sc.runon = 0.0;
    }
}

/// 产流步长选择 [s]
///
/// 上限取干步长、下一次蒸发变化与各雨量计下一次降雨变化的最小
/// 间隔；任一湿润条件成立时用湿步长。
fn get_time_step(prj: &Project, elapsed_ms: f64, current_date: chrono::NaiveDateTime) -> f64 {
    let mut max_step = prj.dry_step;

    if let Some(next_evap) = prj.climate.next_evap_date(current_date) {
        let diff = (next_evap - current_date).num_seconds() as f64;
        if diff > 0.0 && diff < max_step {
            max_step = diff;
        }
    }
    for gage in &prj.gages {
        let next = gage.next_rain_time_ms(elapsed_ms);
        if next < f64::MAX {
            let diff = (next - elapsed_ms) / 1000.0;
            if diff > 0.0 && diff < max_step {
                max_step = diff;
            }
        }
    }

    let flags = &prj.runoff_flags;
    let step = if flags.is_raining || flags.has_snow || flags.has_runoff || flags.has_wet_lids
    {
        prj.wet_step
    } else {
        prj.dry_step
    };
    step.min(max_step)
}

/// 排放口回灌
///
/// 把上一产流步内从排放口流出的体积换算为流量，加到指定
/// 子汇水区的来水上；随流污染物负荷计入其湿沉降临时累加器。
fn get_outfall_runon(prj: &mut Project, tstep: f64) {
    let n_pollut = if prj.ignore_quality {
        0
    } else {
        prj.pollutants.len()
    };
    for i in 0..prj.nodes.len() {
        let NodeKind::Outfall(outfall) = &mut prj.nodes[i].kind else {
            continue;
        };
        let Some(k) = outfall.route_to else { continue };
        if prj.subcatchments[k].area == 0.0 {
            continue;
        }

        let v_routed = outfall.v_routed;
        outfall.v_routed = 0.0;
        let mut w_routed = vec![0.0; n_pollut];
        for p in 0..n_pollut {
            w_routed[p] = outfall.w_routed[p];
            outfall.w_routed[p] = 0.0;
        }

        prj.subcatchments[k].add_runon_flow(v_routed / tstep);
        for (p, &w) in w_routed.iter().enumerate() {
            prj.subcatchments[k].new_qual[p] += w * LPER_FT3 / tstep;
        }
        prj.massbal
            .update_runoff_totals(RunoffQuantity::Runon, v_routed);
    }
}
