// crates/dh_physics/src/runoff/subcatch_flow.rs

//! 子汇水区单步水量平衡
//!
//! 每个产流步对每个子汇水区依次执行：来水获取（上游子汇水区、
//! LID 暗渠、排放口回灌）、子面积交叉汇流、净降水拆分、三类
//! 子面积的蒸发-入渗-积水-产流计算、LID 处理、地下水联动与
//! 质量平衡记账。
//!
//! 本模块返回的“总产流率”（ft/s，摊在全区上）用于污染物冲刷；
//! 实际离开子汇水区的出流（cfs）写入 `new_runoff`。

use dh_foundation::consts::{LPER_FT3, MEXP, ODETOL};

use crate::couplers::{GroundwaterState, InfilState, WaterBalance};
use crate::error::{EngineError, EngineResult, ErrorCode};
use crate::massbal::RunoffQuantity;
use crate::objects::subcatch::{RouteTo, Subarea, IMPERV0, PERV};
use crate::project::Project;

use super::ode;

/// 来水获取与子面积交叉汇流
///
/// 把上一步的出流分配到下游：上游子汇水区的径流挂到本区来水，
/// 子面积间按配置互转，LID 回灌并入透水面。
pub fn get_runon(prj: &mut Project, j: usize) {
    // 上一步径流挂到下游子汇水区
    let q = prj.subcatchments[j].old_runoff;
    if let Some(k) = prj.subcatchments[j].out_subcatch {
        if k != j {
            let n_pollut = if prj.ignore_quality {
                0
            } else {
                prj.pollutants.len()
            };
            let old_qual: Vec<f64> = prj.subcatchments[j].old_qual[..n_pollut].to_vec();
            let target = &mut prj.subcatchments[k];
            target.add_runon_flow(q);
            for (p, &c) in old_qual.iter().enumerate() {
                target.new_qual[p] += q * c * LPER_FT3;
            }
        }
    }

    // LID 暗渠排往其他子汇水区的来水
    if prj.subcatchments[j].lid_area > 0.0 {
        if let Some(lid) = &mut prj.subcatchments[j].lid {
            lid.add_drain_runon();
        }
    }

    // 子面积间交叉汇流（不转移污染物负荷：冲刷负荷按全区径流计）
    let sc = &mut prj.subcatchments[j];

    // 情形 1：不透水面 → 透水面
    if sc.frac_imperv < 1.0 && sc.subareas[IMPERV0].route_to == RouteTo::Perv {
        let q1 = sc.subareas[IMPERV0].runoff * sc.subareas[IMPERV0].f_area;
        let q2 = sc.subareas[1].runoff * sc.subareas[1].f_area;
        let q = q1 + q2;
        sc.subareas[PERV].inflow +=
            q * (1.0 - sc.subareas[IMPERV0].f_outlet) / sc.subareas[PERV].f_area;
    }

    // 情形 2：透水面 → 有洼蓄不透水面
    if sc.frac_imperv > 0.0
        && sc.subareas[PERV].route_to == RouteTo::Imperv
        && sc.subareas[1].f_area > 0.0
    {
        let q = sc.subareas[PERV].runoff;
        sc.subareas[1].inflow += q * (1.0 - sc.subareas[PERV].f_outlet)
            * sc.subareas[PERV].f_area
            / sc.subareas[1].f_area;
    }

    // LID 回灌透水面
    if sc.lid_area > 0.0 && sc.frac_imperv < 1.0 {
        let perv_area = sc.subareas[PERV].f_area * (sc.area - sc.lid_area);
        let q = sc.lid.as_ref().map_or(0.0, |lid| lid.flow_to_perv());
        if perv_area > 0.0 {
            sc.subareas[PERV].inflow += q / perv_area;
        }
    }
}

/// 净降水：雨 + 雪 + 融雪，拆分到三类子面积 [ft/s]
fn get_net_precip(prj: &mut Project, j: usize, tstep: f64) -> [f64; 3] {
    let (rainfall, snowfall) = match prj.subcatchments[j].gage {
        Some(g) => prj.gages[g].get_precip(prj.climate.air_temp, prj.climate.snow_temp),
        None => (0.0, 0.0),
    };
    let air_temp = prj.climate.air_temp;
    let ignore_snowmelt = prj.ignore_snowmelt;

    let sc = &mut prj.subcatchments[j];
    sc.rainfall = rainfall + snowfall;

    let mut net = [0.0; 3];
    if !ignore_snowmelt {
        if let Some(snow) = &mut sc.snowpack {
            sc.new_snow_depth =
                snow.get_snow_melt(air_temp, rainfall, snowfall, tstep, &mut net);
            return net;
        }
    }
    for n in &mut net {
        *n = rainfall + snowfall;
    }
    net
}

/// 子汇水区单步产流计算
///
/// 返回全区平均总产流率 [ft/s]；离开子汇水区的出流写入
/// `new_runoff` [cfs]。
pub fn get_runoff(prj: &mut Project, j: usize, tstep: f64) -> EngineResult<f64> {
    let mut wb = WaterBalance::default();

    let area_total = prj.subcatchments[j].area;
    let non_lid_area = prj.subcatchments[j].non_lid_area();

    // 来水体积 + 既有积水构成本步入流
    let v_runon = prj.subcatchments[j].runon * tstep * non_lid_area;
    wb.v_inflow = v_runon + prj.subcatchments[j].get_depth() * non_lid_area;

    let net_precip = get_net_precip(prj, j, tstep);

    // 潜在蒸发：仅无雨期蒸发的选项下，降雨时置零
    let evap_rate = if prj.climate.dry_only && prj.subcatchments[j].rainfall > 0.0 {
        0.0
    } else {
        prj.climate.evap_rate
    };

    let ignore_gwater = prj.ignore_gwater;
    let mut runoff = 0.0;

    let sc = &mut prj.subcatchments[j];
    {
        let subareas = &mut sc.subareas;
        let infil = &mut sc.infil;
        let gw = if ignore_gwater {
            None
        } else {
            sc.groundwater.as_ref()
        };
        if non_lid_area > 0.0 {
            for (i, sa) in subareas.iter_mut().enumerate() {
                let area = non_lid_area * sa.f_area;
                let r = get_subarea_runoff(
                    sa,
                    infil,
                    gw,
                    &mut wb,
                    i == PERV,
                    area,
                    net_precip[i],
                    evap_rate,
                    tstep,
                )
                .map_err(|_| EngineError::new(ErrorCode::OdeSolver, sc.name.clone()))?;
                sa.runoff = r;
                runoff += r * area;
            }
        }
    }

    // LID 处理（更新共享水量平衡）
    if sc.lid_area > 0.0 {
        if let Some(lid) = &mut sc.lid {
            lid.get_runoff(tstep, &mut wb);
        }
    }

    // 地下水联动：喂入透水面蒸发与总入渗（地表 + LID）
    if !ignore_gwater {
        if let Some(gw) = &mut sc.groundwater {
            gw.update(wb.v_pevap, wb.v_infil + wb.v_lid_infil, area_total, tstep);
        }
    }

    // 损失速率摊在总面积上
    sc.evap_loss = wb.v_evap / tstep / area_total;
    sc.infil_loss = (wb.v_infil + wb.v_lid_infil) / tstep / area_total;

    // 净出流 = 非 LID 面出流 − 送入 LID 处理的量 + LID 面出流
    let mut v_outflow = wb.v_outflow - wb.v_lid_in + wb.v_lid_out;
    sc.new_runoff = v_outflow / tstep;

    let v_rain = sc.rainfall * tstep * area_total;

    // 只有排入管网节点的出流参与全局流量平衡
    if sc.out_node.is_none() && sc.out_subcatch != Some(j) {
        v_outflow = 0.0;
    }

    let v_evap = wb.v_evap;
    let v_infil = wb.v_infil + wb.v_lid_infil;
    prj.massbal
        .update_runoff_totals(RunoffQuantity::Rainfall, v_rain);
    prj.massbal.update_runoff_totals(RunoffQuantity::Evap, v_evap);
    prj.massbal
        .update_runoff_totals(RunoffQuantity::Infil, v_infil);
    prj.massbal
        .update_runoff_totals(RunoffQuantity::Runoff, v_outflow);

    Ok(runoff / area_total)
}

/// 单个子面积的单步水量平衡
///
/// 更新积水深与入流，返回产流率 [ft/s]，同时写入共享水量平衡。
#[allow(clippy::too_many_arguments)]
fn get_subarea_runoff(
    sa: &mut Subarea,
    infil_state: &mut InfilState,
    gw: Option<&GroundwaterState>,
    wb: &mut WaterBalance,
    is_perv: bool,
    area: f64,
    precip: f64,
    evap: f64,
    tstep: f64,
) -> Result<f64, ode::OdeError> {
    // 零面积子面积不产流
    if area == 0.0 {
        return Ok(0.0);
    }

    // 假定产流覆盖整个时间步，积分后可能缩短
    let mut t_runoff = tstep;

    // 地表可供蒸发的水量速率
    let mut surf_moisture = sa.depth / tstep;
    let surf_evap = surf_moisture.min(evap);

    // 入渗只发生在透水面，受地下水非饱和带容量钳制
    let mut infil = 0.0;
    if is_perv {
        infil = infil_state.infil_rate(tstep, precip, sa.inflow, sa.depth);
        if let Some(gw) = gw {
            infil = infil.min(gw.max_infil_vol / tstep);
        }
    }

    // 净降水并入子面积入流
    sa.inflow += precip;
    surf_moisture += sa.inflow;

    wb.v_inflow += precip * area * tstep;
    wb.v_evap += surf_evap * area * tstep;
    if is_perv {
        wb.v_pevap += surf_evap * area * tstep;
    }
    wb.v_infil += infil * area * tstep;

    if surf_evap + infil >= surf_moisture {
        // 损失吃光全部地表水
        sa.depth = 0.0;
    } else {
        // 入流扣除损失后积分积水深
        sa.inflow -= surf_evap + infil;
        update_ponded_depth(sa, &mut t_runoff)?;
    }

    let runoff = find_subarea_runoff(sa, t_runoff);

    // f_outlet 比例的径流离开子汇水区，其余在子面积间内部汇流
    wb.v_outflow += sa.f_outlet * runoff * area * tstep;
    Ok(runoff)
}

/// 按积分后的积水深计算产流率 [ft/s]
///
/// 曼宁 n 为零表示不做坡面汇流：洼蓄以上的水量在一步内排空。
fn find_subarea_runoff(sa: &mut Subarea, t_runoff: f64) -> f64 {
    let x_depth = sa.depth - sa.dstore;
    if x_depth <= dh_foundation::consts::ZERO {
        return 0.0;
    }
    if sa.n > 0.0 {
        sa.alpha * x_depth.powf(MEXP)
    } else {
        let runoff = x_depth / t_runoff;
        sa.depth = sa.dstore;
        runoff
    }
}

/// 积分积水深
///
/// 入流不足以填满洼蓄时线性累积；超过洼蓄后用自适应 RK 积分
/// 非线性水库方程。返回时 `dt` 改写为积水深高于洼蓄的时长。
fn update_ponded_depth(sa: &mut Subarea, dt: &mut f64) -> Result<(), ode::OdeError> {
    let ix = sa.inflow;
    let mut tx = *dt;

    if sa.depth + ix * tx <= sa.dstore {
        sa.depth += ix * tx;
    } else {
        // 先把洼蓄填满，扣掉对应时间
        let dx = sa.dstore - sa.depth;
        if dx > 0.0 && ix > 0.0 {
            tx -= dx / ix;
            sa.depth = sa.dstore;
        }

        // 剩余时间内积分
        if sa.alpha > 0.0 && tx > 0.0 {
            let alpha = sa.alpha;
            let dstore = sa.dstore;
            let mut depth = sa.depth;
            ode::integrate(&mut depth, 0.0, tx, ODETOL, tx, |_, d| {
                let rx = d - dstore;
                if rx <= 0.0 {
                    ix
                } else {
                    ix - alpha * rx.powf(MEXP)
                }
            })?;
            sa.depth = depth;
        } else {
            if tx < 0.0 {
                tx = 0.0;
            }
            sa.depth += ix * tx;
        }
    }

    if sa.depth < 0.0 {
        sa.depth = 0.0;
    }
    *dt = tx;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::couplers::InfilModel;

    fn subarea(n: f64, dstore: f64, alpha: f64) -> Subarea {
        Subarea {
            n,
            dstore,
            f_area: 1.0,
            alpha,
            depth: 0.0,
            inflow: 0.0,
            runoff: 0.0,
            route_to: RouteTo::Outlet,
            f_outlet: 1.0,
        }
    }

    #[test]
    fn test_runoff_zero_at_dstore() {
        // 积水深恰好等于洼蓄深时产流为零
        let mut sa = subarea(0.015, 0.05 / 12.0, 2.0);
        sa.depth = sa.dstore;
        assert_eq!(find_subarea_runoff(&mut sa, 60.0), 0.0);
    }

    #[test]
    fn test_runoff_n_zero_drains_in_one_step() {
        // 无汇流子面积：洼蓄以上水量一步排空
        let mut sa = subarea(0.0, 0.01, 0.0);
        sa.depth = 0.03;
        let runoff = find_subarea_runoff(&mut sa, 100.0);
        assert!((runoff - 0.02 / 100.0).abs() < 1e-15);
        assert!((sa.depth - 0.01).abs() < 1e-15);
    }

    #[test]
    fn test_ponded_depth_linear_below_dstore() {
        let mut sa = subarea(0.015, 0.05, 2.0);
        sa.inflow = 1.0e-4;
        let mut dt = 100.0;
        update_ponded_depth(&mut sa, &mut dt).unwrap();
        // 0.01 ft < dstore，线性累积，全程低于洼蓄
        assert!((sa.depth - 0.01).abs() < 1e-12);
        assert!((dt - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_ponded_depth_fills_dstore_then_integrates() {
        let mut sa = subarea(0.015, 0.01, 2.0);
        sa.inflow = 1.0e-3;
        let mut dt = 100.0;
        update_ponded_depth(&mut sa, &mut dt).unwrap();
        // 洼蓄 10 秒填满，剩余 90 秒积分
        assert!((dt - 90.0).abs() < 1e-9);
        assert!(sa.depth > sa.dstore);
        // 平衡深度 = dstore + (ix/alpha)^(3/5)
        let eq_depth = sa.dstore + (1.0e-3 / 2.0f64).powf(0.6);
        assert!(sa.depth <= eq_depth + 1e-9);
    }

    #[test]
    fn test_subarea_losses_consume_all_moisture() {
        let mut sa = subarea(0.015, 0.01, 2.0);
        sa.depth = 1.0e-6;
        let mut infil = InfilState::new(InfilModel::None);
        let mut wb = WaterBalance::default();
        // 蒸发远大于地表水量
        let r = get_subarea_runoff(
            &mut sa, &mut infil, None, &mut wb, false, 1000.0, 0.0, 1.0e-3, 60.0,
        )
        .unwrap();
        assert_eq!(r, 0.0);
        assert_eq!(sa.depth, 0.0);
    }

    #[test]
    fn test_subarea_steady_state_runoff_matches_rain() {
        // 恒定降雨下积分至平衡：产流率趋近降雨强度
        let alpha = 2.0;
        let rain = 0.5 / 43_200.0; // 0.5 in/hr
        let mut sa = subarea(0.015, 0.05 / 12.0, alpha);
        let mut infil = InfilState::new(InfilModel::None);
        let mut wb = WaterBalance::default();
        let mut last = 0.0;
        for _ in 0..120 {
            sa.inflow = 0.0;
            last = get_subarea_runoff(
                &mut sa, &mut infil, None, &mut wb, false, 43_560.0, rain, 0.0, 60.0,
            )
            .unwrap();
        }
        assert!(
            (last - rain).abs() / rain < 0.01,
            "平衡产流 {} 应接近降雨 {}",
            last,
            rain
        );
    }
}
