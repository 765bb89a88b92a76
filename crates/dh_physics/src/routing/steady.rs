// crates/dh_physics/src/routing/steady.rs

//! 恒定流管段演算
//!
//! 入流瞬时传播到出口：管道先扣除蒸发渗漏损失，流量封顶于满流
//! 流量（封顶时过水面积取满断面），否则由 q = β·S(A) 反演面积。
//! 非管道管段原样传递。

use crate::project::Project;

/// 对单个管段做恒定流演算
///
/// `qin` 可能被满流能力回调；返回管段出流 [cfs]。
pub fn execute(prj: &mut Project, j: usize, qin: &mut f64, tstep: f64) -> f64 {
    let link = &mut prj.links[j];
    let xsect = link.xsect.clone();
    let q_full = link.q_full;
    let loss = link.loss_rate(*qin, tstep);

    let Some(c) = link.conduit_mut() else {
        return *qin;
    };

    let barrels = c.barrels as f64;
    let mut q = *qin / barrels;

    if xsect.is_dummy() {
        c.a1 = 0.0;
    } else {
        // 扣除蒸发与渗漏损失
        q -= loss / barrels;
        if q < 0.0 {
            q = 0.0;
        }

        if q > q_full {
            // 满流封顶，超量退回上游
            q = q_full;
            c.a1 = xsect.a_full();
            *qin = q * barrels;
        } else {
            // 由流量反演过水面积
            let s = if c.beta > 0.0 { q / c.beta } else { 0.0 };
            c.a1 = xsect.a_of_s(s);
        }
    }
    c.a2 = c.a1;
    c.q1_old = c.q1;
    c.q2_old = c.q2;
    c.q1 = q;
    c.q2 = q;
    q * barrels
}
