// crates/dh_physics/src/routing/kinwave.rs

//! 运动波管段演算
//!
//! 以管道为控制体的连续性方程与曼宁正常流出流关系联立：
//!
//! ```text
//! V' = V + (q_in − q_out(V'))·dt,   q_out = β·S(A),  A = V'/(L·B)
//! ```
//!
//! 用带阻尼的不动点迭代求解，出流封顶于满流流量。恒定入流下
//! 管内蓄量收敛，出流趋于入流。非管道管段原样传递。

use dh_foundation::consts::TINY;

use crate::project::Project;

/// 不动点迭代上限
const MAX_ITER: usize = 8;

/// 松弛因子
const RELAX: f64 = 0.5;

/// 迭代收敛容差 [ft³]
const VOLTOL: f64 = 0.001;

/// 对单个管段做运动波演算
///
/// 返回 (出流 [cfs], 迭代次数)。
pub fn execute(prj: &mut Project, j: usize, qin: &mut f64, tstep: f64) -> (f64, usize) {
    let link = &mut prj.links[j];
    let xsect = link.xsect.clone();
    let q_full = link.q_full;
    let loss = link.loss_rate(*qin, tstep);
    let v_old = link.old_volume;

    let Some(c) = link.conduit_mut() else {
        return (*qin, 1);
    };
    if xsect.is_dummy() {
        c.a1 = 0.0;
        c.a2 = 0.0;
        return (*qin, 1);
    }

    let barrels = c.barrels as f64;
    let length = c.length;
    let q_net = (*qin - loss).max(0.0);

    // 上一步管内蓄量（全部并联孔）
    let mut v = v_old;
    let mut q_out = 0.0;
    let mut iters = 0;

    for _ in 0..MAX_ITER {
        iters += 1;
        let a = v / (length * barrels).max(TINY);
        q_out = (c.beta * xsect.s_of_a(a.min(xsect.a_full())) * barrels).min(q_full * barrels);
        let v_next = (v_old + (q_net - q_out) * tstep).max(0.0);
        let v_new = (1.0 - RELAX) * v + RELAX * v_next;
        let done = (v_new - v).abs() <= VOLTOL;
        v = v_new;
        if done {
            break;
        }
    }

    // 蓄量收敛后回算一致的出流
    q_out = if tstep > 0.0 {
        (v_old - v) / tstep + q_net
    } else {
        q_out
    }
    .clamp(0.0, q_full * barrels);

    let a_new = (v / (length * barrels).max(TINY)).min(xsect.a_full());
    c.a1 = a_new;
    c.a2 = a_new;
    c.q1_old = c.q1;
    c.q2_old = c.q2;
    c.q1 = q_net / barrels;
    c.q2 = q_out / barrels;

    (q_out, iters)
}
