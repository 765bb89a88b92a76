// crates/dh_physics/src/routing/mod.rs

//! 管网流量演算引擎
//!
//! 恒定流与运动波模型按拓扑序遍历管段：上游调蓄节点先做欠松弛
//! Picard 迭代收敛容积，再取管段入流（受上游节点出流上限钳制）
//! 过管段求出流，累加到两端节点；全部管段演算完后统一更新节点
//! 与管段的新状态。动力波模型整体委托给外部求解器。
//!
//! 树状布局校验（恒定流/运动波前置）与一般布局校验（动力波
//! 前置）在打开阶段执行，错误写入项目粘性错误码。

pub mod dynwave;
pub mod kinwave;
pub mod steady;
pub mod toposort;

use dh_config::RoutingModel;
use dh_foundation::consts::{FUDGE, TINY};

use crate::error::{EngineError, EngineResult, ErrorCode};
use crate::objects::link::LinkKind;
use crate::objects::node::{Divider, DividerKind, NodeKind};
use crate::project::{interp_weight, Project};

use dynwave::{DynWaveSolver, NullDynWave};

/// 调蓄迭代欠松弛因子
const OMEGA: f64 = 0.55;

/// 调蓄迭代次数上限
const MAXITER: usize = 10;

/// 调蓄迭代水深收敛容差 [ft]
const STOPTOL: f64 = 0.005;

/// 流量演算引擎
pub struct FlowRouting {
    /// 拓扑序下的管段下标
    pub order: Vec<usize>,
    model: RoutingModel,
    dynwave: Box<dyn DynWaveSolver>,
}

impl FlowRouting {
    /// 打开演算引擎：布局校验、状态初始化、拓扑排序
    ///
    /// `hotstart_loaded` 为真时跳过动力波的初始水深估计（热启动
    /// 已提供）。
    pub fn open(
        prj: &mut Project,
        dynwave_solver: Option<Box<dyn DynWaveSolver>>,
        hotstart_loaded: bool,
    ) -> EngineResult<Self> {
        let model = prj.routing_model;
        let mut dynwave = dynwave_solver.unwrap_or_else(|| Box::new(NullDynWave));

        if model == RoutingModel::DynamicWave {
            validate_general_layout(prj);
            dynwave.init(prj)?;
            if !hotstart_loaded {
                init_node_depths(prj);
                init_link_depths(prj);
            }
        } else {
            validate_tree_layout(prj);
        }
        if let Some(code) = prj.error_code {
            return Err(EngineError::new(code, "管网布局校验失败"));
        }

        init_nodes(prj);
        init_links(prj, model);
        let order = toposort::toposort_links(prj);
        Ok(Self {
            order,
            model,
            dynwave,
        })
    }

    /// 关闭演算引擎
    pub fn close(&mut self, prj: &mut Project) {
        if self.model == RoutingModel::DynamicWave {
            self.dynwave.close(prj);
        }
    }

    /// 本步演算步长 [s]（动力波为变步长）
    pub fn routing_step(&mut self, prj: &Project, fixed_step: f64) -> f64 {
        if self.model == RoutingModel::DynamicWave {
            self.dynwave.routing_step(prj, fixed_step)
        } else {
            fixed_step
        }
    }

    /// 推进一个演算步（外层编排）
    ///
    /// 推进演算时钟，翻转双缓冲状态，把子汇水区径流按时刻权重
    /// 摊为节点旁侧入流，执行管段遍历，最后结算排放口出流与
    /// 溢流。返回内部计算步数。
    pub fn step(&mut self, prj: &mut Project, tstep: f64) -> i32 {
        if prj.has_error() {
            return 0;
        }
        prj.clock.old_routing_time = prj.clock.new_routing_time;
        prj.clock.new_routing_time += tstep * 1000.0;

        for node in &mut prj.nodes {
            node.set_old_state();
        }
        for link in &mut prj.links {
            link.set_old_state();
        }
        prj.massbal.flow.step = Default::default();

        add_wet_weather_inflows(prj, tstep);

        for node in &mut prj.nodes {
            node.inflow += node.new_lat_flow;
            node.outflow += node.losses;
        }

        let steps = self.execute(prj, tstep);
        remove_outflows(prj, tstep);
        steps
    }

    /// 按当前模型演算全部管段（内层遍历）
    pub fn execute(&mut self, prj: &mut Project, tstep: f64) -> i32 {
        if prj.has_error() {
            return 0;
        }

        // 非调蓄节点上一步残留的超容水量先按溢流排出
        for node in &mut prj.nodes {
            node.updated = false;
            node.overflow = 0.0;
            if !node.is_storage() && node.new_volume > node.full_volume {
                node.overflow = (node.new_volume - node.full_volume) / tstep;
            }
        }

        if self.model == RoutingModel::DynamicWave {
            return match self.dynwave.execute(prj, tstep) {
                Ok(steps) => steps as i32,
                Err(err) => {
                    prj.set_error(ErrorCode::Timestep, &err.to_string());
                    0
                }
            };
        }

        let mut steps = 0.0;
        for pos in 0..self.order.len() {
            let j = self.order[pos];

            // 上游调蓄节点本步尚未收敛时先做容积迭代
            let n1 = prj.links[j].node1;
            if prj.nodes[n1].is_storage() {
                update_storage_state(prj, n1, pos, &self.order, tstep);
            }

            let mut qin = get_link_inflow(prj, j, tstep);
            let qout = match self.model {
                RoutingModel::Steady => {
                    steps += 1.0;
                    steady::execute(prj, j, &mut qin, tstep)
                }
                _ => {
                    let (q, iters) = kinwave::execute(prj, j, &mut qin, tstep);
                    steps += iters as f64;
                    q
                }
            };
            prj.links[j].new_flow = qout;

            let (n1, n2) = (prj.links[j].node1, prj.links[j].node2);
            prj.nodes[n1].outflow += qin;
            prj.nodes[n2].inflow += qout;
        }
        if !prj.links.is_empty() {
            steps /= prj.links.len() as f64;
        }

        for j in 0..prj.nodes.len() {
            set_new_node_state(prj, j, tstep, &self.order);
        }
        for j in 0..prj.links.len() {
            set_new_link_state(prj, j);
        }
        (steps + 0.5) as i32
    }
}

// ============================================================
// 布局校验
// ============================================================

/// 树状布局校验（恒定流 / 运动波前置）
fn validate_tree_layout(prj: &mut Project) {
    let mut outfall_count = 0;
    for i in 0..prj.nodes.len() {
        let degree = prj.nodes[i].degree;
        let name = prj.nodes[i].name.clone();
        match prj.nodes[i].kind {
            // 分流器最多两条出流管段
            NodeKind::Divider(_) => {
                if degree > 2 {
                    prj.set_error(ErrorCode::Divider, &name);
                }
            }
            // 排放口不允许有出流管段
            NodeKind::Outfall(_) => {
                if degree > 0 {
                    prj.set_error(ErrorCode::Outfall, &name);
                }
                outfall_count += 1;
            }
            // 调蓄节点可多出流
            NodeKind::Storage(_) => {}
            // 其余节点只允许一条出流管段
            NodeKind::Junction => {
                if degree > 1 {
                    prj.set_error(ErrorCode::MultiOutlet, &name);
                }
            }
        }
    }
    if outfall_count == 0 {
        prj.set_error(ErrorCode::NoOutlets, "管网没有排放口");
    }

    for j in 0..prj.links.len() {
        let name = prj.links[j].name.clone();
        // 非虚拟断面的管道不允许逆坡
        let adverse_conduit =
            matches!(&prj.links[j].kind, LinkKind::Conduit(c) if c.slope < 0.0)
                && !prj.links[j].xsect.is_dummy();
        if adverse_conduit {
            prj.set_error(ErrorCode::Slope, &name);
        } else if prj.links[j].kind.is_regulator()
            && !prj.nodes[prj.links[j].node1].is_storage()
        {
            // 调节类管段必须从调蓄节点引出
            prj.set_error(ErrorCode::Regulator, &name);
        }
    }
}

/// 一般布局校验（动力波前置）
fn validate_general_layout(prj: &mut Project) {
    let mut outfall_count = 0;
    // 借节点 inflow 字段临时统计入流连接数
    for node in &mut prj.nodes {
        node.inflow = 0.0;
    }
    for j in 0..prj.links.len() {
        let link = &prj.links[j];
        let i = if prj.nodes[link.node1].is_outfall() {
            link.node1
        } else {
            link.node2
        };
        prj.nodes[i].inflow += 1.0;

        // 虚拟管段与理想泵必须是其上游节点唯一的出流管段
        let is_dummy_like = matches!(&link.kind, LinkKind::Conduit(_) if link.xsect.is_dummy())
            || matches!(link.kind, LinkKind::Pump);
        if is_dummy_like {
            let up = if link.direction >= 0 {
                link.node1
            } else {
                link.node2
            };
            if prj.nodes[up].degree > 1 {
                let name = prj.nodes[up].name.clone();
                prj.set_error(ErrorCode::DummyLink, &name);
            }
        }
    }
    for i in 0..prj.nodes.len() {
        if prj.nodes[i].is_outfall() {
            if prj.nodes[i].degree + prj.nodes[i].inflow as i32 > 1 {
                let name = prj.nodes[i].name.clone();
                prj.set_error(ErrorCode::Outfall, &name);
            } else {
                outfall_count += 1;
            }
        }
    }
    if outfall_count == 0 {
        prj.set_error(ErrorCode::NoOutlets, "管网没有排放口");
    }
    // 无入流连接的节点把度数取负作标记，临时统计量归零
    for node in &mut prj.nodes {
        if node.inflow == 0.0 {
            node.degree = -node.degree;
        }
        node.inflow = 0.0;
    }
}

// ============================================================
// 初始化
// ============================================================

/// 动力波无热启动时的初始节点水深：取连接管段水深均值
fn init_node_depths(prj: &mut Project) {
    // 借 inflow/outflow 字段临时累加水深与连接数
    for node in &mut prj.nodes {
        node.inflow = 0.0;
        node.outflow = 0.0;
    }
    for j in 0..prj.links.len() {
        let y = if prj.links[j].new_depth > FUDGE {
            prj.links[j].new_depth + prj.links[j].offset1
        } else {
            0.0
        };
        let (n1, n2) = (prj.links[j].node1, prj.links[j].node2);
        prj.nodes[n1].inflow += y;
        prj.nodes[n1].outflow += 1.0;
        prj.nodes[n2].inflow += y;
        prj.nodes[n2].outflow += 1.0;
    }
    for node in &mut prj.nodes {
        if node.is_outfall() || node.is_storage() || node.init_depth > 0.0 {
            continue;
        }
        if node.outflow > 0.0 {
            node.new_depth = node.inflow / node.outflow;
        }
    }
    for node in &mut prj.nodes {
        node.inflow = 0.0;
        node.outflow = 0.0;
    }
}

/// 动力波无热启动时的初始管道水深：两端节点水深均值
fn init_link_depths(prj: &mut Project) {
    for j in 0..prj.links.len() {
        if !prj.links[j].is_conduit() {
            continue;
        }
        // 有初始流量的管道已按正常水深设好
        if prj.links[j].new_flow != 0.0 {
            continue;
        }
        let y_full = prj.links[j].xsect.y_full();
        let y1 = (prj.nodes[prj.links[j].node1].new_depth - prj.links[j].offset1)
            .clamp(0.0, y_full);
        let y2 = (prj.nodes[prj.links[j].node2].new_depth - prj.links[j].offset2)
            .clamp(0.0, y_full);
        prj.links[j].new_depth = (0.5 * (y1 + y2)).max(FUDGE);
    }
}

/// 初始化节点容积与入流出流累加器
fn init_nodes(prj: &mut Project) {
    let allow_ponding = prj.allow_ponding;
    for node in &mut prj.nodes {
        node.inflow = node.new_lat_flow;
        node.outflow = 0.0;

        // 初始容积：积水时超满深部分摊在积水面积上
        if allow_ponding && node.ponded_area > 0.0 && node.new_depth > node.full_depth {
            node.new_volume = node.full_volume
                + (node.new_depth - node.full_depth) * node.ponded_area;
        } else {
            node.new_volume = node.volume_from_depth(node.new_depth);
        }
        node.old_volume = node.new_volume;
    }

    // 初始管段流量计入两端节点（恒定流/运动波需要）
    for j in 0..prj.links.len() {
        let q = prj.links[j].new_flow;
        let (n1, n2) = (prj.links[j].node1, prj.links[j].node2);
        if q >= 0.0 {
            prj.nodes[n1].outflow += q;
            prj.nodes[n2].inflow += q;
        } else {
            prj.nodes[n1].inflow -= q;
            prj.nodes[n2].outflow -= q;
        }
    }
}

/// 初始化管段流量与管道过水面积
fn init_links(prj: &mut Project, model: RoutingModel) {
    for j in 0..prj.links.len() {
        if model == RoutingModel::Steady {
            prj.links[j].new_flow = 0.0;
        } else if prj.links[j].is_conduit() {
            let q = prj.links[j].new_flow;
            let depth = prj.links[j].new_depth;
            let xsect = prj.links[j].xsect.clone();
            let length = prj.links[j].length();
            let c = prj.links[j].conduit_mut().unwrap();
            let barrels = c.barrels as f64;
            c.q1 = q / barrels;
            c.q2 = c.q1;
            // 过水面积优先取初始水深，否则由初始流量反演
            c.a1 = if depth > 0.0 {
                xsect.a_of_y(depth)
            } else if q != 0.0 && c.beta > TINY {
                xsect.a_of_s(q.abs() / barrels / c.beta)
            } else {
                0.0
            };
            c.a2 = c.a1;
            prj.links[j].new_volume = prj.links[j].conduit().unwrap().a1 * length * barrels;
            prj.links[j].old_volume = prj.links[j].new_volume;
        }
    }
}

// ============================================================
// 管段入流
// ============================================================

/// 管段入流 [cfs]，受上游节点出流上限钳制
fn get_link_inflow(prj: &Project, j: usize, dt: f64) -> f64 {
    let link = &prj.links[j];
    let n1 = &prj.nodes[link.node1];
    let q = if link.is_conduit() || matches!(link.kind, LinkKind::Pump) || n1.is_storage() {
        node_outflow(prj, link.node1, j)
    } else {
        0.0
    };
    n1.max_outflow(q, dt)
}

/// 节点分配给某条出流管段的流量
fn node_outflow(prj: &Project, i: usize, j: usize) -> f64 {
    match &prj.nodes[i].kind {
        NodeKind::Divider(d) => divider_outflow(prj, i, j, d),
        NodeKind::Storage(_) => storage_outflow(prj, i, j),
        _ => prj.nodes[i].inflow,
    }
}

/// 调蓄节点经由管段的出流：按当前水深的额定曲线
fn storage_outflow(prj: &Project, i: usize, j: usize) -> f64 {
    let link = &prj.links[j];
    // 理想泵照单全收
    if matches!(link.kind, LinkKind::Pump) {
        return prj.nodes[i].inflow;
    }
    let head = prj.nodes[i].new_depth - link.offset1;
    link.rated_outflow(head)
}

/// 分流器的流量拆分
fn divider_outflow(prj: &Project, i: usize, j: usize, d: &Divider) -> f64 {
    let q_in = prj.nodes[i].inflow;
    let q_div = match d.kind {
        // 截流量以上的部分被分走
        DividerKind::Cutoff => (q_in - d.q_min).max(0.0),
        // 非分流管段满流能力以上的部分被分走
        DividerKind::Overflow => {
            let cap = prj
                .links
                .iter()
                .enumerate()
                .filter(|&(k, l)| k != d.link && l.node1 == i)
                .map(|(_, l)| l.q_full)
                .fold(0.0, f64::max);
            let cap = if cap > 0.0 { cap } else { d.q_min };
            (q_in - cap).max(0.0)
        }
    };
    if j == d.link {
        q_div
    } else {
        (q_in - q_div).max(0.0)
    }
}

// ============================================================
// 调蓄节点迭代
// ============================================================

/// 调蓄节点容积的欠松弛 Picard 迭代
///
/// 梯形流量平衡 `V' = V + ½(旧净入流 + 新净入流)·dt −
/// ½·出流(V')·dt`，出流依赖水深故迭代求解；水深变化小于
/// `STOPTOL` 或达到迭代上限时停止。
fn update_storage_state(prj: &mut Project, i: usize, pos: usize, order: &[usize], dt: f64) {
    if !prj.nodes[i].is_storage() || prj.nodes[i].updated {
        return;
    }

    // 与末态水深无关的固定项
    let v_fixed = prj.nodes[i].old_volume
        + 0.5
            * (prj.nodes[i].old_net_inflow + prj.nodes[i].inflow - prj.nodes[i].outflow)
            * dt;
    let mut d1 = prj.nodes[i].new_depth;
    let allow_ponding = prj.allow_ponding;

    let mut iter = 1;
    let mut stopped = false;
    while iter < MAXITER && !stopped {
        let mut v2 = v_fixed - 0.5 * get_storage_outflow(prj, i, pos, order, dt) * dt;
        v2 = v2.max(0.0);

        // 超满容积：溢流速率相对旧容积与满容积的较大者
        prj.nodes[i].overflow = 0.0;
        if v2 > prj.nodes[i].full_volume {
            let overflow =
                (v2 - prj.nodes[i].old_volume.max(prj.nodes[i].full_volume)) / dt;
            prj.nodes[i].overflow = if overflow < FUDGE { 0.0 } else { overflow };
            if !allow_ponding || prj.nodes[i].ponded_area == 0.0 {
                v2 = prj.nodes[i].full_volume;
            }
        }

        prj.nodes[i].new_volume = v2;
        let mut d2 = prj.nodes[i].depth_from_volume(v2, allow_ponding);
        prj.nodes[i].new_depth = d2;

        // 欠松弛推进水深估计
        d2 = (1.0 - OMEGA) * d1 + OMEGA * d2;
        if (d2 - d1).abs() <= STOPTOL {
            stopped = true;
        }
        prj.nodes[i].new_depth = d2;
        d1 = d2;
        iter += 1;
    }
    if !stopped {
        log::debug!(
            "调蓄节点 {} 迭代 {} 次未收敛，沿用最后一次迭代值",
            prj.nodes[i].name,
            MAXITER
        );
    }

    // 水力停留时间记账（随热启动文件持久化）
    let q_out = get_storage_outflow(prj, i, pos, order, dt);
    let volume = prj.nodes[i].new_volume;
    if let NodeKind::Storage(s) = &mut prj.nodes[i].kind {
        if q_out > TINY {
            s.hrt = volume / q_out;
        }
    }
    prj.nodes[i].updated = true;
}

/// 调蓄节点全部出流管段的流量之和
///
/// 拓扑序中同一节点的出流管段连续，从当前位置向后扫描即可。
fn get_storage_outflow(prj: &Project, i: usize, pos: usize, order: &[usize], dt: f64) -> f64 {
    let mut outflow = 0.0;
    for &m in &order[pos..] {
        if prj.links[m].node1 != i {
            break;
        }
        outflow += get_link_inflow(prj, m, dt);
    }
    outflow
}

// ============================================================
// 步末状态更新
// ============================================================

/// 节点步末状态：梯形积分容积、溢流结算、容积反求水深
fn set_new_node_state(prj: &mut Project, j: usize, dt: f64, order: &[usize]) {
    // 末端调蓄节点（无出流管段）走空下游列表的迭代路径
    if prj.nodes[j].is_storage() {
        if !prj.nodes[j].updated {
            update_storage_state(prj, j, order.len(), order, dt);
        }
        return;
    }

    // 排放口不蓄水：到达流量全部离开系统，水深随后由连接管道抬升
    if prj.nodes[j].is_outfall() {
        let node = &mut prj.nodes[j];
        node.new_volume = 0.0;
        node.new_depth = 0.0;
        node.overflow = 0.0;
        return;
    }

    let allow_ponding = prj.allow_ponding;
    let node = &mut prj.nodes[j];

    let new_net_inflow = node.inflow - node.outflow - node.losses;
    node.new_volume = node.old_volume + 0.5 * (node.old_net_inflow + new_net_inflow) * dt;
    if node.new_volume < FUDGE {
        node.new_volume = 0.0;
    }

    // 溢流累加在步首排水通道算出的值之上
    let can_pond = allow_ponding && node.ponded_area > 0.0;
    if node.new_volume > node.full_volume {
        let mut growth = (node.new_volume - node.old_volume.max(node.full_volume)) / dt;
        if growth < FUDGE {
            growth = 0.0;
        }
        node.overflow += growth;
        if !can_pond {
            node.new_volume = node.full_volume;
        }
    }

    // 上游节点水深随后在 set_new_link_state 中按管道水深抬升
    node.new_depth = node.depth_from_volume(node.new_volume, allow_ponding);
}

/// 管段步末状态：由两端过水面积定水深与容积，回抬端点水深
fn set_new_link_state(prj: &mut Project, j: usize) {
    prj.links[j].new_depth = 0.0;
    prj.links[j].new_volume = 0.0;

    if !prj.links[j].is_conduit() {
        return;
    }
    let xsect = prj.links[j].xsect.clone();
    let length = prj.links[j].length();
    let (n1, n2) = (prj.links[j].node1, prj.links[j].node2);
    let (offset1, offset2) = (prj.links[j].offset1, prj.links[j].offset2);

    let c = prj.links[j].conduit().unwrap();
    let (a1, a2, barrels) = (c.a1, c.a2, c.barrels as f64);

    let a = 0.5 * (a1 + a2);
    prj.links[j].new_volume = a * length * barrels;
    let y1 = xsect.y_of_a(a1);
    let y2 = xsect.y_of_a(a2);
    prj.links[j].new_depth = 0.5 * (y1 + y2);

    update_node_depth(prj, n1, y1 + offset1);
    update_node_depth(prj, n2, y2 + offset2);

    let c = prj.links[j].conduit_mut().unwrap();
    if a1 >= xsect.a_full() {
        c.capacity_limited = true;
        c.full_state = crate::objects::link::FullState::AllFull;
    } else {
        c.capacity_limited = false;
        c.full_state = crate::objects::link::FullState::None;
    }
}

/// 节点水深只升不降地同步到连接管道的水深
fn update_node_depth(prj: &mut Project, i: usize, y: f64) {
    // 调蓄节点水深已在迭代中确定
    if prj.nodes[i].is_storage() {
        return;
    }
    let node = &mut prj.nodes[i];
    let mut y = y;

    // 溢流中的非排放口节点定在满深
    if !node.is_outfall() && node.overflow > 0.0 {
        y = node.full_depth;
    }

    if node.new_depth < y {
        node.new_depth = y;
        if node.full_depth > 0.0 && y > node.full_depth {
            node.new_depth = node.full_depth;
        }
    }
}

// ============================================================
// 外层编排辅助
// ============================================================

/// 子汇水区径流按演算时刻权重摊为节点旁侧入流
fn add_wet_weather_inflows(prj: &mut Project, tstep: f64) {
    let f = interp_weight(
        prj.clock.new_routing_time,
        prj.clock.old_runoff_time,
        prj.clock.new_runoff_time,
    );
    for j in 0..prj.subcatchments.len() {
        let Some(n) = prj.subcatchments[j].out_node else {
            continue;
        };
        let q = prj.subcatchments[j].wtd_outflow(f);
        if q == 0.0 {
            continue;
        }
        prj.nodes[n].new_lat_flow += q;
        prj.massbal.flow.wet_inflow += q * tstep;
    }
}

/// 结算排放口出流与系统溢流
///
/// 排放口收到的流量按体积计入出流总量；指回子汇水区的排放口
/// 把体积与污染物负荷累入 `v_routed`/`w_routed`，待下一产流步
/// 回灌。
fn remove_outflows(prj: &mut Project, tstep: f64) {
    let n_pollut = if prj.ignore_quality {
        0
    } else {
        prj.pollutants.len()
    };
    for i in 0..prj.nodes.len() {
        // 溢流计入内涝，节点损失计入损失总量
        let overflow = prj.nodes[i].overflow;
        if overflow > 0.0 {
            prj.massbal.flow.step.flooding += overflow;
            prj.massbal.flow.flooding += overflow * tstep;
        }
        prj.massbal.flow.losses += prj.nodes[i].losses * tstep;

        if !prj.nodes[i].is_outfall() {
            continue;
        }
        let q = prj.nodes[i].inflow;
        let v = q * tstep;
        prj.massbal.flow.outflow += v;
        prj.massbal.flow.step.outflow += q;

        let qual: Vec<f64> = prj.nodes[i].new_qual[..n_pollut].to_vec();
        if let NodeKind::Outfall(outfall) = &mut prj.nodes[i].kind {
            if outfall.route_to.is_some() {
                outfall.v_routed += v;
                for (p, &c) in qual.iter().enumerate() {
                    outfall.w_routed[p] += c * v;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dh_config::ProjectConfig;

    fn project(json: serde_json::Value) -> Project {
        Project::from_config(&ProjectConfig::from_json(&json.to_string()).unwrap()).unwrap()
    }

    fn options() -> serde_json::Value {
        serde_json::json!({
            "start_date": "2023-06-01T00:00:00",
            "end_date": "2023-06-01T06:00:00"
        })
    }

    #[test]
    fn test_tree_validation_rejects_multi_outlet_junction() {
        let mut prj = project(serde_json::json!({
            "options": options(),
            "nodes": [
                {"name": "J1", "type": "junction", "invert_elev": 110.0, "max_depth": 4.0},
                {"name": "O1", "type": "outfall", "invert_elev": 100.0},
                {"name": "O2", "type": "outfall", "invert_elev": 100.0}
            ],
            "links": [
                {"name": "C1", "from": "J1", "to": "O1", "type": "conduit",
                 "length": 400.0, "roughness": 0.013,
                 "xsect": {"shape": "circular", "diameter": 1.0}},
                {"name": "C2", "from": "J1", "to": "O2", "type": "conduit",
                 "length": 400.0, "roughness": 0.013,
                 "xsect": {"shape": "circular", "diameter": 1.0}}
            ]
        }));
        validate_tree_layout(&mut prj);
        assert_eq!(prj.error_code, Some(ErrorCode::MultiOutlet));
    }

    #[test]
    fn test_tree_validation_rejects_adverse_slope() {
        let mut prj = project(serde_json::json!({
            "options": options(),
            "nodes": [
                {"name": "J1", "type": "junction", "invert_elev": 100.0, "max_depth": 4.0},
                {"name": "O1", "type": "outfall", "invert_elev": 110.0}
            ],
            "links": [
                {"name": "C1", "from": "J1", "to": "O1", "type": "conduit",
                 "length": 400.0, "roughness": 0.013,
                 "xsect": {"shape": "circular", "diameter": 1.0}}
            ]
        }));
        validate_tree_layout(&mut prj);
        assert_eq!(prj.error_code, Some(ErrorCode::Slope));
    }

    #[test]
    fn test_tree_validation_rejects_regulator_from_junction() {
        let mut prj = project(serde_json::json!({
            "options": options(),
            "nodes": [
                {"name": "J1", "type": "junction", "invert_elev": 110.0, "max_depth": 4.0},
                {"name": "O1", "type": "outfall", "invert_elev": 100.0}
            ],
            "links": [
                {"name": "W1", "from": "J1", "to": "O1", "type": "weir", "coeff": 3.0}
            ]
        }));
        validate_tree_layout(&mut prj);
        assert_eq!(prj.error_code, Some(ErrorCode::Regulator));
    }

    #[test]
    fn test_tree_validation_requires_outfall() {
        let mut prj = project(serde_json::json!({
            "options": options(),
            "nodes": [
                {"name": "J1", "type": "junction", "invert_elev": 110.0, "max_depth": 4.0}
            ]
        }));
        validate_tree_layout(&mut prj);
        assert_eq!(prj.error_code, Some(ErrorCode::NoOutlets));
    }

    #[test]
    fn test_overflow_case_without_ponding() {
        // 检查井超容 1.2 倍：下一步溢流 0.2·V_full/dt，容积钳回满值
        let mut prj = project(serde_json::json!({
            "options": options(),
            "nodes": [
                {"name": "J1", "type": "junction", "invert_elev": 110.0,
                 "max_depth": 4.0, "area": 100.0},
                {"name": "O1", "type": "outfall", "invert_elev": 100.0}
            ],
            "links": [
                {"name": "C1", "from": "J1", "to": "O1", "type": "conduit",
                 "length": 400.0, "roughness": 0.013,
                 "xsect": {"shape": "circular", "diameter": 1.0}}
            ]
        }));
        let mut routing = FlowRouting::open(&mut prj, None, false).unwrap();
        let full = prj.nodes[0].full_volume;
        prj.nodes[0].new_volume = 1.2 * full;
        prj.nodes[0].old_volume = 1.2 * full;
        let dt = 20.0;
        routing.execute(&mut prj, dt);
        assert!(
            (prj.nodes[0].overflow - 0.2 * full / dt).abs() < 1e-6,
            "溢流 = {}",
            prj.nodes[0].overflow
        );
    }

    #[test]
    fn test_storage_picard_converges_linear_curve() {
        // 恒定入流 10 cfs，出流 Q = 2·d，面积恒定 500 ft²
        let mut prj = project(serde_json::json!({
            "options": options(),
            "nodes": [
                {"name": "T1", "type": "storage", "invert_elev": 100.0, "max_depth": 20.0,
                 "curve": {"functional": {"coeff": 0.0, "exponent": 0.0, "constant": 500.0}}},
                {"name": "O1", "type": "outfall", "invert_elev": 90.0}
            ],
            "links": [
                {"name": "R1", "from": "T1", "to": "O1", "type": "outlet",
                 "coeff": 2.0, "exponent": 1.0}
            ]
        }));
        let mut routing = FlowRouting::open(&mut prj, None, false).unwrap();
        let dt = 60.0;
        prj.nodes[0].new_lat_flow = 10.0;
        prj.nodes[0].inflow = 10.0;
        // 恒定入流：上一步净入流同为 10 cfs
        prj.nodes[0].old_net_inflow = 10.0;
        routing.execute(&mut prj, dt);

        let d1 = prj.nodes[0].new_depth;
        let v1 = prj.nodes[0].new_volume;
        // 解析解：V1 = V0 + (Q − ½·k·(d0+d1))·Δt
        let v_analytic = (10.0 - 0.5 * 2.0 * d1) * dt;
        assert!(
            (v1 - v_analytic).abs() <= STOPTOL * 500.0,
            "V1 = {} 解析 = {}",
            v1,
            v_analytic
        );
        assert!(d1 > 0.0);
    }

    #[test]
    fn test_terminal_storage_updated() {
        // 无出流管段的调蓄节点仍然走末端更新路径
        let mut prj = project(serde_json::json!({
            "options": options(),
            "nodes": [
                {"name": "T1", "type": "storage", "invert_elev": 100.0, "max_depth": 20.0,
                 "curve": {"functional": {"coeff": 0.0, "exponent": 0.0, "constant": 500.0}}},
                {"name": "O1", "type": "outfall", "invert_elev": 90.0}
            ]
        }));
        let mut routing = FlowRouting::open(&mut prj, None, false).unwrap();
        prj.nodes[0].inflow = 5.0;
        routing.execute(&mut prj, 60.0);
        assert!(prj.nodes[0].updated);
        // 入流全部滞蓄
        assert!(prj.nodes[0].new_volume > 0.0);
    }

    #[test]
    fn test_steady_chain_propagates_flow() {
        let mut prj = project(serde_json::json!({
            "options": {
                "start_date": "2023-06-01T00:00:00",
                "end_date": "2023-06-01T06:00:00",
                "routing_model": "steady"
            },
            "nodes": [
                {"name": "J1", "type": "junction", "invert_elev": 110.0, "max_depth": 4.0},
                {"name": "J2", "type": "junction", "invert_elev": 105.0, "max_depth": 4.0},
                {"name": "O1", "type": "outfall", "invert_elev": 100.0}
            ],
            "links": [
                {"name": "C1", "from": "J1", "to": "J2", "type": "conduit",
                 "length": 400.0, "roughness": 0.013,
                 "xsect": {"shape": "circular", "diameter": 1.5}},
                {"name": "C2", "from": "J2", "to": "O1", "type": "conduit",
                 "length": 400.0, "roughness": 0.013,
                 "xsect": {"shape": "circular", "diameter": 1.5}}
            ]
        }));
        let mut routing = FlowRouting::open(&mut prj, None, false).unwrap();
        prj.nodes[0].new_lat_flow = 2.0;
        prj.nodes[0].inflow = 2.0;
        routing.execute(&mut prj, 20.0);
        // 恒定流瞬时传播到排放口
        assert!((prj.links[0].new_flow - 2.0).abs() < 1e-9);
        assert!((prj.links[1].new_flow - 2.0).abs() < 1e-9);
        assert!((prj.nodes[2].inflow - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_step_routes_runoff_to_outfall_volume() {
        let mut prj = project(serde_json::json!({
            "options": {
                "start_date": "2023-06-01T00:00:00",
                "end_date": "2023-06-01T06:00:00",
                "routing_model": "steady"
            },
            "gages": [
                {"name": "G1", "series": [[0.0, 0.5]], "interval": 6.0}
            ],
            "subcatchments": [
                {
                    "name": "S1", "gage": "G1",
                    "outlet": {"node": "J1"},
                    "area": 1.0, "pct_imperv": 100.0,
                    "width": 100.0, "slope": 1.0,
                    "dstore_imperv": 0.05, "pct_zero": 0.0
                }
            ],
            "nodes": [
                {"name": "J1", "type": "junction", "invert_elev": 110.0, "max_depth": 4.0},
                {"name": "O1", "type": "outfall", "invert_elev": 100.0,
                 "route_to": "S1"}
            ],
            "links": [
                {"name": "C1", "from": "J1", "to": "O1", "type": "conduit",
                 "length": 400.0, "roughness": 0.013,
                 "xsect": {"shape": "circular", "diameter": 1.5}}
            ]
        }));
        let mut routing = FlowRouting::open(&mut prj, None, false).unwrap();
        // 伪造一个产流状态：子汇水区径流 1 cfs
        prj.subcatchments[0].old_runoff = 1.0;
        prj.subcatchments[0].new_runoff = 1.0;
        prj.clock.new_runoff_time = 60_000.0;
        routing.step(&mut prj, 20.0);
        // 排放口体积累入 v_routed 等待回灌
        if let NodeKind::Outfall(out) = &prj.nodes[1].kind {
            assert!((out.v_routed - 20.0).abs() < 1e-6, "v_routed = {}", out.v_routed);
        } else {
            panic!("应为排放口");
        }
        assert!(prj.massbal.flow.outflow > 0.0);
    }
}
