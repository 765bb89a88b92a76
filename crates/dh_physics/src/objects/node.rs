// crates/dh_physics/src/objects/node.rs

//! 管网节点
//!
//! 节点分四类：检查井、排放口、分流器、调蓄节点，以带载荷的
//! 枚举表达。非调蓄节点的容积-水深换算按满深线性内插；调蓄
//! 节点由调蓄曲线（函数型或表格型）决定。
//!
//! 状态字段采用 old/new 双缓冲：每步开始 `set_old_state` 将
//! new 拷入 old 并清零累加器，步内只写 new。

use dh_foundation::consts::TINY;
use dh_foundation::units::{Quantity, Units};

/// 结果向量中的节点变量下标
pub mod result_index {
    /// 水深
    pub const DEPTH: usize = 0;
    /// 水头（水深 + 井底高程）
    pub const HEAD: usize = 1;
    /// 蓄水容积
    pub const VOLUME: usize = 2;
    /// 旁侧入流
    pub const LATFLOW: usize = 3;
    /// 总入流
    pub const INFLOW: usize = 4;
    /// 溢流
    pub const OVERFLOW: usize = 5;
    /// 首个污染物浓度
    pub const QUAL: usize = 6;
}

/// 分流器子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DividerKind {
    /// 截流量以上的部分被分走
    Cutoff,
    /// 非分流管段满流以上的部分被分走
    Overflow,
}

/// 调蓄曲线：水深 → 表面积
#[derive(Debug, Clone)]
pub enum StorageCurve {
    /// 函数型 A = a·dᵇ + c
    Functional {
        /// 系数 a
        coeff: f64,
        /// 指数 b
        exponent: f64,
        /// 常数 c
        constant: f64,
    },
    /// 表格型（水深，表面积），按段线性
    Tabular {
        /// 曲线点，水深升序
        points: Vec<(f64, f64)>,
    },
}

impl StorageCurve {
    /// 水深处的表面积 [ft²]
    pub fn area(&self, depth: f64) -> f64 {
        let d = depth.max(0.0);
        match self {
            StorageCurve::Functional {
                coeff,
                exponent,
                constant,
            } => {
                let mut a = *constant;
                if *coeff > 0.0 {
                    a += coeff * d.powf(*exponent);
                }
                a
            }
            StorageCurve::Tabular { points } => {
                if points.is_empty() {
                    return 0.0;
                }
                if d <= points[0].0 {
                    return points[0].1;
                }
                for w in points.windows(2) {
                    let (d1, a1) = w[0];
                    let (d2, a2) = w[1];
                    if d <= d2 {
                        let t = (d - d1) / (d2 - d1).max(TINY);
                        return a1 + t * (a2 - a1);
                    }
                }
                points.last().unwrap().1
            }
        }
    }

    /// 水深处的累积容积（面积曲线积分）[ft³]
    pub fn volume(&self, depth: f64) -> f64 {
        let d = depth.max(0.0);
        match self {
            StorageCurve::Functional {
                coeff,
                exponent,
                constant,
            } => {
                let mut v = constant * d;
                if *coeff > 0.0 {
                    v += coeff / (exponent + 1.0) * d.powf(exponent + 1.0);
                }
                v
            }
            StorageCurve::Tabular { points } => {
                if points.is_empty() {
                    return 0.0;
                }
                let mut v = 0.0;
                let mut d_prev = 0.0;
                let mut a_prev = points[0].1;
                for &(di, ai) in points {
                    if di <= 0.0 {
                        a_prev = ai;
                        continue;
                    }
                    if d <= di {
                        let a_d = self.area(d);
                        v += 0.5 * (a_prev + a_d) * (d - d_prev);
                        return v;
                    }
                    v += 0.5 * (a_prev + ai) * (di - d_prev);
                    d_prev = di;
                    a_prev = ai;
                }
                // 超出表格范围按末端面积外推
                v + a_prev * (d - d_prev)
            }
        }
    }

    /// 由容积反求水深 [ft]
    pub fn depth(&self, volume: f64, full_depth: f64) -> f64 {
        if volume <= 0.0 {
            return 0.0;
        }
        // 容积随水深单调增，二分反演；上界取满深的积水外延
        let mut hi = full_depth.max(1.0);
        while self.volume(hi) < volume && hi < 1.0e6 {
            hi *= 2.0;
        }
        let mut lo = 0.0;
        for _ in 0..40 {
            let mid = 0.5 * (lo + hi);
            if self.volume(mid) < volume {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

/// 排放口载荷
#[derive(Debug, Clone)]
pub struct Outfall {
    /// 排放流量回灌到的子汇水区
    pub route_to: Option<usize>,
    /// 上一产流步内累计排出的体积 [ft³]
    pub v_routed: f64,
    /// 随流量排出的污染物负荷 [mg]
    pub w_routed: Vec<f64>,
}

/// 分流器载荷
#[derive(Debug, Clone)]
pub struct Divider {
    /// 分流管段
    pub link: usize,
    /// 子类型
    pub kind: DividerKind,
    /// 截流流量 [cfs]
    pub q_min: f64,
}

/// 调蓄节点载荷
#[derive(Debug, Clone)]
pub struct Storage {
    /// 调蓄曲线
    pub curve: StorageCurve,
    /// 水力停留时间 [s]，随热启动文件持久化
    pub hrt: f64,
}

/// 节点类型
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// 检查井 / 汇合节点
    Junction,
    /// 排放口
    Outfall(Outfall),
    /// 分流器
    Divider(Divider),
    /// 调蓄节点
    Storage(Storage),
}

/// 管网节点
#[derive(Debug, Clone)]
pub struct Node {
    /// 名称
    pub name: String,
    /// 类型与载荷
    pub kind: NodeKind,
    /// 井底高程 [ft]
    pub invert_elev: f64,
    /// 满深 [ft]
    pub full_depth: f64,
    /// 满容积 [ft³]
    pub full_volume: f64,
    /// 非调蓄节点的等效表面积 [ft²]
    pub surf_area: f64,
    /// 积水面积 [ft²]
    pub ponded_area: f64,
    /// 初始水深 [ft]
    pub init_depth: f64,
    /// 出流管段数（校验时计；无入流端标记为负）
    pub degree: i32,
    /// 写入结果文件
    pub rpt_flag: bool,

    // ---- 双缓冲状态 ----
    /// 上一步水深 [ft]
    pub old_depth: f64,
    /// 当前水深 [ft]
    pub new_depth: f64,
    /// 上一步容积 [ft³]
    pub old_volume: f64,
    /// 当前容积 [ft³]
    pub new_volume: f64,
    /// 上一步旁侧入流 [cfs]
    pub old_lat_flow: f64,
    /// 当前旁侧入流 [cfs]
    pub new_lat_flow: f64,
    /// 上一步总入流 [cfs]
    pub old_flow_inflow: f64,
    /// 本步入流累加 [cfs]
    pub inflow: f64,
    /// 本步出流累加 [cfs]
    pub outflow: f64,
    /// 上一步净入流（梯形积分用）[cfs]
    pub old_net_inflow: f64,
    /// 上一步溢流 [cfs]
    pub old_overflow: f64,
    /// 当前溢流 [cfs]
    pub overflow: f64,
    /// 本步渗漏与蒸发损失 [cfs]
    pub losses: f64,
    /// 本步调蓄迭代是否已完成
    pub updated: bool,
    /// 上一步污染物浓度
    pub old_qual: Vec<f64>,
    /// 当前污染物浓度
    pub new_qual: Vec<f64>,
}

impl Node {
    /// 是否为调蓄节点
    pub fn is_storage(&self) -> bool {
        matches!(self.kind, NodeKind::Storage(_))
    }

    /// 是否为排放口
    pub fn is_outfall(&self) -> bool {
        matches!(self.kind, NodeKind::Outfall(_))
    }

    /// 由水深求容积 [ft³]
    pub fn volume_from_depth(&self, depth: f64) -> f64 {
        match &self.kind {
            NodeKind::Storage(s) => s.curve.volume(depth),
            _ => {
                if self.full_depth > 0.0 {
                    self.full_volume * (depth / self.full_depth).min(1.0)
                } else {
                    0.0
                }
            }
        }
    }

    /// 由容积求水深 [ft]
    ///
    /// 容积超出满容积时：允许积水且有积水面积则水深继续上升，
    /// 否则钳在满深。
    pub fn depth_from_volume(&self, volume: f64, allow_ponding: bool) -> f64 {
        match &self.kind {
            NodeKind::Storage(s) => s.curve.depth(volume, self.full_depth),
            _ => {
                if self.full_volume <= 0.0 {
                    return 0.0;
                }
                let ratio = volume / self.full_volume;
                if ratio <= 1.0 {
                    ratio * self.full_depth
                } else if allow_ponding && self.ponded_area > 0.0 {
                    self.full_depth + (volume - self.full_volume) / self.ponded_area
                } else {
                    self.full_depth
                }
            }
        }
    }

    /// 节点出流上限：本步入流加上一步蓄量的释放
    pub fn max_outflow(&self, q: f64, dt: f64) -> f64 {
        let mut q = q;
        if self.full_depth > 0.0 || self.is_storage() {
            let q_max = self.inflow + self.old_volume / dt;
            if q > q_max {
                q = q_max;
            }
        }
        q.max(0.0)
    }

    /// 步首状态翻转：new → old，清零累加器
    pub fn set_old_state(&mut self) {
        self.old_depth = self.new_depth;
        self.old_volume = self.new_volume;
        self.old_lat_flow = self.new_lat_flow;
        self.old_flow_inflow = self.inflow;
        self.old_net_inflow = self.inflow - self.outflow - self.losses;
        self.old_overflow = self.overflow;
        self.new_lat_flow = 0.0;
        self.inflow = 0.0;
        self.outflow = 0.0;
        self.losses = 0.0;
        for p in 0..self.new_qual.len() {
            self.old_qual[p] = self.new_qual[p];
        }
    }

    /// 报告时刻的插值结果
    ///
    /// `f` 为当前报告时刻在新旧演算时刻之间的权重。
    pub fn get_results(&self, f: f64, units: &Units, x: &mut [f32]) {
        let f1 = 1.0 - f;
        let ucf_len = units.ucf(Quantity::Length);
        let ucf_flow = units.ucf(Quantity::Flow);
        let ucf_vol = units.ucf(Quantity::Volume);

        let depth = f1 * self.old_depth + f * self.new_depth;
        x[result_index::DEPTH] = (depth * ucf_len) as f32;
        x[result_index::HEAD] = ((depth + self.invert_elev) * ucf_len) as f32;
        x[result_index::VOLUME] =
            ((f1 * self.old_volume + f * self.new_volume) * ucf_vol) as f32;
        x[result_index::LATFLOW] =
            ((f1 * self.old_lat_flow + f * self.new_lat_flow) * ucf_flow) as f32;
        x[result_index::INFLOW] =
            ((f1 * self.old_flow_inflow + f * self.inflow) * ucf_flow) as f32;
        x[result_index::OVERFLOW] =
            ((f1 * self.old_overflow + f * self.overflow) * ucf_flow) as f32;
        let n_qual = self
            .new_qual
            .len()
            .min(x.len().saturating_sub(result_index::QUAL));
        for p in 0..n_qual {
            x[result_index::QUAL + p] =
                (f1 * self.old_qual[p] + f * self.new_qual[p]) as f32;
        }
    }

    /// 结果文件中的节点类型代码
    pub fn type_code(&self) -> i32 {
        match self.kind {
            NodeKind::Junction => 0,
            NodeKind::Outfall(_) => 1,
            NodeKind::Storage(_) => 2,
            NodeKind::Divider(_) => 3,
        }
    }
}
