// crates/dh_physics/src/objects/link.rs

//! 管网管段
//!
//! 管段分五类：管道、泵、孔口、堰、出流口，以带载荷的枚举表达。
//! 恒定流与运动波演算下，调节类管段（孔口/堰/出流口）直接传递
//! 入流，且必须从调蓄节点引出（校验保证）。
//!
//! `setting` 是 0.0–1.0 的控制开度，热启动恢复时经由与实时控制
//! 相同的路径（`set_target_setting` → `set_setting`）重放。

use dh_foundation::consts::{MCOEFF, TINY};
use dh_foundation::units::{Quantity, Units};

use super::xsect::Xsect;

/// 结果向量中的管段变量下标
pub mod result_index {
    /// 流量
    pub const FLOW: usize = 0;
    /// 水深
    pub const DEPTH: usize = 1;
    /// 流速
    pub const VELOCITY: usize = 2;
    /// 蓄水容积
    pub const VOLUME: usize = 3;
    /// 满流程度
    pub const CAPACITY: usize = 4;
    /// 首个污染物浓度
    pub const QUAL: usize = 5;
}

/// 管道满流状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullState {
    /// 未满
    #[default]
    None,
    /// 部分并联孔满流
    SomeFull,
    /// 全部满流
    AllFull,
}

/// 管道载荷
#[derive(Debug, Clone)]
pub struct Conduit {
    /// 长度 [ft]
    pub length: f64,
    /// 曼宁糙率
    pub roughness: f64,
    /// 并联孔数
    pub barrels: u32,
    /// 底坡（上游高程 − 下游高程）/ 长度
    pub slope: f64,
    /// 流量系数 β = MCOEFF/n·√slope
    pub beta: f64,
    /// 上游端流量 [cfs]（单孔）
    pub q1: f64,
    /// 下游端流量 [cfs]（单孔）
    pub q2: f64,
    /// 上一步上游端流量
    pub q1_old: f64,
    /// 上一步下游端流量
    pub q2_old: f64,
    /// 上游端过水面积 [ft²]
    pub a1: f64,
    /// 下游端过水面积 [ft²]
    pub a2: f64,
    /// 满流状态
    pub full_state: FullState,
    /// 是否达到输水能力上限
    pub capacity_limited: bool,
    /// 蒸发损失速率 [cfs]
    pub evap_loss_rate: f64,
    /// 渗漏损失速率 [cfs]
    pub seep_loss_rate: f64,
}

/// 孔口载荷
#[derive(Debug, Clone)]
pub struct Orifice {
    /// 流量系数（已并入孔口面积与 √2g）
    pub coeff: f64,
}

/// 堰载荷
#[derive(Debug, Clone)]
pub struct Weir {
    /// 流量系数（已并入堰宽）
    pub coeff: f64,
}

/// 出流口载荷
#[derive(Debug, Clone)]
pub struct OutletRating {
    /// 流量系数
    pub coeff: f64,
    /// 水头指数
    pub exponent: f64,
}

/// 管段类型
#[derive(Debug, Clone)]
pub enum LinkKind {
    /// 管道 / 渠道
    Conduit(Conduit),
    /// 理想泵：传递入流
    Pump,
    /// 孔口
    Orifice(Orifice),
    /// 堰
    Weir(Weir),
    /// 出流口
    Outlet(OutletRating),
}

impl LinkKind {
    /// 是否为调节类管段（孔口 / 堰 / 出流口）
    pub fn is_regulator(&self) -> bool {
        matches!(
            self,
            LinkKind::Orifice(_) | LinkKind::Weir(_) | LinkKind::Outlet(_)
        )
    }
}

/// 管网管段
#[derive(Debug, Clone)]
pub struct Link {
    /// 名称
    pub name: String,
    /// 类型与载荷
    pub kind: LinkKind,
    /// 上游节点
    pub node1: usize,
    /// 下游节点
    pub node2: usize,
    /// 断面
    pub xsect: Xsect,
    /// 上游偏移 [ft]
    pub offset1: f64,
    /// 下游偏移 [ft]
    pub offset2: f64,
    /// 满流流量 [cfs]
    pub q_full: f64,
    /// 流向符号（按坡度校正后 ±1）
    pub direction: i8,
    /// 写入结果文件
    pub rpt_flag: bool,

    // ---- 双缓冲状态 ----
    /// 上一步流量 [cfs]
    pub old_flow: f64,
    /// 当前流量 [cfs]
    pub new_flow: f64,
    /// 上一步水深 [ft]
    pub old_depth: f64,
    /// 当前水深 [ft]
    pub new_depth: f64,
    /// 上一步容积 [ft³]
    pub old_volume: f64,
    /// 当前容积 [ft³]
    pub new_volume: f64,
    /// 控制开度 0.0–1.0
    pub setting: f64,
    /// 目标开度
    pub target_setting: f64,
    /// 上一步污染物浓度
    pub old_qual: Vec<f64>,
    /// 当前污染物浓度
    pub new_qual: Vec<f64>,
}

impl Link {
    /// 是否为管道
    pub fn is_conduit(&self) -> bool {
        matches!(self.kind, LinkKind::Conduit(_))
    }

    /// 管道载荷引用
    pub fn conduit(&self) -> Option<&Conduit> {
        match &self.kind {
            LinkKind::Conduit(c) => Some(c),
            _ => None,
        }
    }

    /// 管道载荷可变引用
    pub fn conduit_mut(&mut self) -> Option<&mut Conduit> {
        match &mut self.kind {
            LinkKind::Conduit(c) => Some(c),
            _ => None,
        }
    }

    /// 管道长度（非管道为 0）[ft]
    pub fn length(&self) -> f64 {
        self.conduit().map_or(0.0, |c| c.length)
    }

    /// 步首状态翻转
    pub fn set_old_state(&mut self) {
        self.old_flow = self.new_flow;
        self.old_depth = self.new_depth;
        self.old_volume = self.new_volume;
        if let LinkKind::Conduit(c) = &mut self.kind {
            c.q1_old = c.q1;
            c.q2_old = c.q2;
        }
        for p in 0..self.new_qual.len() {
            self.old_qual[p] = self.new_qual[p];
        }
    }

    /// 设定目标开度（实时控制与热启动恢复共用的路径）
    pub fn set_target_setting(&mut self, target: f64) {
        self.target_setting = target.clamp(0.0, 1.0);
    }

    /// 向目标开度推进
    ///
    /// 无调节时间时立即到位；`_dt` 为调节经过的时间，为将来的
    /// 渐变控制保留。
    pub fn set_setting(&mut self, _dt: f64) {
        self.setting = self.target_setting;
    }

    /// 本步蒸发+渗漏损失速率，不超过入流 [cfs]
    pub fn loss_rate(&self, q: f64, _dt: f64) -> f64 {
        match &self.kind {
            LinkKind::Conduit(c) => (c.evap_loss_rate + c.seep_loss_rate).min(q.max(0.0)),
            _ => 0.0,
        }
    }

    /// 管道验证：计算坡度、β 系数与满流流量
    ///
    /// 坡度保留符号（树状校验据此报 `Slope` 错误）；逆坡管道
    /// 方向取反，水力计算用坡度绝对值。
    pub fn validate_conduit(&mut self, elev1: f64, elev2: f64) -> bool {
        let xsect = self.xsect.clone();
        let LinkKind::Conduit(c) = &mut self.kind else {
            return false;
        };
        let slope = (elev1 - elev2) / c.length.max(TINY);
        let adverse = slope < 0.0 && !xsect.is_dummy();
        if slope < 0.0 {
            self.direction = -1;
        }
        c.slope = slope;
        c.beta = if c.roughness > TINY {
            MCOEFF / c.roughness * slope.abs().sqrt()
        } else {
            0.0
        };
        self.q_full = c.beta * xsect.s_full();
        adverse
    }

    /// 平均流速 [ft/s]
    pub fn velocity(&self, q: f64, depth: f64) -> f64 {
        let a = self.xsect.a_of_y(depth);
        if a < TINY {
            0.0
        } else {
            q / a
        }
    }

    /// 报告时刻的插值结果
    pub fn get_results(&self, f: f64, units: &Units, x: &mut [f32]) {
        let f1 = 1.0 - f;
        let ucf_len = units.ucf(Quantity::Length);
        let ucf_flow = units.ucf(Quantity::Flow);
        let ucf_vol = units.ucf(Quantity::Volume);

        let dir = self.direction as f64;
        let q = (f1 * self.old_flow + f * self.new_flow) * dir;
        let y = f1 * self.old_depth + f * self.new_depth;
        x[result_index::FLOW] = (q * ucf_flow) as f32;
        x[result_index::DEPTH] = (y * ucf_len) as f32;
        x[result_index::VELOCITY] = (self.velocity(q, y) * ucf_len) as f32;
        x[result_index::VOLUME] =
            ((f1 * self.old_volume + f * self.new_volume) * ucf_vol) as f32;
        x[result_index::CAPACITY] = match &self.kind {
            LinkKind::Conduit(_) => {
                let a_full = self.xsect.a_full();
                if a_full > TINY {
                    (self.xsect.a_of_y(y) / a_full) as f32
                } else {
                    0.0
                }
            }
            _ => self.setting as f32,
        };
        let n_qual = self
            .new_qual
            .len()
            .min(x.len().saturating_sub(result_index::QUAL));
        for p in 0..n_qual {
            x[result_index::QUAL + p] =
                (f1 * self.old_qual[p] + f * self.new_qual[p]) as f32;
        }
    }

    /// 调蓄节点经由本管段的额定出流
    ///
    /// `head` 为调蓄水深扣除上游偏移后的有效水头 [ft]。管道按
    /// 曼宁正常流计；调节类管段按各自的额定曲线计。
    pub fn rated_outflow(&self, head: f64) -> f64 {
        if head <= 0.0 {
            return 0.0;
        }
        match &self.kind {
            LinkKind::Conduit(c) => {
                let y = head.min(self.xsect.y_full());
                let a = self.xsect.a_of_y(y);
                c.beta * self.xsect.s_of_a(a) * c.barrels as f64
            }
            LinkKind::Orifice(o) => self.setting * o.coeff * head.sqrt(),
            LinkKind::Weir(w) => self.setting * w.coeff * head.powf(1.5),
            LinkKind::Outlet(o) => o.coeff * head.powf(o.exponent),
            LinkKind::Pump => 0.0,
        }
    }

    /// 结果文件中的管段类型代码
    pub fn type_code(&self) -> i32 {
        match self.kind {
            LinkKind::Conduit(_) => 0,
            LinkKind::Pump => 1,
            LinkKind::Orifice(_) => 2,
            LinkKind::Weir(_) => 3,
            LinkKind::Outlet(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conduit_link() -> Link {
        Link {
            name: "C1".to_string(),
            kind: LinkKind::Conduit(Conduit {
                length: 400.0,
                roughness: 0.013,
                barrels: 1,
                slope: 0.0,
                beta: 0.0,
                q1: 0.0,
                q2: 0.0,
                q1_old: 0.0,
                q2_old: 0.0,
                a1: 0.0,
                a2: 0.0,
                full_state: FullState::None,
                capacity_limited: false,
                evap_loss_rate: 0.0,
                seep_loss_rate: 0.0,
            }),
            node1: 0,
            node2: 1,
            xsect: Xsect::Circular { diameter: 1.0 },
            offset1: 0.0,
            offset2: 0.0,
            q_full: 0.0,
            direction: 1,
            rpt_flag: true,
            old_flow: 0.0,
            new_flow: 0.0,
            old_depth: 0.0,
            new_depth: 0.0,
            old_volume: 0.0,
            new_volume: 0.0,
            setting: 1.0,
            target_setting: 1.0,
            old_qual: Vec::new(),
            new_qual: Vec::new(),
        }
    }

    #[test]
    fn test_validate_computes_beta_and_qfull() {
        let mut link = conduit_link();
        // 坡度 = 4/400 = 0.01
        let adverse = link.validate_conduit(104.0, 100.0);
        assert!(!adverse);
        let c = link.conduit().unwrap();
        assert!((c.slope - 0.01).abs() < 1e-12);
        let beta_expected = 1.49 / 0.013 * 0.1;
        assert!((c.beta - beta_expected).abs() < 1e-9);
        assert!(link.q_full > 0.0);
        // 满管流量 = β · S_full
        assert!((link.q_full - c.beta * link.xsect.s_full()).abs() < 1e-9);
    }

    #[test]
    fn test_adverse_slope_detected() {
        let mut link = conduit_link();
        let adverse = link.validate_conduit(100.0, 104.0);
        assert!(adverse);
        assert_eq!(link.direction, -1);
        // 坡度保留符号，β 用绝对值
        assert!(link.conduit().unwrap().slope < 0.0);
        assert!(link.conduit().unwrap().beta > 0.0);
    }

    #[test]
    fn test_setting_restore_path() {
        let mut link = conduit_link();
        link.set_target_setting(0.4);
        link.set_setting(0.0);
        assert!((link.setting - 0.4).abs() < 1e-12);
        assert!((link.target_setting - link.setting).abs() < 1e-12);
        // 越界钳制
        link.set_target_setting(2.0);
        assert!((link.target_setting - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_loss_rate_capped_by_inflow() {
        let mut link = conduit_link();
        if let LinkKind::Conduit(c) = &mut link.kind {
            c.evap_loss_rate = 0.3;
            c.seep_loss_rate = 0.4;
        }
        assert!((link.loss_rate(10.0, 60.0) - 0.7).abs() < 1e-12);
        assert!((link.loss_rate(0.5, 60.0) - 0.5).abs() < 1e-12);
        assert_eq!(link.loss_rate(-1.0, 60.0), 0.0);
    }

    #[test]
    fn test_rated_outflow_linear_outlet() {
        let mut link = conduit_link();
        link.kind = LinkKind::Outlet(OutletRating {
            coeff: 2.0,
            exponent: 1.0,
        });
        assert!((link.rated_outflow(3.0) - 6.0).abs() < 1e-12);
        assert_eq!(link.rated_outflow(-1.0), 0.0);
    }

    #[test]
    fn test_rated_outflow_conduit_normal_flow() {
        let mut link = conduit_link();
        link.validate_conduit(104.0, 100.0);
        let q_half = link.rated_outflow(0.5);
        let q_full = link.rated_outflow(1.0);
        assert!(q_half > 0.0);
        assert!(q_full > q_half);
        // 满水头即满流流量
        assert!((q_full - link.q_full).abs() < 1e-9);
    }

    #[test]
    fn test_set_old_state() {
        let mut link = conduit_link();
        link.new_flow = 2.0;
        link.new_depth = 0.5;
        link.set_old_state();
        assert!((link.old_flow - 2.0).abs() < 1e-12);
        assert!((link.old_depth - 0.5).abs() < 1e-12);
    }
}
