// crates/dh_physics/src/objects/subcatch.rs

//! 子汇水区
//!
//! 每个子汇水区划分为三类子面积：无洼蓄不透水面（IMPERV0）、
//! 有洼蓄不透水面（IMPERV1）、透水面（PERV），三者面积比例之和
//! 恒为 1。产流的逐步水量平衡在 `runoff` 模块中实现，本模块
//! 负责对象定义、参数校验与状态查询。

use dh_foundation::consts::{MCOEFF, MIN_RUNOFF};
use dh_foundation::units::{Quantity, Units};

use crate::couplers::{GroundwaterState, InfilState, LidState, SnowpackState};

/// 无洼蓄不透水子面积下标
pub const IMPERV0: usize = 0;
/// 有洼蓄不透水子面积下标
pub const IMPERV1: usize = 1;
/// 透水子面积下标
pub const PERV: usize = 2;

/// 结果向量中的子汇水区变量下标
pub mod result_index {
    /// 降雨强度
    pub const RAINFALL: usize = 0;
    /// 积雪深
    pub const SNOWDEPTH: usize = 1;
    /// 蒸发损失
    pub const EVAP: usize = 2;
    /// 入渗损失
    pub const INFIL: usize = 3;
    /// 径流量
    pub const RUNOFF: usize = 4;
    /// 地下水出流
    pub const GW_FLOW: usize = 5;
    /// 地下水位高程
    pub const GW_ELEV: usize = 6;
    /// 非饱和带含水率
    pub const SOIL_MOIST: usize = 7;
    /// 首个污染物冲刷浓度
    pub const WASHOFF: usize = 8;
}

/// 子面积径流去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteTo {
    /// 直接排向子汇水区出口
    #[default]
    Outlet,
    /// 转入不透水面
    Imperv,
    /// 转入透水面
    Perv,
}

/// 子面积
///
/// `f_outlet` 是径流中直接排向出口的比例，其余部分在子面积间
/// 内部汇流。
#[derive(Debug, Clone, Default)]
pub struct Subarea {
    /// 曼宁 n
    pub n: f64,
    /// 洼蓄深 [ft]
    pub dstore: f64,
    /// 占非 LID 面积的比例
    pub f_area: f64,
    /// 非线性水库系数 α
    pub alpha: f64,
    /// 积水深 [ft]
    pub depth: f64,
    /// 本步入流速率 [ft/s]
    pub inflow: f64,
    /// 径流速率 [ft/s]
    pub runoff: f64,
    /// 径流去向
    pub route_to: RouteTo,
    /// 直接排向出口的径流比例
    pub f_outlet: f64,
}

/// 土地利用在子汇水区上的覆盖与污染物累积
#[derive(Debug, Clone, Default)]
pub struct LandFactor {
    /// 覆盖比例
    pub fraction: f64,
    /// 各污染物累积量 [lb 或 kg]
    pub buildup: Vec<f64>,
    /// 最近一次清扫日期 [day]
    pub last_swept: f64,
}

/// 子汇水区
#[derive(Debug, Clone)]
pub struct Subcatchment {
    /// 名称
    pub name: String,
    /// 雨量计
    pub gage: Option<usize>,
    /// 出口节点
    pub out_node: Option<usize>,
    /// 出口子汇水区
    pub out_subcatch: Option<usize>,
    /// 面积 [ft²]
    pub area: f64,
    /// 不透水比例 [0, 1]
    pub frac_imperv: f64,
    /// 特征宽度 [ft]
    pub width: f64,
    /// 平均坡度
    pub slope: f64,
    /// 路缘长度
    pub curb_length: f64,
    /// LID 占地面积 [ft²]
    pub lid_area: f64,
    /// 三类子面积
    pub subareas: [Subarea; 3],
    /// 写入结果文件
    pub rpt_flag: bool,

    // ---- 动态状态 ----
    /// 当前降雨（含降雪）强度 [ft/s]
    pub rainfall: f64,
    /// 上一步径流 [cfs]
    pub old_runoff: f64,
    /// 当前径流 [cfs]
    pub new_runoff: f64,
    /// 上一步积雪深 [ft]
    pub old_snow_depth: f64,
    /// 当前积雪深 [ft]
    pub new_snow_depth: f64,
    /// 本步累计上游来水速率（摊在非 LID 面积上）[ft/s]
    pub runon: f64,
    /// 蒸发损失速率（摊在总面积上）[ft/s]
    pub evap_loss: f64,
    /// 入渗损失速率（摊在总面积上）[ft/s]
    pub infil_loss: f64,
    /// 上一步径流水质
    pub old_qual: Vec<f64>,
    /// 当前径流水质（步内兼作湿沉降临时累加器）
    pub new_qual: Vec<f64>,
    /// 积水水质
    pub ponded_qual: Vec<f64>,
    /// 各土地利用的覆盖与累积
    pub land_factors: Vec<LandFactor>,

    // ---- 可选附着对象 ----
    /// 入渗模型状态
    pub infil: InfilState,
    /// 地下水状态
    pub groundwater: Option<GroundwaterState>,
    /// 积雪状态
    pub snowpack: Option<SnowpackState>,
    /// LID 单元组状态
    pub lid: Option<LidState>,
}

impl Subcatchment {
    /// 非 LID 面积 [ft²]
    pub fn non_lid_area(&self) -> f64 {
        self.area - self.lid_area
    }

    /// 参数校验：计算各子面积的非线性水库系数 α
    ///
    /// 两类不透水子面积共用全部不透水面积作为贡献面积。
    pub fn validate(&mut self) {
        let non_lid_area = self.non_lid_area();
        for i in IMPERV0..=PERV {
            let area = if i == PERV {
                (1.0 - self.frac_imperv) * non_lid_area
            } else {
                self.frac_imperv * non_lid_area
            };
            self.subareas[i].alpha = 0.0;
            if area > 0.0 && self.subareas[i].n > 0.0 {
                self.subareas[i].alpha =
                    MCOEFF * self.width / area * self.slope.sqrt() / self.subareas[i].n;
            }
        }
    }

    /// 初始化动态状态
    pub fn init_state(&mut self) {
        self.rainfall = 0.0;
        self.old_runoff = 0.0;
        self.new_runoff = 0.0;
        self.old_snow_depth = 0.0;
        self.new_snow_depth = 0.0;
        self.runon = 0.0;
        self.evap_loss = 0.0;
        self.infil_loss = 0.0;
        for sa in &mut self.subareas {
            sa.depth = 0.0;
            sa.inflow = 0.0;
            sa.runoff = 0.0;
        }
        for q in &mut self.old_qual {
            *q = 0.0;
        }
        for q in &mut self.new_qual {
            *q = 0.0;
        }
        for q in &mut self.ponded_qual {
            *q = 0.0;
        }
        self.infil.init_state();
        if let Some(gw) = &mut self.groundwater {
            gw.init_state();
        }
        if let Some(snow) = &mut self.snowpack {
            snow.init_state();
        }
    }

    /// 步首状态翻转：new → old，清零子面积入流
    pub fn set_old_state(&mut self) {
        self.old_runoff = self.new_runoff;
        self.old_snow_depth = self.new_snow_depth;
        for sa in &mut self.subareas {
            sa.inflow = 0.0;
        }
        for p in 0..self.new_qual.len() {
            self.old_qual[p] = self.new_qual[p];
            self.new_qual[p] = 0.0;
        }
        if let Some(lid) = &mut self.lid {
            lid.set_old_state();
        }
    }

    /// 含 LID 的透水面积比例
    pub fn frac_perv(&self) -> f64 {
        let mut frac_perv = 1.0 - self.frac_imperv;
        if self.lid_area > 0.0 {
            let lid_perv = self
                .lid
                .as_ref()
                .map_or(self.lid_area, |lid| lid.perv_area());
            frac_perv =
                (frac_perv * (self.area - self.lid_area) + lid_perv) / self.area;
            frac_perv = frac_perv.min(1.0);
        }
        frac_perv
    }

    /// 非 LID 面上的平均积水深 [ft]
    pub fn get_depth(&self) -> f64 {
        let mut depth = 0.0;
        for sa in &self.subareas {
            if sa.f_area > 0.0 {
                depth += sa.depth * sa.f_area;
            }
        }
        depth
    }

    /// 地表与 LID 的总蓄水体积 [ft³]
    pub fn get_storage(&self) -> f64 {
        let mut v = 0.0;
        for sa in &self.subareas {
            v += sa.depth * sa.f_area;
        }
        v * self.non_lid_area()
            + self.lid.as_ref().map_or(0.0, |lid| lid.stored_volume())
    }

    /// 上游来水按非 LID 面积摊成速率，计入三类子面积
    ///
    /// `q` 为来水流量 [cfs]。LID 占满全区时退化为按总面积摊。
    pub fn add_runon_flow(&mut self, q: f64) {
        if self.area <= 0.0 {
            return;
        }
        let non_lid_area = self.non_lid_area();
        let q = if non_lid_area > 0.0 {
            q / non_lid_area
        } else {
            q / self.area
        };
        self.runon += q;
        for sa in &mut self.subareas {
            sa.inflow += q;
        }
    }

    /// 新旧径流的加权组合 [cfs]
    pub fn wtd_outflow(&self, f: f64) -> f64 {
        if self.area == 0.0 {
            return 0.0;
        }
        (1.0 - f) * self.old_runoff + f * self.new_runoff
    }

    /// 报告时刻的插值结果
    ///
    /// `report_rain` 为所属雨量计的报告期降雨强度（用户单位）。
    pub fn get_results(&self, f: f64, report_rain: f64, units: &Units, x: &mut [f32]) {
        let f1 = 1.0 - f;

        x[result_index::RAINFALL] = report_rain as f32;
        let z = (f1 * self.old_snow_depth + f * self.new_snow_depth)
            * units.ucf(Quantity::RainDepth);
        x[result_index::SNOWDEPTH] = z as f32;

        x[result_index::EVAP] = (self.evap_loss * units.ucf(Quantity::EvapRate)) as f32;
        x[result_index::INFIL] = (self.infil_loss * units.ucf(Quantity::Rainfall)) as f32;

        let mut runoff = f1 * self.old_runoff + f * self.new_runoff;
        if let Some(lid) = &self.lid {
            runoff += f1 * lid.old_drain_flow + f * lid.new_drain_flow;
        }
        // 极小径流只在报告层面抹零，不影响演算
        if runoff < MIN_RUNOFF * self.area {
            runoff = 0.0;
        }
        x[result_index::RUNOFF] = (runoff * units.ucf(Quantity::Flow)) as f32;

        if let Some(gw) = &self.groundwater {
            let z = (f1 * gw.old_flow + f * gw.new_flow)
                * self.area
                * units.ucf(Quantity::Flow);
            x[result_index::GW_FLOW] = z as f32;
            x[result_index::GW_ELEV] =
                (gw.water_table_elev() * units.ucf(Quantity::Length)) as f32;
            x[result_index::SOIL_MOIST] = gw.theta as f32;
        } else {
            x[result_index::GW_FLOW] = 0.0;
            x[result_index::GW_ELEV] = 0.0;
            x[result_index::SOIL_MOIST] = 0.0;
        }

        let n_qual = self
            .new_qual
            .len()
            .min(x.len().saturating_sub(result_index::WASHOFF));
        for p in 0..n_qual {
            let z = if runoff == 0.0 {
                0.0
            } else {
                f1 * self.old_qual[p] + f * self.new_qual[p]
            };
            x[result_index::WASHOFF + p] = z as f32;
        }
    }
}
