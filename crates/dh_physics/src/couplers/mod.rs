// crates/dh_physics/src/couplers/mod.rs

//! 耦合过程接缝
//!
//! 入渗、地下水、积雪与 LID 是产流引擎消费的协作者。完整的
//! 过程模型（霍顿/Green-Ampt 入渗、含水层流动、积雪热力学、
//! LID 单元水量平衡）不在本引擎范围内；此处定义引擎消费的接口
//! 与随热启动文件持久化的状态向量，并内置足以支撑测试与演示的
//! 简化实现。
//!
//! 状态向量宽度由热启动文件格式固定：入渗 6 元、地下水 4 元、
//! 积雪 3 面 × 5 元。

use dh_foundation::consts::MISSING;

// ============================================================
// 共享水量平衡累加器
// ============================================================

/// 单个子汇水区单步的水量平衡累加器 [ft³]
///
/// 产流引擎与 LID 协作者共同写入；步末折算为损失速率与出流。
#[derive(Debug, Clone, Copy, Default)]
pub struct WaterBalance {
    /// 总入流量（来水 + 既有积水 + 降水）
    pub v_inflow: f64,
    /// 蒸发量
    pub v_evap: f64,
    /// 透水面蒸发量
    pub v_pevap: f64,
    /// 入渗量
    pub v_infil: f64,
    /// 非 LID 面出流量
    pub v_outflow: f64,
    /// 送入 LID 处理的径流量
    pub v_lid_in: f64,
    /// LID 内入渗量
    pub v_lid_infil: f64,
    /// LID 面出流量
    pub v_lid_out: f64,
    /// LID 暗渠排水量
    pub v_lid_drain: f64,
    /// LID 回灌透水面的量
    pub v_lid_return: f64,
}

// ============================================================
// 入渗
// ============================================================

/// 入渗模型
///
/// 完整模型族属于外部协作者，内置常容量模型用于测试。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InfilModel {
    /// 不入渗
    None,
    /// 恒定入渗容量 [ft/s]
    Constant {
        /// 入渗容量
        capacity: f64,
    },
}

/// 入渗模型状态
///
/// 状态向量 6 元随热启动文件持久化；常容量模型只使用第 0 元
/// 记录累计入渗深，其余元置零保留。
#[derive(Debug, Clone)]
pub struct InfilState {
    /// 模型
    pub model: InfilModel,
    state: [f64; 6],
}

impl InfilState {
    /// 创建状态
    pub fn new(model: InfilModel) -> Self {
        Self {
            model,
            state: [0.0; 6],
        }
    }

    /// 初始化
    pub fn init_state(&mut self) {
        self.state = [0.0; 6];
    }

    /// 当前时间步的入渗速率 [ft/s]
    ///
    /// `precip` 为净降水速率，`inflow` 为子面积累计入流速率，
    /// `depth` 为积水深。
    pub fn infil_rate(&mut self, dt: f64, precip: f64, inflow: f64, depth: f64) -> f64 {
        match self.model {
            InfilModel::None => 0.0,
            InfilModel::Constant { capacity } => {
                let available = precip + inflow + depth / dt.max(1.0e-10);
                let rate = capacity.min(available).max(0.0);
                self.state[0] += rate * dt;
                rate
            }
        }
    }

    /// 导出状态向量（热启动保存）
    pub fn state_vec(&self) -> [f64; 6] {
        self.state
    }

    /// 恢复状态向量（热启动读取）
    pub fn set_state_vec(&mut self, x: [f64; 6]) {
        self.state = x;
    }
}

// ============================================================
// 地下水
// ============================================================

/// 地下水状态
///
/// 引擎向地下水协作者提供透水面净蒸发与总入渗（地表 + LID），
/// 并消费其对入渗的非饱和带容量钳制。含水层流动本身不在范围内，
/// 此处以最简的线性水库记账维持状态演化。
#[derive(Debug, Clone)]
pub struct GroundwaterState {
    /// 含水层底板高程 [ft]
    pub bottom_elev: f64,
    /// 饱和带厚度 [ft]
    pub lower_depth: f64,
    /// 非饱和带含水率
    pub theta: f64,
    /// 上一步出流速率（摊在面积上）[ft/s]
    pub old_flow: f64,
    /// 当前出流速率 [ft/s]
    pub new_flow: f64,
    /// 非饱和带本步可容纳的入渗体积 [ft]
    pub max_infil_vol: f64,
    /// 非饱和带入渗容量速率 [ft/s]
    pub max_infil_rate: f64,
    /// 本步蒸发损失速率（摊在面积上）[ft/s]
    pub evap_loss: f64,
}

impl GroundwaterState {
    /// 创建状态
    pub fn new(bottom_elev: f64, water_table: f64, theta: f64, max_infil_rate: f64) -> Self {
        Self {
            bottom_elev,
            lower_depth: (water_table - bottom_elev).max(0.0),
            theta,
            old_flow: 0.0,
            new_flow: 0.0,
            max_infil_vol: f64::MAX,
            max_infil_rate,
            evap_loss: 0.0,
        }
    }

    /// 初始化
    pub fn init_state(&mut self) {
        self.old_flow = 0.0;
        self.new_flow = 0.0;
        self.evap_loss = 0.0;
        self.max_infil_vol = f64::MAX;
    }

    /// 地下水位高程 [ft]
    pub fn water_table_elev(&self) -> f64 {
        self.bottom_elev + self.lower_depth
    }

    /// 接收透水面净蒸发与总入渗，推进一步
    ///
    /// `perv_evap` 与 `total_infil` 为体积 [ft³]，`area` 为
    /// 子汇水区面积。
    pub fn update(&mut self, perv_evap: f64, total_infil: f64, area: f64, dt: f64) {
        self.old_flow = self.new_flow;
        self.evap_loss = if area > 0.0 && dt > 0.0 {
            perv_evap / area / dt
        } else {
            0.0
        };
        if area > 0.0 && dt > 0.0 {
            // 入渗抬升含水率，粗粒度记账
            let d_theta = total_infil / area / 10.0_f64.max(self.lower_depth);
            self.theta = (self.theta + d_theta).min(0.5);
        }
        // 下一步非饱和带可容纳的入渗体积
        self.max_infil_vol = if self.max_infil_rate > 0.0 {
            self.max_infil_rate * dt
        } else {
            f64::MAX
        };
    }

    /// 导出状态向量（热启动保存）
    pub fn state_vec(&self) -> [f64; 4] {
        [
            self.theta,
            self.water_table_elev(),
            self.new_flow,
            if self.max_infil_vol == f64::MAX {
                MISSING
            } else {
                self.max_infil_vol
            },
        ]
    }

    /// 恢复状态向量（热启动读取）
    ///
    /// 第 3 元为 MISSING 时保持当前钳制不变（v2 文件语义）。
    pub fn set_state_vec(&mut self, x: [f64; 4]) {
        self.theta = x[0];
        self.lower_depth = (x[1] - self.bottom_elev).max(0.0);
        self.new_flow = x[2];
        if x[3] != MISSING {
            self.max_infil_vol = x[3];
        }
    }
}

// ============================================================
// 积雪
// ============================================================

/// 积雪状态
///
/// 三个积雪面分别对应三类子面积；每面 5 元状态向量随热启动
/// 文件持久化。融雪热力学在范围之外，内置度日式融雪。
#[derive(Debug, Clone)]
pub struct SnowpackState {
    /// 每个积雪面的状态向量 [雪水当量, 自由水, 冷容, 温度指数, 面积比]
    pub surfaces: [[f64; 5]; 3],
    /// 度日融雪系数 [ft/s/°F]
    pub melt_coeff: f64,
    /// 融雪基温 [°F]
    pub base_temp: f64,
}

impl SnowpackState {
    /// 创建状态
    pub fn new(melt_coeff: f64) -> Self {
        Self {
            surfaces: [[0.0; 5]; 3],
            melt_coeff,
            base_temp: 32.0,
        }
    }

    /// 初始化
    pub fn init_state(&mut self) {
        self.surfaces = [[0.0; 5]; 3];
    }

    /// 是否仍有积雪
    pub fn has_snow(&self) -> bool {
        self.surfaces.iter().any(|s| s[0] > 0.0)
    }

    /// 融雪计算
    ///
    /// 把降水拆分为各子面积的净输入（雨 + 融雪），返回新的平均
    /// 积雪深 [ft]。
    pub fn get_snow_melt(
        &mut self,
        air_temp: f64,
        rainfall: f64,
        snowfall: f64,
        dt: f64,
        net_precip: &mut [f64; 3],
    ) -> f64 {
        let mut total = 0.0;
        for (i, surf) in self.surfaces.iter_mut().enumerate() {
            surf[0] += snowfall * dt;
            let melt = if air_temp > self.base_temp {
                (self.melt_coeff * (air_temp - self.base_temp)).min(surf[0] / dt.max(1e-10))
            } else {
                0.0
            };
            surf[0] = (surf[0] - melt * dt).max(0.0);
            net_precip[i] = rainfall + melt;
            total += surf[0];
        }
        total / 3.0
    }

    /// 除雪钩子
    ///
    /// 完整的除雪再分配属于外部协作者；此处保留调用点。
    pub fn plow_snow(&mut self, _dt: f64) {}

    /// 导出某个积雪面的状态向量
    pub fn state_vec(&self, surface: usize) -> [f64; 5] {
        self.surfaces[surface]
    }

    /// 恢复某个积雪面的状态向量
    pub fn set_state_vec(&mut self, surface: usize, x: [f64; 5]) {
        self.surfaces[surface] = x;
    }
}

// ============================================================
// LID
// ============================================================

/// LID 单元组状态
///
/// LID 单元内部水量平衡属于外部协作者。内置实现只维护接口：
/// 占地面积从产流面积中扣除，处理量与排水量为零。
#[derive(Debug, Clone)]
pub struct LidState {
    /// 占地面积 [ft²]
    pub area: f64,
    /// 其中按透水面计的面积 [ft²]
    pub perv_fraction: f64,
    /// 上一步暗渠排水流量 [cfs]
    pub old_drain_flow: f64,
    /// 当前暗渠排水流量 [cfs]
    pub new_drain_flow: f64,
    /// 单元内蓄水体积 [ft³]
    pub storage: f64,
}

impl LidState {
    /// 创建状态
    pub fn new(area: f64) -> Self {
        Self {
            area,
            perv_fraction: 1.0,
            old_drain_flow: 0.0,
            new_drain_flow: 0.0,
            storage: 0.0,
        }
    }

    /// 步首状态翻转
    pub fn set_old_state(&mut self) {
        self.old_drain_flow = self.new_drain_flow;
    }

    /// LID 中按透水面计的面积 [ft²]
    pub fn perv_area(&self) -> f64 {
        self.area * self.perv_fraction
    }

    /// 单元内蓄水体积 [ft³]
    pub fn stored_volume(&self) -> f64 {
        self.storage
    }

    /// 是否处于湿润状态（影响产流步长选择）
    pub fn is_wet(&self) -> bool {
        self.storage > 0.0 || self.new_drain_flow > 0.0
    }

    /// 执行 LID 处理，写入共享水量平衡
    pub fn get_runoff(&mut self, _dt: f64, _wb: &mut WaterBalance) {
        // 内置实现不截留径流；外部协作者在此更新
        // v_evap / v_lid_in / v_lid_infil / v_lid_out / v_lid_drain
    }

    /// 回灌透水面的流量 [cfs]
    pub fn flow_to_perv(&self) -> f64 {
        0.0
    }

    /// 将排往其他子汇水区的暗渠水量计入对方的来水
    pub fn add_drain_runon(&mut self) {}
}
