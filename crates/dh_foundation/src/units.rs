// crates/dh_foundation/src/units.rs

//! 单位系统与换算
//!
//! 引擎内部统一使用美制单位（ft、ft²、ft³、cfs、ft/s，时间为秒），
//! 输入输出按用户选择的单位制换算。换算因子与原型引擎逐位一致，
//! 保证二进制结果文件可被既有工具读取。
//!
//! # 使用示例
//!
//! ```
//! use dh_foundation::units::{FlowUnits, Quantity, UnitSystem, Units};
//!
//! let units = Units::new(FlowUnits::Cms);
//! assert_eq!(units.system(), UnitSystem::Si);
//! // 1 cfs -> 0.02832 m³/s
//! assert!((units.ucf(Quantity::Flow) - 0.02832).abs() < 1e-10);
//! ```

use serde::{Deserialize, Serialize};

/// 单位制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSystem {
    /// 美制（ft / in / acre）
    Us,
    /// 国际单位制（m / mm / ha）
    Si,
}

/// 流量单位
///
/// 前三种属于美制，后三种属于国际制；单位制由流量单位决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FlowUnits {
    /// 立方英尺每秒
    #[default]
    Cfs,
    /// 加仑每分钟
    Gpm,
    /// 百万加仑每天
    Mgd,
    /// 立方米每秒
    Cms,
    /// 升每秒
    Lps,
    /// 百万升每天
    Mld,
}

impl FlowUnits {
    /// 二进制文件中的单位代码
    pub fn code(self) -> i32 {
        match self {
            FlowUnits::Cfs => 0,
            FlowUnits::Gpm => 1,
            FlowUnits::Mgd => 2,
            FlowUnits::Cms => 3,
            FlowUnits::Lps => 4,
            FlowUnits::Mld => 5,
        }
    }

    /// 从二进制单位代码还原
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FlowUnits::Cfs),
            1 => Some(FlowUnits::Gpm),
            2 => Some(FlowUnits::Mgd),
            3 => Some(FlowUnits::Cms),
            4 => Some(FlowUnits::Lps),
            5 => Some(FlowUnits::Mld),
            _ => None,
        }
    }

    /// 所属单位制
    pub fn system(self) -> UnitSystem {
        match self {
            FlowUnits::Cfs | FlowUnits::Gpm | FlowUnits::Mgd => UnitSystem::Us,
            FlowUnits::Cms | FlowUnits::Lps | FlowUnits::Mld => UnitSystem::Si,
        }
    }

    /// cfs 到本单位的换算因子
    pub fn per_cfs(self) -> f64 {
        match self {
            FlowUnits::Cfs => 1.0,
            FlowUnits::Gpm => 448.831,
            FlowUnits::Mgd => 0.64632,
            FlowUnits::Cms => 0.02832,
            FlowUnits::Lps => 28.317,
            FlowUnits::Mld => 2.4466,
        }
    }
}

/// 可换算的物理量类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// 降雨强度 ft/s → in/hr 或 mm/hr
    Rainfall,
    /// 降雨深度 ft → in 或 mm
    RainDepth,
    /// 蒸发速率 ft/s → in/day 或 mm/day
    EvapRate,
    /// 长度 ft → ft 或 m
    Length,
    /// 汇水面积 ft² → acre 或 ha
    LandArea,
    /// 体积 ft³ → ft³ 或 m³
    Volume,
    /// 流量 cfs → 用户流量单位
    Flow,
}

/// 单位换算器
///
/// 持有用户选择的流量单位，按物理量类别给出
/// “内部单位 → 用户单位”的乘法因子。
#[derive(Debug, Clone, Copy)]
pub struct Units {
    flow_units: FlowUnits,
}

impl Units {
    /// 创建换算器
    pub fn new(flow_units: FlowUnits) -> Self {
        Self { flow_units }
    }

    /// 用户流量单位
    pub fn flow_units(&self) -> FlowUnits {
        self.flow_units
    }

    /// 用户单位制
    pub fn system(&self) -> UnitSystem {
        self.flow_units.system()
    }

    /// 内部单位到用户单位的换算因子
    pub fn ucf(&self, q: Quantity) -> f64 {
        let si = self.system() == UnitSystem::Si;
        match q {
            Quantity::Rainfall => {
                if si {
                    1_097_280.0
                } else {
                    43_200.0
                }
            }
            Quantity::RainDepth => {
                if si {
                    304.8
                } else {
                    12.0
                }
            }
            Quantity::EvapRate => {
                if si {
                    26_334_720.0
                } else {
                    1_036_800.0
                }
            }
            Quantity::Length => {
                if si {
                    0.3048
                } else {
                    1.0
                }
            }
            Quantity::LandArea => {
                if si {
                    9.2903e-3
                } else {
                    2.2956e-5
                }
            }
            Quantity::Volume => {
                if si {
                    0.02832
                } else {
                    1.0
                }
            }
            Quantity::Flow => self.flow_units.per_cfs(),
        }
    }

    /// 温度换算：内部华氏度 → 用户单位
    pub fn temperature(&self, ta_fahrenheit: f64) -> f64 {
        match self.system() {
            UnitSystem::Us => ta_fahrenheit,
            UnitSystem::Si => (5.0 / 9.0) * (ta_fahrenheit - 32.0),
        }
    }
}

impl Default for Units {
    fn default() -> Self {
        Self::new(FlowUnits::Cfs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_units_code_roundtrip() {
        for code in 0..6 {
            let fu = FlowUnits::from_code(code).unwrap();
            assert_eq!(fu.code(), code);
        }
        assert!(FlowUnits::from_code(6).is_none());
        assert!(FlowUnits::from_code(-1).is_none());
    }

    #[test]
    fn test_us_factors() {
        let units = Units::new(FlowUnits::Cfs);
        assert_eq!(units.system(), UnitSystem::Us);
        assert!((units.ucf(Quantity::Rainfall) - 43_200.0).abs() < 1e-10);
        assert!((units.ucf(Quantity::RainDepth) - 12.0).abs() < 1e-10);
        assert!((units.ucf(Quantity::Flow) - 1.0).abs() < 1e-10);
        // 1 ft² = 2.2956e-5 acre
        assert!((units.ucf(Quantity::LandArea) - 2.2956e-5).abs() < 1e-12);
    }

    #[test]
    fn test_si_factors() {
        let units = Units::new(FlowUnits::Lps);
        assert_eq!(units.system(), UnitSystem::Si);
        assert!((units.ucf(Quantity::Rainfall) - 1_097_280.0).abs() < 1e-6);
        assert!((units.ucf(Quantity::Length) - 0.3048).abs() < 1e-10);
        assert!((units.ucf(Quantity::Flow) - 28.317).abs() < 1e-10);
    }

    #[test]
    fn test_rainfall_factor_consistency() {
        // 1 ft/s 持续 1 小时 = 12 in/hr * 3600 s... 即 43200 in/hr
        // 验证 in/hr 与 mm/hr 因子比值为 25.4
        let us = Units::new(FlowUnits::Cfs).ucf(Quantity::Rainfall);
        let si = Units::new(FlowUnits::Cms).ucf(Quantity::Rainfall);
        assert!((si / us - 25.4).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_conversion() {
        let us = Units::new(FlowUnits::Cfs);
        let si = Units::new(FlowUnits::Cms);
        assert!((us.temperature(32.0) - 32.0).abs() < 1e-10);
        assert!(si.temperature(32.0).abs() < 1e-10);
        assert!((si.temperature(212.0) - 100.0).abs() < 1e-10);
    }
}
