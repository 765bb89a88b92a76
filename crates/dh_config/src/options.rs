// crates/dh_config/src/options.rs

//! 模拟选项
//!
//! 定义一次模拟运行的所有控制参数，使用 serde 序列化以便
//! 从 JSON 项目文件加载。时间步长以秒为单位存储。

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use dh_foundation::units::FlowUnits;

use crate::error::ConfigError;

/// 流量演算模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingModel {
    /// 恒定流演算（瞬时传播）
    Steady,
    /// 运动波演算
    #[default]
    KinematicWave,
    /// 动力波演算（外部求解器）
    DynamicWave,
}

/// 接口文件模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    /// 读取既有文件替代计算
    Use,
    /// 计算并保存
    Save,
}

/// 接口文件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceFile {
    /// 模式
    pub mode: FileMode,
    /// 文件路径
    pub path: PathBuf,
}

/// 蒸发配置
///
/// 速率以用户单位给出（in/day 或 mm/day），构建时换算为 ft/s。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvapOptions {
    /// 恒定蒸发速率 [in/day 或 mm/day]
    #[serde(default)]
    pub rate: f64,
    /// 逐月蒸发速率（给出时覆盖恒定速率）
    #[serde(default)]
    pub monthly: Option<[f64; 12]>,
    /// 仅在无雨期蒸发
    #[serde(default)]
    pub dry_only: bool,
}

impl Default for EvapOptions {
    fn default() -> Self {
        Self {
            rate: 0.0,
            monthly: None,
            dry_only: false,
        }
    }
}

/// 模拟选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimOptions {
    /// 流量单位（同时决定单位制）
    #[serde(default)]
    pub flow_units: FlowUnits,

    /// 流量演算模型
    #[serde(default)]
    pub routing_model: RoutingModel,

    /// 模拟起始时刻
    pub start_date: NaiveDateTime,

    /// 模拟结束时刻
    pub end_date: NaiveDateTime,

    /// 报告起始时刻（缺省为模拟起始）
    #[serde(default)]
    pub report_start: Option<NaiveDateTime>,

    /// 报告步长 [s]
    #[serde(default = "default_report_step")]
    pub report_step: u32,

    /// 降雨期产流步长 [s]
    #[serde(default = "default_wet_step")]
    pub wet_step: u32,

    /// 无雨期产流步长 [s]
    #[serde(default = "default_dry_step")]
    pub dry_step: u32,

    /// 管网演算步长 [s]
    #[serde(default = "default_routing_step")]
    pub routing_step: f64,

    /// 允许节点积水
    #[serde(default)]
    pub allow_ponding: bool,

    /// 忽略融雪计算
    #[serde(default)]
    pub ignore_snowmelt: bool,

    /// 忽略地下水计算
    #[serde(default)]
    pub ignore_gwater: bool,

    /// 忽略水质计算
    #[serde(default)]
    pub ignore_quality: bool,

    /// 忽略管网演算（仅产流）
    #[serde(default)]
    pub ignore_routing: bool,

    /// 蒸发配置
    #[serde(default)]
    pub evap: EvapOptions,

    /// 气温 [°F 或 °C，按单位制]
    #[serde(default = "default_air_temp")]
    pub air_temp: f64,

    /// 雨雪分界气温 [°F 或 °C]
    #[serde(default = "default_snow_temp")]
    pub snow_temp: f64,

    /// 读取热启动文件
    #[serde(default)]
    pub hotstart_use: Option<PathBuf>,

    /// 保存热启动文件
    #[serde(default)]
    pub hotstart_save: Option<PathBuf>,

    /// 产流接口文件
    #[serde(default)]
    pub runoff_file: Option<InterfaceFile>,

    /// 二进制结果文件
    #[serde(default)]
    pub results_file: Option<PathBuf>,
}

fn default_report_step() -> u32 {
    900
}
fn default_wet_step() -> u32 {
    300
}
fn default_dry_step() -> u32 {
    3600
}
fn default_routing_step() -> f64 {
    20.0
}
fn default_air_temp() -> f64 {
    70.0
}
fn default_snow_temp() -> f64 {
    34.0
}

impl SimOptions {
    /// 模拟总时长 [ms]
    pub fn total_duration_ms(&self) -> f64 {
        (self.end_date - self.start_date).num_milliseconds() as f64
    }

    /// 校验选项自洽性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end_date <= self.start_date {
            return Err(ConfigError::InvalidValue {
                key: "end_date".to_string(),
                value: self.end_date.to_string(),
                reason: "结束时刻必须晚于起始时刻".to_string(),
            });
        }
        if self.report_step == 0 {
            return Err(ConfigError::InvalidValue {
                key: "report_step".to_string(),
                value: "0".to_string(),
                reason: "必须为正".to_string(),
            });
        }
        if self.wet_step == 0 || self.dry_step == 0 {
            return Err(ConfigError::InvalidValue {
                key: "wet_step/dry_step".to_string(),
                value: "0".to_string(),
                reason: "必须为正".to_string(),
            });
        }
        if self.routing_step <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "routing_step".to_string(),
                value: self.routing_step.to_string(),
                reason: "必须为正".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn opts() -> SimOptions {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 6, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        serde_json::from_value(serde_json::json!({
            "start_date": start,
            "end_date": end,
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let o = opts();
        assert_eq!(o.report_step, 900);
        assert_eq!(o.wet_step, 300);
        assert_eq!(o.dry_step, 3600);
        assert_eq!(o.routing_model, RoutingModel::KinematicWave);
        assert!(!o.allow_ponding);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn test_total_duration() {
        let o = opts();
        assert!((o.total_duration_ms() - 86_400_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_reversed_dates() {
        let mut o = opts();
        std::mem::swap(&mut o.start_date, &mut o.end_date);
        assert!(o.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_steps() {
        let mut o = opts();
        o.report_step = 0;
        assert!(o.validate().is_err());
    }
}
