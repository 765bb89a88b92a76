// crates/dh_physics/src/forcing/climate.rs

//! 气候状态
//!
//! 维护潜在蒸发速率与气温。完整的气候文件处理与温度时间序列
//! 属于外部协作者，此处实现引擎消费的接口子集：恒定或逐月蒸发
//! 速率、下一次蒸发变化时刻、雨雪分界温度。

use chrono::{Datelike, NaiveDateTime};

/// 气候状态
#[derive(Debug, Clone)]
pub struct Climate {
    /// 当前潜在蒸发速率 [ft/s]
    pub evap_rate: f64,
    /// 逐月蒸发速率 [ft/s]（给出时覆盖恒定速率）
    pub monthly_evap: Option<[f64; 12]>,
    /// 恒定蒸发速率 [ft/s]
    pub constant_evap: f64,
    /// 仅在无雨期蒸发
    pub dry_only: bool,
    /// 气温 [°F]
    pub air_temp: f64,
    /// 雨雪分界气温 [°F]
    pub snow_temp: f64,
}

impl Climate {
    /// 创建气候状态
    pub fn new(constant_evap: f64, monthly_evap: Option<[f64; 12]>, dry_only: bool) -> Self {
        Self {
            evap_rate: constant_evap,
            monthly_evap,
            constant_evap,
            dry_only,
            air_temp: 70.0,
            snow_temp: 34.0,
        }
    }

    /// 按当前日期更新蒸发速率
    pub fn set_state(&mut self, date: NaiveDateTime) {
        self.evap_rate = match &self.monthly_evap {
            Some(rates) => rates[date.month0() as usize],
            None => self.constant_evap,
        };
    }

    /// 下一次蒸发速率变化时刻
    ///
    /// 逐月速率在次月月初变化；恒定速率永不变化，返回 None。
    pub fn next_evap_date(&self, date: NaiveDateTime) -> Option<NaiveDateTime> {
        self.monthly_evap.as_ref()?;
        let (year, month) = if date.month() == 12 {
            (date.year() + 1, 1)
        } else {
            (date.year(), date.month() + 1)
        };
        chrono::NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.and_hms_opt(0, 0, 0).unwrap())
    }
}
