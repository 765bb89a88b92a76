// crates/dh_physics/src/forcing/gage.rs

//! 雨量计
//!
//! 提供分段恒定的降雨强度时间序列。每条记录在
//! `[start, start + interval)` 内有效，区间外强度为零。
//! 产流步长选择依赖 [`Gage::next_rain_time_ms`] 给出的下一个
//! 强度变化时刻。

use dh_foundation::units::{Quantity, Units};

/// 雨量计
#[derive(Debug, Clone)]
pub struct Gage {
    /// 名称
    pub name: String,
    /// 降雨序列：（起始时刻 [ms]，强度 [ft/s]），按时刻升序
    pub series: Vec<(f64, f64)>,
    /// 记录有效时长 [ms]
    pub interval_ms: f64,
    /// 当前降雨强度 [ft/s]
    pub rainfall: f64,
    /// 报告期降雨强度（用户单位）
    pub report_rainfall: f64,
    /// 是否被子汇水区引用
    pub is_used: bool,
}

impl Gage {
    /// 创建雨量计
    pub fn new(name: String, series: Vec<(f64, f64)>, interval_ms: f64) -> Self {
        Self {
            name,
            series,
            interval_ms,
            rainfall: 0.0,
            report_rainfall: 0.0,
            is_used: false,
        }
    }

    /// 按当前时刻更新降雨强度
    pub fn set_state(&mut self, elapsed_ms: f64) {
        self.rainfall = 0.0;
        for &(start, intensity) in &self.series {
            if elapsed_ms >= start && elapsed_ms < start + self.interval_ms {
                self.rainfall = intensity;
                break;
            }
            if start > elapsed_ms {
                break;
            }
        }
    }

    /// 当前降水拆分为雨与雪 [ft/s]
    ///
    /// 气温低于雨雪分界温度时全部按雪计。
    pub fn get_precip(&self, air_temp: f64, snow_temp: f64) -> (f64, f64) {
        if air_temp <= snow_temp {
            (0.0, self.rainfall)
        } else {
            (self.rainfall, 0.0)
        }
    }

    /// 下一个降雨强度变化时刻 [ms]
    ///
    /// 返回当前时刻之后最近的记录起点或终点；没有后续变化时返回
    /// `f64::MAX`。
    pub fn next_rain_time_ms(&self, elapsed_ms: f64) -> f64 {
        let mut next = f64::MAX;
        for &(start, _) in &self.series {
            let end = start + self.interval_ms;
            if start > elapsed_ms {
                next = next.min(start);
                break;
            }
            if end > elapsed_ms {
                next = next.min(end);
            }
        }
        next
    }

    /// 更新报告期降雨强度（用户单位）
    pub fn set_report_rainfall(&mut self, units: &Units) {
        self.report_rainfall = self.rainfall * units.ucf(Quantity::Rainfall);
    }
}
