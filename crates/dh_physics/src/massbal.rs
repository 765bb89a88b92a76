// crates/dh_physics/src/massbal.rs

//! 质量平衡记账
//!
//! 产流侧与演算侧各维护一套体积累计量，供连续性误差检验与
//! 结果文件的系统级变量使用。`StepFlowTotals` 保存当前演算步
//! 的瞬时流量，用于报告期写出。

/// 产流侧体积类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunoffQuantity {
    /// 降水体积
    Rainfall,
    /// 蒸发体积
    Evap,
    /// 入渗体积
    Infil,
    /// 径流体积
    Runoff,
    /// 排放口回灌体积
    Runon,
}

/// 产流侧体积累计 [ft³]
#[derive(Debug, Clone, Copy, Default)]
pub struct RunoffTotals {
    /// 降水
    pub rainfall: f64,
    /// 蒸发
    pub evap: f64,
    /// 入渗
    pub infil: f64,
    /// 径流
    pub runoff: f64,
    /// 排放口回灌
    pub runon: f64,
    /// 初始地表蓄水
    pub init_storage: f64,
    /// 末期地表蓄水
    pub final_storage: f64,
}

impl RunoffTotals {
    /// 产流侧连续性误差（相对值）
    ///
    /// 输入 = 降水 + 回灌 + 初始蓄水；
    /// 输出 = 蒸发 + 入渗 + 径流 + 末期蓄水。
    pub fn continuity_error(&self) -> f64 {
        let inflow = self.rainfall + self.runon + self.init_storage;
        let outflow = self.evap + self.infil + self.runoff + self.final_storage;
        if inflow <= 0.0 {
            return 0.0;
        }
        (inflow - outflow) / inflow
    }
}

/// 当前演算步的瞬时流量 [cfs]
#[derive(Debug, Clone, Copy, Default)]
pub struct StepFlowTotals {
    /// 旱季污水入流
    pub dw_inflow: f64,
    /// 地下水入流
    pub gw_inflow: f64,
    /// 入流入渗
    pub ii_inflow: f64,
    /// 外部直接入流
    pub ex_inflow: f64,
    /// 溢流（内涝）
    pub flooding: f64,
    /// 排放口出流
    pub outflow: f64,
}

/// 演算侧体积累计 [ft³]
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowTotals {
    /// 湿天入流（子汇水区径流）
    pub wet_inflow: f64,
    /// 溢流
    pub flooding: f64,
    /// 排放口出流
    pub outflow: f64,
    /// 蒸发与渗漏损失
    pub losses: f64,
    /// 初始管网蓄水
    pub init_storage: f64,
    /// 末期管网蓄水
    pub final_storage: f64,
    /// 当前步瞬时流量
    pub step: StepFlowTotals,
}

/// 质量平衡账本
#[derive(Debug, Clone, Copy, Default)]
pub struct MassBalance {
    /// 产流侧
    pub runoff: RunoffTotals,
    /// 演算侧
    pub flow: FlowTotals,
}

impl MassBalance {
    /// 累计产流侧体积
    pub fn update_runoff_totals(&mut self, q: RunoffQuantity, volume: f64) {
        match q {
            RunoffQuantity::Rainfall => self.runoff.rainfall += volume,
            RunoffQuantity::Evap => self.runoff.evap += volume,
            RunoffQuantity::Infil => self.runoff.infil += volume,
            RunoffQuantity::Runoff => self.runoff.runoff += volume,
            RunoffQuantity::Runon => self.runoff.runon += volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_runoff_totals() {
        let mut mb = MassBalance::default();
        mb.update_runoff_totals(RunoffQuantity::Rainfall, 100.0);
        mb.update_runoff_totals(RunoffQuantity::Rainfall, 50.0);
        mb.update_runoff_totals(RunoffQuantity::Evap, 10.0);
        assert!((mb.runoff.rainfall - 150.0).abs() < 1e-12);
        assert!((mb.runoff.evap - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_continuity_error_balanced() {
        let totals = RunoffTotals {
            rainfall: 100.0,
            evap: 10.0,
            infil: 20.0,
            runoff: 60.0,
            runon: 0.0,
            init_storage: 0.0,
            final_storage: 10.0,
        };
        assert!(totals.continuity_error().abs() < 1e-12);
    }

    #[test]
    fn test_continuity_error_zero_inflow() {
        let totals = RunoffTotals::default();
        assert_eq!(totals.continuity_error(), 0.0);
    }
}
