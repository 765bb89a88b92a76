// crates/dh_physics/src/routing/dynwave.rs

//! 动力波求解器接缝
//!
//! 圣维南方程组的动量迭代、节点冠顶高程预计算与变步长选择全部
//! 属于外部求解器；核心只在演算模型为动力波时委托。未注册求解
//! 器而选择动力波模型时在初始化阶段失败。

use crate::error::{EngineError, EngineResult};
use crate::project::Project;

/// 动力波求解器契约
pub trait DynWaveSolver {
    /// 初始化（冠顶高程等预计算）
    fn init(&mut self, prj: &mut Project) -> EngineResult<()>;

    /// 释放内部资源
    fn close(&mut self, prj: &mut Project);

    /// 给定用户步长上限，返回本步实际采用的变步长 [s]
    fn routing_step(&mut self, prj: &Project, fixed_step: f64) -> f64;

    /// 推进一个演算步，返回内部计算步数
    fn execute(&mut self, prj: &mut Project, tstep: f64) -> EngineResult<usize>;
}

/// 未注册求解器时的占位实现
pub struct NullDynWave;

impl DynWaveSolver for NullDynWave {
    fn init(&mut self, _prj: &mut Project) -> EngineResult<()> {
        Err(EngineError::Config(dh_config::ConfigError::Missing(
            "动力波求解器未注册".to_string(),
        )))
    }

    fn close(&mut self, _prj: &mut Project) {}

    fn routing_step(&mut self, _prj: &Project, fixed_step: f64) -> f64 {
        fixed_step
    }

    fn execute(&mut self, _prj: &mut Project, _tstep: f64) -> EngineResult<usize> {
        Ok(0)
    }
}
