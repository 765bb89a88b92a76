// crates/dh_config/src/lib.rs

//! DrainHydro 配置层
//!
//! 定义项目描述与模拟选项的 serde 模型。所有数值以用户单位存储，
//! 由 `dh_physics` 的构建器换算为内部单位。
//!
//! # 模块概览
//!
//! - [`options`]: 模拟选项（时间步长、演算模型、接口文件）
//! - [`project`]: 对象目录描述（雨量计、子汇水区、节点、管段）
//! - [`error`]: 配置错误

#![warn(clippy::all)]

pub mod error;
pub mod options;
pub mod project;

pub use error::ConfigError;
pub use options::{EvapOptions, FileMode, InterfaceFile, RoutingModel, SimOptions};
pub use project::{
    ConcUnits, DividerKind, GageConfig, GroundwaterConfig, InfilConfig, LandUseConfig,
    LinkConfig, LinkKindConfig, NodeConfig, NodeKindConfig, OutletRef, PollutantConfig,
    ProjectConfig, StorageCurveConfig, SubareaRouting, SubcatchConfig, XsectConfig,
};
