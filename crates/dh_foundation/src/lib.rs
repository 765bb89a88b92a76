// crates/dh_foundation/src/lib.rs

//! DrainHydro Foundation Layer
//!
//! 基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一基础错误类型
//! - [`units`]: 单位制与内部/用户单位换算
//! - [`consts`]: 与原型引擎逐位对齐的数值常量
//!
//! # 设计原则
//!
//! 1. **纯净性**: 不引入任何引擎或水文业务概念
//! 2. **可转换性**: 所有高层错误最终可转换为 [`DhError`]
//! 3. **逐位对齐**: 单位换算因子与数值常量参与二进制格式兼容

#![warn(clippy::all)]

pub mod consts;
pub mod error;
pub mod units;

// 重导出常用类型
pub use error::{DhError, DhResult};
pub use units::{FlowUnits, Quantity, UnitSystem, Units};
