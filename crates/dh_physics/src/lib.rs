// crates/dh_physics/src/lib.rs

//! DrainHydro 引擎核心
//!
//! 城市雨洪产流与排水管网演算引擎：给定雨量计、子汇水区与
//! 管网描述，按离散时间步推进模拟，产出每个子汇水区的径流和
//! 每个节点、管段的流量、水深与蓄量。
//!
//! # 模块概览
//!
//! - [`project`]: 项目上下文（对象目录、时钟、粘性错误）
//! - [`objects`]: 子汇水区、节点、管段、断面
//! - [`runoff`]: 产流引擎与步进控制器
//! - [`routing`]: 管网流量演算（恒定流 / 运动波 / 动力波接缝）
//! - [`forcing`]: 雨量计与气候驱动
//! - [`couplers`]: 入渗 / 地下水 / 积雪 / LID 接缝
//! - [`massbal`]: 质量平衡记账
//!
//! # 设计原则
//!
//! 1. **显式上下文**: 单一 [`project::Project`] 以 `&mut` 贯穿
//!    所有调用，无隐藏静态状态
//! 2. **双缓冲状态**: 每步 old/new 翻转，步内 old 只读
//! 3. **确定性顺序**: 子汇水区按目录序，管段按拓扑序，调蓄
//!    迭代先于其下游管段

#![warn(clippy::all)]

pub mod couplers;
pub mod error;
pub mod forcing;
pub mod massbal;
pub mod objects;
pub mod project;
pub mod routing;
pub mod runoff;

pub use error::{EngineError, EngineResult, ErrorCode};
pub use project::{Clock, IfaceMode, Project};
pub use routing::FlowRouting;
