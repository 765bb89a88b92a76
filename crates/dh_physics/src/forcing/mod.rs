// crates/dh_physics/src/forcing/mod.rs

//! 外部驱动数据
//!
//! 雨量计与气候状态。两者都以“当前值 + 下一变化时刻”的形式
//! 被产流步长选择消费。

pub mod climate;
pub mod gage;

pub use climate::Climate;
pub use gage::Gage;
