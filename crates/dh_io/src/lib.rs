// crates/dh_io/src/lib.rs

//! DrainHydro IO 层
//!
//! 三种逐位对齐的小端二进制格式：
//!
//! - [`hotstart`]: 带版本的全量状态快照（续算用）
//! - [`results`]: 逐报告期定宽记录的结果文件，支持随机读取
//! - [`iface`]: 产流接口文件（逐步产流结果的存读）
//!
//! 所有编解码手写 `to_le_bytes`/`from_le_bytes`，不依赖结构体
//! 内存布局，不使用序列化框架。IO 失败置位项目粘性错误码并
//! 返回 [`IoError`]。

#![warn(clippy::all)]

pub mod error;
pub mod hotstart;
pub mod iface;
pub mod results;

pub use error::{IoError, IoResult};
pub use iface::RunoffIfaceFile;
pub use results::ResultsStore;
