// crates/dh_foundation/src/consts.rs

//! 共享数值常量
//!
//! 与原型引擎保持一致的容差与物理常数。这些值参与二进制结果的
//! 逐位对齐，修改任何一个都会破坏与既有结果文件的可比性。

/// 曼宁公式系数（美制）
pub const MCOEFF: f64 = 1.49;

/// 曼宁公式中水深的指数 (5/3)
pub const MEXP: f64 = 1.666_666_7;

/// 常微分方程求解容差
pub const ODETOL: f64 = 1.0e-4;

/// 通用小量：体积、溢流速率低于此值视为零 [ft³ / cfs]
pub const FUDGE: f64 = 1.0e-4;

/// 安全除法阈值
pub const TINY: f64 = 1.0e-6;

/// 水深比较零阈值 [ft]
pub const ZERO: f64 = 1.0e-10;

/// 地表径流报告平滑阈值 [ft/s]
pub const MIN_RUNOFF: f64 = 1.0e-8;

/// 升每立方英尺
pub const LPER_FT3: f64 = 28.317;

/// 结果文件最大可寻址字节数（32 位文件指针）
pub const MAX_FILE_SIZE: f64 = 2_147_483_647.0;

/// 缺失值标记
pub const MISSING: f64 = -1.0e10;
