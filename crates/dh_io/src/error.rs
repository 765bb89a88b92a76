// crates/dh_io/src/error.rs

//! IO 层错误类型
//!
//! IO 失败同时做两件事：向调用方返回 [`IoError`]，并把对应的
//! 粘性错误码写入项目上下文（引擎据此短路后续工作）。

use dh_foundation::DhError;

/// IO 模块结果类型别名
pub type IoResult<T> = Result<T, IoError>;

/// IO 错误枚举
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// 文件无法打开
    #[error("文件无法打开: {path}")]
    Open {
        /// 文件路径
        path: String,
        /// 底层错误
        #[source]
        source: std::io::Error,
    },

    /// 文件格式不符
    #[error("文件格式不符: {0}")]
    Format(String),

    /// 读取失败（截断或 NaN）
    #[error("文件读取失败: {0}")]
    Read(String),

    /// 写入失败
    #[error("文件写入失败: {0}")]
    Write(String),

    /// 结果文件尺寸超出可寻址范围
    #[error("结果文件尺寸超出上限: 预计 {projected} 字节")]
    SizeLimit {
        /// 预计尺寸
        projected: f64,
    },

    /// 底层 IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IoError> for DhError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Open { path, source } => {
                DhError::io_with_source(format!("文件无法打开: {}", path), source)
            }
            IoError::Io(e) => DhError::io_with_source("IO 操作失败", e),
            other => DhError::io(other.to_string()),
        }
    }
}
