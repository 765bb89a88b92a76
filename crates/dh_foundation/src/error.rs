// crates/dh_foundation/src/error.rs

//! 基础错误类型
//!
//! 定义整个项目的基础错误类型，仅包含与基础设施相关的错误。
//! 本层禁止引入任何引擎或业务领域概念。
//!
//! # 错误分层
//!
//! ```text
//! 引擎错误 (dh_physics::EngineError)
//!        ↓ (转换)
//! IO 错误 (dh_io::IoError)
//!        ↓ (转换)
//! 配置错误 (dh_config::ConfigError)
//!        ↓ (转换)
//! 基础错误 ← 你在这里 (dh_foundation::DhError)
//! ```

use std::{fmt, io, path::PathBuf};

/// 统一结果类型别名
///
/// 用于简化函数签名，等价于 `Result<T, DhError>`。
pub type DhResult<T> = Result<T, DhError>;

/// Foundation 层基础错误
///
/// 包含所有基础设施级别的错误，是错误体系的根基。
/// 高层错误通过转换为 [`DhError::Internal`] 或具体的基础错误向下兼容。
#[derive(Debug)]
pub enum DhError {
    /// IO 操作失败
    Io {
        /// 描述性错误信息
        message: String,
        /// 底层 IO 错误源
        source: Option<io::Error>,
    },

    /// 文件不存在
    FileNotFound {
        /// 未找到的文件路径
        path: PathBuf,
    },

    /// 输入数据验证失败
    ///
    /// 用于参数校验、前置条件检查等场景。
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 数组或集合大小不匹配
    SizeMismatch {
        /// 数据名称（用于调试）
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 内部实现错误
    ///
    /// 当程序进入不应到达的状态时使用，通常表示不变量被破坏。
    Internal {
        /// 内部错误描述
        message: String,
    },

    /// 功能未实现
    NotImplemented {
        /// 未实现的功能描述
        feature: String,
    },
}

// ============================================================================
// 便捷构造方法
// ============================================================================

impl DhError {
    /// 创建 IO 错误
    #[inline]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源的 IO 错误
    ///
    /// 当需要保留底层 [`std::io::Error`] 时使用。
    #[inline]
    pub fn io_with_source(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 创建文件未找到错误
    #[inline]
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// 创建无效输入错误
    #[inline]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 创建大小不匹配错误
    #[inline]
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 创建内部错误
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 创建功能未实现错误
    #[inline]
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
        }
    }

    /// 验证数组大小是否匹配，不匹配则返回 [`DhError::SizeMismatch`]
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> DhResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// 标准库错误转换实现
// ============================================================================

impl From<io::Error> for DhError {
    /// 将 [`std::io::Error`] 转换为 [`DhError::Io`]
    fn from(err: io::Error) -> Self {
        Self::io_with_source("IO 操作失败", err)
    }
}

// ============================================================================
// 核心 Trait 实现
// ============================================================================

impl fmt::Display for DhError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { message, .. } => write!(f, "IO错误: {}", message),
            Self::FileNotFound { path } => {
                write!(f, "文件不存在: {}", path.display())
            }
            Self::InvalidInput { message } => write!(f, "无效的输入数据: {}", message),
            Self::SizeMismatch {
                name,
                expected,
                actual,
            } => {
                write!(f, "数组大小不匹配: {} 期望{}, 实际{}", name, expected, actual)
            }
            Self::Internal { message } => write!(f, "内部错误: {}", message),
            Self::NotImplemented { feature } => write!(f, "功能未实现: {}", feature),
        }
    }
}

impl std::error::Error for DhError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => source.as_ref().map(|e| e as _),
            _ => None,
        }
    }
}

// ============================================================================
// 测试
// ============================================================================
