// crates/dh_config/src/error.rs

//! 配置层错误类型

use dh_foundation::DhError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 引用了不存在的对象
    #[error("未知对象引用: {kind} '{name}'")]
    UnknownReference {
        /// 对象类别
        kind: &'static str,
        /// 被引用名称
        name: String,
    },

    /// 缺失配置
    #[error("缺失配置: {0}")]
    Missing(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<ConfigError> for DhError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => DhError::io_with_source("读取配置失败", e),
            other => DhError::invalid_input(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "wet_step".to_string(),
            value: "-1".to_string(),
            reason: "必须为正".to_string(),
        };
        assert!(err.to_string().contains("wet_step"));
    }

    #[test]
    fn test_unknown_reference_display() {
        let err = ConfigError::UnknownReference {
            kind: "节点",
            name: "J99".to_string(),
        };
        assert!(err.to_string().contains("J99"));
    }
}
