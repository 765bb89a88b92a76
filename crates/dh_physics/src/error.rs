// crates/dh_physics/src/error.rs

//! 引擎错误类型
//!
//! 错误分两层：[`ErrorCode`] 是写入项目上下文的粘性错误码
//! （与二进制结果文件尾记录的终止码对应），[`EngineError`] 是
//! 带上下文信息的错误值，沿调用栈向上传播。
//!
//! 粘性语义：任何核心操作在入口检查项目错误码，已置位则直接
//! 短路返回；告警只累加计数，从不置位错误码。

use dh_foundation::DhError;

/// 引擎结果类型别名
pub type EngineResult<T> = Result<T, EngineError>;

/// 粘性错误码
///
/// 分四类：校验错误（阻止进入模拟循环）、IO 错误、数值错误、
/// 资源错误。数字码写入结果文件尾记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 热启动文件无法打开
    HotstartFileOpen,
    /// 热启动文件格式不符
    HotstartFileFormat,
    /// 热启动文件读取失败（NaN 或截断）
    HotstartFileRead,
    /// 结果文件写入失败
    OutWrite,
    /// 结果文件无法打开
    OutFile,
    /// 结果文件尺寸超出可寻址范围
    FileSize,
    /// 内存分配失败
    Memory,
    /// 常微分方程求解失败
    OdeSolver,
    /// 产流接口文件无法打开
    RunoffFileOpen,
    /// 产流接口文件格式不符
    RunoffFileFormat,
    /// 产流接口文件记录耗尽
    RunoffFileEnd,
    /// 产流接口文件读取失败
    RunoffFileRead,
    /// 非法时间步长
    Timestep,
    /// 分流器出流管段数超限
    Divider,
    /// 排放口连接管段数超限
    Outfall,
    /// 普通节点多出流管段
    MultiOutlet,
    /// 虚拟管段连接不合法
    DummyLink,
    /// 管网没有排放口
    NoOutlets,
    /// 管道坡度为负
    Slope,
    /// 调节管段未从调蓄节点引出
    Regulator,
}

impl ErrorCode {
    /// 写入结果文件尾记录的数字码
    pub fn code(self) -> i32 {
        match self {
            // 校验类（1xx）
            ErrorCode::Divider => 141,
            ErrorCode::Outfall => 142,
            ErrorCode::MultiOutlet => 143,
            ErrorCode::DummyLink => 144,
            ErrorCode::NoOutlets => 145,
            ErrorCode::Slope => 146,
            ErrorCode::Regulator => 147,
            // 数值类（2xx）
            ErrorCode::OdeSolver => 201,
            ErrorCode::Timestep => 202,
            // 资源类（3xx）
            ErrorCode::Memory => 300,
            ErrorCode::FileSize => 301,
            // IO 类（4xx）
            ErrorCode::HotstartFileOpen => 401,
            ErrorCode::HotstartFileFormat => 402,
            ErrorCode::HotstartFileRead => 403,
            ErrorCode::OutFile => 411,
            ErrorCode::OutWrite => 412,
            ErrorCode::RunoffFileOpen => 421,
            ErrorCode::RunoffFileFormat => 422,
            ErrorCode::RunoffFileEnd => 423,
            ErrorCode::RunoffFileRead => 424,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// 引擎错误
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 携带粘性错误码的引擎错误
    #[error("引擎错误 {code}: {message}")]
    Engine {
        /// 粘性错误码
        code: ErrorCode,
        /// 出错对象或上下文
        message: String,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] dh_config::ConfigError),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// 创建带错误码的引擎错误
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Engine {
            code,
            message: message.into(),
        }
    }

    /// 取出粘性错误码（非引擎类错误返回 None）
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<EngineError> for DhError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Io(e) => DhError::io_with_source("引擎 IO 失败", e),
            other => DhError::internal(other.to_string()),
        }
    }
}
