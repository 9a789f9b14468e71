//! 错误处理模块
//!
//! 定义了引擎中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - **可恢复错误**：配置加载、后端初始化等，通过 `Result` 返回给调用者
//! - **致命错误**：同步核心内部的图形 API 调用失败（命令列表关闭、Fence 操作等），
//!   通过 [`gfx_check!`](crate::gfx_check) 记录诊断信息后立即终止
//!
//! 命令分配器不可用从来不是错误，池会直接创建新的分配器。

use std::fmt;

use thiserror::Error;

/// 引擎统一的 Result 类型
pub type Result<T> = std::result::Result<T, GfxError>;

/// 图形接口层的错误类型
#[derive(Debug, Error)]
pub enum GfxError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 设备创建失败
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// 资源（命令分配器、命令列表、Fence 等）创建失败
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// 命令列表执行失败
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// Fence 操作失败
    #[error("Fence operation failed: {0}")]
    Fence(String),

    /// 对象处于不允许该操作的状态
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 原生图形 API 调用失败
    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// 日志系统错误
    #[error("Log error: {0}")]
    Log(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl GfxError {
    /// 包装原生 API 调用的错误
    pub fn backend(operation: &'static str, message: impl fmt::Display) -> Self {
        GfxError::Backend {
            operation,
            message: message.to_string(),
        }
    }
}

/// 报告致命错误并终止
///
/// 由 [`gfx_check!`](crate::gfx_check) 调用。原生图形 API 的失败意味着驱动或
/// 运行环境已经不可用，不存在恢复路径。
#[cold]
#[inline(never)]
pub fn fatal(expression: &str, file: &str, line: u32, error: &dyn fmt::Display) -> ! {
    tracing::error!(
        target: "gfx_interface::fatal",
        expression,
        file,
        line,
        error = %error,
        "Fatal graphics API failure"
    );
    panic!("{file}:{line}: `{expression}` failed: {error}");
}

/// 检查图形 API 调用结果，失败时终止
///
/// 成功时返回 `Ok` 中的值；失败时记录失败的表达式、文件和行号，然后 panic。
///
/// ```ignore
/// let allocator = gfx_check!(backend.create_command_allocator(CommandListType::Direct));
/// ```
#[macro_export]
macro_rules! gfx_check {
    ($expr:expr) => {
        match $expr {
            ::core::result::Result::Ok(value) => value,
            ::core::result::Result::Err(error) => {
                $crate::core::error::fatal(stringify!($expr), file!(), line!(), &error)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GfxError::backend("ID3D12CommandQueue::Signal", "device removed");
        assert_eq!(err.to_string(), "ID3D12CommandQueue::Signal failed: device removed");

        let err: GfxError = ConfigError::InvalidValue {
            field: "workload.submit_threads".to_string(),
            reason: "must be greater than 0".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value for 'workload.submit_threads': must be greater than 0"
        );
    }

    #[test]
    fn test_gfx_check_passes_value_through() {
        let value: u64 = crate::gfx_check!(Ok::<u64, GfxError>(7));
        assert_eq!(value, 7);
    }

    #[test]
    #[should_panic(expected = "failed: Fence operation failed: lost")]
    fn test_gfx_check_halts_on_error() {
        let _: u64 = crate::gfx_check!(Err::<u64, GfxError>(GfxError::Fence("lost".to_string())));
    }
}
