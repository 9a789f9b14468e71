//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//!
//! 同步核心在各级别输出的内容：
//!
//! - `debug`：新建命令分配器、队列创建与销毁
//! - `trace`：分配器回收、Fence 等待、跨队列 stall
//! - `error`：致命的图形 API 失败（见 [`gfx_check!`](crate::gfx_check)）
//!
//! ```no_run
//! use gfx_interface::core::{config::LogLevel, log};
//!
//! log::init_logger(LogLevel::Debug, true, Some("logs/gfx.log")).unwrap();
//! tracing::info!(queue = "Direct", fence = 42, "Submitted");
//! ```

use std::path::Path;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::config::LogLevel;
use super::error::{GfxError, Result};

/// 初始化日志系统
///
/// 必须在程序开始时调用一次，重复调用返回 [`GfxError::Log`]。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否同时输出到文件（按天滚动）
/// * `log_file_path` - 日志文件路径（默认为 "gfx_interface.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) -> Result<()> {
    let filter = EnvFilter::new(filter_directive(level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(true);

    let file_layer = if file_output {
        let log_path = log_file_path.unwrap_or("gfx_interface.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("gfx_interface.log");

        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, filename);

        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false) // 文件不需要 ANSI 颜色
                .with_writer(file_appender),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| GfxError::Log(e.to_string()))
}

fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(filter_directive(LogLevel::Trace), "trace");
    }

    #[test]
    fn test_second_init_is_an_error() {
        // 测试进程内可能已有其他测试安装了订阅者，只验证第二次一定失败
        let _ = init_logger(LogLevel::Warn, false, None);
        assert!(matches!(init_logger(LogLevel::Warn, false, None), Err(GfxError::Log(_))));
    }
}
