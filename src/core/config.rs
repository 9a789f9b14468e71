//! 配置管理模块
//!
//! 提供配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [gpu]
//! backend = "software"    # 或 "dx12"（仅 Windows）
//! debug_layer = true
//!
//! [software]
//! execution_delay_us = 0  # 模拟 GPU 执行每个命令列表的耗时
//!
//! [logging]
//! level = "info"          # trace, debug, info, warn, error
//! file_output = false
//!
//! [workload]
//! submit_threads = 4
//! submissions_per_thread = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, Result};

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// GPU 后端配置
    #[serde(default)]
    pub gpu: GpuConfig,

    /// 软件后端配置
    #[serde(default)]
    pub software: SoftwareConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 演示负载配置
    #[serde(default)]
    pub workload: WorkloadConfig,
}

/// GPU 后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 是否启用原生调试层（仅 DX12 生效）
    #[serde(default = "default_debug_layer")]
    pub debug_layer: bool,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// CPU 模拟的 GPU（所有平台可用）
    Software,
    /// DirectX 12 后端
    Dx12,
}

/// 软件后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareConfig {
    /// 每个命令列表的模拟执行时间（微秒）
    #[serde(default)]
    pub execution_delay_us: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// 演示负载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// 并发提交线程数
    #[serde(default = "default_submit_threads")]
    pub submit_threads: usize,

    /// 每个线程的提交次数
    #[serde(default = "default_submissions")]
    pub submissions_per_thread: usize,
}

// 默认值函数
fn default_backend() -> GraphicsBackend { GraphicsBackend::Software }
fn default_debug_layer() -> bool { cfg!(debug_assertions) }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_file() -> String { "gfx_interface.log".to_string() }
fn default_submit_threads() -> usize { 4 }
fn default_submissions() -> usize { 64 }

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            debug_layer: default_debug_layer(),
        }
    }
}

impl Default for SoftwareConfig {
    fn default() -> Self {
        Self { execution_delay_us: 0 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_file: default_log_file(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            submit_threads: default_submit_threads(),
            submissions_per_thread: default_submissions(),
        }
    }
}

impl SoftwareConfig {
    /// 模拟执行时间
    pub fn execution_delay(&self) -> Duration {
        Duration::from_micros(self.execution_delay_us)
    }
}

impl Config {
    /// 从配置文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在或无法解析则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--dx12`: 使用 DirectX 12 后端
    /// - `--software`: 使用软件后端
    /// - `--threads <value>`: 提交线程数
    /// - `--submissions <value>`: 每个线程的提交次数
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--dx12") {
            self.gpu.backend = GraphicsBackend::Dx12;
        }

        if args.iter().any(|a| a == "--software") {
            self.gpu.backend = GraphicsBackend::Software;
        }

        if let Some(threads) = parse_flag(&args, "--threads") {
            self.workload.submit_threads = threads;
        }

        if let Some(submissions) = parse_flag(&args, "--submissions") {
            self.workload.submissions_per_thread = submissions;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.workload.submit_threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workload.submit_threads".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.workload.submissions_per_thread == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workload.submissions_per_thread".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.gpu.backend == GraphicsBackend::Dx12 && !cfg!(target_os = "windows") {
            return Err(ConfigError::InvalidValue {
                field: "gpu.backend".to_string(),
                reason: "DirectX 12 backend is only available on Windows".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

fn parse_flag(args: &[String], flag: &str) -> Option<usize> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Software => "Software",
            GraphicsBackend::Dx12 => "DirectX 12",
        }
    }
}
