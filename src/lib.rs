//! GfxInterface - GPU 命令提交与同步核心
//!
//! 管理每个队列类型（Direct、Compute、Copy）的命令队列、单调递增的 Fence 值
//! 以及按 Fence 完成情况回收的命令分配器池。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（日志、配置、错误处理）
//! - `gfx`: 图形后端抽象层（软件模拟后端、DirectX 12）
//! - `renderer`: 同步核心（Fence、分配器池、命令队列、设备、命令上下文）
//!
//! # 使用示例
//!
//! ```no_run
//! use gfx_interface::gfx::SoftwareBackend;
//! use gfx_interface::renderer::{CommandContext, Device};
//!
//! let device = Device::new(SoftwareBackend::new());
//!
//! let mut context = CommandContext::begin(device.graphics_queue());
//! context.list_mut().record(|| println!("executed on the GPU timeline"));
//! let fence_value = context.finish(false);
//!
//! device.wait_for_fence(fence_value);
//! assert!(device.is_fence_complete(fence_value));
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
