//! 同步核心模块
//!
//! 与具体图形 API 无关的命令队列 / Fence / 命令分配器回收子系统。
//! 保证命令分配器不会在 GPU 仍可能引用它时被重用，同时不让 CPU 做不必要的等待。
//!
//! # 组成（自底向上）
//!
//! - `sync`：Fence 值与 Fence 计数器
//! - `allocator_pool`：按 Fence 完成情况回收命令分配器
//! - `command_queue`：提交命令列表、发出 Fence 值、等待与跨队列 stall
//! - `device`：拥有 Direct / Compute / Copy 三个队列
//! - `command`：命令列表类型与记录上下文
//!
//! # 控制流
//!
//! ```text
//! request_allocator ──> 记录命令 ──> execute_command_list ──> Fence 值
//!        ▲                                                     │
//!        └──────── GPU 越过该值后回收 <── discard_allocator <───┘
//! ```

pub mod sync;
pub mod allocator_pool;
pub mod command_queue;
pub mod device;
pub mod command;

pub use allocator_pool::{CommandAllocatorHandle, CommandAllocatorPool};
pub use command::{CommandContext, CommandListType};
pub use command_queue::CommandQueue;
pub use device::Device;
pub use sync::{FenceCounter, FenceValue};
