//! 图形后端的统一抽象接口
//!
//! 同步核心只通过本模块的 trait 访问原生图形 API。每个后端（DirectX 12、软件模拟）
//! 提供一组不透明的句柄类型：设备、命令队列、Fence、事件、命令分配器和命令列表。
//!
//! 这里的方法全部返回 [`Result`]，由上层决定如何处理失败。同步核心把这些失败视为
//! 致命错误（见 [`gfx_check!`](crate::gfx_check)）。

use crate::core::error::Result;
use crate::renderer::command::CommandListType;

/// 图形后端（原生设备）
///
/// 负责创建队列、Fence、事件、命令分配器和命令列表。
pub trait GfxBackend: Send + Sync + 'static {
    /// 命令队列
    type Queue: NativeQueue<Fence = Self::Fence, CommandList = Self::CommandList>;
    /// GPU Fence
    type Fence: NativeFence<Event = Self::Event>;
    /// CPU 等待 Fence 时使用的事件
    type Event: NativeEvent;
    /// 命令分配器
    type CommandAllocator: NativeCommandAllocator;
    /// 命令列表
    type CommandList: NativeCommandList<CommandAllocator = Self::CommandAllocator>;

    /// 获取后端的名称（如 "DirectX 12"）
    fn backend_name(&self) -> &str;

    /// 创建指定类型的命令队列
    fn create_command_queue(&self, list_type: CommandListType) -> Result<Self::Queue>;

    /// 创建初始值为 `initial_value` 的 Fence
    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence>;

    /// 创建自动复位的等待事件
    fn create_event(&self) -> Result<Self::Event>;

    /// 创建指定类型的命令分配器
    fn create_command_allocator(&self, list_type: CommandListType) -> Result<Self::CommandAllocator>;

    /// 创建记录到 `allocator` 的命令列表，创建后处于记录状态
    fn create_command_list(
        &self,
        list_type: CommandListType,
        allocator: &Self::CommandAllocator,
    ) -> Result<Self::CommandList>;
}

/// 原生命令队列
pub trait NativeQueue: Send + Sync {
    type Fence;
    type CommandList;

    /// 提交已关闭的命令列表
    fn execute_command_list(&self, list: &Self::CommandList) -> Result<()>;

    /// 在之前提交的工作全部完成后，由 GPU 把 `fence` 设置为 `value`
    fn signal(&self, fence: &Self::Fence, value: u64) -> Result<()>;

    /// 让该队列的后续 GPU 工作等待 `fence` 到达 `value`（不阻塞 CPU）
    fn wait(&self, fence: &Self::Fence, value: u64) -> Result<()>;
}

/// 原生 Fence
pub trait NativeFence: Send + Sync {
    type Event;

    /// GPU 已完成的值
    fn completed_value(&self) -> u64;

    /// 当 Fence 到达 `value` 时触发 `event`（已到达则立即触发）
    fn set_event_on_completion(&self, value: u64, event: &Self::Event) -> Result<()>;
}

/// CPU 侧等待事件
pub trait NativeEvent: Send {
    /// 阻塞当前线程直到事件被触发，没有超时
    fn wait(&self) -> Result<()>;
}

/// 原生命令分配器
pub trait NativeCommandAllocator: Send + Sync {
    /// 重置分配器以便重新记录；调用方保证 GPU 已不再引用它
    fn reset(&self) -> Result<()>;

    /// 设置调试名称（仅用于调试工具显示）
    fn set_name(&self, name: &str);
}

/// 原生命令列表
pub trait NativeCommandList: Send {
    type CommandAllocator;

    /// 结束记录
    fn close(&mut self) -> Result<()>;

    /// 重新开始记录到 `allocator`
    fn reset(&mut self, allocator: &Self::CommandAllocator) -> Result<()>;
}
