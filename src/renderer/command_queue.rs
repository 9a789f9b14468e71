//! 命令队列
//!
//! 串行化某一类型命令列表的提交，发出并跟踪 Fence 值，提供 CPU 等待和跨队列 stall。
//!
//! # 锁
//!
//! 三把互相独立的锁，任何一把都不会在持有时去获取另一把：
//!
//! - 分配器池内部的锁：保护池的数组和回收队列
//! - `fence_state`：保护 `next_fence_value`，使“提交 + signal”对并发提交者是原子的
//! - `fence_event`：保护 CPU 等待用的事件句柄，等待期间不阻塞其他提交者
//!
//! # Fence 值状态
//!
//! ```text
//! Issued ──> Pending (v > 已完成缓存) ──> Complete (v <= 已完成缓存)
//! ```
//!
//! 没有反向转换。

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::allocator_pool::{CommandAllocatorHandle, CommandAllocatorPool};
use super::command::CommandListType;
use super::sync::{FenceCounter, FenceValue};
use crate::gfx::backend::{GfxBackend, NativeCommandList, NativeEvent, NativeFence, NativeQueue};
use crate::gfx_check;

/// 命令队列
pub struct CommandQueue<B: GfxBackend> {
    backend: Arc<B>,
    list_type: CommandListType,
    queue: B::Queue,
    fence: FenceCounter<B::Fence>,
    /// 下一个要 signal 的值
    fence_state: Mutex<FenceValue>,
    fence_event: Mutex<B::Event>,
    allocator_pool: CommandAllocatorPool<B>,
}

impl<B: GfxBackend> CommandQueue<B> {
    /// 创建命令队列、Fence、等待事件和分配器池
    ///
    /// Fence 初始值为 [`FenceValue::initial`]，第一个发出的值是它的下一个。
    ///
    /// # Panics
    ///
    /// 原生对象创建失败（致命错误）。
    pub fn new(backend: Arc<B>, list_type: CommandListType) -> Self {
        let initial = FenceValue::initial(list_type);

        let queue = gfx_check!(backend.create_command_queue(list_type));
        let fence = gfx_check!(backend.create_fence(initial.value()));
        let fence_event = gfx_check!(backend.create_event());
        let allocator_pool = CommandAllocatorPool::new(Arc::clone(&backend), list_type);

        debug!(
            backend = backend.backend_name(),
            list_type = list_type.name(),
            first_fence_value = %initial.next(),
            "Command queue created"
        );

        Self {
            backend,
            list_type,
            queue,
            fence: FenceCounter::new(fence, initial),
            fence_state: Mutex::new(initial.next()),
            fence_event: Mutex::new(fence_event),
            allocator_pool,
        }
    }

    /// 让 Fence 在之前提交的所有工作完成后到达一个新值，并返回该值
    ///
    /// 不对之后提交的工作做任何保证，只是预留一个值。
    pub fn increment_fence(&self) -> FenceValue {
        let mut next = self.fence_state.lock();
        gfx_check!(self.queue.signal(self.fence.native(), next.value()));
        let issued = *next;
        *next = issued.next();
        issued
    }

    /// 检查 Fence 值是否已完成
    ///
    /// 超出缓存时才查询 GPU，缓存只增不减，因此返回 true 之后对同一个值永远返回 true。
    pub fn is_fence_complete(&self, fence_value: FenceValue) -> bool {
        self.fence.is_complete(fence_value)
    }

    /// 关闭并提交命令列表，返回本次提交的 Fence 值
    pub fn execute_command_list(&self, list: &mut B::CommandList) -> FenceValue {
        let mut next = self.fence_state.lock();

        gfx_check!(list.close());
        gfx_check!(self.queue.execute_command_list(list));
        gfx_check!(self.queue.signal(self.fence.native(), next.value()));

        let issued = *next;
        *next = issued.next();
        trace!(list_type = self.list_type.name(), fence_value = %issued, "Executed command list");
        issued
    }

    /// 阻塞当前线程直到 Fence 到达 `fence_value`，没有超时
    pub fn wait_for_fence(&self, fence_value: FenceValue) {
        if self.is_fence_complete(fence_value) {
            return;
        }

        {
            let event = self.fence_event.lock();
            trace!(list_type = self.list_type.name(), %fence_value, "Waiting for fence");
            gfx_check!(self.fence.native().set_event_on_completion(fence_value.value(), &*event));
            gfx_check!(event.wait());
        }

        self.fence.mark_completed(fence_value);
    }

    /// 等待此前提交到该队列的所有 GPU 工作完成
    pub fn wait_for_idle(&self) {
        let fence_value = self.increment_fence();
        self.wait_for_fence(fence_value);
    }

    /// 让该队列的 GPU 执行等待 `producer` 最近发出的 Fence 值（不阻塞 CPU）
    ///
    /// # Panics
    ///
    /// `producer` 还没有发出过任何 Fence 值。
    pub fn stall_for_command_queue(&self, producer: &CommandQueue<B>) {
        let producer_next = producer.next_fence_value();
        assert!(
            producer_next > FenceValue::initial(producer.list_type).next(),
            "stall_for_command_queue: {} queue has not issued any fence value",
            producer.list_type.name()
        );

        let last_issued = FenceValue::new(producer_next.value() - 1);
        self.stall_for_fence(producer, last_issued);
    }

    /// 让该队列的 GPU 执行等待 `producer` 的 Fence 到达 `fence_value`（不阻塞 CPU）
    pub fn stall_for_fence(&self, producer: &CommandQueue<B>, fence_value: FenceValue) {
        trace!(
            consumer = self.list_type.name(),
            producer = producer.list_type.name(),
            %fence_value,
            "Stalling queue on fence"
        );
        gfx_check!(self.queue.wait(producer.fence.native(), fence_value.value()));
    }

    /// 请求可以开始记录的命令分配器
    ///
    /// 以 GPU 当前实际完成的值作为回收依据。
    pub fn request_allocator(&self) -> CommandAllocatorHandle<B::CommandAllocator> {
        let completed = self.fence.refresh();
        self.allocator_pool.request_allocator(completed)
    }

    /// 归还分配器，使用它的工作在 `fence_value` 完成
    pub fn discard_allocator(
        &self,
        fence_value: FenceValue,
        allocator: CommandAllocatorHandle<B::CommandAllocator>,
    ) {
        self.allocator_pool.discard_allocator(fence_value, allocator);
    }

    /// 下一个将要发出的 Fence 值
    pub fn next_fence_value(&self) -> FenceValue {
        *self.fence_state.lock()
    }

    /// 缓存的已完成 Fence 值（不查询 GPU）
    pub fn last_completed_fence_value(&self) -> FenceValue {
        self.fence.completed_value()
    }

    /// 队列类型
    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    /// 原生命令队列
    pub fn native(&self) -> &B::Queue {
        &self.queue
    }

    /// 原生 Fence
    pub fn native_fence(&self) -> &B::Fence {
        self.fence.native()
    }

    /// 创建该队列的后端
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// 该队列的命令分配器池
    pub fn allocator_pool(&self) -> &CommandAllocatorPool<B> {
        &self.allocator_pool
    }
}

impl<B: GfxBackend> Drop for CommandQueue<B> {
    fn drop(&mut self) {
        let next_fence_value = *self.fence_state.get_mut();
        debug!(
            list_type = self.list_type.name(),
            %next_fence_value,
            allocators = self.allocator_pool.size(),
            "Command queue destroyed"
        );
    }
}
