//! 命令列表管理模块
//!
//! - [`CommandListType`]：命令列表 / 队列类型，索引与原生 API 一致
//! - [`CommandContext`]：单个命令列表的记录上下文，串起
//!   “请求分配器 → 记录 → 提交 → 归还分配器” 的完整流程
//!
//! ```ignore
//! let mut context = CommandContext::begin(device.graphics_queue());
//! context.list_mut().record(|| { /* GPU 工作 */ });
//! let fence = context.finish(false);
//! device.wait_for_fence(fence);
//! ```

use tracing::trace;

use super::allocator_pool::CommandAllocatorHandle;
use super::command_queue::CommandQueue;
use super::sync::FenceValue;
use crate::gfx::backend::{GfxBackend, NativeCommandList};
use crate::gfx_check;

/// 命令列表类型
///
/// 判别值与 `D3D12_COMMAND_LIST_TYPE` 一致，也用作 Fence 值的高位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListType {
    /// 直接命令列表：图形、计算和传输命令
    Direct = 0,
    /// 可复用的命令包，只能由 Direct 命令列表调用，没有自己的队列
    Bundle = 1,
    /// 计算专用
    Compute = 2,
    /// 传输专用（复制）
    Copy = 3,
}

impl CommandListType {
    /// 拥有独立队列的类型
    pub const QUEUE_TYPES: [CommandListType; 3] = [
        CommandListType::Direct,
        CommandListType::Compute,
        CommandListType::Copy,
    ];

    /// 原生类型索引
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// 从原生类型索引还原
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(CommandListType::Direct),
            1 => Some(CommandListType::Bundle),
            2 => Some(CommandListType::Compute),
            3 => Some(CommandListType::Copy),
            _ => None,
        }
    }

    /// 类型名称，用于日志和调试名
    pub fn name(self) -> &'static str {
        match self {
            CommandListType::Direct => "Direct",
            CommandListType::Bundle => "Bundle",
            CommandListType::Compute => "Compute",
            CommandListType::Copy => "Copy",
        }
    }
}

/// 命令记录上下文
///
/// 持有一个原生命令列表和当前借用的命令分配器。
pub struct CommandContext<'q, B: GfxBackend> {
    queue: &'q CommandQueue<B>,
    list: B::CommandList,
    allocator: Option<CommandAllocatorHandle<B::CommandAllocator>>,
}

impl<'q, B: GfxBackend> CommandContext<'q, B> {
    /// 从队列请求分配器并创建处于记录状态的命令列表
    pub fn begin(queue: &'q CommandQueue<B>) -> Self {
        let allocator = queue.request_allocator();
        let list = gfx_check!(queue.backend().create_command_list(queue.list_type(), &*allocator));
        Self {
            queue,
            list,
            allocator: Some(allocator),
        }
    }

    /// 用于记录命令的原生命令列表
    pub fn list_mut(&mut self) -> &mut B::CommandList {
        &mut self.list
    }

    /// 提交到的队列
    pub fn queue(&self) -> &'q CommandQueue<B> {
        self.queue
    }

    /// 提交命令列表并归还分配器
    ///
    /// 返回本次提交的 Fence 值；`wait_for_completion` 为 true 时阻塞到 GPU 完成。
    ///
    /// # Panics
    ///
    /// 上下文已经 finish 过且没有 [`reset`](Self::reset)。
    pub fn finish(&mut self, wait_for_completion: bool) -> FenceValue {
        let allocator = self
            .allocator
            .take()
            .unwrap_or_else(|| panic!("CommandContext::finish called without an active allocator"));

        let fence_value = self.queue.execute_command_list(&mut self.list);
        self.queue.discard_allocator(fence_value, allocator);

        if wait_for_completion {
            self.queue.wait_for_fence(fence_value);
        }
        fence_value
    }

    /// 请求新的分配器并重置命令列表，复用该上下文
    pub fn reset(&mut self) {
        assert!(
            self.allocator.is_none(),
            "CommandContext::reset called while still recording"
        );
        let allocator = self.queue.request_allocator();
        gfx_check!(self.list.reset(&*allocator));
        self.allocator = Some(allocator);
    }
}

impl<B: GfxBackend> Drop for CommandContext<'_, B> {
    fn drop(&mut self) {
        // 未提交的列表从未进入 GPU，分配器只可能被已发出的工作引用
        if let Some(allocator) = self.allocator.take() {
            // 归还前结束记录，否则其他线程回收该分配器时重置会失败
            let _ = self.list.close();
            let last_issued = FenceValue::new(self.queue.next_fence_value().value() - 1);
            trace!(
                list_type = self.queue.list_type().name(),
                index = allocator.index(),
                %last_issued,
                "Returning allocator of unfinished command context"
            );
            self.queue.discard_allocator(last_issued, allocator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::software::SoftwareBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_command_list_type_indices() {
        for list_type in [
            CommandListType::Direct,
            CommandListType::Bundle,
            CommandListType::Compute,
            CommandListType::Copy,
        ] {
            assert_eq!(CommandListType::from_index(list_type.index()), Some(list_type));
        }
        assert_eq!(CommandListType::from_index(4), None);
        assert_eq!(CommandListType::Copy.index(), 3);
    }

    #[test]
    fn test_context_round_trip() {
        let queue = CommandQueue::new(Arc::new(SoftwareBackend::new()), CommandListType::Direct);
        let executed = Arc::new(AtomicUsize::new(0));

        let mut context = CommandContext::begin(&queue);
        let counter = Arc::clone(&executed);
        context.list_mut().record(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let first = context.finish(true);
        assert_eq!(first, FenceValue::new(1));
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert!(queue.is_fence_complete(first));

        // 上一次的分配器已完成，可以回收
        context.reset();
        let counter = Arc::clone(&executed);
        context.list_mut().record(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let second = context.finish(true);
        assert_eq!(second, FenceValue::new(2));
        assert_eq!(executed.load(Ordering::SeqCst), 2);
        assert_eq!(queue.allocator_pool().size(), 1);
    }

    #[test]
    fn test_dropped_context_returns_allocator() {
        let queue = CommandQueue::new(Arc::new(SoftwareBackend::new()), CommandListType::Copy);
        {
            let _context = CommandContext::begin(&queue);
            assert_eq!(queue.allocator_pool().ready_count(), 0);
        }
        assert_eq!(queue.allocator_pool().ready_count(), 1);

        // 队列从未提交过工作，归还的分配器立即可用
        let context = CommandContext::begin(&queue);
        drop(context);
        assert_eq!(queue.allocator_pool().size(), 1);
    }

    #[test]
    fn test_dropped_context_closes_list_before_return() {
        let queue = CommandQueue::new(Arc::new(SoftwareBackend::new()), CommandListType::Direct);
        drop(CommandContext::begin(&queue));

        let recycled = queue.request_allocator();
        assert_eq!(recycled.index(), 0);
        assert_eq!(recycled.recording(), 0);
        assert_eq!(recycled.reset_count(), 1);
        queue.discard_allocator(FenceValue::initial(CommandListType::Direct), recycled);
    }

    #[test]
    fn test_concurrent_dropped_contexts_recycle_safely() {
        let queue = Arc::new(CommandQueue::new(
            Arc::new(SoftwareBackend::new()),
            CommandListType::Compute,
        ));

        // 其他线程可能在归还后立即重置该分配器，列表此时必须已结束记录
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let mut context = CommandContext::begin(&queue);
                        context.list_mut().record(|| {});
                        drop(context);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(queue.allocator_pool().size() <= 4);
        assert_eq!(queue.allocator_pool().ready_count(), queue.allocator_pool().size());
    }

    #[test]
    #[should_panic(expected = "without an active allocator")]
    fn test_double_finish_panics() {
        let queue = CommandQueue::new(Arc::new(SoftwareBackend::new()), CommandListType::Direct);
        let mut context = CommandContext::begin(&queue);
        context.finish(false);
        context.finish(false);
    }
}
