//! 命令分配器池
//!
//! 回收命令分配器：分配器在最后一次使用它的 Fence 值完成后才会被重置并重新发放。
//!
//! 池按索引把所有分配器存放在数组中，负责创建、命名与回收。调用方在
//! `request_allocator` 与 `discard_allocator` 之间持有一个不可复制的句柄，
//! 句柄与池共享分配器的引用计数，因此池销毁时仍被借出的分配器会活到句柄释放为止。

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::command::CommandListType;
use super::sync::FenceValue;
use crate::gfx::backend::{GfxBackend, NativeCommandAllocator};
use crate::gfx_check;

/// 从池中借出的命令分配器
///
/// 不实现 `Clone`：同一个分配器在归还前只会被一个调用方持有。
/// 通过 [`CommandAllocatorPool::discard_allocator`] 归还。
pub struct CommandAllocatorHandle<A> {
    index: usize,
    allocator: Arc<A>,
}

impl<A> CommandAllocatorHandle<A> {
    /// 分配器在池中的索引
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<A> Deref for CommandAllocatorHandle<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.allocator
    }
}

impl<A> fmt::Debug for CommandAllocatorHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandAllocatorHandle")
            .field("index", &self.index)
            .finish()
    }
}

struct PoolState<A> {
    /// 所有创建过的分配器
    allocators: Vec<Arc<A>>,
    /// 等待回收的分配器：(归还时的 Fence 值, 索引)，按归还顺序排列
    ready: VecDeque<(FenceValue, usize)>,
}

/// 命令分配器池
pub struct CommandAllocatorPool<B: GfxBackend> {
    backend: Arc<B>,
    list_type: CommandListType,
    state: Mutex<PoolState<B::CommandAllocator>>,
}

impl<B: GfxBackend> CommandAllocatorPool<B> {
    /// 创建空的分配器池
    pub fn new(backend: Arc<B>, list_type: CommandListType) -> Self {
        Self {
            backend,
            list_type,
            state: Mutex::new(PoolState {
                allocators: Vec::new(),
                ready: VecDeque::new(),
            }),
        }
    }

    /// 请求一个可以开始记录的分配器
    ///
    /// `completed_fence_value` 是调用方提供的 GPU 进度下界，同一队列的多次调用必须单调不减。
    /// 只检查最早归还的分配器：它的 Fence 值不大于 `completed_fence_value` 时重置后返回，
    /// 否则新建一个分配器。
    pub fn request_allocator(
        &self,
        completed_fence_value: FenceValue,
    ) -> CommandAllocatorHandle<B::CommandAllocator> {
        let mut state = self.state.lock();

        if let Some(&(fence_value, index)) = state.ready.front() {
            if fence_value <= completed_fence_value {
                state.ready.pop_front();
                let allocator = Arc::clone(&state.allocators[index]);
                gfx_check!(allocator.reset());

                trace!(
                    list_type = self.list_type.name(),
                    index,
                    %fence_value,
                    %completed_fence_value,
                    "Recycled command allocator"
                );
                return CommandAllocatorHandle { index, allocator };
            }
        }

        // 队列按 Fence 值有序，队首未完成则其余都未完成，不再向后查找
        let allocator = gfx_check!(self.backend.create_command_allocator(self.list_type));
        let index = state.allocators.len();
        allocator.set_name(&format!("CommandAllocator {}", index));

        let allocator = Arc::new(allocator);
        state.allocators.push(Arc::clone(&allocator));

        debug!(
            list_type = self.list_type.name(),
            index,
            pool_size = state.allocators.len(),
            "Created command allocator"
        );
        CommandAllocatorHandle { index, allocator }
    }

    /// 归还分配器
    ///
    /// 使用它的 GPU 工作在 Fence 到达 `fence_value` 时全部完成，此后分配器才会被重新发放。
    ///
    /// # Panics
    ///
    /// 句柄不是由该池发放的。
    pub fn discard_allocator(
        &self,
        fence_value: FenceValue,
        allocator: CommandAllocatorHandle<B::CommandAllocator>,
    ) {
        let mut state = self.state.lock();
        let owned = state
            .allocators
            .get(allocator.index)
            .is_some_and(|pooled| Arc::ptr_eq(pooled, &allocator.allocator));
        assert!(
            owned,
            "discard_allocator: allocator {} does not belong to the {} pool",
            allocator.index,
            self.list_type.name()
        );

        trace!(
            list_type = self.list_type.name(),
            index = allocator.index,
            %fence_value,
            "Discarded command allocator"
        );
        state.ready.push_back((fence_value, allocator.index));
    }

    /// 创建过的分配器总数
    pub fn size(&self) -> usize {
        self.state.lock().allocators.len()
    }

    /// 等待回收的分配器数量
    pub fn ready_count(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// 池对应的命令列表类型
    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }
}

impl<B: GfxBackend> Drop for CommandAllocatorPool<B> {
    /// 释放所有分配器，不等待 GPU；调用方需保证设备已空闲
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug!(
            list_type = self.list_type.name(),
            released = state.allocators.len(),
            "Releasing command allocator pool"
        );
        state.ready.clear();
        state.allocators.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::software::SoftwareBackend;
    use std::collections::HashSet;
    use std::thread;

    fn pool() -> (Arc<SoftwareBackend>, CommandAllocatorPool<SoftwareBackend>) {
        let backend = Arc::new(SoftwareBackend::new());
        let pool = CommandAllocatorPool::new(Arc::clone(&backend), CommandListType::Direct);
        (backend, pool)
    }

    #[test]
    fn test_recycle_scenario() {
        let (_backend, pool) = pool();

        let a0 = pool.request_allocator(FenceValue::new(0));
        assert_eq!(a0.index(), 0);
        assert_eq!(a0.name(), "CommandAllocator 0");
        pool.discard_allocator(FenceValue::new(5), a0);

        // A0 仍可能被 GPU 使用
        let a1 = pool.request_allocator(FenceValue::new(4));
        assert_eq!(a1.index(), 1);
        assert_eq!(pool.size(), 2);

        let recycled = pool.request_allocator(FenceValue::new(5));
        assert_eq!(recycled.index(), 0);
        assert_eq!(recycled.reset_count(), 1);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.ready_count(), 0);
    }

    #[test]
    fn test_only_front_is_checked() {
        let (_backend, pool) = pool();

        let a0 = pool.request_allocator(FenceValue::new(0));
        let a1 = pool.request_allocator(FenceValue::new(0));
        // 并发提交者可能乱序归还
        pool.discard_allocator(FenceValue::new(8), a1);
        pool.discard_allocator(FenceValue::new(3), a0);

        let fresh = pool.request_allocator(FenceValue::new(5));
        assert_eq!(fresh.index(), 2);
        assert_eq!(pool.ready_count(), 2);

        assert_eq!(pool.request_allocator(FenceValue::new(8)).index(), 1);
        assert_eq!(pool.request_allocator(FenceValue::new(8)).index(), 0);
    }

    #[test]
    fn test_never_returned_before_discard_fence() {
        let (_backend, pool) = pool();

        let mut handles = Vec::new();
        for _ in 0..4 {
            handles.push(pool.request_allocator(FenceValue::new(0)));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            pool.discard_allocator(FenceValue::new(10 + i as u64), handle);
        }

        for completed in 0..10 {
            let handle = pool.request_allocator(FenceValue::new(completed));
            assert!(handle.index() >= 4, "allocator reused before its fence completed");
            pool.discard_allocator(FenceValue::new(100), handle);
        }
    }

    #[test]
    fn test_concurrent_requests_hand_out_distinct_allocators() {
        let (_backend, pool) = pool();
        let pool = Arc::new(pool);

        let seed: Vec<_> = (0..8).map(|_| pool.request_allocator(FenceValue::new(0))).collect();
        for handle in seed {
            pool.discard_allocator(FenceValue::new(1), handle);
        }

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.request_allocator(FenceValue::new(1)))
            })
            .collect();
        let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        let indices: HashSet<usize> = handles.iter().map(|h| h.index()).collect();
        assert_eq!(indices.len(), handles.len());
        assert_eq!(pool.size(), 8);
    }

    #[test]
    #[should_panic(expected = "does not belong to the Copy pool")]
    fn test_discard_into_foreign_pool_panics() {
        let backend = Arc::new(SoftwareBackend::new());
        let direct = CommandAllocatorPool::new(Arc::clone(&backend), CommandListType::Direct);
        let copy = CommandAllocatorPool::new(backend, CommandListType::Copy);

        let _held = copy.request_allocator(FenceValue::new(0));
        let foreign = direct.request_allocator(FenceValue::new(0));
        assert_eq!(foreign.index(), 0);
        copy.discard_allocator(FenceValue::new(0), foreign);
    }

    #[test]
    fn test_foreign_discard_never_reaches_ready_queue() {
        let backend = Arc::new(SoftwareBackend::new());
        let direct = Arc::new(CommandAllocatorPool::new(Arc::clone(&backend), CommandListType::Direct));
        let copy = Arc::new(CommandAllocatorPool::new(backend, CommandListType::Copy));

        let held = copy.request_allocator(FenceValue::new(0));
        let foreign = direct.request_allocator(FenceValue::new(0));
        let discarded = {
            let copy = Arc::clone(&copy);
            thread::spawn(move || copy.discard_allocator(FenceValue::new(0), foreign)).join()
        };
        assert!(discarded.is_err());
        assert_eq!(copy.ready_count(), 0);

        // 被持有的分配器不会再被发给第二个调用方
        let second = copy.request_allocator(FenceValue::new(0));
        assert_ne!(second.index(), held.index());
        assert_eq!(copy.size(), 2);
    }

    #[test]
    fn test_drop_releases_everything() {
        let (backend, pool) = pool();
        let a0 = pool.request_allocator(FenceValue::new(0));
        let _a1 = pool.request_allocator(FenceValue::new(0));
        pool.discard_allocator(FenceValue::new(1), a0);
        assert_eq!(backend.allocators_created(), 2);
        drop(pool);
        assert_eq!(backend.allocators_alive(), 1); // 只剩调用方仍持有的 _a1
    }
}
