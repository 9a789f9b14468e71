//! 设备
//!
//! 同步核心的顶层拥有者：为 Direct、Compute、Copy 三种类型各创建一个命令队列，
//! 并提供按 Fence 值路由到对应队列的查询与等待。

use std::sync::Arc;

use tracing::info;

use super::allocator_pool::CommandAllocatorHandle;
use super::command::CommandListType;
use super::command_queue::CommandQueue;
use super::sync::FenceValue;
use crate::gfx::backend::GfxBackend;
use crate::gfx_check;

/// 设备
pub struct Device<B: GfxBackend> {
    backend: Arc<B>,
    graphics_queue: CommandQueue<B>,
    compute_queue: CommandQueue<B>,
    copy_queue: CommandQueue<B>,
}

impl<B: GfxBackend> Device<B> {
    /// 在后端上创建三个命令队列
    pub fn new(backend: B) -> Self {
        let backend = Arc::new(backend);

        let graphics_queue = CommandQueue::new(Arc::clone(&backend), CommandListType::Direct);
        let compute_queue = CommandQueue::new(Arc::clone(&backend), CommandListType::Compute);
        let copy_queue = CommandQueue::new(Arc::clone(&backend), CommandListType::Copy);

        info!(backend = backend.backend_name(), "Device created with direct, compute and copy queues");

        Self {
            backend,
            graphics_queue,
            compute_queue,
            copy_queue,
        }
    }

    /// 后端
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct 队列
    pub fn graphics_queue(&self) -> &CommandQueue<B> {
        &self.graphics_queue
    }

    /// Compute 队列
    pub fn compute_queue(&self) -> &CommandQueue<B> {
        &self.compute_queue
    }

    /// Copy 队列
    pub fn copy_queue(&self) -> &CommandQueue<B> {
        &self.copy_queue
    }

    /// 按类型获取队列，Bundle 没有自己的队列，返回 Direct 队列
    pub fn queue(&self, list_type: CommandListType) -> &CommandQueue<B> {
        match list_type {
            CommandListType::Compute => &self.compute_queue,
            CommandListType::Copy => &self.copy_queue,
            CommandListType::Direct | CommandListType::Bundle => &self.graphics_queue,
        }
    }

    /// 所有队列
    pub fn queues(&self) -> [&CommandQueue<B>; 3] {
        [&self.graphics_queue, &self.compute_queue, &self.copy_queue]
    }

    /// 从对应队列请求分配器并创建记录到它的命令列表
    pub fn create_new_command_list(
        &self,
        list_type: CommandListType,
    ) -> (B::CommandList, CommandAllocatorHandle<B::CommandAllocator>) {
        let allocator = self.queue(list_type).request_allocator();
        let list = gfx_check!(self.backend.create_command_list(list_type, &*allocator));
        (list, allocator)
    }

    /// 检查 Fence 值是否已完成，由 Fence 值的高位决定查询哪个队列
    pub fn is_fence_complete(&self, fence_value: FenceValue) -> bool {
        self.producer_of(fence_value).is_fence_complete(fence_value)
    }

    /// 阻塞直到 Fence 值完成
    pub fn wait_for_fence(&self, fence_value: FenceValue) {
        self.producer_of(fence_value).wait_for_fence(fence_value);
    }

    /// 让 `consumer` 类型的队列在 GPU 上等待 `fence_value`（可以来自任意队列）
    pub fn stall_for_fence(&self, consumer: CommandListType, fence_value: FenceValue) {
        let producer = self.producer_of(fence_value);
        self.queue(consumer).stall_for_fence(producer, fence_value);
    }

    /// 等待所有队列上已提交的 GPU 工作完成
    pub fn idle_gpu(&self) {
        for queue in self.queues() {
            queue.wait_for_idle();
        }
    }

    fn producer_of(&self, fence_value: FenceValue) -> &CommandQueue<B> {
        match fence_value.queue_type() {
            Some(list_type) => self.queue(list_type),
            None => panic!("fence value {:#x} does not belong to any queue", fence_value.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::software::SoftwareBackend;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_queue_routing() {
        let device = Device::new(SoftwareBackend::new());
        assert_eq!(device.queue(CommandListType::Direct).list_type(), CommandListType::Direct);
        assert_eq!(device.queue(CommandListType::Bundle).list_type(), CommandListType::Direct);
        assert_eq!(device.queue(CommandListType::Compute).list_type(), CommandListType::Compute);
        assert_eq!(device.queue(CommandListType::Copy).list_type(), CommandListType::Copy);

        let compute_fence = device.compute_queue().increment_fence();
        assert_eq!(compute_fence.queue_type(), Some(CommandListType::Compute));
        device.wait_for_fence(compute_fence);
        assert!(device.is_fence_complete(compute_fence));
        // 同序号的 Copy 值属于另一个队列
        let copy_value = FenceValue::new(FenceValue::initial(CommandListType::Copy).value() | 1);
        assert!(!device.is_fence_complete(copy_value));
    }

    #[test]
    fn test_create_new_command_list() {
        let device = Device::new(SoftwareBackend::new());
        let (mut list, allocator) = device.create_new_command_list(CommandListType::Copy);
        assert_eq!(allocator.name(), "CommandAllocator 0");

        let fence_value = device.copy_queue().execute_command_list(&mut list);
        device.copy_queue().discard_allocator(fence_value, allocator);
        device.wait_for_fence(fence_value);

        let (_list, recycled) = device.create_new_command_list(CommandListType::Copy);
        assert_eq!(recycled.index(), 0);
        assert_eq!(device.copy_queue().allocator_pool().size(), 1);
        assert_eq!(device.graphics_queue().allocator_pool().size(), 0);
    }

    #[test]
    fn test_cross_queue_stall() {
        let device = Device::new(SoftwareBackend::new());
        let uploaded = Arc::new(AtomicBool::new(false));

        device.copy_queue().native().pause();
        let (mut upload, allocator) = device.create_new_command_list(CommandListType::Copy);
        let flag = Arc::clone(&uploaded);
        upload.record(move || flag.store(true, Ordering::SeqCst));
        let upload_fence = device.copy_queue().execute_command_list(&mut upload);
        device.copy_queue().discard_allocator(upload_fence, allocator);

        device.stall_for_fence(CommandListType::Direct, upload_fence);
        let (mut draw, allocator) = device.create_new_command_list(CommandListType::Direct);
        let flag = Arc::clone(&uploaded);
        let saw_upload = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&saw_upload);
        draw.record(move || seen.store(flag.load(Ordering::SeqCst), Ordering::SeqCst));
        let draw_fence = device.graphics_queue().execute_command_list(&mut draw);
        device.graphics_queue().discard_allocator(draw_fence, allocator);

        thread::sleep(Duration::from_millis(20));
        assert!(!device.is_fence_complete(draw_fence));

        device.copy_queue().native().resume();
        device.wait_for_fence(draw_fence);
        assert!(saw_upload.load(Ordering::SeqCst), "draw ran before upload");
    }

    #[test]
    fn test_idle_gpu() {
        let device = Device::new(SoftwareBackend::new().with_execution_delay(Duration::from_millis(2)));
        let mut pending = Vec::new();
        for list_type in CommandListType::QUEUE_TYPES {
            for _ in 0..3 {
                let (mut list, allocator) = device.create_new_command_list(list_type);
                let queue = device.queue(list_type);
                let fence_value = queue.execute_command_list(&mut list);
                queue.discard_allocator(fence_value, allocator);
                pending.push(fence_value);
            }
        }

        device.idle_gpu();
        assert!(pending.iter().all(|&fence_value| device.is_fence_complete(fence_value)));
    }

    #[test]
    #[should_panic(expected = "does not belong to any queue")]
    fn test_unknown_fence_value_panics() {
        let device = Device::new(SoftwareBackend::new());
        device.is_fence_complete(FenceValue::new(9u64 << 56));
    }
}
