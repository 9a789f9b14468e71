//! GPU 同步机制模块
//!
//! 提供 Fence 值与 Fence 计数器，用于 CPU-GPU 同步。
//!
//! # Fence 值编码
//!
//! 每个队列的 Fence 值在其命令列表类型索引左移 56 位的基础上单调递增，
//! 因此任意 Fence 值都能还原出发出它的队列：
//!
//! ```text
//! 63        56 55                                   0
//! ┌──────────┬──────────────────────────────────────┐
//! │ 列表类型  │              提交序号                 │
//! └──────────┴──────────────────────────────────────┘
//! ```
//!
//! Direct 队列的类型索引为 0，它发出的值就是 1, 2, 3, ...

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::command::CommandListType;
use crate::gfx::backend::NativeFence;

/// 队列类型在 Fence 值中的位移
pub const QUEUE_TYPE_SHIFT: u32 = 56;

/// Fence 值
///
/// 用于 CPU-GPU 同步的单调递增值，每次提交发出一个。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 创建新的 Fence 值
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// 某类型队列的初始（已完成）值
    pub const fn initial(list_type: CommandListType) -> Self {
        Self((list_type.index() as u64) << QUEUE_TYPE_SHIFT)
    }

    /// 获取内部值
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// 下一个 Fence 值
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 发出该值的队列类型
    pub fn queue_type(&self) -> Option<CommandListType> {
        CommandListType::from_index((self.0 >> QUEUE_TYPE_SHIFT) as u32)
    }

    /// 去掉队列类型后的提交序号
    pub const fn sequence(&self) -> u64 {
        self.0 & ((1 << QUEUE_TYPE_SHIFT) - 1)
    }
}

impl From<FenceValue> for u64 {
    fn from(value: FenceValue) -> Self {
        value.0
    }
}

impl fmt::Display for FenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.queue_type() {
            Some(list_type) => write!(f, "{}#{}", list_type.name(), self.sequence()),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

/// Fence 计数器
///
/// 封装原生 Fence，并缓存已完成值的下界。缓存只会增长：
/// `completed_value() <= GPU 实际完成值`。
pub struct FenceCounter<F> {
    /// 原生 Fence
    fence: F,
    /// 已完成的 Fence 值（缓存）
    last_completed: AtomicU64,
}

impl<F: NativeFence> FenceCounter<F> {
    /// 包装原生 Fence，`initial` 必须等于创建 Fence 时的初始值
    pub fn new(fence: F, initial: FenceValue) -> Self {
        Self {
            fence,
            last_completed: AtomicU64::new(initial.value()),
        }
    }

    /// 原生 Fence
    pub fn native(&self) -> &F {
        &self.fence
    }

    /// 缓存的已完成值，不查询 GPU
    pub fn completed_value(&self) -> FenceValue {
        FenceValue(self.last_completed.load(Ordering::Acquire))
    }

    /// 查询 GPU 进度并更新缓存，返回更新后的缓存值
    pub fn refresh(&self) -> FenceValue {
        let gpu_value = self.fence.completed_value();
        self.mark_completed(FenceValue(gpu_value))
    }

    /// 记录 `value` 已完成，缓存取最大值，返回更新后的缓存值
    pub fn mark_completed(&self, value: FenceValue) -> FenceValue {
        let previous = self.last_completed.fetch_max(value.value(), Ordering::AcqRel);
        FenceValue(previous.max(value.value()))
    }

    /// 检查 `value` 是否已完成
    ///
    /// 先与缓存比较；超出缓存时才查询 GPU。
    pub fn is_complete(&self, value: FenceValue) -> bool {
        if value > self.completed_value() {
            self.refresh();
        }
        value <= self.completed_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::software::SoftwareFence;

    #[test]
    fn test_fence_value() {
        let fence = FenceValue::new(1);
        assert_eq!(fence.value(), 1);
        assert_eq!(fence.next().value(), 2);
        assert_eq!(fence.value(), 1); // 原值不变
        assert!(FenceValue::new(1) < FenceValue::new(2));
    }

    #[test]
    fn test_queue_type_encoding() {
        let direct = FenceValue::initial(CommandListType::Direct);
        assert_eq!(direct.value(), 0);
        assert_eq!(direct.next().queue_type(), Some(CommandListType::Direct));

        let compute = FenceValue::initial(CommandListType::Compute).next().next();
        assert_eq!(compute.value(), (2u64 << 56) | 2);
        assert_eq!(compute.queue_type(), Some(CommandListType::Compute));
        assert_eq!(compute.sequence(), 2);
        assert_eq!(compute.to_string(), "Compute#2");

        let copy = FenceValue::initial(CommandListType::Copy);
        assert_eq!(copy.queue_type(), Some(CommandListType::Copy));
        assert_eq!(FenceValue::new(7u64 << 56).queue_type(), None);
    }

    #[test]
    fn test_fence_counter_refresh() {
        let fence = SoftwareFence::new(0);
        let counter = FenceCounter::new(fence.clone(), FenceValue::new(0));

        assert!(counter.is_complete(FenceValue::new(0)));
        assert!(!counter.is_complete(FenceValue::new(1)));

        fence.signal(2);
        // 缓存只在需要时刷新
        assert_eq!(counter.completed_value(), FenceValue::new(0));
        assert!(counter.is_complete(FenceValue::new(1)));
        assert_eq!(counter.completed_value(), FenceValue::new(2));
    }

    #[test]
    fn test_fence_counter_never_regresses() {
        let fence = SoftwareFence::new(0);
        let counter = FenceCounter::new(fence.clone(), FenceValue::new(0));

        counter.mark_completed(FenceValue::new(5));
        assert_eq!(counter.refresh(), FenceValue::new(5));
        assert!(counter.is_complete(FenceValue::new(5)));

        fence.signal(3);
        assert_eq!(counter.refresh(), FenceValue::new(5));
    }
}
