//! 软件后端：设备、命令分配器与命令列表
//!
//! 命令列表记录的是 CPU 闭包，提交后由队列工作线程执行。
//! 命令分配器跟踪正在记录的命令列表和仍在“GPU”上执行的提交数，
//! 在被引用时重置会返回错误，用来在测试中发现过早回收。

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use super::fence::{SoftwareEvent, SoftwareFence};
use super::queue::SoftwareQueue;
use crate::core::error::{GfxError, Result};
use crate::gfx::backend::{GfxBackend, NativeCommandAllocator, NativeCommandList};
use crate::renderer::command::CommandListType;

/// 记录在命令列表中的一条命令
pub(crate) type Command = Arc<dyn Fn() + Send + Sync>;

/// 软件后端
pub struct SoftwareBackend {
    execution_delay: Duration,
    allocators_created: AtomicUsize,
    allocators_alive: Arc<AtomicUsize>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            execution_delay: Duration::ZERO,
            allocators_created: AtomicUsize::new(0),
            allocators_alive: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 每个命令列表在队列上额外耗费的模拟执行时间
    pub fn with_execution_delay(mut self, delay: Duration) -> Self {
        self.execution_delay = delay;
        self
    }

    /// 创建过的命令分配器总数
    pub fn allocators_created(&self) -> usize {
        self.allocators_created.load(Ordering::Acquire)
    }

    /// 尚未销毁的命令分配器数量
    pub fn allocators_alive(&self) -> usize {
        self.allocators_alive.load(Ordering::Acquire)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GfxBackend for SoftwareBackend {
    type Queue = SoftwareQueue;
    type Fence = SoftwareFence;
    type Event = SoftwareEvent;
    type CommandAllocator = SoftwareCommandAllocator;
    type CommandList = SoftwareCommandList;

    fn backend_name(&self) -> &str {
        "Software"
    }

    fn create_command_queue(&self, list_type: CommandListType) -> Result<SoftwareQueue> {
        if list_type == CommandListType::Bundle {
            return Err(GfxError::ResourceCreation(
                "bundle command lists cannot have a command queue".to_string(),
            ));
        }
        let queue = SoftwareQueue::new(list_type, self.execution_delay)?;
        info!(list_type = list_type.name(), "Software command queue created");
        Ok(queue)
    }

    fn create_fence(&self, initial_value: u64) -> Result<SoftwareFence> {
        Ok(SoftwareFence::new(initial_value))
    }

    fn create_event(&self) -> Result<SoftwareEvent> {
        Ok(SoftwareEvent::new())
    }

    fn create_command_allocator(&self, list_type: CommandListType) -> Result<SoftwareCommandAllocator> {
        self.allocators_created.fetch_add(1, Ordering::AcqRel);
        self.allocators_alive.fetch_add(1, Ordering::AcqRel);
        Ok(SoftwareCommandAllocator {
            shared: Arc::new(AllocatorShared {
                list_type,
                name: Mutex::new(String::new()),
                reset_count: AtomicU64::new(0),
                recording: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
            }),
            alive: Arc::clone(&self.allocators_alive),
        })
    }

    fn create_command_list(
        &self,
        list_type: CommandListType,
        allocator: &SoftwareCommandAllocator,
    ) -> Result<SoftwareCommandList> {
        check_list_type(list_type, allocator)?;
        allocator.shared.recording.fetch_add(1, Ordering::AcqRel);
        Ok(SoftwareCommandList {
            list_type,
            commands: Vec::new(),
            allocator: Arc::clone(&allocator.shared),
            closed: false,
        })
    }
}

fn check_list_type(list_type: CommandListType, allocator: &SoftwareCommandAllocator) -> Result<()> {
    if allocator.shared.list_type != list_type {
        return Err(GfxError::InvalidState(format!(
            "{} command list cannot record into {} allocator",
            list_type.name(),
            allocator.shared.list_type.name()
        )));
    }
    Ok(())
}

/// 分配器状态，命令列表和已提交的工作共享它
pub(crate) struct AllocatorShared {
    list_type: CommandListType,
    name: Mutex<String>,
    reset_count: AtomicU64,
    /// 正在记录到该分配器的命令列表数
    recording: AtomicUsize,
    /// 已提交但尚未执行完的命令列表数
    in_flight: AtomicUsize,
}

impl AllocatorShared {
    pub(crate) fn begin_execution(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_execution(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 软件命令分配器
pub struct SoftwareCommandAllocator {
    shared: Arc<AllocatorShared>,
    alive: Arc<AtomicUsize>,
}

impl SoftwareCommandAllocator {
    /// 调试名称
    pub fn name(&self) -> String {
        self.shared.name.lock().clone()
    }

    /// 被重置的次数
    pub fn reset_count(&self) -> u64 {
        self.shared.reset_count.load(Ordering::Acquire)
    }

    /// 仍在执行、引用该分配器的命令列表数
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// 处于记录状态、记录到该分配器的命令列表数
    pub fn recording(&self) -> usize {
        self.shared.recording.load(Ordering::Acquire)
    }
}

impl NativeCommandAllocator for SoftwareCommandAllocator {
    fn reset(&self) -> Result<()> {
        let recording = self.recording();
        if recording > 0 {
            return Err(GfxError::InvalidState(format!(
                "command allocator '{}' reset while {} command list(s) are recording into it",
                self.name(),
                recording
            )));
        }
        let in_flight = self.in_flight();
        if in_flight > 0 {
            return Err(GfxError::InvalidState(format!(
                "command allocator '{}' reset while {} submission(s) still reference it",
                self.name(),
                in_flight
            )));
        }
        self.shared.reset_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn set_name(&self, name: &str) {
        *self.shared.name.lock() = name.to_string();
    }
}

impl fmt::Debug for SoftwareCommandAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareCommandAllocator")
            .field("name", &self.name())
            .field("list_type", &self.shared.list_type)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Drop for SoftwareCommandAllocator {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 软件命令列表
pub struct SoftwareCommandList {
    list_type: CommandListType,
    commands: Vec<Command>,
    allocator: Arc<AllocatorShared>,
    closed: bool,
}

impl SoftwareCommandList {
    /// 记录一条命令，在队列执行该列表时按记录顺序调用
    ///
    /// # Panics
    ///
    /// 列表已关闭。
    pub fn record(&mut self, command: impl Fn() + Send + Sync + 'static) {
        assert!(!self.closed, "recording into a closed command list");
        self.commands.push(Arc::new(command));
    }

    /// 已记录的命令数
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    /// 提交时交给队列的内容
    pub(crate) fn submission(&self) -> Result<(Vec<Command>, Arc<AllocatorShared>)> {
        if !self.closed {
            return Err(GfxError::CommandExecution(
                "command list must be closed before execution".to_string(),
            ));
        }
        Ok((self.commands.clone(), Arc::clone(&self.allocator)))
    }
}

impl NativeCommandList for SoftwareCommandList {
    type CommandAllocator = SoftwareCommandAllocator;

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(GfxError::InvalidState("command list is already closed".to_string()));
        }
        self.closed = true;
        self.allocator.recording.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    fn reset(&mut self, allocator: &SoftwareCommandAllocator) -> Result<()> {
        if !self.closed {
            return Err(GfxError::InvalidState(
                "command list must be closed before reset".to_string(),
            ));
        }
        check_list_type(self.list_type, allocator)?;
        self.commands.clear();
        self.allocator = Arc::clone(&allocator.shared);
        self.allocator.recording.fetch_add(1, Ordering::AcqRel);
        self.closed = false;
        Ok(())
    }
}

impl Drop for SoftwareCommandList {
    fn drop(&mut self) {
        if !self.closed {
            self.allocator.recording.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
