//! 软件命令队列
//!
//! 每个队列有一个工作线程，按提交顺序执行操作（执行命令列表、signal、GPU 侧等待），
//! 模拟 GPU 对单个队列的串行执行。
//!
//! 队列可以暂停：暂停后只有 [`SoftwareQueue::step`] 发放的额度才能让操作继续执行，
//! 测试借此精确控制“GPU”的进度。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

use super::backend::{AllocatorShared, Command, SoftwareCommandList};
use super::fence::SoftwareFence;
use crate::core::error::{GfxError, Result};
use crate::gfx::backend::NativeQueue;
use crate::renderer::command::CommandListType;

enum QueueOp {
    Execute {
        commands: Vec<Command>,
        allocator: Arc<AllocatorShared>,
    },
    Signal {
        fence: SoftwareFence,
        value: u64,
    },
    Wait {
        fence: SoftwareFence,
        value: u64,
    },
}

#[derive(Default)]
struct QueueState {
    ops: VecDeque<QueueOp>,
    paused: bool,
    /// 暂停时还允许执行的操作数
    credits: usize,
    busy: bool,
}

struct QueueShared {
    list_type: CommandListType,
    execution_delay: Duration,
    state: Mutex<QueueState>,
    work_ready: Condvar,
    idle: Condvar,
    shutdown: AtomicBool,
}

/// 软件命令队列
pub struct SoftwareQueue {
    shared: Arc<QueueShared>,
    worker: Option<JoinHandle<()>>,
}

impl SoftwareQueue {
    pub(crate) fn new(list_type: CommandListType, execution_delay: Duration) -> Result<Self> {
        let shared = Arc::new(QueueShared {
            list_type,
            execution_delay,
            state: Mutex::new(QueueState::default()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = thread::Builder::new()
            .name(format!("software-gpu-{}", list_type.name().to_lowercase()))
            .spawn({
                let shared = Arc::clone(&shared);
                move || run_worker(&shared)
            })
            .map_err(|e| GfxError::DeviceCreation(format!("failed to spawn queue worker: {e}")))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// 暂停执行，已提交的操作保留在队列中
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        state.paused = true;
        state.credits = 0;
    }

    /// 恢复执行
    pub fn resume(&self) {
        let mut state = self.shared.state.lock();
        state.paused = false;
        state.credits = 0;
        self.shared.work_ready.notify_all();
    }

    /// 暂停状态下执行最多 `ops` 个操作，阻塞到它们执行完毕
    ///
    /// 每次 `execute_command_list` 提交两个操作（执行 + signal），
    /// 每次单独的 signal 或 GPU 侧等待各一个操作。
    pub fn step(&self, ops: usize) {
        let mut state = self.shared.state.lock();
        state.credits += ops;
        self.shared.work_ready.notify_all();

        while state.busy || (state.credits > 0 && !state.ops.is_empty()) {
            self.shared.idle.wait(&mut state);
        }
        state.credits = 0;
    }

    /// 尚未执行的操作数
    pub fn pending_ops(&self) -> usize {
        self.shared.state.lock().ops.len()
    }

    fn push(&self, op: QueueOp) {
        let mut state = self.shared.state.lock();
        state.ops.push_back(op);
        self.shared.work_ready.notify_all();
    }
}

impl NativeQueue for SoftwareQueue {
    type Fence = SoftwareFence;
    type CommandList = SoftwareCommandList;

    fn execute_command_list(&self, list: &SoftwareCommandList) -> Result<()> {
        let (commands, allocator) = list.submission()?;
        allocator.begin_execution();
        self.push(QueueOp::Execute { commands, allocator });
        Ok(())
    }

    fn signal(&self, fence: &SoftwareFence, value: u64) -> Result<()> {
        self.push(QueueOp::Signal {
            fence: fence.clone(),
            value,
        });
        Ok(())
    }

    fn wait(&self, fence: &SoftwareFence, value: u64) -> Result<()> {
        self.push(QueueOp::Wait {
            fence: fence.clone(),
            value,
        });
        Ok(())
    }
}

impl Drop for SoftwareQueue {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let _state = self.shared.state.lock();
            self.shared.work_ready.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(list_type = self.shared.list_type.name(), "Software queue worker panicked");
            }
        }
    }
}

fn run_worker(shared: &QueueShared) {
    loop {
        let op = {
            let mut state = shared.state.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                if !state.ops.is_empty() && (!state.paused || state.credits > 0) {
                    break;
                }
                shared.work_ready.wait(&mut state);
            }
            if state.paused {
                state.credits -= 1;
            }
            state.busy = true;
            state.ops.pop_front()
        };

        if let Some(op) = op {
            execute(shared, op);
        }

        let mut state = shared.state.lock();
        state.busy = false;
        shared.idle.notify_all();
    }
}

fn execute(shared: &QueueShared, op: QueueOp) {
    match op {
        QueueOp::Execute { commands, allocator } => {
            if !shared.execution_delay.is_zero() {
                thread::sleep(shared.execution_delay);
            }
            for command in &commands {
                command();
            }
            allocator.end_execution();
        }
        QueueOp::Signal { fence, value } => {
            trace!(list_type = shared.list_type.name(), value, "Software fence signaled");
            fence.signal(value);
        }
        QueueOp::Wait { fence, value } => {
            fence.wait_until(value, || !shared.shutdown.load(Ordering::Acquire));
        }
    }
}
