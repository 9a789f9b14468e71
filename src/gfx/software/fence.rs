//! 软件 Fence 与等待事件
//!
//! Fence 是一个 CPU 计数器：队列工作线程执行 signal 操作时写入新值，
//! 并唤醒所有目标值已到达的事件和 GPU 侧等待者。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::error::Result;
use crate::gfx::backend::{NativeEvent, NativeFence};

struct FenceState {
    value: u64,
    /// 尚未到达的 (目标值, 事件)
    pending_events: Vec<(u64, SoftwareEvent)>,
}

struct FenceShared {
    state: Mutex<FenceState>,
    changed: Condvar,
}

/// 软件 Fence
///
/// 克隆得到的是同一个 Fence 的另一个引用。
#[derive(Clone)]
pub struct SoftwareFence {
    shared: Arc<FenceShared>,
}

impl SoftwareFence {
    /// 创建初始值为 `initial_value` 的 Fence
    pub fn new(initial_value: u64) -> Self {
        Self {
            shared: Arc::new(FenceShared {
                state: Mutex::new(FenceState {
                    value: initial_value,
                    pending_events: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// 立即把 Fence 设置为 `value`（CPU 侧 signal，允许变小）
    pub fn signal(&self, value: u64) {
        let mut state = self.shared.state.lock();
        state.value = value;

        let (reached, pending): (Vec<_>, Vec<_>) = state
            .pending_events
            .drain(..)
            .partition(|(target, _)| *target <= value);
        state.pending_events = pending;
        drop(state);

        for (_, event) in reached {
            event.set();
        }
        self.shared.changed.notify_all();
    }

    /// 阻塞直到 Fence 到达 `value`；`keep_waiting` 返回 false 时放弃并返回 false
    pub(crate) fn wait_until(&self, value: u64, mut keep_waiting: impl FnMut() -> bool) -> bool {
        let mut state = self.shared.state.lock();
        while state.value < value {
            if !keep_waiting() {
                return false;
            }
            self.shared.changed.wait_for(&mut state, Duration::from_millis(10));
        }
        true
    }
}

impl NativeFence for SoftwareFence {
    type Event = SoftwareEvent;

    fn completed_value(&self) -> u64 {
        self.shared.state.lock().value
    }

    fn set_event_on_completion(&self, value: u64, event: &SoftwareEvent) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.value >= value {
            drop(state);
            event.set();
        } else {
            state.pending_events.push((value, event.clone()));
        }
        Ok(())
    }
}

/// 自动复位事件
///
/// 一次 `set` 唤醒一次 `wait`，`wait` 返回时事件回到未触发状态。
#[derive(Clone, Default)]
pub struct SoftwareEvent {
    shared: Arc<(Mutex<bool>, Condvar)>,
}

impl SoftwareEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发事件
    pub fn set(&self) {
        let (signaled, cond) = &*self.shared;
        *signaled.lock() = true;
        cond.notify_one();
    }
}

impl NativeEvent for SoftwareEvent {
    fn wait(&self) -> Result<()> {
        let (signaled, cond) = &*self.shared;
        let mut signaled = signaled.lock();
        while !*signaled {
            cond.wait(&mut signaled);
        }
        *signaled = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_event_fires_immediately_when_reached() {
        let fence = SoftwareFence::new(4);
        let event = SoftwareEvent::new();
        fence.set_event_on_completion(3, &event).unwrap();
        event.wait().unwrap();
    }

    #[test]
    fn test_event_fires_on_signal() {
        let fence = SoftwareFence::new(0);
        let event = SoftwareEvent::new();
        fence.set_event_on_completion(2, &event).unwrap();

        let signaler = {
            let fence = fence.clone();
            thread::spawn(move || {
                fence.signal(1);
                thread::sleep(Duration::from_millis(5));
                fence.signal(2);
            })
        };

        event.wait().unwrap();
        assert!(fence.completed_value() >= 2);
        signaler.join().unwrap();
    }

    #[test]
    fn test_wait_until_can_give_up() {
        let fence = SoftwareFence::new(0);
        assert!(!fence.wait_until(1, || false));
        fence.signal(1);
        assert!(fence.wait_until(1, || false));
    }
}
