//! 软件后端
//!
//! 用 CPU 线程模拟 GPU：每个命令队列一个工作线程，Fence 是 CPU 计数器。
//! 不依赖任何图形驱动，可以在所有平台上运行同步核心并在测试中控制 GPU 进度。

mod backend;
mod fence;
mod queue;

pub use backend::{SoftwareBackend, SoftwareCommandAllocator, SoftwareCommandList};
pub use fence::{SoftwareEvent, SoftwareFence};
pub use queue::SoftwareQueue;
